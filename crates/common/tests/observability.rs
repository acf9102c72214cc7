use metrics_exporter_prometheus::PrometheusBuilder;

// Integration test: exercises the public `common::observability` surface.

#[test]
fn error_events_counter_increments_on_error_event() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let dispatch = common::observability::build_dispatch(
            "test-service",
            "info",
            common::observability::LogFormat::Json,
        );

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::error!(wallet = "0xabc", "boom");
            tracing::info!("not counted");
        });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains(common::observability::ERROR_EVENTS_METRIC),
        "expected error events counter in rendered metrics, got:\n{rendered}"
    );
    assert!(rendered.contains("service=\"test-service\""));
}
