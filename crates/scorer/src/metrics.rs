use anyhow::Result;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_histogram!(
        "credit_scorer_subgraph_latency_ms",
        "Subgraph request latency in milliseconds."
    );
    describe_counter!(
        "credit_scorer_subgraph_requests_total",
        "Subgraph requests by status."
    );
    describe_counter!(
        "credit_scorer_subgraph_errors_total",
        "Failed subgraph requests by error kind."
    );
    describe_counter!(
        "credit_scorer_wallets_total",
        "Wallets processed by extraction outcome."
    );
    describe_counter!(
        "credit_scorer_wallets_scored_total",
        "Wallets scored, by scorer."
    );
    describe_counter!(
        common::observability::ERROR_EVENTS_METRIC,
        "Number of ERROR-level log events."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_handle_renders_metric_names() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe();
            metrics::counter!("credit_scorer_wallets_total", "outcome" => "extracted")
                .increment(2);
            metrics::histogram!("credit_scorer_subgraph_latency_ms").record(12.0);
        });

        let rendered = handle.render();
        assert!(rendered.contains("credit_scorer_wallets_total{outcome=\"extracted\"} 2"));
        assert!(rendered.contains("credit_scorer_subgraph_latency_ms"));
    }
}
