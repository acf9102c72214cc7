use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

pub const ERROR_EVENTS_METRIC: &str = "credit_scorer_error_events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Unknown values fall back to JSON; the config layer validates earlier.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("pretty") {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

struct ErrorCounterLayer {
    service: &'static str,
}

impl<S> Layer<S> for ErrorCounterLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            metrics::counter!(ERROR_EVENTS_METRIC, "service" => self.service).increment(1);
        }
    }
}

/// Build a `tracing` dispatcher with:
/// - JSON (or human-readable) logs to stderr, keeping stdout free for command output
/// - EnvFilter honoring `RUST_LOG` first, then `default_level`
/// - an ERROR event counter exported through `metrics`
pub fn build_dispatch(
    service: &'static str,
    default_level: &str,
    format: LogFormat,
) -> tracing::Dispatch {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let error_counter = ErrorCounterLayer { service };

    match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .json();
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(error_counter);
            tracing::Dispatch::new(subscriber)
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false);
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(error_counter);
            tracing::Dispatch::new(subscriber)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }
}
