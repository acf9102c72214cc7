use anyhow::Result;
use clap::Parser;

mod cli;
mod extraction;
mod fetcher;
mod jobs;
mod metrics;
mod model_scoring;
mod tables;
mod wallet_features;
mod wallet_scoring;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the key may come from the real environment.
    let _ = dotenv::dotenv();

    let cli = cli::Cli::parse();
    let config = common::config::Config::load(&cli.config)?;

    let dispatch = common::observability::build_dispatch(
        "credit_scorer",
        &config.general.log_level,
        common::observability::LogFormat::parse(&config.general.log_format),
    );
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    if let Some(port) = config.observability.prometheus_port {
        metrics::install_prometheus(port)?;
        tracing::info!(port, "prometheus exporter listening");
    }
    metrics::describe();

    tracing::info!(config = %cli.config, "credit_scorer starting");

    if let Err(e) = cli::run_command(&config, cli.into_command()).await {
        tracing::error!(error = %format!("{e:#}"), "credit_scorer failed");
        return Err(e);
    }
    Ok(())
}
