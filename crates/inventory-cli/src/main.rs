//! Inventory CLI entry point.

use event_store::InMemoryEventStore;
use inventory_cli::{Config, LogFormat};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only the tables.
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Run the demo sequence against a fresh in-memory log
    let summary = inventory_cli::run(
        InMemoryEventStore::new(),
        &config,
        inventory_cli::reference_commands(),
        std::io::stdout(),
    )
    .await
    .expect("inventory run failed");

    tracing::info!(
        aggregate_id = %summary.aggregate_id,
        applied = summary.applied,
        rejected = summary.rejected,
        "inventory shut down gracefully"
    );

    if config.print_metrics {
        println!("{}", metrics_handle.render());
    }
}
