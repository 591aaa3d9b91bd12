#[macro_use]
extern crate log;

mod cli;
mod cluster_admin;
mod cluster_metadata;
mod constants;
mod consumer_registry;
mod consumption;
mod fact_source;
mod http;
mod kafka_types;
mod lag;
mod logging;
mod prometheus_metrics;
mod throughput;

use std::error::Error;
use std::process;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cli::Cli;
use cluster_admin::KafkaClusterAdmin;
use cluster_metadata::MetadataAggregator;
use consumer_registry::ConsumerRegistry;
use consumption::{ConsumptionSessions, PartitionConsumptionCoordinator};
use fact_source::{ClusterFactSource, KafkaFactSource};
use http::HttpServiceState;
use lag::LagAggregator;
use throughput::ThroughputTracker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = parse_cli_and_init_logging();

    let shutdown_token = build_shutdown_token();

    let client_config = cli.build_client_config();
    let kafka_source = match KafkaFactSource::new(client_config.clone(), cli.fetch_timeout) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create Kafka clients: {e}");
            process::exit(exit_code::CONFIG_ERROR);
        },
    };
    let kafka_admin = match KafkaClusterAdmin::new(&client_config, cli.fetch_timeout) {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to create Kafka admin clients: {e}");
            process::exit(exit_code::CONFIG_ERROR);
        },
    };

    // Cluster identifier, used as default label by all metrics
    let cluster_id = match &cli.cluster_id {
        Some(id) => Some(id.clone()),
        None => kafka_source.cluster_id().await,
    };
    let metrics = Arc::new(prometheus_metrics::init(cluster_id));

    let source: Arc<dyn ClusterFactSource> = Arc::new(kafka_source);
    let registry = Arc::new(ConsumerRegistry::new(metrics.clone()));

    let state = HttpServiceState {
        metadata: Arc::new(MetadataAggregator::new(source.clone(), metrics.clone())),
        lag: Arc::new(LagAggregator::new(source.clone(), metrics.clone())),
        throughput: Arc::new(ThroughputTracker::new(
            source.clone(),
            cli.throughput_window,
            cli.throughput_rate_window,
            metrics.clone(),
        )),
        sessions: Arc::new(ConsumptionSessions::new(
            PartitionConsumptionCoordinator::new(source),
            registry.clone(),
            metrics.clone(),
        )),
        admin: Arc::new(kafka_admin),
        shutdown_token: shutdown_token.clone(),
        metrics,
    };

    let res = http::init(cli.listen_on(), state, shutdown_token.clone()).await;

    // The server might have stopped on its own: make sure everything else stops too
    shutdown_token.cancel();
    registry.stop_all().await;

    if let Err(e) = res {
        error!("HTTP server on '{}' failed: {e}", cli.listen_on());
        process::exit(exit_code::SERVICE_UNAVAILABLE);
    }

    info!("Shutdown complete");
    Ok(())
}

fn parse_cli_and_init_logging() -> Cli {
    // Parse command line input and initialize logging
    let cli = Cli::parse_and_validate();
    logging::init(cli.verbosity_level());

    trace!("Created:\n{:#?}", cli);

    cli
}

fn build_shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();

    // Setup shutdown signal handler:
    // when it's time to shutdown, cancel the token every part of the system holds a clone (or child) of.
    //
    // NOTE: This handler will be listening on its own dedicated thread.
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutting down...");
        handler_token.cancel();
    }) {
        error!("Failed to register signal handler: {e}");
    }

    token
}
