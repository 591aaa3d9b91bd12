mod api;
mod metrics;

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    routing::{delete, get, post},
    Router,
};
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;

use crate::cluster_admin::ClusterAdmin;
use crate::cluster_metadata::MetadataAggregator;
use crate::consumption::ConsumptionSessions;
use crate::lag::LagAggregator;
use crate::throughput::ThroughputTracker;

/// Upper bound to the time spent serving a single request.
///
/// Aggregations issue one cluster request per Topic Partition (or more): on large clusters
/// they can take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct HttpServiceState {
    pub metadata: Arc<MetadataAggregator>,
    pub lag: Arc<LagAggregator>,
    pub throughput: Arc<ThroughputTracker>,
    pub sessions: Arc<ConsumptionSessions>,
    pub admin: Arc<dyn ClusterAdmin>,
    pub shutdown_token: CancellationToken,
    pub metrics: Arc<Registry>,
}

fn router(state: HttpServiceState) -> Router {
    Router::new()
        .route("/api/v1/brokers", get(api::get_brokers))
        .route("/api/v1/topics", get(api::get_topics).post(api::post_topic))
        .route("/api/v1/topics/:topic", delete(api::delete_topic))
        .route("/api/v1/topics/:topic/records", post(api::post_record))
        .route("/api/v1/consumer-groups", get(api::get_consumer_groups))
        .route("/api/v1/consumer-groups/:group", get(api::get_consumer_group))
        .route("/api/v1/throughput", get(api::get_throughput))
        .route("/api/v1/consumers", get(api::get_consumers).post(api::post_consumer))
        .route("/api/v1/consumers/:id", delete(api::delete_consumer))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/health", get(api::get_health))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

/// Serve the HTTP API until `shutdown_token` is cancelled.
pub async fn init(
    listen_on: SocketAddr,
    state: HttpServiceState,
    shutdown_token: CancellationToken,
) -> io::Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(listen_on).await?;
    info!("Begin listening on '{}'...", listen_on);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await
}
