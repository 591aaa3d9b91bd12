use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::HttpServiceState;
use crate::cluster_admin::{AdminError, NewTopic, OutgoingRecord};
use crate::cluster_metadata::ClusterMetadataError;
use crate::consumption::ConsumptionMode;
use crate::fact_source::FactSourceError;
use crate::kafka_types::StartOffset;
use crate::lag::LagError;
use crate::throughput::ThroughputError;

/// Body of every JSON response.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Envelope<T: Serialize> {
    Ok { data: T },
    Error { error: String },
}

fn respond<T: Serialize>(status: StatusCode, data: T) -> Response {
    (
        status,
        Json(Envelope::Ok {
            data,
        }),
    )
        .into_response()
}

/// Error response: status code, and message placed in the [`Envelope`].
#[derive(Debug)]
pub(super) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn from_cluster(e: &FactSourceError, message: String) -> Self {
        let status = if e.is_connection() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_GATEWAY
        };
        error!("{message}");
        Self::new(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(Envelope::<()>::Error {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<ClusterMetadataError> for ApiError {
    fn from(e: ClusterMetadataError) -> Self {
        Self::from_cluster(e.fact_source_error(), e.to_string())
    }
}

impl From<LagError> for ApiError {
    fn from(e: LagError) -> Self {
        match e.fact_source_error() {
            Some(fse) => Self::from_cluster(fse, e.to_string()),
            None => Self::new(StatusCode::NOT_FOUND, e.to_string()),
        }
    }
}

impl From<ThroughputError> for ApiError {
    fn from(e: ThroughputError) -> Self {
        Self::from_cluster(e.fact_source_error(), e.to_string())
    }
}

impl From<AdminError> for ApiError {
    fn from(e: AdminError) -> Self {
        let status = match &e {
            AdminError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::TopicAlreadyExists(_) => StatusCode::CONFLICT,
            AdminError::TopicNotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Kafka(_) if e.is_connection() => StatusCode::SERVICE_UNAVAILABLE,
            AdminError::Kafka(_) | AdminError::TopicOperation(..) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            error!("{e}");
        }
        Self::new(status, e.to_string())
    }
}

type ApiResult = Result<Response, ApiError>;

#[derive(Debug, Serialize)]
pub(super) struct Health {
    status: &'static str,
}

pub(super) async fn get_health() -> Json<Health> {
    Json(Health {
        status: "ok",
    })
}

pub(super) async fn get_brokers(State(state): State<HttpServiceState>) -> ApiResult {
    Ok(respond(StatusCode::OK, state.metadata.broker_stats().await?))
}

pub(super) async fn get_topics(State(state): State<HttpServiceState>) -> ApiResult {
    Ok(respond(StatusCode::OK, state.metadata.topic_stats().await?))
}

pub(super) async fn post_topic(
    State(state): State<HttpServiceState>,
    Json(topic): Json<NewTopic>,
) -> ApiResult {
    topic.validate()?;
    state.admin.create_topic(&topic).await?;

    Ok(respond(StatusCode::CREATED, topic))
}

pub(super) async fn delete_topic(
    State(state): State<HttpServiceState>,
    Path(topic): Path<String>,
) -> ApiResult {
    state.admin.delete_topic(&topic).await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(super) async fn post_record(
    State(state): State<HttpServiceState>,
    Path(topic): Path<String>,
    Json(record): Json<OutgoingRecord>,
) -> ApiResult {
    Ok(respond(StatusCode::CREATED, state.admin.produce(&topic, &record).await?))
}

pub(super) async fn get_consumer_groups(State(state): State<HttpServiceState>) -> ApiResult {
    Ok(respond(StatusCode::OK, state.lag.consumer_groups().await?))
}

pub(super) async fn get_consumer_group(
    State(state): State<HttpServiceState>,
    Path(group): Path<String>,
) -> ApiResult {
    Ok(respond(StatusCode::OK, state.lag.consumer_group(&group).await?))
}

pub(super) async fn get_throughput(State(state): State<HttpServiceState>) -> ApiResult {
    Ok(respond(StatusCode::OK, state.throughput.poll().await?))
}

pub(super) async fn get_consumers(State(state): State<HttpServiceState>) -> ApiResult {
    Ok(respond(StatusCode::OK, state.sessions.registry().list().await))
}

/// Request to start a consumption session.
///
/// Without `group`, every partition is consumed independently starting at `from`
/// (default: `latest`).
#[derive(Debug, Deserialize)]
pub(super) struct StartConsumerRequest {
    id: String,
    topic: String,
    group: Option<String>,
    from: Option<StartOffset>,
}

#[derive(Debug, Serialize)]
struct StartedConsumer {
    id: String,
    topic: String,
    mode: String,
}

pub(super) async fn post_consumer(
    State(state): State<HttpServiceState>,
    Json(req): Json<StartConsumerRequest>,
) -> ApiResult {
    if req.id.trim().is_empty() || req.topic.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Both 'id' and 'topic' are required"));
    }

    let mode = match (req.group, req.from) {
        (Some(_), Some(_)) => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "'from' only applies to consumers without 'group'",
            ));
        },
        (Some(id), None) => ConsumptionMode::Group {
            id,
        },
        (None, from) => ConsumptionMode::GroupLess {
            start: from.unwrap_or_default(),
        },
    };

    let description = mode.to_string();
    if !state.sessions.start(&req.id, &req.topic, mode, &state.shutdown_token).await {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("Consumer '{}' is already running", req.id),
        ));
    }

    Ok(respond(
        StatusCode::ACCEPTED,
        StartedConsumer {
            id: req.id,
            topic: req.topic,
            mode: description,
        },
    ))
}

pub(super) async fn delete_consumer(
    State(state): State<HttpServiceState>,
    Path(id): Path<String>,
) -> ApiResult {
    if state.sessions.registry().remove(&id).await {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, format!("Consumer '{id}' not found")))
    }
}
