//! HTTP handlers for the queue API
//!
//! Every mutating endpoint goes through the position engine, which
//! persists the change and fans the resulting events out through the
//! broadcast hub. Errors surface as structured JSON bodies with a
//! machine-readable kind.

use crate::error::QueueError;
use crate::hub::BroadcastHub;
use crate::metrics::MetricsCollector;
use crate::queue::QueueEngine;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::store::QueueStore;
use crate::stream::{StreamSession, StreamSessionConfig};
use crate::types::{EntryId, JoinRequest, PartyIdentity, VenueQueueSettings};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error};
use uuid::Uuid;

/// Shared state for all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<QueueEngine>,
    pub hub: Arc<BroadcastHub>,
    pub store: Arc<dyn QueueStore>,
    pub metrics: Arc<MetricsCollector>,
    pub stream_config: StreamSessionConfig,
}

/// Body for joining a venue's queue
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBody {
    pub party_size: Option<u32>,
    pub user_id: Option<String>,
    pub guest_name: Option<String>,
    pub phone_number: Option<String>,
}

/// Query for leaving a queue
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveQuery {
    pub entry_id: Option<String>,
}

/// Body for the staff call-next action
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNextBody {
    pub venue_id: String,
    pub count: Option<usize>,
}

/// Body for staff seated / no-show actions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffEntryBody {
    pub queue_entry_id: String,
}

/// Body for replacing venue settings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBody {
    pub settings: VenueQueueSettings,
}

/// Query for opening a stream session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub venue_id: Option<String>,
    pub entry_id: Option<String>,
    pub user_id: Option<String>,
}

/// Map an engine error onto a structured HTTP response
fn error_response(err: anyhow::Error) -> Response {
    let (status, kind, message) = if let Some(queue_err) = err.downcast_ref::<QueueError>() {
        let status = match queue_err {
            QueueError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            QueueError::NotFound { .. } => StatusCode::NOT_FOUND,
            QueueError::InvalidState { .. } => StatusCode::CONFLICT,
            QueueError::DuplicateEntry { .. } => StatusCode::CONFLICT,
            QueueError::QueueEmpty { .. } => StatusCode::NOT_FOUND,
            QueueError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            QueueError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, queue_err.kind(), queue_err.to_string())
    } else {
        error!("Unclassified API error: {}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            err.to_string(),
        )
    };

    debug!("Request failed ({}): {}", kind, message);
    (
        status,
        Json(json!({ "error": { "kind": kind, "message": message } })),
    )
        .into_response()
}

fn invalid_request(reason: &str) -> Response {
    error_response(
        QueueError::InvalidRequest {
            reason: reason.to_string(),
        }
        .into(),
    )
}

fn entry_not_found(raw: &str) -> Response {
    error_response(
        QueueError::NotFound {
            what: format!("entry {}", raw),
        }
        .into(),
    )
}

/// Root endpoint handler - shows service information
pub async fn root_handler() -> impl IntoResponse {
    let info = json!({
        "service": "host-stand",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/ready",
            "/metrics",
            "/queue/{venueId}",
            "/queue/status/{entryId}",
            "/queue/settings/{venueId}",
            "/queue/manage/call-next",
            "/queue/manage/seated",
            "/queue/manage/no-show",
            "/queue/stream"
        ]
    });

    Json(info)
}

/// Liveness check endpoint handler
pub async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Health check requested");

    let report = HealthCheck::evaluate(&state.store, &state.hub, &state.metrics).await;
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}

/// Readiness check endpoint handler
pub async fn ready_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    let report = HealthCheck::evaluate(&state.store, &state.hub, &state.metrics).await;
    match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => (StatusCode::OK, "Ready"),
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
    }
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<ApiState>) -> Response {
    let registry = state.metrics.registry();
    let metric_families = registry.gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            output,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// GET /queue/{venue_id} - current queue snapshot
pub async fn venue_snapshot_handler(
    State(state): State<ApiState>,
    Path(venue_id): Path<String>,
) -> Response {
    match state.engine.snapshot(&venue_id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /queue/{venue_id} - join the waitlist
pub async fn join_queue_handler(
    State(state): State<ApiState>,
    Path(venue_id): Path<String>,
    Json(body): Json<JoinBody>,
) -> Response {
    let Some(party_size) = body.party_size else {
        return invalid_request("partySize is required");
    };

    let party = PartyIdentity {
        user_id: body.user_id,
        guest_name: body.guest_name,
        phone_number: body.phone_number,
    };
    if !party.is_identified() {
        return invalid_request("A guestName, phoneNumber, or userId is required");
    }

    let request = JoinRequest { party, party_size };
    match state.engine.join(&venue_id, request).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /queue/{venue_id}?entryId= - leave the waitlist
pub async fn leave_queue_handler(
    State(state): State<ApiState>,
    Path(venue_id): Path<String>,
    Query(query): Query<LeaveQuery>,
) -> Response {
    let Some(raw) = query.entry_id.filter(|v| !v.is_empty()) else {
        return invalid_request("entryId query parameter is required");
    };
    let Ok(entry_id) = Uuid::parse_str(&raw) else {
        return entry_not_found(&raw);
    };

    match state.engine.leave(&venue_id, entry_id).await {
        Ok(entry) => Json(json!({ "status": "cancelled", "entry": entry })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /queue/status/{entry_id} - live status for one entry
pub async fn entry_status_handler(
    State(state): State<ApiState>,
    Path(raw_entry_id): Path<String>,
) -> Response {
    let Ok(entry_id) = Uuid::parse_str(&raw_entry_id) else {
        return entry_not_found(&raw_entry_id);
    };

    match state.engine.entry_status(entry_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /queue/manage/call-next - staff invites the next parties
pub async fn call_next_handler(
    State(state): State<ApiState>,
    Json(body): Json<CallNextBody>,
) -> Response {
    let count = body.count.unwrap_or(1);
    match state.engine.call_next(&body.venue_id, count).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /queue/manage/seated - staff confirms a called party sat down
pub async fn mark_seated_handler(
    State(state): State<ApiState>,
    Json(body): Json<StaffEntryBody>,
) -> Response {
    let Ok(entry_id) = Uuid::parse_str(&body.queue_entry_id) else {
        return entry_not_found(&body.queue_entry_id);
    };

    match state.engine.mark_seated(entry_id).await {
        Ok(entry) => Json(json!({ "status": "seated", "entry": entry })).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /queue/manage/no-show - staff records a called party never arrived
pub async fn mark_no_show_handler(
    State(state): State<ApiState>,
    Json(body): Json<StaffEntryBody>,
) -> Response {
    let Ok(entry_id) = Uuid::parse_str(&body.queue_entry_id) else {
        return entry_not_found(&body.queue_entry_id);
    };

    match state.engine.mark_no_show(entry_id).await {
        Ok(entry) => Json(json!({ "status": "no_show", "entry": entry })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /queue/settings/{venue_id} - venue queue settings
pub async fn get_settings_handler(
    State(state): State<ApiState>,
    Path(venue_id): Path<String>,
) -> Response {
    match state.engine.settings(&venue_id).await {
        Ok(settings) => Json(json!({ "venueId": venue_id, "settings": settings })).into_response(),
        Err(e) => error_response(e),
    }
}

/// PUT /queue/settings/{venue_id} - replace venue queue settings
pub async fn put_settings_handler(
    State(state): State<ApiState>,
    Path(venue_id): Path<String>,
    Json(body): Json<SettingsBody>,
) -> Response {
    match state.engine.update_settings(&venue_id, body.settings).await {
        Ok(settings) => Json(json!({ "venueId": venue_id, "settings": settings })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /queue/stream - long-lived SSE connection for live updates
pub async fn stream_queue_handler(
    State(state): State<ApiState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let Some(venue_id) = query.venue_id.filter(|v| !v.is_empty()) else {
        return invalid_request("venueId query parameter is required");
    };

    let entry_id: Option<EntryId> = match query.entry_id.as_deref().filter(|v| !v.is_empty()) {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => return invalid_request("entryId is not a valid id"),
        },
        None => None,
    };
    let user_id = query.user_id.filter(|v| !v.is_empty());

    let session = StreamSession::new(
        state.engine.clone(),
        state.hub.clone(),
        state.metrics.clone(),
        venue_id,
        entry_id,
        user_id,
        state.stream_config.clone(),
    );

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(session.run(tx));

    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<Event, Infallible>(Event::default().event(event.name).data(event.data())));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases: Vec<(QueueError, StatusCode)> = vec![
            (
                QueueError::InvalidRequest {
                    reason: "bad".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                QueueError::NotFound {
                    what: "entry".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                QueueError::InvalidState {
                    reason: "already seated".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                QueueError::DuplicateEntry {
                    venue_id: "v".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                QueueError::QueueEmpty {
                    venue_id: "v".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                QueueError::StoreUnavailable {
                    message: "down".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            let response = error_response(err.into());
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_unclassified_error_is_internal() {
        let response = error_response(anyhow::anyhow!("something odd"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
