//! Route table for the queue API

use crate::api::handlers::{self, ApiState};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the Axum router with all queue, staff, and operational endpoints
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/queue/stream", get(handlers::stream_queue_handler))
        .route("/queue/status/{entry_id}", get(handlers::entry_status_handler))
        .route(
            "/queue/settings/{venue_id}",
            get(handlers::get_settings_handler).put(handlers::put_settings_handler),
        )
        .route("/queue/manage/call-next", post(handlers::call_next_handler))
        .route("/queue/manage/seated", post(handlers::mark_seated_handler))
        .route("/queue/manage/no-show", post(handlers::mark_no_show_handler))
        .route(
            "/queue/{venue_id}",
            get(handlers::venue_snapshot_handler)
                .post(handlers::join_queue_handler)
                .delete(handlers::leave_queue_handler),
        )
        .with_state(state)
}
