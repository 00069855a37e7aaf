//! HTTP wire interface.
//!
//! - `GET /get` returns the current value as decimal text
//! - `POST /set/{value}` writes locally and returns the new value
//! - `POST /notify/{value}/{generation}?notifier=` applies a peer's push
//! - `GET /status` returns a `NodeStatus` as JSON
//! - `POST /swim` carries membership traffic

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use lww_core::{InboundHandler, NodeStatus, Register, parse_value};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::gossip::SwimMembership;
use crate::swim::SwimMessage;

/// Shared application state
pub struct AppState {
    pub node_name: String,
    pub register: Arc<Register>,
    pub inbound: InboundHandler,
    pub membership: Arc<SwimMembership>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/get", get(get_handler))
        .route("/set/{value}", post(set_handler))
        .route("/notify/{value}/{generation}", post(notify_handler))
        .route("/status", get(status_handler))
        .route("/swim", post(swim_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_handler(State(state): State<Arc<AppState>>) -> String {
    state.register.read().value.to_string()
}

async fn set_handler(
    State(state): State<Arc<AppState>>,
    Path(value): Path<String>,
) -> Response {
    let value = match parse_value(&value) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("[{}] rejected set: {}", state.node_name, e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let written = state.register.write(value);
    tracing::info!(
        "[{}] set value {} (generation {})",
        state.node_name,
        written.value,
        written.generation
    );
    (StatusCode::OK, written.value.to_string()).into_response()
}

#[derive(Debug, Deserialize)]
struct NotifyQuery {
    notifier: Option<String>,
}

/// Always 200 once both segments parse; the body says whether the push was adopted.
async fn notify_handler(
    State(state): State<Arc<AppState>>,
    Path((value, generation)): Path<(String, String)>,
    Query(query): Query<NotifyQuery>,
) -> Response {
    match state
        .inbound
        .handle_push_raw(&value, &generation, query.notifier.as_deref())
    {
        Ok(true) => (StatusCode::OK, "accepted").into_response(),
        Ok(false) => (StatusCode::OK, "ignored").into_response(),
        Err(e) => {
            tracing::debug!("[{}] rejected notify: {}", state.node_name, e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<NodeStatus> {
    Json(NodeStatus::capture(
        &state.node_name,
        &state.register,
        state.membership.as_ref(),
    ))
}

async fn swim_handler(
    State(state): State<Arc<AppState>>,
    Json(msg): Json<SwimMessage>,
) -> Json<SwimMessage> {
    Json(state.membership.handle_message(msg))
}
