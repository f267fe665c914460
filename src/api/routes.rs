//! API route definitions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use super::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/window", get(window))
        .route("/counters", get(counters))
        .route("/trend", get(trend))
        .route("/connectivity", get(connectivity))
        .route("/dashboard", get(dashboard))
        .route("/machines/{machine_id}/latest", get(machine_latest))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn envelope<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "data": data, "meta": meta() }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let connectivity = state.dashboard.connectivity().await;
    envelope(json!({
        "status": "ok",
        "live_feed": connectivity,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn window(State(state): State<AppState>) -> Json<Value> {
    let window = state.dashboard.window().await;
    let mut meta = meta();
    meta["total"] = json!(window.len());
    meta["capacity"] = json!(state.dashboard.capacity());
    Json(json!({ "data": window, "meta": meta }))
}

async fn counters(State(state): State<AppState>) -> Json<Value> {
    envelope(state.dashboard.counters().await)
}

async fn trend(State(state): State<AppState>) -> Json<Value> {
    envelope(state.dashboard.trend_series().await)
}

async fn connectivity(State(state): State<AppState>) -> Json<Value> {
    envelope(json!({ "state": state.dashboard.connectivity().await }))
}

async fn dashboard(State(state): State<AppState>) -> Json<Value> {
    envelope(state.dashboard.view().await)
}

async fn machine_latest(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.dashboard.latest_for_machine(&machine_id).await {
        Some(result) => (StatusCode::OK, envelope(result)),
        None => (
            StatusCode::NOT_FOUND,
            {
                let mut meta = meta();
                meta["message"] = json!(format!("no result for machine {machine_id} in window"));
                Json(json!({ "data": null, "meta": meta }))
            },
        ),
    }
}
