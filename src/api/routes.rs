//! API route definitions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::ingress::{Activity, ActivityAttributes, EntityType};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/dashboard", get(dashboard))
        .route("/metrics", get(metrics))
        .route("/activities", post(record_activity))
        .route("/alerts", get(list_alerts))
        .route("/alerts/{id}/acknowledge", post(acknowledge_alert))
        .route("/alerts/{id}/resolve", post(resolve_alert))
        .route("/mitigations", get(list_mitigations))
        .route("/mitigations/{type}/{entity_id}", delete(remove_mitigation))
}

fn envelope(data: Value) -> Json<Value> {
    Json(json!({
        "data": data,
        "meta": {
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn health() -> Json<Value> {
    envelope(json!({ "status": "ok" }))
}

async fn dashboard(State(state): State<AppState>) -> Json<Value> {
    let summary = state.engine.dashboard_summary().await;
    envelope(json!(summary))
}

async fn metrics(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.engine.metrics.snapshot();
    envelope(json!(snapshot))
}

#[derive(Debug, Deserialize)]
struct RecordActivityRequest {
    entity_id: String,
    entity_type: EntityType,
    activity_type: String,
    attributes: ActivityAttributes,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Fire-and-forget ingress: always accepted; malformed payloads are
/// dropped by the engine without failing the request.
async fn record_activity(
    State(state): State<AppState>,
    Json(req): Json<RecordActivityRequest>,
) -> StatusCode {
    state
        .engine
        .record_activity(Activity {
            entity_id: req.entity_id,
            entity_type: req.entity_type,
            activity_type: req.activity_type,
            timestamp: req.timestamp.unwrap_or_else(Utc::now),
            attributes: req.attributes,
        })
        .await;
    StatusCode::ACCEPTED
}

async fn list_alerts(State(state): State<AppState>) -> Json<Value> {
    let alerts = state.engine.alerts.active_alerts().await;
    let total = alerts.len();
    envelope(json!({ "alerts": alerts, "total": total }))
}

async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let alert = state
        .engine
        .alerts
        .acknowledge(id)
        .await
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    Ok(envelope(json!(alert)))
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    notes: String,
    #[serde(default)]
    false_positive: bool,
}

async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let result = if req.false_positive {
        state.engine.alerts.mark_false_positive(id, &req.notes).await
    } else {
        state.engine.alerts.resolve(id, &req.notes).await
    };
    let alert = result.map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    Ok(envelope(json!(alert)))
}

async fn list_mitigations(State(state): State<AppState>) -> Json<Value> {
    let mitigations = state.engine.mitigations.active_mitigations();
    let total = mitigations.len();
    envelope(json!({ "mitigations": mitigations, "total": total }))
}

async fn remove_mitigation(
    State(state): State<AppState>,
    Path((mitigation_type, entity_id)): Path<(String, String)>,
) -> Json<Value> {
    let removed = state.engine.mitigations.remove(&mitigation_type, &entity_id);
    envelope(json!({ "removed": removed }))
}
