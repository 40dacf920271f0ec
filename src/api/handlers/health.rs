//! Liveness check. Not part of the spec's external interfaces (§6), but
//! every deployable the teacher ships carries one (`handlers/health.rs`).

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
