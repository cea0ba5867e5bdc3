use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "publicUrl": state.config.public_url,
        "cleanupEnabled": state.config.processor.cleanup.is_enabled(),
    }))
}
