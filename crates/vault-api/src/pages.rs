use axum::{Json, extract::State, http::HeaderMap};
use serde_json::{Value, json};

use vault_types::api::IndexPage;

use crate::auth::AppState;
use crate::error::AppError;
use crate::middleware::authenticate;

/// GET /: landing page.
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<IndexPage>, AppError> {
    let authenticated = authenticate(&state, &headers).await?.is_some();
    Ok(Json(IndexPage {
        app: "vault",
        authenticated,
    }))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
