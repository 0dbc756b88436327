//! Assistant metadata, liveness, and warmup endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use adkar::assistant::{resolve_assistant_type, AssistantType};
use adkar::Stage;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/status",
    responses((status = 200, description = "Liveness and resolved assistant type"))
)]
pub(crate) async fn api_status(
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    let assistant_type = resolve_assistant_type(&query, None);
    let request_origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    Json(json!({
        "status": "online",
        "message": format!("{} API is running", assistant_type.display_name()),
        "assistantType": assistant_type.as_str(),
        "request_origin": request_origin,
    }))
}

#[utoipa::path(
    get,
    path = "/api/assistant/info",
    responses((status = 200, description = "Metadata for the resolved assistant persona"))
)]
pub(crate) async fn assistant_info(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    let assistant_type = resolve_assistant_type(&query, None);
    Json(json!({
        "type": assistant_type.as_str(),
        "name": assistant_type.display_name(),
        "description": assistant_type.description(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[utoipa::path(
    get,
    path = "/api/stages",
    responses((status = 200, description = "The ADKAR stages with descriptions and coaching prompts"))
)]
pub(crate) async fn stages() -> Json<Value> {
    let stages: Vec<Value> = Stage::all()
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            json!({
                "stage": (i + 1).to_string(),
                "name": stage.name(),
                "description": stage.description(),
                "examplePrompts": stage.example_prompts(),
            })
        })
        .collect();
    Json(json!({ "stages": stages }))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WarmupRequest {
    #[serde(rename = "assistantType")]
    pub assistant_type: Option<String>,
    #[serde(default)]
    pub all: bool,
}

#[utoipa::path(
    post,
    path = "/api/warmup",
    request_body = WarmupRequest,
    responses(
        (status = 200, description = "Widget cache and engine warmed"),
        (status = 503, description = "Warmup failed; widget host or engine unavailable")
    )
)]
pub(crate) async fn warmup(
    State(state): State<Arc<AppState>>,
    body: Option<Json<WarmupRequest>>,
) -> axum::response::Response {
    let Json(request) = body.unwrap_or_default();
    let types: Vec<&str> = if request.all || request.assistant_type.is_none() {
        AssistantType::all().iter().map(|t| t.as_str()).collect()
    } else {
        let requested = request
            .assistant_type
            .as_deref()
            .and_then(AssistantType::parse)
            .unwrap_or_default();
        vec![requested.as_str()]
    };

    if state.widget_cache.initialize().await {
        Json(json!({
            "status": "success",
            "message": "Assistant service initialized successfully",
            "types": types,
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "message": "Assistant service failed to initialize",
            })),
        )
            .into_response()
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/assistant/info", get(assistant_info))
        .route("/api/stages", get(stages))
        .route("/api/warmup", post(warmup))
        .with_state(state)
}
