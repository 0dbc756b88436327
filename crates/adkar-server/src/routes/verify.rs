//! Readiness probe endpoint. Each action maps to one bounded-timeout check
//! against the locally installed engine tooling.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::routes::chat::ErrorBody;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub action: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum VerifyAction {
    CheckInstallation,
    CheckRunning,
    CheckModel,
    TestModel,
}

impl VerifyAction {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "check-installation" => Some(Self::CheckInstallation),
            "check-running" => Some(Self::CheckRunning),
            "check-model" => Some(Self::CheckModel),
            "test-model" => Some(Self::TestModel),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelsResponse {
    pub exists: bool,
    #[serde(rename = "fastModelExists")]
    pub fast_model_exists: bool,
    #[serde(rename = "ultrafastModelExists")]
    pub ultrafast_model_exists: bool,
}

#[utoipa::path(
    post,
    path = "/api/adkar-chat/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Probe result for the requested action"),
        (status = 400, description = "Missing or unknown action", body = ErrorBody)
    )
)]
pub(crate) async fn verify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> axum::response::Response {
    let action = match request.action.as_deref() {
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "Missing action parameter".to_string(),
                }),
            )
                .into_response();
        }
        Some(raw) => match VerifyAction::parse(raw) {
            Some(action) => action,
            None => {
                tracing::debug!(action = raw, "unknown verify action");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorBody {
                        error: "Invalid action parameter".to_string(),
                    }),
                )
                    .into_response();
            }
        },
    };

    match action {
        VerifyAction::CheckInstallation => {
            let installed = state.probe.check_installed().await;
            Json(json!({ "installed": installed })).into_response()
        }
        VerifyAction::CheckRunning => {
            let running = state.probe.check_running().await;
            Json(json!({ "running": running })).into_response()
        }
        VerifyAction::CheckModel => {
            let report = state.probe.check_models().await;
            Json(ModelsResponse {
                exists: report.has_model("adkar"),
                fast_model_exists: report.has_model("adkar_fast"),
                ultrafast_model_exists: report.has_model("adkar_ultrafast"),
            })
            .into_response()
        }
        VerifyAction::TestModel => {
            let model = request
                .model
                .unwrap_or_else(|| state.engine.default_model().to_string());
            let outcome = state.probe.test_model(&model).await;
            Json(json!({ "success": outcome.ok, "output": outcome.output })).into_response()
        }
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/adkar-chat/verify", post(verify))
        .with_state(state)
}
