//! The generation relay endpoints: one buffered, one streaming.

use std::convert::Infallible;
use std::sync::Arc;

use adkar::engine::{GenerationRequest, STREAM_ERROR_MARKER};
use adkar::RelayError;
use axum::{
    body::Body,
    extract::State,
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub stage: Option<String>,
    pub question: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl ChatRequest {
    fn validate(&self) -> Result<GenerationRequest, RelayError> {
        GenerationRequest::new(
            self.stage.as_deref(),
            self.question.as_deref(),
            self.model.clone(),
        )
    }
}

/// Chunked plain-text body carrying the reframed token stream.
struct PlainTextStream<S>(S);

impl<S> IntoResponse for PlainTextStream<S>
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    fn into_response(self) -> axum::response::Response {
        http::Response::builder()
            .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(http::header::CACHE_CONTROL, "no-cache")
            .header(http::header::CONNECTION, "keep-alive")
            .body(Body::from_stream(self.0))
            .unwrap()
    }
}

#[utoipa::path(
    post,
    path = "/api/adkar-chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Aggregated generation result", body = ChatResponse),
        (status = 400, description = "Missing stage or question", body = ErrorBody),
        (status = 500, description = "Engine failure", body = ErrorBody)
    )
)]
pub(crate) async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> axum::response::Response {
    let request = match request.validate() {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("rejecting chat request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    match state.engine.generate(&request).await {
        Ok(text) => {
            tracing::info!(stage = request.stage().name(), chars = text.len(), "chat completed");
            Json(ChatResponse { response: text }).into_response()
        }
        Err(e) => {
            tracing::error!("chat generation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/adkar-chat/stream",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Chunked text fragments; a line containing `Error:` signals mid-stream failure", content_type = "text/plain"),
        (status = 400, description = "Missing stage or question", content_type = "text/plain")
    )
)]
pub(crate) async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> axum::response::Response {
    let request = match request.validate() {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("rejecting streaming chat request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                format!("{STREAM_ERROR_MARKER} {e}"),
            )
                .into_response();
        }
    };

    tracing::info!(stage = request.stage().name(), "starting streaming chat");
    PlainTextStream(state.engine.generate_streaming(&request)).into_response()
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/adkar-chat", post(chat))
        .route("/api/adkar-chat/stream", post(chat_stream))
        .with_state(state)
}
