use utoipa::OpenApi;

use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::chat::chat,
        routes::chat::chat_stream,
        routes::verify::verify,
        routes::assistant::api_status,
        routes::assistant::assistant_info,
        routes::assistant::stages,
        routes::assistant::warmup,
    ),
    components(schemas(
        routes::chat::ChatRequest,
        routes::chat::ChatResponse,
        routes::chat::ErrorBody,
        routes::verify::VerifyRequest,
        routes::verify::ModelsResponse,
        routes::assistant::WarmupRequest,
    ))
)]
pub struct ApiDoc;

pub fn generate_schema() -> String {
    let api_doc = ApiDoc::openapi();
    serde_json::to_string_pretty(&api_doc).unwrap_or_else(|e| format!("Error serializing: {}", e))
}
