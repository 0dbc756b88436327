use adkar_server::configuration::Settings;
use adkar_server::routes;
use adkar_server::AppState;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(engine_host: &str, widget_host: &str) -> Settings {
    Settings {
        host: "127.0.0.1".to_string(),
        port: 0,
        engine_host: engine_host.to_string(),
        default_model: "adkar_fast".to_string(),
        widget_host: widget_host.to_string(),
    }
}

fn app(engine_host: &str, widget_host: &str) -> Router {
    let state = AppState::new(&settings(engine_host, widget_host)).expect("state");
    routes::configure(state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn buffered_chat_relays_engine_text() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "Start with awareness.", "done": true})),
        )
        .expect(1)
        .mount(&engine)
        .await;

    let app = app(&engine.uri(), "http://localhost:8000");
    let response = app
        .oneshot(post_json(
            "/api/adkar-chat",
            json!({"stage": "1", "question": "Why change?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["response"], "Start with awareness.");
}

#[tokio::test]
async fn buffered_chat_surfaces_engine_failure_as_500() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&engine)
        .await;

    let app = app(&engine.uri(), "http://localhost:8000");
    let response = app
        .oneshot(post_json(
            "/api/adkar-chat",
            json!({"stage": "1", "question": "Why change?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "model not loaded");
}

#[tokio::test]
async fn missing_question_never_reaches_the_engine() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&engine)
        .await;

    let app = app(&engine.uri(), "http://localhost:8000");
    let response = app
        .oneshot(post_json("/api/adkar-chat", json!({"stage": "1"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Missing question parameter");
}

#[tokio::test]
async fn streaming_chat_assembles_token_fragments() {
    let engine = MockServer::start().await;
    let ndjson = "{\"response\":\"Aware\"}\n{\"response\":\"ness first.\"}\n{\"done\":true}\n";
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
        .mount(&engine)
        .await;

    let app = app(&engine.uri(), "http://localhost:8000");
    let response = app
        .oneshot(post_json(
            "/api/adkar-chat/stream",
            json!({"stage": "1", "question": "Why change?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/plain; charset=utf-8")
    );
    assert_eq!(body_text(response).await, "Awareness first.");
}

#[tokio::test]
async fn streaming_chat_reports_engine_failure_in_band() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&engine)
        .await;

    let app = app(&engine.uri(), "http://localhost:8000");
    let response = app
        .oneshot(post_json(
            "/api/adkar-chat/stream",
            json!({"stage": "1", "question": "Why change?"}),
        ))
        .await
        .unwrap();

    // The session itself is 200; the failure travels in the body.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.starts_with("Error:"), "body was {body:?}");
    assert!(body.contains("model not loaded"));
}

#[tokio::test]
async fn streaming_chat_rejects_missing_stage_up_front() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(post_json(
            "/api/adkar-chat/stream",
            json!({"question": "Why change?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_text(response).await;
    assert!(body.starts_with("Error:"));
    assert!(body.contains("stage"));
}

#[tokio::test]
async fn verify_without_action_is_rejected() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(post_json("/api/adkar-chat/verify", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Missing action parameter");
}

#[tokio::test]
async fn verify_with_unknown_action_is_rejected() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(post_json(
            "/api/adkar-chat/verify",
            json!({"action": "reboot-universe"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid action parameter");
}

#[tokio::test]
async fn verify_check_installation_reports_a_boolean() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(post_json(
            "/api/adkar-chat/verify",
            json!({"action": "check-installation"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["installed"].is_boolean());
}

#[tokio::test]
async fn verify_check_model_reports_all_tiers() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(post_json(
            "/api/adkar-chat/verify",
            json!({"action": "check-model"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["exists"].is_boolean());
    assert!(body["fastModelExists"].is_boolean());
    assert!(body["ultrafastModelExists"].is_boolean());
}

#[tokio::test]
async fn api_status_echoes_origin_and_assistant_type() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(
            Request::get("/api/status?assistantType=changePlanning")
                .header("origin", "https://intranet.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "online");
    assert_eq!(body["assistantType"], "changePlanning");
    assert_eq!(body["request_origin"], "https://intranet.example.com");
    assert_eq!(body["message"], "Change Planning Assistant API is running");
}

#[tokio::test]
async fn assistant_info_describes_the_default_persona() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(
            Request::get("/api/assistant/info")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["type"], "changeManagement");
    assert_eq!(body["name"], "Change Management Assistant");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn stages_endpoint_lists_all_five_with_prompts() {
    let app = app("localhost", "http://localhost:8000");
    let response = app
        .oneshot(Request::get("/api/stages").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let stages = body["stages"].as_array().expect("stages array");
    assert_eq!(stages.len(), 5);
    assert_eq!(stages[0]["stage"], "1");
    assert_eq!(stages[0]["name"], "Awareness");
    assert_eq!(
        stages[0]["description"],
        "Understanding why the change is needed"
    );
    assert_eq!(stages[4]["name"], "Reinforcement");
    assert_eq!(
        stages[4]["examplePrompts"][0],
        "How can we ensure our recent process changes stick long-term?"
    );
}

#[tokio::test]
async fn warmup_succeeds_against_a_live_widget_host() {
    let engine = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "warm"})))
        .mount(&engine)
        .await;

    let widgets = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "online"})))
        .mount(&widgets)
        .await;
    Mock::given(method("GET"))
        .and(path("/widgets/user-widget.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>user</html>"))
        .mount(&widgets)
        .await;
    Mock::given(method("GET"))
        .and(path("/widgets/admin-widget.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>admin</html>"))
        .mount(&widgets)
        .await;

    let app = app(&engine.uri(), &widgets.uri());
    let response = app
        .oneshot(post_json("/api/warmup", json!({"all": true})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(
        body["types"],
        json!(["changeManagement", "changePlanning"])
    );
}

#[tokio::test]
async fn warmup_reports_unavailable_widget_host() {
    // Nothing is listening on this port.
    let app = app("localhost", "http://127.0.0.1:59996");
    let response = app
        .oneshot(post_json("/api/warmup", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
}
