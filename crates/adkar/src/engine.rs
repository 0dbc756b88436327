//! Client for the local inference engine's small HTTP API, covering both
//! relay modes: a single buffered generation call and an incrementally
//! consumed streaming call.

use std::convert::Infallible;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use crate::decode::NdjsonReframer;
use crate::error::RelayError;
use crate::stage::Stage;

pub const ENGINE_HOST: &str = "localhost";
pub const ENGINE_DEFAULT_PORT: u16 = 11434;
pub const DEFAULT_MODEL: &str = "adkar_fast";

/// Marker prefix written into the outbound stream when the engine call fails.
/// Clients scan chunks for this substring to detect mid-stream failures
/// without a separate side channel.
pub const STREAM_ERROR_MARKER: &str = "Error:";

/// One user-submitted chat exchange, validated and immutable after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    stage: Stage,
    question: String,
    model: Option<String>,
}

impl GenerationRequest {
    /// Validates the raw wire fields. A missing stage or a missing/blank
    /// question is a client input error and must not reach the engine.
    pub fn new(
        stage: Option<&str>,
        question: Option<&str>,
        model: Option<String>,
    ) -> Result<Self, RelayError> {
        let stage = match stage {
            Some(code) if !code.trim().is_empty() => Stage::from_code(code),
            _ => return Err(RelayError::Input("stage".to_string())),
        };
        let question = match question {
            Some(q) if !q.trim().is_empty() => q.trim().to_string(),
            _ => return Err(RelayError::Input("question".to_string())),
        };
        let model = model.filter(|m| !m.trim().is_empty());

        Ok(Self {
            stage,
            question,
            model,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default)
    }

    /// The single prompt string sent to the engine, embedding the stage name
    /// and the verbatim question.
    pub fn prompt(&self) -> String {
        format!(
            "As a change management assistant, help with the {} stage of ADKAR for the following: {}",
            self.stage.name(),
            self.question
        )
    }
}

/// HTTP client for the engine's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct EngineClient {
    client: Client,
    host: String,
    default_model: String,
}

impl EngineClient {
    pub fn new(host: impl Into<String>, default_model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            host: host.into(),
            default_model: default_model.into(),
        })
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Base URL for engine calls. The configured host is sometimes just
    /// `host` or `host:port` without a scheme.
    fn base_url(&self) -> Result<Url, RelayError> {
        let base = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.clone()
        } else {
            format!("http://{}", self.host)
        };

        let mut base_url = Url::parse(&base)
            .map_err(|e| RelayError::RequestFailed(format!("Invalid engine URL: {e}")))?;

        let explicit_default_port = self.host.ends_with(":80") || self.host.ends_with(":443");
        if base_url.port().is_none() && !explicit_default_port {
            base_url.set_port(Some(ENGINE_DEFAULT_PORT)).map_err(|_| {
                RelayError::RequestFailed("Failed to set default engine port".to_string())
            })?;
        }

        Ok(base_url)
    }

    fn generate_url(&self) -> Result<Url, RelayError> {
        self.base_url()?.join("api/generate").map_err(|e| {
            RelayError::RequestFailed(format!("Failed to construct endpoint URL: {e}"))
        })
    }

    /// Buffered generation of a raw prompt: one non-streaming engine call,
    /// returning the aggregated text.
    ///
    /// A success body without a usable `response` field is an
    /// [`RelayError::EmptyResponse`], never an empty string: callers must be
    /// able to tell "the engine had nothing to say" apart from "the engine
    /// said nothing usefully".
    pub async fn generate_prompt(&self, model: &str, prompt: &str) -> Result<String, RelayError> {
        let url = self.generate_url()?;
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });

        tracing::debug!(model, "sending buffered generation request");
        let response = self.client.post(url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "engine returned an error body");
            return Err(RelayError::Engine(body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::RequestFailed(format!("Invalid engine response: {e}")))?;

        match body.get("response").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(RelayError::EmptyResponse),
        }
    }

    /// Buffered relay mode for a chat request.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, RelayError> {
        let model = request.model_or(&self.default_model);
        self.generate_prompt(model, &request.prompt()).await
    }

    /// Streaming relay mode: opens a streaming engine call and re-frames its
    /// NDJSON token events into a plain byte stream of text fragments.
    ///
    /// Failure before any engine bytes arrive produces a single
    /// `Error:`-prefixed diagnostic line. A frame that fails to decode is
    /// forwarded raw rather than aborting the session. The returned stream
    /// always terminates exactly once, on every exit path, and backpressure
    /// propagates through the bounded channel: the engine body is never
    /// buffered whole.
    pub fn generate_streaming(
        &self,
        request: &GenerationRequest,
    ) -> impl Stream<Item = Result<Bytes, Infallible>> {
        let model = request.model_or(&self.default_model).to_string();
        let payload = json!({
            "model": model,
            "prompt": request.prompt(),
            "stream": true,
        });

        let client = self.client.clone();
        let url = self.generate_url();
        let (tx, rx) = mpsc::channel::<Bytes>(16);

        tokio::spawn(async move {
            let url = match url {
                Ok(url) => url,
                Err(e) => {
                    let _ = tx.send(error_line(&e.to_string())).await;
                    return;
                }
            };

            tracing::debug!(model, "opening streaming generation request");
            let response = match client.post(url).json(&payload).send().await {
                Ok(response) => response,
                Err(e) => {
                    let relay_err = RelayError::from(e);
                    tracing::warn!("streaming engine call failed: {}", relay_err);
                    let _ = tx.send(error_line(&relay_err.to_string())).await;
                    return;
                }
            };

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                let _ = tx.send(error_line(&body)).await;
                return;
            }

            let mut body = response.bytes_stream();
            let mut reframer = NdjsonReframer::new();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for fragment in reframer.feed(&bytes) {
                            // A closed receiver means the client went away;
                            // stop reading engine output.
                            if tx.send(Bytes::from(fragment.into_bytes())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(error_line(&format!("failed to read from engine: {e}")))
                            .await;
                        return;
                    }
                }
            }

            if let Some(fragment) = reframer.finish() {
                let _ = tx.send(Bytes::from(fragment.into_bytes())).await;
            }
        });

        ReceiverStream::new(rx).map(Ok)
    }
}

fn error_line(message: &str) -> Bytes {
    Bytes::from(format!("{STREAM_ERROR_MARKER} {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(stage: &str, question: &str, model: Option<&str>) -> GenerationRequest {
        GenerationRequest::new(Some(stage), Some(question), model.map(String::from))
            .expect("valid request")
    }

    async fn collect(stream: impl Stream<Item = Result<Bytes, Infallible>>) -> String {
        let chunks: Vec<_> = stream.collect::<Vec<_>>().await;
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&chunk.expect("infallible"));
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn request_validation_rejects_missing_fields() {
        assert_eq!(
            GenerationRequest::new(None, Some("Why change?"), None),
            Err(RelayError::Input("stage".to_string()))
        );
        assert_eq!(
            GenerationRequest::new(Some("1"), None, None),
            Err(RelayError::Input("question".to_string()))
        );
        assert_eq!(
            GenerationRequest::new(Some("1"), Some("   "), None),
            Err(RelayError::Input("question".to_string()))
        );
    }

    #[test]
    fn prompt_embeds_stage_name_and_question() {
        let req = request("2", "Why change?", None);
        assert_eq!(
            req.prompt(),
            "As a change management assistant, help with the Desire stage of ADKAR for the following: Why change?"
        );

        let fallback = request("9", "Why change?", None);
        assert!(fallback.prompt().contains("the General stage"));
    }

    #[test]
    fn base_url_defaults_scheme_and_port() {
        let client = EngineClient::new("localhost", DEFAULT_MODEL).unwrap();
        assert_eq!(
            client.base_url().unwrap().as_str(),
            "http://localhost:11434/"
        );

        let client = EngineClient::new("http://engine:8080", DEFAULT_MODEL).unwrap();
        assert_eq!(client.base_url().unwrap().as_str(), "http://engine:8080/");
    }

    #[tokio::test]
    async fn buffered_round_trip_returns_engine_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "ok", "done": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = EngineClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let text = client
            .generate(&request("1", "Why change?", None))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn buffered_error_surfaces_raw_engine_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = EngineClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let err = client
            .generate(&request("1", "Why change?", None))
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::Engine("boom".to_string()));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn success_body_without_text_field_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let client = EngineClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let err = client
            .generate(&request("1", "Why change?", None))
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::EmptyResponse);
    }

    #[tokio::test]
    async fn requested_model_overrides_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"model": "adkar_ultrafast"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "fast answer"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = EngineClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let text = client
            .generate(&request("1", "Why change?", Some("adkar_ultrafast")))
            .await
            .unwrap();
        assert_eq!(text, "fast answer");
    }

    #[tokio::test]
    async fn streaming_reframes_ndjson_into_text() {
        let server = MockServer::start().await;
        let body = "{\"response\":\"Aware\"}\n{\"response\":\"ness\"}\n{\"done\":true}\n";
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = EngineClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let out = collect(client.generate_streaming(&request("1", "Why change?", None))).await;
        assert_eq!(out, "Awareness");
    }

    #[tokio::test]
    async fn streaming_engine_error_becomes_single_marker_line() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let client = EngineClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let out = collect(client.generate_streaming(&request("1", "Why change?", None))).await;
        assert!(out.starts_with(STREAM_ERROR_MARKER));
        assert!(out.contains("model not loaded"));
    }

    #[tokio::test]
    async fn streaming_unreachable_engine_emits_marker() {
        // Nothing is listening on this port.
        let client = EngineClient::new("127.0.0.1:59999", DEFAULT_MODEL).unwrap();
        let out = collect(client.generate_streaming(&request("1", "Why change?", None))).await;
        assert!(out.starts_with(STREAM_ERROR_MARKER));
    }

    #[tokio::test]
    async fn streaming_forwards_undecodable_frames_raw() {
        let server = MockServer::start().await;
        let body = "{\"response\":\"good\"}\ngarbage-frame\n{\"response\":\"!\"}\n";
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = EngineClient::new(server.uri(), DEFAULT_MODEL).unwrap();
        let out = collect(client.generate_streaming(&request("1", "Why change?", None))).await;
        assert_eq!(out, "goodgarbage-frame!");
    }
}
