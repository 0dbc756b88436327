//! Client-side streaming consumer: the state machine that drives a chat UI
//! against the relay endpoints. It owns the transcript, reads streamed
//! fragments incrementally, classifies failures for remediation, and applies
//! a deterministic model-tier fallback on retry.

use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::engine::{DEFAULT_MODEL, STREAM_ERROR_MARKER};
use crate::error::RelayError;

/// Outer window for one relay call. Tunable; the observed default is 90 s.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Fixed fallback order for model tiers, slowest to fastest. Retries cycle
/// through this list and are never randomized.
pub const MODEL_TIERS: &[&str] = &["adkar", "adkar_fast", "adkar_ultrafast"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry. Owned exclusively by the consumer; the streaming
/// fill process is the only thing that mutates a message after it is
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    Sending,
    StreamingReceive,
    BufferedWait,
    Done,
    Error,
    Retrying,
}

/// Pure retry policy: which tier to try next after a failure.
///
/// `attempt` counts retries already performed this turn. Gives up once every
/// alternative tier has had its chance, so retry loops terminate. An unknown
/// current tier falls back to the fast tier, matching the observed UI.
pub fn next_model(attempt: usize, last_model: &str) -> Option<&'static str> {
    if attempt + 1 >= MODEL_TIERS.len() {
        return None;
    }
    match MODEL_TIERS.iter().position(|m| *m == last_model) {
        Some(i) => Some(MODEL_TIERS[(i + 1) % MODEL_TIERS.len()]),
        None => Some(MODEL_TIERS[1]),
    }
}

/// Suggested next action for an error category, surfaced alongside the
/// error text.
pub fn remediation(error: &RelayError) -> &'static str {
    match error.category() {
        "timeout" => "Try a faster model tier such as adkar_ultrafast, or ask a shorter question.",
        "transport" => "The inference engine looks unreachable. Check that it is installed and running.",
        "input" => "Provide both a stage and a question.",
        _ => "The engine reported an error. Retry, or switch to a different model tier.",
    }
}

pub struct ChatConsumer {
    client: Client,
    base_url: String,
    transcript: Vec<Message>,
    phase: ChatPhase,
    last_error: Option<RelayError>,
    last_request: Option<(String, String)>,
    request_timeout: Duration,
    streaming: bool,
    model: String,
}

impl ChatConsumer {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transcript: Vec::new(),
            phase: ChatPhase::Idle,
            last_error: None,
            last_request: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            streaming: true,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_timeout(mut self, window: Duration) -> Self {
        self.request_timeout = window;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn last_error(&self) -> Option<&RelayError> {
        self.last_error.as_ref()
    }

    /// Submits one user message and drives the exchange to completion.
    pub async fn send(&mut self, stage: &str, question: &str) -> Result<(), RelayError> {
        let question = question.trim().to_string();
        self.last_request = Some((stage.to_string(), question.clone()));
        self.transcript.push(Message {
            role: Role::User,
            content: question,
        });
        self.dispatch().await
    }

    /// Retries the last exchange on the next model tier. Returns `None` when
    /// the policy gives up or there is nothing to retry; fallback state does
    /// not outlive the turn.
    pub async fn retry_next_tier(&mut self, attempt: usize) -> Option<Result<(), RelayError>> {
        self.last_request.as_ref()?;
        let next = next_model(attempt, &self.model)?;
        tracing::info!(from = %self.model, to = %next, "retrying with fallback model tier");
        self.phase = ChatPhase::Retrying;
        self.model = next.to_string();
        Some(self.dispatch().await)
    }

    async fn dispatch(&mut self) -> Result<(), RelayError> {
        let (stage, question) = match self.last_request.clone() {
            Some(request) => request,
            None => return Err(RelayError::Input("question".to_string())),
        };

        self.last_error = None;
        self.phase = ChatPhase::Sending;

        let result = if self.streaming {
            self.exchange_streaming(&stage, &question).await
        } else {
            self.exchange_buffered(&stage, &question).await
        };

        match result {
            Ok(()) => {
                self.phase = ChatPhase::Done;
                Ok(())
            }
            Err(e) => {
                self.phase = ChatPhase::Error;
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn exchange_streaming(&mut self, stage: &str, question: &str) -> Result<(), RelayError> {
        // Placeholder the stream fills in place, so the UI has a concrete
        // transcript slot to attach its in-progress indicator to.
        self.transcript.push(Message {
            role: Role::Assistant,
            content: String::new(),
        });
        self.phase = ChatPhase::StreamingReceive;

        let url = format!("{}/api/adkar-chat/stream", self.base_url);
        let body = json!({
            "stage": stage,
            "question": question,
            "model": self.model,
        });

        let window = self.request_timeout;
        let outcome = timeout(window, self.read_stream(url, body)).await;
        match outcome {
            // Expiry drops the in-flight call, tearing down the connection,
            // and is its own category: the remediation differs from a
            // transport failure.
            Err(_) => {
                self.drop_placeholder();
                Err(RelayError::Timeout)
            }
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.drop_placeholder();
                Err(e)
            }
        }
    }

    async fn read_stream(&mut self, url: String, body: Value) -> Result<(), RelayError> {
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_rejection(status, strip_marker(&text)));
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let text = String::from_utf8_lossy(&chunk);
            if text.contains(STREAM_ERROR_MARKER) {
                return Err(RelayError::Engine(strip_marker(&text)));
            }
            if let Some(slot) = self.transcript.last_mut() {
                slot.content.push_str(&text);
            }
        }
        Ok(())
    }

    async fn exchange_buffered(&mut self, stage: &str, question: &str) -> Result<(), RelayError> {
        self.phase = ChatPhase::BufferedWait;

        let url = format!("{}/api/adkar-chat", self.base_url);
        let body = json!({
            "stage": stage,
            "question": question,
            "model": self.model,
        });

        let window = self.request_timeout;
        let outcome = timeout(window, fetch_buffered(&self.client, &url, &body)).await;
        match outcome {
            Err(_) => Err(RelayError::Timeout),
            Ok(Err(e)) => Err(e),
            Ok(Ok(text)) => {
                self.transcript.push(Message {
                    role: Role::Assistant,
                    content: text,
                });
                Ok(())
            }
        }
    }

    fn drop_placeholder(&mut self) {
        // A failed streaming exchange must not leave an empty-but-present
        // assistant slot behind.
        if matches!(self.transcript.last(), Some(m) if m.role == Role::Assistant) {
            self.transcript.pop();
        }
    }
}

async fn fetch_buffered(client: &Client, url: &str, body: &Value) -> Result<String, RelayError> {
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    let data: Value = response
        .json()
        .await
        .map_err(|e| RelayError::RequestFailed(format!("Unexpected response format: {e}")))?;

    if !status.is_success() {
        let message = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Request failed")
            .to_string();
        return Err(classify_rejection(status, message));
    }

    match data.get("response").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(RelayError::EmptyResponse),
    }
}

/// A relay-side 400 means the relay rejected the input before any engine
/// call, so it belongs to the input category, not the application one.
fn classify_rejection(status: StatusCode, message: String) -> RelayError {
    if status == StatusCode::BAD_REQUEST {
        if let Some(parameter) = message
            .strip_prefix("Missing ")
            .and_then(|rest| rest.strip_suffix(" parameter"))
        {
            return RelayError::Input(parameter.to_string());
        }
    }
    RelayError::Engine(message)
}

fn strip_marker(text: &str) -> String {
    let stripped = match text.split_once(STREAM_ERROR_MARKER) {
        Some((_, diagnostic)) => diagnostic.trim(),
        None => text.trim(),
    };
    if stripped.is_empty() {
        "Unknown error from model".to_string()
    } else {
        stripped.to_string()
    }
}
