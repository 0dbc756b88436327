//! Cross-context message bus for the embedded chat widget.
//!
//! When the chat UI runs as a child view inside a host page, the two sides
//! talk over a narrow postcard-style channel. Every inbound message is
//! origin-checked against the allow-listed peer origin; anything else is
//! silently dropped. That check is a security boundary, not a convenience
//! filter, and it applies to every message, not just the first.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::assistant::AssistantType;

/// Envelope exchanged between host page and embedded widget. Lifetime is a
/// single message; nothing is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WidgetEnvelope {
    /// Configuration handshake, sent once after the embedded view signals it
    /// has finished loading.
    #[serde(rename = "INIT_WIDGET")]
    InitWidget(WidgetInit),
    /// A streamed fragment arrived. Informational; the widget manages its
    /// own streaming state.
    #[serde(rename = "STREAM_RESPONSE")]
    StreamResponse(String),
    /// The embedded view could not reach its backend; the host may render a
    /// fallback instead of a broken frame.
    #[serde(rename = "CONNECTION_ERROR")]
    ConnectionError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetInit {
    pub stream_responses: bool,
    pub theme: String,
    pub admin_mode: bool,
    pub assistant_type: AssistantType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fullscreen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floating: Option<bool>,
}

#[derive(Debug, Clone)]
struct PostedMessage {
    origin: String,
    target_origin: String,
    envelope: WidgetEnvelope,
}

/// One end of a connected host/widget pair.
pub struct WidgetPort {
    /// Origin of the context this port lives in.
    origin: String,
    /// The only peer origin this port accepts messages from.
    allowed_origin: String,
    tx: mpsc::UnboundedSender<PostedMessage>,
    rx: mpsc::UnboundedReceiver<PostedMessage>,
}

/// Wires a host context and a widget context together. Each side names its
/// own origin; each side only accepts messages declared from the other's.
pub fn connect(host_origin: &str, widget_origin: &str) -> (WidgetPort, WidgetPort) {
    let (host_tx, widget_rx) = mpsc::unbounded_channel();
    let (widget_tx, host_rx) = mpsc::unbounded_channel();

    let host = WidgetPort {
        origin: host_origin.to_string(),
        allowed_origin: widget_origin.to_string(),
        tx: host_tx,
        rx: host_rx,
    };
    let widget = WidgetPort {
        origin: widget_origin.to_string(),
        allowed_origin: host_origin.to_string(),
        tx: widget_tx,
        rx: widget_rx,
    };
    (host, widget)
}

impl WidgetPort {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Posts an envelope towards the peer, addressed to `target_origin`.
    /// Fire and forget; a mismatched target is discarded on the receiving
    /// side, as is a closed peer.
    pub fn post(&self, envelope: WidgetEnvelope, target_origin: &str) {
        let message = PostedMessage {
            origin: self.origin.clone(),
            target_origin: target_origin.to_string(),
            envelope,
        };
        if self.tx.send(message).is_err() {
            tracing::debug!("widget peer closed, dropping envelope");
        }
    }

    /// Next accepted envelope. Messages addressed to a different target
    /// origin, or declared from a non-allow-listed origin, are dropped
    /// without surfacing to the caller. Returns `None` once the peer is
    /// gone.
    pub async fn recv(&mut self) -> Option<WidgetEnvelope> {
        while let Some(message) = self.rx.recv().await {
            if message.target_origin != "*" && message.target_origin != self.origin {
                continue;
            }
            if message.origin != self.allowed_origin {
                tracing::debug!(
                    origin = %message.origin,
                    "dropping widget message from non-allow-listed origin"
                );
                continue;
            }
            return Some(message.envelope);
        }
        None
    }

    /// Non-blocking variant of [`recv`]: returns `None` when no accepted
    /// message is queued right now.
    pub fn try_recv(&mut self) -> Option<WidgetEnvelope> {
        while let Ok(message) = self.rx.try_recv() {
            if message.target_origin != "*" && message.target_origin != self.origin {
                continue;
            }
            if message.origin != self.allowed_origin {
                tracing::debug!(
                    origin = %message.origin,
                    "dropping widget message from non-allow-listed origin"
                );
                continue;
            }
            return Some(message.envelope);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "http://localhost:3000";
    const WIDGET: &str = "http://localhost:8000";

    fn init_payload() -> WidgetInit {
        WidgetInit {
            stream_responses: true,
            theme: "light".to_string(),
            admin_mode: false,
            assistant_type: AssistantType::ChangeManagement,
            fullscreen: None,
            floating: Some(true),
        }
    }

    #[tokio::test]
    async fn allow_listed_origin_delivers_init_unmodified() {
        let (host, mut widget) = connect(HOST, WIDGET);
        let payload = init_payload();
        host.post(WidgetEnvelope::InitWidget(payload.clone()), WIDGET);

        match widget.recv().await {
            Some(WidgetEnvelope::InitWidget(received)) => assert_eq!(received, payload),
            other => panic!("expected InitWidget, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn foreign_origin_is_dropped_on_every_message() {
        let (_host, mut widget) = connect(HOST, WIDGET);

        // A third context posting into the widget's inbox with its own
        // declared origin must never reach the handler, even after an
        // accepted message.
        let (intruder_tx, rx) = mpsc::unbounded_channel();
        widget.rx = rx;
        intruder_tx
            .send(PostedMessage {
                origin: "http://evil.example".to_string(),
                target_origin: WIDGET.to_string(),
                envelope: WidgetEnvelope::InitWidget(init_payload()),
            })
            .unwrap();
        intruder_tx
            .send(PostedMessage {
                origin: HOST.to_string(),
                target_origin: WIDGET.to_string(),
                envelope: WidgetEnvelope::StreamResponse("ok".to_string()),
            })
            .unwrap();
        intruder_tx
            .send(PostedMessage {
                origin: "http://evil.example".to_string(),
                target_origin: WIDGET.to_string(),
                envelope: WidgetEnvelope::ConnectionError("spoof".to_string()),
            })
            .unwrap();
        drop(intruder_tx);

        assert_eq!(
            widget.recv().await,
            Some(WidgetEnvelope::StreamResponse("ok".to_string()))
        );
        assert_eq!(widget.recv().await, None);
    }

    #[tokio::test]
    async fn mismatched_target_origin_is_discarded() {
        let (host, mut widget) = connect(HOST, WIDGET);
        host.post(
            WidgetEnvelope::StreamResponse("leaked?".to_string()),
            "http://other.example",
        );
        assert_eq!(widget.try_recv(), None);

        host.post(WidgetEnvelope::StreamResponse("direct".to_string()), WIDGET);
        assert_eq!(
            widget.try_recv(),
            Some(WidgetEnvelope::StreamResponse("direct".to_string()))
        );
    }

    #[test]
    fn envelope_wire_format_matches_the_widget_protocol() {
        let envelope = WidgetEnvelope::InitWidget(init_payload());
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "INIT_WIDGET");
        assert_eq!(json["data"]["streamResponses"], true);
        assert_eq!(json["data"]["assistantType"], "changeManagement");
        assert_eq!(json["data"]["floating"], true);
        assert!(json["data"].get("fullscreen").is_none());

        let error = WidgetEnvelope::ConnectionError("backend offline".to_string());
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "CONNECTION_ERROR");
        assert_eq!(json["data"], "backend offline");
    }
}
