//! Preload cache for the embeddable chat widgets.
//!
//! At startup the surrounding system warms user-facing widget content and
//! the inference engine so the first chat does not pay the cold-start cost.
//! This is an explicit, constructed object with an `initialize`/`is_ready`
//! contract; tests build independent instances instead of sharing ambient
//! global state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::Mutex;

use crate::assistant::AssistantType;
use crate::engine::EngineClient;

const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const WARMUP_PROMPT: &str = "Briefly introduce yourself as a change management assistant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    User,
    Admin,
}

impl WidgetKind {
    fn path(&self) -> &'static str {
        match self {
            WidgetKind::User => "widgets/user-widget.html",
            WidgetKind::Admin => "widgets/admin-widget.html",
        }
    }

    fn assistant_type(&self) -> AssistantType {
        match self {
            WidgetKind::User => AssistantType::ChangeManagement,
            WidgetKind::Admin => AssistantType::ChangePlanning,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    user: Option<String>,
    admin: Option<String>,
    initialized: bool,
    last_updated: Option<DateTime<Utc>>,
}

pub struct WidgetCache {
    widget_host: String,
    client: Client,
    engine: EngineClient,
    state: Mutex<CacheState>,
}

impl WidgetCache {
    pub fn new(widget_host: impl Into<String>, engine: EngineClient) -> anyhow::Result<Self> {
        Ok(Self {
            widget_host: widget_host.into().trim_end_matches('/').to_string(),
            client: Client::builder().timeout(STATUS_CHECK_TIMEOUT).build()?,
            engine,
            state: Mutex::new(CacheState::default()),
        })
    }

    /// Preloads widget content and warms the engine. Idempotent: once the
    /// cache is ready a second call is a no-op. Returns whether the cache is
    /// ready afterwards.
    pub async fn initialize(&self) -> bool {
        {
            let state = self.state.lock().await;
            if state.initialized {
                return true;
            }
        }
        self.preload().await
    }

    /// Re-fetches widget content regardless of current readiness.
    pub async fn refresh(&self) -> bool {
        self.preload().await
    }

    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.initialized
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_updated
    }

    /// Cached widget content, or `None` while uninitialized.
    pub async fn get(&self, kind: WidgetKind) -> Option<String> {
        let state = self.state.lock().await;
        if !state.initialized {
            return None;
        }
        match kind {
            WidgetKind::User => state.user.clone(),
            WidgetKind::Admin => state.admin.clone(),
        }
    }

    async fn preload(&self) -> bool {
        tracing::info!("preloading widget content from {}", self.widget_host);

        // Bail out early when the widget host is down; a broken preload must
        // not mark the cache ready.
        let status_url = format!("{}/api/status", self.widget_host);
        match self.client.get(&status_url).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::error!(status = %response.status(), "widget host is not available");
                return false;
            }
            Err(e) => {
                tracing::error!("widget host is not available: {}", e);
                return false;
            }
        }

        let user = self.fetch_widget(WidgetKind::User).await;
        let admin = self.fetch_widget(WidgetKind::Admin).await;

        // Warm the engine with a tiny generation so the first real chat does
        // not pay model load time. Failure here is logged, not fatal.
        if let Err(e) = self
            .engine
            .generate_prompt(self.engine.default_model(), WARMUP_PROMPT)
            .await
        {
            tracing::warn!("engine warmup failed: {}", e);
        }

        let mut state = self.state.lock().await;
        state.user = user;
        state.admin = admin;
        state.initialized = true;
        state.last_updated = Some(Utc::now());
        tracing::info!("widget content preloaded");
        true
    }

    async fn fetch_widget(&self, kind: WidgetKind) -> Option<String> {
        let url = format!(
            "{}/{}?assistantType={}",
            self.widget_host,
            kind.path(),
            kind.assistant_type().as_str()
        );
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                tracing::error!(status = %response.status(), "failed to preload {:?} widget", kind);
                None
            }
            Err(e) => {
                tracing::error!("failed to preload {:?} widget: {}", kind, e);
                None
            }
        }
    }
}
