use std::sync::Arc;

use adkar::cache::WidgetCache;
use adkar::engine::EngineClient;
use adkar::probe::ReadinessProbe;

use crate::configuration::Settings;

/// Shared per-process state. The relay itself is request-scoped; nothing
/// here is mutated across concurrent chats.
pub struct AppState {
    pub engine: EngineClient,
    pub probe: ReadinessProbe,
    pub widget_cache: Arc<WidgetCache>,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Arc<Self>> {
        let engine = EngineClient::new(&settings.engine_host, &settings.default_model)?;
        let probe = ReadinessProbe::new(engine.clone());
        let widget_cache = Arc::new(WidgetCache::new(&settings.widget_host, engine.clone())?);

        Ok(Arc::new(Self {
            engine,
            probe,
            widget_cache,
        }))
    }
}
