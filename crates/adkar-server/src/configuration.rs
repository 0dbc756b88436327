use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Server settings, overridable with `ADKAR_SERVER__*` environment
/// variables (for example `ADKAR_SERVER__ENGINE_HOST=engine:11434`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Host (optionally `host:port` or a full URL) of the inference engine.
    pub engine_host: String,
    /// Model tier used when a request does not name one.
    pub default_model: String,
    /// Base URL of the host serving the embeddable widget content.
    pub widget_host: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8000)?
            .set_default("engine_host", adkar::engine::ENGINE_HOST)?
            .set_default("default_model", adkar::DEFAULT_MODEL)?
            .set_default("widget_host", "http://localhost:8000")?
            .add_source(Environment::with_prefix("ADKAR_SERVER").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
