use anyhow::Result;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::configuration::Settings;
use crate::logging;
use crate::routes;
use crate::state::AppState;

pub async fn run() -> Result<()> {
    logging::setup("adkard")?;

    let settings = Settings::new()?;
    let state = AppState::new(&settings)?;

    // Warm the widget cache and the engine off the accept path so the
    // server answers immediately while the first model load proceeds.
    let cache = state.widget_cache.clone();
    tokio::spawn(async move {
        if !cache.initialize().await {
            tracing::warn!("startup warmup did not complete; will retry on demand");
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = TcpListener::bind(settings.socket_addr()).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
