use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub mod assistant;
pub mod chat;
pub mod status;
pub mod verify;

pub fn configure(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(status::routes())
        .merge(chat::routes(state.clone()))
        .merge(verify::routes(state.clone()))
        .merge(assistant::routes(state))
}
