mod export;
pub mod handlers;

use crate::state::AppState;
use axum::Router;

pub fn router(import_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
        .merge(handlers::import_routes(import_max_bytes))
}
