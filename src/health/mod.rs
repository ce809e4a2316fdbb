pub mod dto;
pub mod handlers;
mod repo;
pub mod repo_types;
pub mod services;
pub mod trends;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::health_routes()
}
