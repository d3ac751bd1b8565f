use crate::{config::AccountPolicy, state::AppState};
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(policy: &AccountPolicy) -> Router<AppState> {
    Router::new().merge(handlers::user_routes(policy))
}
