pub mod health;
pub mod user;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/user", post(user::upsert_user))
        .route("/user/increase-points", post(user::increase_points))
        .route("/user/update-moves", post(user::update_moves))
        .route("/user/update-points", post(user::update_points))
}
