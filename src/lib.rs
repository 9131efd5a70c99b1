pub mod config;
pub mod db;
pub mod error;
pub mod game;
pub mod models;
pub mod routes;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::Router;
use config::Config;
use dashmap::DashMap;
use sqlx::PgPool;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// How often expired point grants are swept from the database and the
/// in-process replay cache.
pub const GRANT_PRUNE_INTERVAL: Duration = Duration::from_secs(600);

/// A recently applied increment, cached so hot retries are answered without
/// touching the database.
#[derive(Debug, Clone)]
pub struct GrantEntry {
    pub points_after: i64,
    pub at: Instant,
}

/// Application state shared across all handlers
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    /// Replay cache in front of the point_grants table, keyed by
    /// idempotency key.
    pub recent_grants: DashMap<String, GrantEntry>,
}

/// Assemble the router: API routes, permissive CORS, request tracing and
/// the static mini-app frontend at the fallback.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let frontend_service = ServeDir::new(&state.config.server.frontend_dir);

    Router::new()
        .merge(routes::create_routes())
        .fallback_service(frontend_service)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Background task that periodically prunes expired grants from the
/// database and the in-process replay cache.
pub async fn grant_prune_task(state: Arc<AppState>) {
    let retention = Duration::from_secs(state.config.game.grant_retention_secs.max(0) as u64);
    let mut interval = tokio::time::interval(GRANT_PRUNE_INTERVAL);

    loop {
        interval.tick().await;

        match db::queries::prune_point_grants(&state.db, state.config.game.grant_retention_secs)
            .await
        {
            Ok(0) => {}
            Ok(pruned) => tracing::info!("Pruned {} expired point grants", pruned),
            Err(e) => tracing::warn!("Failed to prune point grants: {}", e),
        }

        let dropped = prune_grant_cache(&state.recent_grants, retention);
        if dropped > 0 {
            tracing::debug!("Dropped {} expired replay cache entries", dropped);
        }
    }
}

/// Drop replay cache entries older than the retention window. Returns how
/// many were removed.
fn prune_grant_cache(cache: &DashMap<String, GrantEntry>, retention: Duration) -> usize {
    let before = cache.len();
    cache.retain(|_, entry| entry.at.elapsed() <= retention);
    before - cache.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_aged(age: Duration) -> GrantEntry {
        GrantEntry {
            points_after: 105,
            at: Instant::now() - age,
        }
    }

    #[test]
    fn test_prune_grant_cache_drops_only_expired_entries() {
        let cache: DashMap<String, GrantEntry> = DashMap::new();
        cache.insert("fresh".to_string(), entry_aged(Duration::from_secs(10)));
        cache.insert("stale".to_string(), entry_aged(Duration::from_secs(120)));

        let dropped = prune_grant_cache(&cache, Duration::from_secs(60));

        assert_eq!(dropped, 1);
        assert!(cache.contains_key("fresh"));
        assert!(!cache.contains_key("stale"));
    }

    #[test]
    fn test_prune_grant_cache_is_a_noop_when_everything_is_fresh() {
        let cache: DashMap<String, GrantEntry> = DashMap::new();
        cache.insert("a".to_string(), entry_aged(Duration::ZERO));
        cache.insert("b".to_string(), entry_aged(Duration::from_secs(1)));

        assert_eq!(prune_grant_cache(&cache, Duration::from_secs(60)), 0);
        assert_eq!(cache.len(), 2);
    }
}
