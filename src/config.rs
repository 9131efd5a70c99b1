use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

use crate::game::{MatchPolicy, SessionRules};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub game: GameConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the built mini-app frontend, served at the router
    /// fallback.
    pub frontend_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    /// Points granted when an increment request carries no explicit amount.
    /// Matches the per-match award the client requests.
    pub default_increment_amount: i64,
    /// Strict ledger mode: increments against unknown identities answer
    /// not-found instead of creating the row.
    pub require_existing_user: bool,
    /// Full move budget per replenishment window.
    pub move_allowance: i32,
    pub move_refill_secs: i64,
    /// How long applied idempotency keys are remembered.
    pub grant_retention_secs: i64,
    pub match_policy: MatchPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a number")?,
        };

        let server = ServerConfig {
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a number")?,
            frontend_dir: env::var("FRONTEND_DIR")
                .unwrap_or_else(|_| "../frontend".to_string()),
        };

        let match_policy = match env::var("MATCH_POLICY")
            .unwrap_or_else(|_| "detect_only".to_string())
            .as_str()
        {
            "clear_and_refill" => MatchPolicy::ClearAndRefill,
            _ => MatchPolicy::DetectOnly,
        };

        let game = GameConfig {
            default_increment_amount: env::var("DEFAULT_INCREMENT_AMOUNT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            require_existing_user: env::var("REQUIRE_EXISTING_USER")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            move_allowance: env::var("MOVE_ALLOWANCE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            move_refill_secs: env::var("MOVE_REFILL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
            grant_retention_secs: env::var("GRANT_RETENTION_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .unwrap_or(86_400),
            match_policy,
        };

        Ok(Config {
            database,
            server,
            game,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// The same tunables the session layer consumes.
    pub fn session_rules(&self) -> SessionRules {
        SessionRules {
            move_allowance: self.game.move_allowance.max(0) as u32,
            move_refill: chrono::Duration::seconds(self.game.move_refill_secs),
            match_award: self.game.default_increment_amount,
            match_policy: self.game.match_policy,
        }
    }
}
