use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    db::queries::{self, GrantOutcome, SetPointsOutcome},
    error::ApiError,
    models::User,
    AppState, GrantEntry,
};

/// The user object Telegram's WebApp bridge hands to the client. Field names
/// are Telegram's own (snake_case); everything else on this API is the
/// frontend's camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUserPayload {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub telegram_id: String,
    pub first_name: String,
    pub points: i64,
    pub moves_left: i32,
    /// Derived from points on every read; never stored.
    pub fluxx_balance: i64,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let fluxx_balance = user.fluxx_balance();
        Self {
            telegram_id: user.telegram_id,
            first_name: user.first_name,
            points: user.points,
            moves_left: user.moves_left,
            fluxx_balance,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncreasePointsRequest {
    #[serde(default)]
    pub telegram_id: Option<String>,
    /// Optional; falls back to the configured per-match award.
    #[serde(default)]
    pub points: Option<i64>,
    /// Optional retry token. Requests sharing a key apply exactly once.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncreasePointsResponse {
    pub success: bool,
    pub points: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMovesRequest {
    #[serde(default)]
    pub telegram_id: Option<String>,
    #[serde(default)]
    pub moves_left: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMovesResponse {
    pub success: bool,
    pub moves_left: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePointsRequest {
    #[serde(default)]
    pub telegram_id: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePointsResponse {
    pub success: bool,
    pub points: i64,
}

/// Create or refresh the user record from the platform identity payload.
/// First contact creates the row with zero points and a full move allowance.
pub async fn upsert_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TelegramUserPayload>,
) -> Result<Json<UserResponse>, ApiError> {
    let telegram_id = validate_platform_user(&payload)?;

    let user = queries::create_or_update_user(
        &state.db,
        &telegram_id,
        &payload.first_name,
        state.config.game.move_allowance,
    )
    .await?;

    tracing::info!("Upserted user {} ({})", user.first_name, user.telegram_id);
    Ok(Json(UserResponse::from(user)))
}

/// The single validated increment operation. Behavior is configured by
/// `default_increment_amount` (used when the body carries no amount) and
/// `require_existing_user` (404 vs create-on-first-increment).
pub async fn increase_points(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IncreasePointsRequest>,
) -> Result<Json<IncreasePointsResponse>, ApiError> {
    let (telegram_id, delta) =
        validate_increment(&payload, state.config.game.default_increment_amount)?;

    let points = match payload.idempotency_key.as_deref() {
        Some(key) => {
            if let Some(entry) = state.recent_grants.get(key) {
                tracing::debug!("Replayed grant {} from the in-process cache", key);
                return Ok(Json(IncreasePointsResponse {
                    success: true,
                    points: entry.points_after,
                }));
            }

            let points = apply_idempotent_increment(&state, &telegram_id, delta, key).await?;
            state.recent_grants.insert(
                key.to_string(),
                GrantEntry {
                    points_after: points,
                    at: Instant::now(),
                },
            );
            points
        }
        None => {
            if state.config.game.require_existing_user {
                match queries::increase_points(&state.db, &telegram_id, delta).await? {
                    Some(user) => user.points,
                    None => return Err(ApiError::NotFound),
                }
            } else {
                queries::increase_points_or_create(
                    &state.db,
                    &telegram_id,
                    delta,
                    state.config.game.move_allowance,
                )
                .await?
                .points
            }
        }
    };

    tracing::info!("Increased points for {} by {} -> {}", telegram_id, delta, points);
    Ok(Json(IncreasePointsResponse {
        success: true,
        points,
    }))
}

async fn apply_idempotent_increment(
    state: &AppState,
    telegram_id: &str,
    delta: i64,
    key: &str,
) -> Result<i64, ApiError> {
    match queries::increase_points_idempotent(&state.db, telegram_id, delta, key).await? {
        GrantOutcome::Applied(user) => Ok(user.points),
        GrantOutcome::Replayed { points_after } => Ok(points_after),
        GrantOutcome::UnknownUser => {
            if state.config.game.require_existing_user {
                return Err(ApiError::NotFound);
            }
            // Lenient mode: create the row, then run the keyed increment
            // against it so the grant is still recorded.
            queries::ensure_user(&state.db, telegram_id, state.config.game.move_allowance).await?;
            match queries::increase_points_idempotent(&state.db, telegram_id, delta, key).await? {
                GrantOutcome::Applied(user) => Ok(user.points),
                GrantOutcome::Replayed { points_after } => Ok(points_after),
                GrantOutcome::UnknownUser => Err(ApiError::Internal(anyhow::anyhow!(
                    "user {} vanished during idempotent increment",
                    telegram_id
                ))),
            }
        }
    }
}

/// Persist the client-reported move count, bounds-checked against the
/// configured allowance.
pub async fn update_moves(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateMovesRequest>,
) -> Result<Json<UpdateMovesResponse>, ApiError> {
    let (telegram_id, moves_left) =
        validate_update_moves(&payload, state.config.game.move_allowance)?;

    let user = queries::set_moves(&state.db, &telegram_id, moves_left)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!("Stored move count {} for {}", user.moves_left, telegram_id);
    Ok(Json(UpdateMovesResponse {
        success: true,
        moves_left: user.moves_left,
    }))
}

/// Persist the client-reported points total. Decreases are refused: the
/// balance is monotonically non-decreasing.
pub async fn update_points(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdatePointsRequest>,
) -> Result<Json<UpdatePointsResponse>, ApiError> {
    let (telegram_id, points) = validate_update_points(&payload)?;

    match queries::set_points(&state.db, &telegram_id, points).await? {
        SetPointsOutcome::Updated(user) => {
            tracing::info!("Stored points total {} for {}", user.points, telegram_id);
            Ok(Json(UpdatePointsResponse {
                success: true,
                points: user.points,
            }))
        }
        SetPointsOutcome::WouldDecrease { current } => Err(ApiError::validation(format!(
            "points cannot decrease (stored total is {})",
            current
        ))),
        SetPointsOutcome::UnknownUser => Err(ApiError::NotFound),
    }
}

// Validation helpers. All of these run before any storage call.

fn validate_platform_user(payload: &TelegramUserPayload) -> Result<String, ApiError> {
    if payload.id <= 0 {
        return Err(ApiError::validation("invalid user payload"));
    }
    if payload.first_name.trim().is_empty() {
        return Err(ApiError::validation("invalid user payload"));
    }
    Ok(payload.id.to_string())
}

fn validate_increment(
    payload: &IncreasePointsRequest,
    default_amount: i64,
) -> Result<(String, i64), ApiError> {
    let telegram_id = require_telegram_id(payload.telegram_id.as_deref())?;

    let delta = payload.points.unwrap_or(default_amount);
    if delta < 1 {
        return Err(ApiError::validation("points must be a positive amount"));
    }

    if let Some(key) = &payload.idempotency_key {
        if key.trim().is_empty() {
            return Err(ApiError::validation("idempotencyKey must not be empty"));
        }
    }

    Ok((telegram_id, delta))
}

fn validate_update_moves(
    payload: &UpdateMovesRequest,
    move_allowance: i32,
) -> Result<(String, i32), ApiError> {
    let telegram_id = require_telegram_id(payload.telegram_id.as_deref())?;

    let moves_left = payload
        .moves_left
        .ok_or_else(|| ApiError::validation("invalid telegramId or movesLeft"))?;
    if moves_left < 0 || moves_left > move_allowance {
        return Err(ApiError::validation(format!(
            "movesLeft must be between 0 and {}",
            move_allowance
        )));
    }

    Ok((telegram_id, moves_left))
}

fn validate_update_points(payload: &UpdatePointsRequest) -> Result<(String, i64), ApiError> {
    let telegram_id = require_telegram_id(payload.telegram_id.as_deref())?;

    let points = payload
        .points
        .ok_or_else(|| ApiError::validation("invalid telegramId or points"))?;
    if points < 0 {
        return Err(ApiError::validation("points must not be negative"));
    }

    Ok((telegram_id, points))
}

fn require_telegram_id(telegram_id: Option<&str>) -> Result<String, ApiError> {
    telegram_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::validation("invalid telegramId or points"))
}
