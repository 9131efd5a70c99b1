use sqlx::{PgPool, Result};

use crate::models::User;

// User queries

pub async fn get_user(pool: &PgPool, telegram_id: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = $1")
        .bind(telegram_id)
        .fetch_optional(pool)
        .await
}

/// Upsert on first contact from the client bridge. An existing row keeps its
/// points and moves; only the display name is refreshed.
pub async fn create_or_update_user(
    pool: &PgPool,
    telegram_id: &str,
    first_name: &str,
    initial_moves: i32,
) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (telegram_id, first_name, moves_left)
        VALUES ($1, $2, $3)
        ON CONFLICT (telegram_id)
        DO UPDATE SET
            first_name = $2,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(telegram_id)
    .bind(first_name)
    .bind(initial_moves)
    .fetch_one(pool)
    .await
}

/// Create the row if it does not exist yet, leaving existing rows alone.
pub async fn ensure_user(pool: &PgPool, telegram_id: &str, initial_moves: i32) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (telegram_id, moves_left)
        VALUES ($1, $2)
        ON CONFLICT (telegram_id) DO NOTHING
        "#,
    )
    .bind(telegram_id)
    .bind(initial_moves)
    .execute(pool)
    .await?;

    Ok(())
}

// Ledger queries
//
// Concurrent increments for the same identity rely on the row-level atomic
// `points = points + $n`; there is no app-level locking.

/// Strict increment: `None` when the identity has no record, in which case
/// the ledger is untouched.
pub async fn increase_points(
    pool: &PgPool,
    telegram_id: &str,
    delta: i64,
) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET points = points + $2,
            updated_at = NOW()
        WHERE telegram_id = $1
        RETURNING *
        "#,
    )
    .bind(telegram_id)
    .bind(delta)
    .fetch_optional(pool)
    .await
}

/// Lenient increment: first contact creates the row with the delta as its
/// starting balance.
pub async fn increase_points_or_create(
    pool: &PgPool,
    telegram_id: &str,
    delta: i64,
    initial_moves: i32,
) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (telegram_id, points, moves_left)
        VALUES ($1, $2, $3)
        ON CONFLICT (telegram_id)
        DO UPDATE SET
            points = users.points + $2,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(telegram_id)
    .bind(delta)
    .bind(initial_moves)
    .fetch_one(pool)
    .await
}

#[derive(Debug, Clone)]
pub enum GrantOutcome {
    /// The increment applied and the grant was recorded.
    Applied(User),
    /// The key was seen before; the stored result is returned and the
    /// ledger is untouched.
    Replayed { points_after: i64 },
    UnknownUser,
}

/// Exactly-once increment keyed by a caller-supplied token.
///
/// The user row is incremented first (taking its row lock), then the grant
/// is inserted with `ON CONFLICT DO NOTHING`. A concurrent duplicate blocks
/// on the row lock, loses the insert race, and rolls its increment back, so
/// two identical requests apply once.
pub async fn increase_points_idempotent(
    pool: &PgPool,
    telegram_id: &str,
    delta: i64,
    idempotency_key: &str,
) -> Result<GrantOutcome> {
    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET points = points + $2,
            updated_at = NOW()
        WHERE telegram_id = $1
        RETURNING *
        "#,
    )
    .bind(telegram_id)
    .bind(delta)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(user) = user else {
        tx.rollback().await?;
        return Ok(GrantOutcome::UnknownUser);
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO point_grants (idempotency_key, telegram_id, delta, points_after)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(idempotency_key)
    .bind(telegram_id)
    .bind(delta)
    .bind(user.points)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        tx.rollback().await?;

        // The conflicting grant was committed by an earlier request; fetch
        // the result it recorded.
        let points_after: i64 =
            sqlx::query_scalar("SELECT points_after FROM point_grants WHERE idempotency_key = $1")
                .bind(idempotency_key)
                .fetch_one(pool)
                .await?;
        return Ok(GrantOutcome::Replayed { points_after });
    }

    tx.commit().await?;
    Ok(GrantOutcome::Applied(user))
}

#[derive(Debug, Clone)]
pub enum SetPointsOutcome {
    Updated(User),
    /// The requested total is below the stored balance; rejected to keep
    /// points monotonically non-decreasing.
    WouldDecrease { current: i64 },
    UnknownUser,
}

/// Persist a client-reported points total, refusing decreases.
pub async fn set_points(pool: &PgPool, telegram_id: &str, points: i64) -> Result<SetPointsOutcome> {
    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET points = $2,
            updated_at = NOW()
        WHERE telegram_id = $1 AND points <= $2
        RETURNING *
        "#,
    )
    .bind(telegram_id)
    .bind(points)
    .fetch_optional(pool)
    .await?;

    if let Some(user) = updated {
        return Ok(SetPointsOutcome::Updated(user));
    }

    match get_user(pool, telegram_id).await? {
        Some(user) => Ok(SetPointsOutcome::WouldDecrease {
            current: user.points,
        }),
        None => Ok(SetPointsOutcome::UnknownUser),
    }
}

/// Persist a client-reported move count. Range validation happens in the
/// handler before any storage call.
pub async fn set_moves(pool: &PgPool, telegram_id: &str, moves_left: i32) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET moves_left = $2,
            updated_at = NOW()
        WHERE telegram_id = $1
        RETURNING *
        "#,
    )
    .bind(telegram_id)
    .bind(moves_left)
    .fetch_optional(pool)
    .await
}

/// Drop grants older than the retention window. Replays beyond the window
/// are treated as fresh requests.
pub async fn prune_point_grants(pool: &PgPool, older_than_secs: i64) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM point_grants WHERE created_at < NOW() - make_interval(secs => $1)",
    )
    .bind(older_than_secs as f64)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
