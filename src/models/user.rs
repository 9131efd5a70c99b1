use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One Fluxx per this many points.
pub const POINTS_PER_FLUXX: i64 = 10_000;

/// Derived display currency. Never stored, recomputed on every read.
pub fn fluxx_balance(points: i64) -> i64 {
    points / POINTS_PER_FLUXX
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Opaque Telegram user id, stored as text.
    pub telegram_id: String,
    pub first_name: String,
    /// Monotonically non-decreasing; only increments and monotonic writes
    /// exist in the API.
    pub points: i64,
    pub moves_left: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn fluxx_balance(&self) -> i64 {
        fluxx_balance(self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluxx_balance_floors() {
        assert_eq!(fluxx_balance(0), 0);
        assert_eq!(fluxx_balance(9_999), 0);
        assert_eq!(fluxx_balance(10_000), 1);
        assert_eq!(fluxx_balance(25_000), 2);
    }

    #[test]
    fn test_user_fluxx_balance_uses_stored_points() {
        let user = User {
            telegram_id: "42".to_string(),
            first_name: "Dana".to_string(),
            points: 123_456,
            moves_left: 30,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(user.fluxx_balance(), 12);
    }
}
