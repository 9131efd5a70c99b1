use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::board::{Board, BoardError, MatchPolicy, Position, SwapOutcome};
use crate::models::fluxx_balance;

/// The player identity handed over by the embedding platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformUser {
    /// Opaque external identifier (the Telegram user id, stringified).
    pub id: String,
    pub first_name: String,
}

/// Bridge to the embedding platform (the Telegram WebApp object in
/// production). Injected into sessions so nothing reads ambient globals.
pub trait PlatformContext {
    fn user(&self) -> Option<PlatformUser>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no user data available")]
    NoUser,
    #[error("you have no moves left this hour")]
    NoMovesLeft,
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// Gameplay tunables. Server-side the same values live in `GameConfig`.
#[derive(Debug, Clone, Copy)]
pub struct SessionRules {
    /// Full move budget restored by each replenishment.
    pub move_allowance: u32,
    /// Minimum time between replenishments.
    pub move_refill: Duration,
    /// Points requested from the ledger per successful match.
    pub match_award: i64,
    pub match_policy: MatchPolicy,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            move_allowance: 30,
            move_refill: Duration::hours(1),
            match_award: 5,
            match_policy: MatchPolicy::default(),
        }
    }
}

/// What a swap attempt means for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapEvent {
    /// A run was made. The caller should ask the ledger for `award` points
    /// and feed the reply into [`PlayerSession::confirm_points`].
    Matched { award: i64, cleared: Vec<Position> },
    /// No run; the board was left untouched.
    NoMatch,
}

/// One player's ephemeral game state: the board, the move allowance and the
/// ledger-confirmed points total. Boards never outlive the session and are
/// never persisted.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    session_id: Uuid,
    user: PlatformUser,
    rules: SessionRules,
    board: Board,
    moves_left: u32,
    last_reset: DateTime<Utc>,
    /// Only updated from ledger replies, never optimistically. A failed
    /// increment call therefore cannot leave a phantom balance behind.
    points: i64,
}

impl PlayerSession {
    /// Start a fresh session for the platform's current user. Fails when the
    /// context carries no user (e.g. the app was opened outside Telegram).
    pub fn start(
        ctx: &dyn PlatformContext,
        rules: SessionRules,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let user = ctx.user().ok_or(SessionError::NoUser)?;
        Ok(Self::resume(user, rules, Board::generate(), rules.move_allowance, now))
    }

    /// Rebuild a session from known state, e.g. after the client reloads and
    /// the server reports the stored move count.
    pub fn resume(
        user: PlatformUser,
        rules: SessionRules,
        board: Board,
        moves_left: u32,
        last_reset: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user,
            rules,
            board,
            moves_left,
            last_reset,
            points: 0,
        }
    }

    /// Attempt to swap two tiles. Costs one move whether or not a run
    /// results; out-of-range coordinates fail before the move is spent.
    pub fn swap(
        &mut self,
        a: Position,
        b: Position,
        now: DateTime<Utc>,
    ) -> Result<SwapEvent, SessionError> {
        self.maybe_replenish(now);

        if self.moves_left == 0 {
            return Err(SessionError::NoMovesLeft);
        }

        let outcome = self.board.try_swap(a, b, self.rules.match_policy)?;
        self.moves_left -= 1;

        Ok(match outcome {
            SwapOutcome::Matched { cleared } => SwapEvent::Matched {
                award: self.rules.match_award,
                cleared,
            },
            SwapOutcome::NoMatch => SwapEvent::NoMatch,
        })
    }

    /// Restore the full move allowance once the refill interval has passed
    /// since the last reset. Gated by the stored timestamp, so calling this
    /// every tick is safe.
    pub fn maybe_replenish(&mut self, now: DateTime<Utc>) {
        if now - self.last_reset >= self.rules.move_refill {
            self.moves_left = self.rules.move_allowance;
            self.last_reset = now;
        }
    }

    /// Commit the ledger's reply as the new displayed total.
    pub fn confirm_points(&mut self, new_total: i64) {
        self.points = new_total;
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user(&self) -> &PlatformUser {
        &self.user
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn moves_left(&self) -> u32 {
        self.moves_left
    }

    /// Ledger-confirmed points.
    pub fn points(&self) -> i64 {
        self.points
    }

    /// Derived display currency, recomputed on every read.
    pub fn fluxx_balance(&self) -> i64 {
        fluxx_balance(self.points)
    }
}
