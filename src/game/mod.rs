// Board engine and the session layer that owns it.

pub mod board;
pub mod session;

pub use board::{Board, BoardError, MatchPolicy, Position, SwapOutcome, TileColor, BOARD_SIZE};
pub use session::{
    PlatformContext, PlatformUser, PlayerSession, SessionError, SessionRules, SwapEvent,
};
