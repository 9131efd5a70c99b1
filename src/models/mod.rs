pub mod user;

pub use user::{fluxx_balance, User, POINTS_PER_FLUXX};
