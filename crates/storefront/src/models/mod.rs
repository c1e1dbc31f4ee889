//! Per-visitor data kept in the session.

pub mod session;

pub use session::{CartSession, keys as session_keys};
