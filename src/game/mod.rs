//! Game-side session management.

pub mod session;

pub use session::{Session, SessionRunner, SessionSettings};
