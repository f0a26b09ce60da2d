//! Call session state machine

pub mod session;

pub use session::{CallSession, Outcome, SessionEffect, SessionInput, MAX_PENDING_CANDIDATES};
