//! Optional resume capability for collection runs
//!
//! Provides persistent checkpoint state with atomic writes and file locking.
//! Checkpoints are only taken when no fetched items are pending, so a stored
//! cursor always points at the next unread page.

pub mod checkpoint;
pub mod state;

pub use checkpoint::Checkpoint;
pub use state::{ResumeError, ResumeState};
