//! Persisted run status.
//!
//! The [`RunState`] record is the only piece of a run that outlives the
//! orchestrator process. It is rewritten on every transition so external
//! pollers (a web API, a shell script) can follow progress.

mod file;
mod store;
mod types;

pub use file::FileStatusStore;
pub use store::{StatusError, StatusStore};
pub use types::{AbortReason, RunState};
