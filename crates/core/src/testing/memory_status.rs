//! In-memory status store for testing.

use std::sync::{Arc, Mutex};

use crate::status::{RunState, StatusError, StatusStore};

/// Status store that keeps every saved record.
///
/// Clones share the same history, so a test can keep one handle and give
/// the other to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusStore {
    history: Arc<Mutex<Vec<RunState>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record saved so far, oldest first.
    pub fn history(&self) -> Vec<RunState> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// The most recent record.
    pub fn latest(&self) -> Option<RunState> {
        self.history().pop()
    }

    pub fn save_count(&self) -> usize {
        self.history().len()
    }
}

impl StatusStore for MemoryStatusStore {
    fn save(&self, state: &RunState) -> Result<(), StatusError> {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history.push(state.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<RunState>, StatusError> {
        Ok(self.latest())
    }
}
