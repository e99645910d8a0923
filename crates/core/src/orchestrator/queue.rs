//! FIFO backlog of job ids waiting to be launched.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct JobQueue {
    pending: VecDeque<u32>,
    enqueued: bool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate ids `1..=total_jobs` in order. Only the first call has an effect.
    pub fn enqueue_all(&mut self, total_jobs: u32) -> usize {
        if self.enqueued {
            tracing::warn!("Job queue already populated, ignoring enqueue_all");
            return 0;
        }
        self.enqueued = true;
        self.pending.extend(1..=total_jobs);
        self.pending.len()
    }

    pub fn dequeue(&mut self) -> Option<u32> {
        self.pending.pop_front()
    }

    /// Empty the queue, returning the discarded ids in launch order.
    pub fn drain(&mut self) -> Vec<u32> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
