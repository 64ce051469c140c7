//! Priority-aware queue of completed chunk builds.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::chunk::ChunkRecord;

/// Unbounded double-ended queue of finished [`ChunkRecord`]s.
///
/// Workers push from either end: normal completions go to the back, priority
/// completions to the front so they surface ahead of the backlog when the
/// owning thread drains. The lock is held only for the container mutation,
/// never across a chunk build.
pub struct ResultQueue {
    inner: Mutex<VecDeque<ChunkRecord>>,
}

impl ResultQueue {
    pub fn new() -> Self {
        ResultQueue {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_back(&self, record: ChunkRecord) {
        self.inner.lock().push_back(record);
    }

    pub fn push_front(&self, record: ChunkRecord) {
        self.inner.lock().push_front(record);
    }

    /// Non-blocking pop from the front; `None` when empty.
    pub fn pop_front(&self) -> Option<ChunkRecord> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for ResultQueue {
    fn default() -> Self {
        Self::new()
    }
}
