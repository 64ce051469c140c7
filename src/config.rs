use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Tuning knobs for the streaming subsystem.
///
/// The pools are small and fixed; there is no dynamic scaling. Every field
/// falls back to its default when absent from a config file.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub normal_workers: usize,
    pub priority_workers: usize,
    pub visibility_radius: i32,
    pub idle_poll_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            normal_workers: DEFAULT_NORMAL_WORKERS,
            priority_workers: DEFAULT_PRIORITY_WORKERS,
            visibility_radius: DEFAULT_VISIBILITY_RADIUS,
            idle_poll_ms: IDLE_POLL_MS,
        }
    }
}
