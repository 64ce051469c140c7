// Streaming constants
pub const DEFAULT_NORMAL_WORKERS: usize = 1;
pub const DEFAULT_PRIORITY_WORKERS: usize = 1;
pub const DEFAULT_VISIBILITY_RADIUS: i32 = 4;

// Worker idle poll interval when its request queue is empty, milliseconds
pub const IDLE_POLL_MS: u64 = 200;
// Sleep between emptiness checks in wait_until_empty, milliseconds
pub const WAIT_POLL_MS: u64 = 500;
