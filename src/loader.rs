//! Background chunk build pool with two-tier request prioritization.
//!
//! Keeps the main thread off the expensive generate/mesh path: requests go
//! into one of two FIFO channels (normal or priority), a small fixed pool of
//! worker threads builds chunks from them, and finished records land in a
//! shared [`ResultQueue`] for the owning thread to drain. Priority workers
//! push their completions to the queue's front so they surface ahead of the
//! normal backlog.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::chunk::{ChunkRecord, WorldSource};
use crate::config::StreamConfig;
use crate::constants::WAIT_POLL_MS;
use crate::coords::ChunkCoords;
use crate::queue::ResultQueue;

/// Manages the background build workers and their queues.
///
/// Dropping the loader stops and joins every worker; a worker mid-build
/// always finishes its current chunk before observing the stop flag.
pub struct ChunkLoader {
    normal_tx: Sender<ChunkCoords>,
    priority_tx: Sender<ChunkCoords>,
    results: Arc<ResultQueue>,
    stop_flag: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ChunkLoader {
    /// Spawn a loader with the default pool sizes (one normal worker, one
    /// priority worker).
    pub fn new(world: Arc<dyn WorldSource>) -> Self {
        Self::with_config(world, &StreamConfig::default())
    }

    pub fn with_config(world: Arc<dyn WorldSource>, config: &StreamConfig) -> Self {
        let (normal_tx, normal_rx) = unbounded::<ChunkCoords>();
        let (priority_tx, priority_rx) = unbounded::<ChunkCoords>();
        let results = Arc::new(ResultQueue::new());
        let stop_flag = Arc::new(AtomicBool::new(false));
        let idle_poll = Duration::from_millis(config.idle_poll_ms);

        let mut workers = Vec::with_capacity(config.normal_workers + config.priority_workers);

        for worker_id in 0..config.normal_workers.max(1) {
            workers.push(spawn_worker(
                format!("chunk-load-{}", worker_id),
                normal_rx.clone(),
                Arc::clone(&world),
                Arc::clone(&results),
                Arc::clone(&stop_flag),
                idle_poll,
                false,
            ));
        }
        for worker_id in 0..config.priority_workers.max(1) {
            workers.push(spawn_worker(
                format!("chunk-load-prio-{}", worker_id),
                priority_rx.clone(),
                Arc::clone(&world),
                Arc::clone(&results),
                Arc::clone(&stop_flag),
                idle_poll,
                true,
            ));
        }

        ChunkLoader {
            normal_tx,
            priority_tx,
            results,
            stop_flag,
            workers,
        }
    }

    /// Enqueue a load request. Priority requests go to the dedicated priority
    /// channel and their completions preempt the normal backlog on drain.
    ///
    /// Duplicate requests for the same coordinate are tolerated; the manager
    /// resolves duplicate adoptions when it drains.
    pub fn request_load(&self, coords: ChunkCoords, priority: bool) {
        // Unbounded channels: a send only fails once all receivers are gone,
        // i.e. after shutdown, where dropping the request is the intended
        // outcome anyway.
        if priority {
            let _ = self.priority_tx.send(coords);
        } else {
            let _ = self.normal_tx.send(coords);
        }
    }

    /// Non-blocking poll for one completed build, priority-first.
    pub fn get_completed_load(&self) -> Option<ChunkRecord> {
        self.results.pop_front()
    }

    /// Number of completed builds awaiting drain.
    pub fn completed_len(&self) -> usize {
        self.results.len()
    }

    /// Number of requests not yet picked up by a worker.
    pub fn queued_len(&self) -> usize {
        self.normal_tx.len() + self.priority_tx.len()
    }

    /// Signal all workers to exit after their current chunk. Idempotent.
    /// Requests still queued are left unprocessed and dropped at teardown.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    /// Block until both request channels are empty, polling at a bounded
    /// interval. Used for synchronous bulk preload. Returns early if the
    /// loader is stopped, since a stopped pool will never drain the backlog.
    pub fn wait_until_empty(&self) {
        while !self.stop_flag.load(Ordering::Relaxed) {
            if self.normal_tx.is_empty() && self.priority_tx.is_empty() {
                return;
            }
            thread::sleep(Duration::from_millis(WAIT_POLL_MS));
        }
    }
}

impl Drop for ChunkLoader {
    fn drop(&mut self) {
        self.stop();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("chunk load worker panicked");
            }
        }
        tracing::info!("chunk loading stopped");
    }
}

fn spawn_worker(
    name: String,
    rx: Receiver<ChunkCoords>,
    world: Arc<dyn WorldSource>,
    results: Arc<ResultQueue>,
    stop_flag: Arc<AtomicBool>,
    idle_poll: Duration,
    priority: bool,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            loop {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                // Bounded wait doubles as the stop-flag poll interval.
                match rx.recv_timeout(idle_poll) {
                    Ok(coords) => {
                        // A request can arrive while stop() is racing the
                        // recv; it must be dropped, not built.
                        if stop_flag.load(Ordering::Relaxed) {
                            break;
                        }
                        match world.build_chunk(coords) {
                            Ok(payload) => {
                                let record = ChunkRecord::new(coords, payload);
                                if priority {
                                    results.push_front(record);
                                } else {
                                    results.push_back(record);
                                }
                            }
                            Err(err) => {
                                // Drop the request rather than retry: a coordinate
                                // that keeps failing must not wedge the pool.
                                tracing::warn!("dropping failed chunk build: {}", err);
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .expect("Failed to spawn chunk load worker")
}
