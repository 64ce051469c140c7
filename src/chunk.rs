//! Chunk records and the boundary traits the streaming core talks through.
//!
//! The core never generates terrain or touches the scene graph itself; it
//! drives a [`WorldSource`] on worker threads and a [`SceneAttach`] on the
//! owning thread, keeping both behind narrow trait objects injected at
//! construction.

use std::error::Error;
use std::fmt;

use crate::coords::ChunkCoords;

/// Built voxel/mesh data for one chunk, produced by the world service.
///
/// Opaque to the streaming core; it only moves the bytes from the worker that
/// built them to the scene service that consumes them.
pub struct ChunkPayload {
    pub data: Vec<u8>,
}

impl ChunkPayload {
    pub fn new(data: Vec<u8>) -> Self {
        ChunkPayload { data }
    }
}

/// Opaque handle to a scene node returned by [`SceneAttach::attach`].
///
/// The node itself is owned by the scene service; the core only holds the
/// handle so it can detach exactly once on eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderHandle(pub u64);

/// A built chunk and its attachment state.
///
/// Constructed by a worker thread, then handed over the result queue to the
/// manager, which is its sole owner from adoption to eviction. Deliberately
/// neither `Clone` nor `Copy`: two owners of the same record would mean two
/// detach calls for one attach.
pub struct ChunkRecord {
    pub coords: ChunkCoords,
    pub payload: ChunkPayload,
    pub render_handle: Option<RenderHandle>,
}

impl ChunkRecord {
    pub fn new(coords: ChunkCoords, payload: ChunkPayload) -> Self {
        ChunkRecord {
            coords,
            payload,
            render_handle: None,
        }
    }
}

/// Axis-aligned rectangular span of chunk coordinates, inclusive on both
/// corners. Used by the bulk region load/unload hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub lower: ChunkCoords,
    pub upper: ChunkCoords,
}

impl Region {
    pub fn new(lower: ChunkCoords, upper: ChunkCoords) -> Self {
        Region { lower, upper }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.lower, self.upper)
    }
}

/// Failure to build a single chunk. Contained at the worker boundary; the
/// offending request is logged and dropped, never retried.
#[derive(Debug)]
pub struct BuildError {
    pub coords: ChunkCoords,
    pub reason: String,
}

impl BuildError {
    pub fn new(coords: ChunkCoords, reason: impl Into<String>) -> Self {
        BuildError {
            coords,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk build failed at {}: {}", self.coords, self.reason)
    }
}

impl Error for BuildError {}

/// World/terrain service: generates and meshes chunk data.
///
/// `build_chunk` is called concurrently from multiple worker threads against
/// a shared world model, so implementations must be internally synchronized
/// or read-only. It may take milliseconds to tens of milliseconds and must
/// not spawn threads of its own.
pub trait WorldSource: Send + Sync {
    fn build_chunk(&self, coords: ChunkCoords) -> Result<ChunkPayload, BuildError>;

    /// Populate a rectangular region of the backing world model.
    /// Synchronous; large regions block the caller.
    fn populate_region(&self, region: &Region);

    /// Clear a rectangular region of the backing world model.
    fn clear_region(&self, region: &Region);
}

/// Scene/render attachment service. Called only from the manager's owning
/// thread during adopt and evict; `detach` is called exactly once per
/// successful `attach`.
pub trait SceneAttach {
    fn attach(&mut self, coords: ChunkCoords, payload: &ChunkPayload) -> RenderHandle;
    fn detach(&mut self, handle: RenderHandle);
}
