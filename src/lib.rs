//! Incremental chunk streaming for an unbounded voxel world.
//!
//! Background worker threads generate and mesh chunks off the main thread;
//! a single owning thread moves the streaming window, drains completed
//! builds, and owns every resident chunk. Terrain generation and the scene
//! graph stay behind the [`WorldSource`] and [`SceneAttach`] traits.

// Chunk coordinates and record types
pub mod chunk;
pub mod coords;

// Worker pool and its queues
pub mod loader;
pub mod queue;

// Spatial lifecycle manager
pub mod manager;

// Configuration
pub mod config;
pub mod constants;

// Re-exports
pub use chunk::{
    BuildError, ChunkPayload, ChunkRecord, Region, RenderHandle, SceneAttach, WorldSource,
};
pub use config::StreamConfig;
pub use constants::*;
pub use coords::ChunkCoords;
pub use loader::ChunkLoader;
pub use manager::ChunkManager;
pub use queue::ResultQueue;
