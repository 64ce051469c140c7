//! Spatial chunk lifecycle manager.
//!
//! Owns the authoritative map of resident chunks and drives the streaming
//! window: as the center moves it evicts chunks that fell out of range,
//! requests the ones that came into range, and each tick drains at most one
//! completed build from the loader so the frame never stalls on a backlog.
//!
//! Everything here runs on a single owning thread. The resident map is never
//! touched from anywhere else, which is what lets it live without a lock.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::chunk::{ChunkRecord, Region, SceneAttach, WorldSource};
use crate::config::StreamConfig;
use crate::coords::ChunkCoords;
use crate::loader::ChunkLoader;

pub struct ChunkManager {
    resident: FxHashMap<ChunkCoords, ChunkRecord>,
    /// Coordinates requested but not yet adopted. A reservation keeps the
    /// load pass from re-requesting a chunk every re-center while its build
    /// is still in flight.
    pending: FxHashSet<ChunkCoords>,
    /// Resident chunks whose voxel data changed and need a re-mesh.
    dirty: VecDeque<ChunkCoords>,
    center: Option<ChunkCoords>,
    visibility: i32,
    loader: ChunkLoader,
    world: Arc<dyn WorldSource>,
    scene: Box<dyn SceneAttach>,
}

impl ChunkManager {
    pub fn new(world: Arc<dyn WorldSource>, scene: Box<dyn SceneAttach>) -> Self {
        Self::with_config(world, scene, &StreamConfig::default())
    }

    pub fn with_config(
        world: Arc<dyn WorldSource>,
        scene: Box<dyn SceneAttach>,
        config: &StreamConfig,
    ) -> Self {
        let loader = ChunkLoader::with_config(Arc::clone(&world), config);
        ChunkManager {
            resident: FxHashMap::default(),
            pending: FxHashSet::default(),
            dirty: VecDeque::new(),
            center: None,
            visibility: config.visibility_radius,
            loader,
            world,
            scene,
        }
    }

    /// Move the streaming window to a new center chunk.
    ///
    /// No-op when the center is unchanged and `force` is false. Otherwise
    /// runs the eviction pass (drop every resident chunk whose planar box
    /// distance exceeds the visibility radius) and then the load pass
    /// (request every in-window coordinate that is neither resident nor
    /// already reserved). The window iterates row-major, x outer then y,
    /// with z pinned to the single ground layer.
    pub fn set_center(&mut self, center: ChunkCoords, force: bool) {
        if self.center == Some(center) && !force {
            return;
        }
        self.center = Some(center);

        let out_of_range: Vec<ChunkCoords> = self
            .resident
            .keys()
            .filter(|coords| coords.planar_distance(&center) > self.visibility)
            .copied()
            .collect();
        for coords in out_of_range {
            if let Some(record) = self.resident.remove(&coords) {
                self.release(record);
            }
        }
        // Stale reservations are forgotten too, so a build that completes
        // out-of-window can be re-requested if the window comes back.
        self.pending
            .retain(|coords| coords.planar_distance(&center) <= self.visibility);

        for x in (center.x - self.visibility)..=(center.x + self.visibility) {
            for y in (center.y - self.visibility)..=(center.y + self.visibility) {
                let coords = ChunkCoords::new(x, y, 0);
                if !self.resident.contains_key(&coords) && !self.pending.contains(&coords) {
                    self.pending.insert(coords);
                    self.loader.request_load(coords, false);
                }
            }
        }
    }

    /// Translate the current center and re-run the window logic.
    pub fn move_center(&mut self, delta: ChunkCoords) {
        let from = self.center.unwrap_or(ChunkCoords::new(0, 0, 0));
        let to = from + delta;
        tracing::debug!("center chunk {} => {}", from, to);
        self.set_center(to, false);
    }

    /// Request a single chunk outside the normal window logic, e.g. an
    /// urgent load directly under the player.
    pub fn request_load(&mut self, coords: ChunkCoords, priority: bool) {
        self.pending.insert(coords);
        self.loader.request_load(coords, priority);
    }

    /// Adopt at most one completed build into the resident map.
    ///
    /// Called once per tick by the owning thread; the one-per-call bound
    /// keeps drain latency off the frame budget. Returns the adopted
    /// coordinate, if any.
    ///
    /// Requests are at-least-once, so the same coordinate can complete
    /// twice; the earlier record's render handle is detached before the new
    /// one replaces it. A completion for a coordinate that has since left
    /// the window is still adopted and left for the next eviction pass.
    pub fn drain_one_completed_build(&mut self) -> Option<ChunkCoords> {
        let mut record = self.loader.get_completed_load()?;
        let coords = record.coords;
        self.pending.remove(&coords);

        if let Some(old) = self.resident.remove(&coords) {
            tracing::warn!("duplicate adoption at {}, replacing earlier chunk", coords);
            self.release(old);
        }

        let handle = self.scene.attach(coords, &record.payload);
        record.render_handle = Some(handle);
        self.resident.insert(coords, record);
        Some(coords)
    }

    /// Queue a resident chunk for re-meshing after its voxel data changed.
    pub fn mark_dirty(&mut self, coords: ChunkCoords) {
        if self.resident.contains_key(&coords) {
            self.dirty.push_back(coords);
        }
    }

    /// Rebuild at most one dirty chunk, synchronously on the calling thread.
    ///
    /// Edited chunks are latency-sensitive and small, so they skip the async
    /// path. A chunk evicted after being marked dirty is silently skipped.
    pub fn rebuild_dirty(&mut self) -> Option<ChunkCoords> {
        let coords = self.dirty.pop_front()?;
        if !self.resident.contains_key(&coords) {
            return None;
        }
        match self.world.build_chunk(coords) {
            Ok(payload) => {
                if let Some(record) = self.resident.get_mut(&coords) {
                    if let Some(handle) = record.render_handle.take() {
                        self.scene.detach(handle);
                    }
                    record.payload = payload;
                    record.render_handle = Some(self.scene.attach(coords, &record.payload));
                }
                Some(coords)
            }
            Err(err) => {
                tracing::warn!("dropping failed chunk rebuild: {}", err);
                None
            }
        }
    }

    /// Throw away every resident chunk and reload the whole window from
    /// scratch, e.g. after a world-wide change that invalidates all meshes.
    ///
    /// Evicts (detaches) all residents, clears the dirty queue, then forces
    /// a re-center so the load pass re-requests the window. Reservations for
    /// builds still in flight are kept; their completions adopt normally.
    pub fn rebuild_all(&mut self) {
        let records: Vec<ChunkRecord> = self.resident.drain().map(|(_, record)| record).collect();
        for record in records {
            self.release(record);
        }
        self.dirty.clear();
        if let Some(center) = self.center {
            self.set_center(center, true);
        }
    }

    /// Synchronously populate a rectangular region in the world service.
    /// Large regions block the calling thread.
    pub fn request_region_load(&self, region: &Region) {
        tracing::warn!("loading region: {}", region);
        self.world.populate_region(region);
    }

    /// Synchronously clear a rectangular region in the world service.
    pub fn request_region_unload(&self, region: &Region) {
        tracing::warn!("unloading region: {}", region);
        self.world.clear_region(region);
    }

    pub fn loader(&self) -> &ChunkLoader {
        &self.loader
    }

    /// Idempotent shutdown of the background workers.
    pub fn stop(&self) {
        self.loader.stop();
    }

    /// Block until the request backlog is empty, for bulk preload.
    pub fn wait_until_empty(&self) {
        self.loader.wait_until_empty();
    }

    pub fn center(&self) -> Option<ChunkCoords> {
        self.center
    }

    pub fn visibility_radius(&self) -> i32 {
        self.visibility
    }

    pub fn is_resident(&self, coords: &ChunkCoords) -> bool {
        self.resident.contains_key(coords)
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// Coordinates of all currently resident chunks, in map order.
    pub fn resident_coords(&self) -> impl Iterator<Item = ChunkCoords> + '_ {
        self.resident.keys().copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Detach and release one record. Owning thread only.
    fn release(&mut self, mut record: ChunkRecord) {
        if let Some(handle) = record.render_handle.take() {
            self.scene.detach(handle);
        }
    }
}

impl Drop for ChunkManager {
    fn drop(&mut self) {
        // Detach everything still resident so the scene service never ends
        // up holding nodes for chunks that no longer exist.
        let records: Vec<ChunkRecord> = self.resident.drain().map(|(_, record)| record).collect();
        for record in records {
            self.release(record);
        }
        self.loader.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{BuildError, ChunkPayload, RenderHandle};
    use parking_lot::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    struct TestWorld {
        fail_all: bool,
        region_loads: Mutex<Vec<Region>>,
        region_unloads: Mutex<Vec<Region>>,
    }

    impl TestWorld {
        fn new() -> Self {
            TestWorld {
                fail_all: false,
                region_loads: Mutex::new(Vec::new()),
                region_unloads: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            TestWorld {
                fail_all: true,
                region_loads: Mutex::new(Vec::new()),
                region_unloads: Mutex::new(Vec::new()),
            }
        }
    }

    impl WorldSource for TestWorld {
        fn build_chunk(&self, coords: ChunkCoords) -> Result<ChunkPayload, BuildError> {
            if self.fail_all {
                return Err(BuildError::new(coords, "test failure"));
            }
            Ok(ChunkPayload::new(vec![1, 2, 3]))
        }

        fn populate_region(&self, region: &Region) {
            self.region_loads.lock().push(*region);
        }

        fn clear_region(&self, region: &Region) {
            self.region_unloads.lock().push(*region);
        }
    }

    #[derive(Default)]
    struct SceneState {
        attaches: usize,
        detaches: usize,
        next_handle: u64,
        live: Vec<u64>,
    }

    /// Scene stub backed by shared state so tests can inspect the
    /// attach/detach accounting after handing the box to the manager.
    struct TestScene {
        state: Arc<Mutex<SceneState>>,
    }

    impl TestScene {
        fn new() -> (Self, Arc<Mutex<SceneState>>) {
            let state = Arc::new(Mutex::new(SceneState::default()));
            (
                TestScene {
                    state: Arc::clone(&state),
                },
                state,
            )
        }
    }

    impl SceneAttach for TestScene {
        fn attach(&mut self, _coords: ChunkCoords, _payload: &ChunkPayload) -> RenderHandle {
            let mut state = self.state.lock();
            state.attaches += 1;
            state.next_handle += 1;
            let handle = state.next_handle;
            state.live.push(handle);
            RenderHandle(handle)
        }

        fn detach(&mut self, handle: RenderHandle) {
            let mut state = self.state.lock();
            state.detaches += 1;
            let pos = state
                .live
                .iter()
                .position(|&h| h == handle.0)
                .expect("detach of unknown handle");
            state.live.remove(pos);
        }
    }

    fn test_config(radius: i32) -> StreamConfig {
        StreamConfig {
            visibility_radius: radius,
            idle_poll_ms: 10,
            ..StreamConfig::default()
        }
    }

    fn manager(radius: i32) -> (ChunkManager, Arc<Mutex<SceneState>>) {
        let (scene, state) = TestScene::new();
        let mgr = ChunkManager::with_config(
            Arc::new(TestWorld::new()),
            Box::new(scene),
            &test_config(radius),
        );
        (mgr, state)
    }

    /// Drain until the resident map reaches `count` entries.
    fn drain_until(mgr: &mut ChunkManager, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while mgr.resident_count() < count {
            assert!(Instant::now() < deadline, "timed out draining builds");
            if mgr.drain_one_completed_build().is_none() {
                thread::sleep(Duration::from_millis(5));
            }
        }
    }

    #[test]
    fn test_window_scenario_radius_one() {
        let (mut mgr, state) = manager(1);

        mgr.set_center(ChunkCoords::new(0, 0, 0), true);
        assert_eq!(mgr.pending_count(), 9);

        drain_until(&mut mgr, 9);
        for x in -1..=1 {
            for y in -1..=1 {
                assert!(mgr.is_resident(&ChunkCoords::new(x, y, 0)));
            }
        }
        assert_eq!(mgr.resident_count(), 9);
        assert_eq!(state.lock().attaches, 9);

        mgr.move_center(ChunkCoords::new(1, 0, 0));
        assert_eq!(mgr.center(), Some(ChunkCoords::new(1, 0, 0)));
        // The x = -1 column leaves the window.
        assert_eq!(state.lock().detaches, 3);
        assert_eq!(mgr.resident_count(), 6);
        assert_eq!(mgr.pending_count(), 3);

        drain_until(&mut mgr, 9);
        for y in -1..=1 {
            assert!(!mgr.is_resident(&ChunkCoords::new(-1, y, 0)));
            assert!(mgr.is_resident(&ChunkCoords::new(2, y, 0)));
        }
        assert_eq!(state.lock().live.len(), 9);
    }

    #[test]
    fn test_idempotent_recenter() {
        let (mut mgr, state) = manager(1);
        // Builds always fail, so reservations stay put and nothing drains.
        let mut failing = ChunkManager::with_config(
            Arc::new(TestWorld::failing()),
            Box::new(TestScene::new().0),
            &test_config(1),
        );
        failing.set_center(ChunkCoords::new(5, 5, 0), false);
        assert_eq!(failing.pending_count(), 9);
        failing.set_center(ChunkCoords::new(5, 5, 0), false);
        assert_eq!(failing.pending_count(), 9);

        // Same check on the healthy manager once the window is stable.
        mgr.set_center(ChunkCoords::new(0, 0, 0), true);
        drain_until(&mut mgr, 9);
        let detaches_before = state.lock().detaches;
        mgr.set_center(ChunkCoords::new(0, 0, 0), false);
        assert_eq!(mgr.pending_count(), 0);
        assert_eq!(state.lock().detaches, detaches_before);
    }

    #[test]
    fn test_duplicate_adoption_detaches_earlier_handle() {
        let (mut mgr, state) = manager(1);
        let coords = ChunkCoords::new(0, 0, 0);

        mgr.request_load(coords, false);
        mgr.request_load(coords, false);

        drain_until(&mut mgr, 1);
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            assert!(Instant::now() < deadline, "second build never completed");
            if mgr.drain_one_completed_build().is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(mgr.resident_count(), 1);
        let state = state.lock();
        assert_eq!(state.attaches, 2);
        assert_eq!(state.detaches, 1);
        assert_eq!(state.live.len(), 1);
    }

    #[test]
    fn test_stale_adoption_tolerated_then_evicted() {
        let (mut mgr, state) = manager(1);
        mgr.set_center(ChunkCoords::new(0, 0, 0), true);
        drain_until(&mut mgr, 9);

        // Way outside the window; the completion must still be adopted.
        let far = ChunkCoords::new(10, 10, 0);
        mgr.request_load(far, true);
        drain_until(&mut mgr, 10);
        assert!(mgr.is_resident(&far));

        // The next eviction pass removes it.
        mgr.set_center(ChunkCoords::new(0, 0, 0), true);
        assert!(!mgr.is_resident(&far));
        assert_eq!(mgr.resident_count(), 9);
        assert_eq!(state.lock().live.len(), 9);
    }

    #[test]
    fn test_rebuild_dirty_one_per_call() {
        let (mut mgr, state) = manager(1);
        mgr.set_center(ChunkCoords::new(0, 0, 0), true);
        drain_until(&mut mgr, 9);

        let a = ChunkCoords::new(0, 0, 0);
        let b = ChunkCoords::new(1, 1, 0);
        mgr.mark_dirty(a);
        mgr.mark_dirty(b);
        assert_eq!(mgr.dirty_count(), 2);

        assert_eq!(mgr.rebuild_dirty(), Some(a));
        assert_eq!(mgr.dirty_count(), 1);
        assert_eq!(mgr.rebuild_dirty(), Some(b));
        assert_eq!(mgr.rebuild_dirty(), None);

        // Each rebuild detached the old node and attached a fresh one.
        let state = state.lock();
        assert_eq!(state.attaches, 11);
        assert_eq!(state.detaches, 2);
        assert_eq!(state.live.len(), 9);
    }

    #[test]
    fn test_rebuild_all_reloads_window() {
        let (mut mgr, state) = manager(1);
        mgr.set_center(ChunkCoords::new(0, 0, 0), true);
        drain_until(&mut mgr, 9);
        mgr.mark_dirty(ChunkCoords::new(0, 0, 0));

        mgr.rebuild_all();
        // Everything detached, dirty queue gone, whole window re-requested.
        assert_eq!(mgr.resident_count(), 0);
        assert_eq!(mgr.dirty_count(), 0);
        assert_eq!(mgr.pending_count(), 9);
        assert_eq!(state.lock().detaches, 9);
        assert!(state.lock().live.is_empty());

        drain_until(&mut mgr, 9);
        for x in -1..=1 {
            for y in -1..=1 {
                assert!(mgr.is_resident(&ChunkCoords::new(x, y, 0)));
            }
        }
        let state = state.lock();
        assert_eq!(state.attaches, 18);
        assert_eq!(state.live.len(), 9);
    }

    #[test]
    fn test_resident_coords_enumerates_map() {
        let (mut mgr, _) = manager(1);
        mgr.set_center(ChunkCoords::new(0, 0, 0), true);
        drain_until(&mut mgr, 9);

        let mut coords: Vec<ChunkCoords> = mgr.resident_coords().collect();
        coords.sort();
        let mut expected = Vec::new();
        for x in -1..=1 {
            for y in -1..=1 {
                expected.push(ChunkCoords::new(x, y, 0));
            }
        }
        assert_eq!(coords, expected);
    }

    #[test]
    fn test_mark_dirty_ignores_non_resident() {
        let (mut mgr, _) = manager(1);
        mgr.mark_dirty(ChunkCoords::new(3, 3, 0));
        assert_eq!(mgr.dirty_count(), 0);
    }

    #[test]
    fn test_region_hooks_delegate_to_world() {
        let world = Arc::new(TestWorld::new());
        let (scene, _) = TestScene::new();
        let mgr = ChunkManager::with_config(world.clone(), Box::new(scene), &test_config(1));

        let region = Region::new(ChunkCoords::new(0, 0, 0), ChunkCoords::new(4, 4, 0));
        mgr.request_region_load(&region);
        mgr.request_region_unload(&region);

        assert_eq!(*world.region_loads.lock(), vec![region]);
        assert_eq!(*world.region_unloads.lock(), vec![region]);
    }

    #[test]
    fn test_drop_detaches_all_resident() {
        let (mut mgr, state) = manager(1);
        mgr.set_center(ChunkCoords::new(0, 0, 0), true);
        drain_until(&mut mgr, 9);
        drop(mgr);
        let state = state.lock();
        assert_eq!(state.attaches, state.detaches);
        assert!(state.live.is_empty());
    }
}
