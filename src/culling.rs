//! View-dependent visibility culling.
//!
//! The culling scene owns the registered cullables and produces visible draw
//! items per view. Per-view culling work runs concurrently with feature
//! processor render jobs inside the scene's collection phase; the two streams
//! are independent until draw lists are finalized.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use glam::Vec3;
use parking_lot::{Mutex, RwLock};

use crate::scene::SceneId;
use crate::view::{DrawItem, View, ViewPtr};

/// Bounding sphere of a cullable object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center in world space.
    pub center: Vec3,
    /// Sphere radius.
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a bounding sphere.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// One culled object: bounds plus the draw items it submits when visible.
#[derive(Debug, Clone)]
pub struct Cullable {
    /// World-space bounds used for the visibility test.
    pub bounds: BoundingSphere,
    /// Draw items submitted to a view when the object is visible.
    pub draw_items: Vec<DrawItem>,
}

/// Runtime toggles for culling behavior.
#[derive(Debug)]
pub struct CullingDebugContext {
    /// When false, per-view culling tasks run synchronously to completion
    /// instead of being dispatched to the worker pool.
    pub parallel_traversal: AtomicBool,
}

impl Default for CullingDebugContext {
    fn default() -> Self {
        Self {
            parallel_traversal: AtomicBool::new(true),
        }
    }
}

/// Visibility determination over a set of registered cullables.
#[derive(Debug, Default)]
pub struct CullingScene {
    cullables: RwLock<Vec<Cullable>>,
    debug: CullingDebugContext,
    owner: Mutex<Option<SceneId>>,
    in_progress: AtomicBool,
    visible_count: AtomicUsize,
}

impl CullingScene {
    /// Creates an empty culling scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds this culling scene to its owning scene.
    pub fn activate(&self, owner: SceneId) {
        *self.owner.lock() = Some(owner);
    }

    /// Unbinds from the owning scene.
    pub fn deactivate(&self) {
        *self.owner.lock() = None;
    }

    /// Id of the owning scene while activated.
    pub fn owner(&self) -> Option<SceneId> {
        *self.owner.lock()
    }

    /// Registers a cullable object.
    pub fn register_cullable(&self, cullable: Cullable) {
        self.cullables.write().push(cullable);
    }

    /// Removes all registered cullables.
    pub fn clear_cullables(&self) {
        self.cullables.write().clear();
    }

    /// Number of registered cullables.
    pub fn cullable_count(&self) -> usize {
        self.cullables.read().len()
    }

    /// Runtime toggles.
    pub fn debug_context(&self) -> &CullingDebugContext {
        &self.debug
    }

    /// Starts a culling pass over the given views.
    pub fn begin_culling(&self, views: &[ViewPtr]) {
        debug_assert!(
            !self.in_progress.swap(true, Ordering::SeqCst),
            "begin_culling called while culling is in progress"
        );
        self.visible_count.store(0, Ordering::SeqCst);
        log::trace!("Begin culling: {} views", views.len());
    }

    /// Culls all registered objects against one view.
    ///
    /// Visible draw items whose tag intersects the view's mask are queued on
    /// the view. Safe to run concurrently for different views.
    pub fn process_cullables(&self, view: &View) {
        let frustum = view.frustum();
        let mask = view.draw_list_mask();

        let mut visible = 0usize;
        let cullables = self.cullables.read();
        for cullable in cullables.iter() {
            if !frustum.contains_sphere(cullable.bounds.center, cullable.bounds.radius) {
                continue;
            }
            for item in cullable.draw_items.iter().copied() {
                if mask.contains(item.tag) {
                    view.add_draw_item(item);
                    visible += 1;
                }
            }
        }

        self.visible_count.fetch_add(visible, Ordering::Relaxed);
        log::trace!("View '{}': {} visible draw items", view.name(), visible);
    }

    /// Ends the current culling pass.
    pub fn end_culling(&self) {
        debug_assert!(
            self.in_progress.swap(false, Ordering::SeqCst),
            "end_culling called without begin_culling"
        );
    }

    /// Visible draw items produced by the last completed pass.
    pub fn visible_count(&self) -> usize {
        self.visible_count.load(Ordering::SeqCst)
    }
}
