//! Views and per-view draw lists.
//!
//! A [`View`] is a camera/frustum-like projection used for culling and draw
//! submission. Persistent views live across frames inside render pipelines;
//! transient views are requested per frame by feature processors.
//!
//! Views are shared (`Arc`) because culling jobs and feature processor render
//! jobs push draw items into them concurrently; the pending buffer is drained
//! and sorted into per-tag draw lists by [`View::finalize_draw_lists`] once
//! the collection barrier has passed.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use glam::Vec3;
use parking_lot::{Mutex, RwLock};

use crate::srg::ShaderResourceGroup;
use crate::tags::{DrawListMask, DrawListTag};

bitflags! {
    /// What a view is used for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ViewUsageFlags: u32 {
        /// Regular camera view.
        const CAMERA = 1 << 0;
        /// Shadow map projection.
        const SHADOW = 1 << 1;
        /// Reflective cubemap face.
        const REFLECTIVE_CUBEMAP = 1 << 2;
    }
}

/// One renderable item routed to a draw bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    /// Draw bucket this item belongs to.
    pub tag: DrawListTag,
    /// Sort key within the bucket (ascending).
    pub sort_key: u64,
}

/// A clipping plane in the form `dot(normal, p) + d >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    normal: Vec3,
    d: f32,
}

impl Plane {
    /// Creates a plane from a (not necessarily unit) normal and offset.
    pub fn new(normal: Vec3, d: f32) -> Self {
        let length = normal.length();
        Self {
            normal: normal / length,
            d: d / length,
        }
    }

    /// Signed distance from the plane to `point`.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// Convex view volume described by inward-facing planes.
///
/// No planes means an infinite frustum that contains everything.
#[derive(Debug, Clone, Default)]
pub struct Frustum {
    planes: Vec<Plane>,
}

impl Frustum {
    /// Frustum containing all of space.
    pub fn infinite() -> Self {
        Self { planes: Vec::new() }
    }

    /// Frustum bounded by the given planes.
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Axis-aligned box frustum, useful for tests and orthographic views.
    pub fn axis_aligned(min: Vec3, max: Vec3) -> Self {
        Self::from_planes(vec![
            Plane::new(Vec3::X, -min.x),
            Plane::new(-Vec3::X, max.x),
            Plane::new(Vec3::Y, -min.y),
            Plane::new(-Vec3::Y, max.y),
            Plane::new(Vec3::Z, -min.z),
            Plane::new(-Vec3::Z, max.z),
        ])
    }

    /// Whether a bounding sphere intersects the frustum.
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }
}

/// Shared handle to a view.
pub type ViewPtr = Arc<View>;

/// A camera/frustum projection collecting draw items for one frame.
#[derive(Debug)]
pub struct View {
    name: String,
    usage: ViewUsageFlags,
    frustum: RwLock<Frustum>,
    draw_list_mask: RwLock<DrawListMask>,
    pending_items: Mutex<Vec<DrawItem>>,
    draw_lists: RwLock<HashMap<DrawListTag, Vec<DrawItem>>>,
    srg: Mutex<ShaderResourceGroup>,
}

impl View {
    /// Creates a view with an infinite frustum and an empty mask.
    pub fn new(name: impl Into<String>, usage: ViewUsageFlags) -> ViewPtr {
        let name = name.into();
        let srg = ShaderResourceGroup::new(format!("{name}_srg"));
        Arc::new(Self {
            name,
            usage,
            frustum: RwLock::new(Frustum::infinite()),
            draw_list_mask: RwLock::new(DrawListMask::default()),
            pending_items: Mutex::new(Vec::new()),
            draw_lists: RwLock::new(HashMap::new()),
            srg: Mutex::new(srg),
        })
    }

    /// Debug name of this view.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Usage flags of this view.
    pub fn usage(&self) -> ViewUsageFlags {
        self.usage
    }

    /// Replaces the culling frustum.
    pub fn set_frustum(&self, frustum: Frustum) {
        *self.frustum.write() = frustum;
    }

    /// Current culling frustum.
    pub fn frustum(&self) -> Frustum {
        self.frustum.read().clone()
    }

    /// Assigns the combined draw list mask for this frame.
    pub fn set_draw_list_mask(&self, mask: DrawListMask) {
        *self.draw_list_mask.write() = mask;
    }

    /// Draw list mask assigned for this frame.
    pub fn draw_list_mask(&self) -> DrawListMask {
        *self.draw_list_mask.read()
    }

    /// Queues a draw item for this frame.
    ///
    /// Safe to call concurrently from culling and render jobs.
    pub fn add_draw_item(&self, item: DrawItem) {
        self.pending_items.lock().push(item);
    }

    /// Queues a batch of draw items for this frame.
    pub fn add_draw_items(&self, items: impl IntoIterator<Item = DrawItem>) {
        self.pending_items.lock().extend(items);
    }

    /// Number of items queued but not yet finalized.
    pub fn pending_item_count(&self) -> usize {
        self.pending_items.lock().len()
    }

    /// Drains pending items into sorted per-tag draw lists.
    ///
    /// Items whose tag is outside the view's mask are dropped. Must only run
    /// after the collection barrier; callers provide that ordering.
    pub fn finalize_draw_lists(&self) {
        let pending = std::mem::take(&mut *self.pending_items.lock());
        let mask = self.draw_list_mask();

        let mut lists: HashMap<DrawListTag, Vec<DrawItem>> = HashMap::new();
        for item in pending {
            if mask.contains(item.tag) {
                lists.entry(item.tag).or_default().push(item);
            }
        }
        for list in lists.values_mut() {
            list.sort_by_key(|item| item.sort_key);
        }

        log::trace!(
            "View '{}': finalized {} draw lists",
            self.name,
            lists.len()
        );
        *self.draw_lists.write() = lists;
    }

    /// Finalized draw list for a tag (empty if none).
    pub fn draw_list(&self, tag: DrawListTag) -> Vec<DrawItem> {
        self.draw_lists
            .read()
            .get(&tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of non-empty finalized draw lists.
    pub fn draw_list_count(&self) -> usize {
        self.draw_lists.read().len()
    }

    /// Writes a per-view shader constant.
    pub fn set_srg_constant(&self, name: impl Into<String>, value: f32) {
        self.srg.lock().set_constant(name, value);
    }

    /// Reads a per-view shader constant.
    pub fn srg_constant(&self, name: &str) -> Option<f32> {
        self.srg.lock().constant(name)
    }

    /// Compiles this view's shader resource group for the frame.
    pub fn update_srg(&self) {
        self.srg.lock().compile();
    }

    /// Number of completed srg compilations.
    pub fn srg_generation(&self) -> u64 {
        self.srg.lock().generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::DrawListTagRegistry;

    fn item(tag: DrawListTag, sort_key: u64) -> DrawItem {
        DrawItem { tag, sort_key }
    }

    #[test]
    fn finalize_filters_by_mask_and_sorts() {
        let registry = DrawListTagRegistry::new();
        let opaque = registry.acquire_tag("opaque").unwrap();
        let shadow = registry.acquire_tag("shadow").unwrap();

        let view = View::new("camera", ViewUsageFlags::CAMERA);
        view.set_draw_list_mask(DrawListMask::from_tag(opaque));

        view.add_draw_items([item(opaque, 30), item(shadow, 1), item(opaque, 10)]);
        view.add_draw_item(item(opaque, 20));
        assert_eq!(view.pending_item_count(), 4);

        view.finalize_draw_lists();

        assert_eq!(view.pending_item_count(), 0);
        let list = view.draw_list(opaque);
        assert_eq!(
            list.iter().map(|i| i.sort_key).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        // Masked-out tag was dropped entirely.
        assert!(view.draw_list(shadow).is_empty());
    }

    #[test]
    fn finalize_replaces_previous_frame_lists() {
        let registry = DrawListTagRegistry::new();
        let opaque = registry.acquire_tag("opaque").unwrap();

        let view = View::new("camera", ViewUsageFlags::CAMERA);
        view.set_draw_list_mask(DrawListMask::from_tag(opaque));

        view.add_draw_item(item(opaque, 1));
        view.finalize_draw_lists();
        assert_eq!(view.draw_list(opaque).len(), 1);

        // Next frame with no submissions: lists are rebuilt empty.
        view.finalize_draw_lists();
        assert!(view.draw_list(opaque).is_empty());
    }

    #[test]
    fn infinite_frustum_contains_everything() {
        let frustum = Frustum::infinite();
        assert!(frustum.contains_sphere(Vec3::new(1.0e6, -1.0e6, 0.0), 0.1));
    }

    #[test]
    fn box_frustum_sphere_tests() {
        let frustum = Frustum::axis_aligned(Vec3::splat(-1.0), Vec3::splat(1.0));

        assert!(frustum.contains_sphere(Vec3::ZERO, 0.5));
        // Touching from outside through the +x face.
        assert!(frustum.contains_sphere(Vec3::new(1.4, 0.0, 0.0), 0.5));
        assert!(!frustum.contains_sphere(Vec3::new(3.0, 0.0, 0.0), 0.5));
    }

    #[test]
    fn view_srg_updates() {
        let view = View::new("camera", ViewUsageFlags::CAMERA);
        view.set_srg_constant("near_clip", 0.1);
        assert_eq!(view.srg_constant("near_clip"), Some(0.1));

        view.update_srg();
        assert_eq!(view.srg_generation(), 1);
    }
}
