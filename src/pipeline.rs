//! Render pipelines.
//!
//! A render pipeline owns a tree of passes producing one rendered output and
//! the bindings between pipeline views and draw list tags. Pipelines are
//! shared (`Arc`) because the scene hands pipeline pointers out to callers;
//! the scene remains the only writer of pipeline membership, and all
//! structural pass edits go through the deferred edit queue.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::pass::{ParentPass, Pass, PassEdit};
use crate::scene::SceneId;
use crate::tags::{DrawFilterTag, DrawListMask};
use crate::view::ViewPtr;

/// Identifier of a render pipeline, unique within a scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPipelineId(String);

impl RenderPipelineId {
    /// Creates an id from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RenderPipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RenderPipelineId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Names a view slot inside a pipeline ("MainCamera", "ShadowCascade0", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineViewTag(String);

impl PipelineViewTag {
    /// Creates a view tag from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PipelineViewTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PipelineViewTag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// When a pipeline renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Render every frame.
    EveryFrame,
    /// Render the next frame, then stop.
    RenderOnce,
    /// Do not render.
    NoRender,
}

/// Whether a view slot lives across frames or is requested per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineViewType {
    /// Registered once, survives across frames.
    Persistent,
    /// Requested by feature processors each frame, cleared at frame start.
    Transient,
}

/// The views bound to one pipeline view tag.
#[derive(Debug, Clone)]
pub struct PipelineViews {
    /// Persistent or transient.
    pub view_type: PipelineViewType,
    /// Union of the draw list tags of all passes referencing this view tag.
    pub draw_list_mask: DrawListMask,
    /// Bound views. Persistent slots hold at most one view.
    pub views: Vec<ViewPtr>,
}

impl PipelineViews {
    fn new(view_type: PipelineViewType) -> Self {
        Self {
            view_type,
            draw_list_mask: DrawListMask::default(),
            views: Vec::new(),
        }
    }
}

/// Shared handle to a render pipeline.
pub type RenderPipelinePtr = Arc<RenderPipeline>;

/// An ordered graph of passes producing a rendered output.
#[derive(Debug)]
pub struct RenderPipeline {
    id: RenderPipelineId,
    root: RwLock<ParentPass>,
    pending_edits: Mutex<Vec<PassEdit>>,
    scene: Mutex<Option<SceneId>>,
    draw_filter_tag: Mutex<Option<DrawFilterTag>>,
    render_mode: Mutex<RenderMode>,
    views: RwLock<HashMap<PipelineViewTag, PipelineViews>>,
}

impl RenderPipeline {
    /// Creates a pipeline with an empty root pass.
    pub fn new(id: impl Into<RenderPipelineId>, render_mode: RenderMode) -> RenderPipelinePtr {
        let id = id.into();
        let root = ParentPass::new(format!("{id}_root"));
        Arc::new(Self {
            id,
            root: RwLock::new(root),
            pending_edits: Mutex::new(Vec::new()),
            scene: Mutex::new(None),
            draw_filter_tag: Mutex::new(None),
            render_mode: Mutex::new(render_mode),
            views: RwLock::new(HashMap::new()),
        })
    }

    /// Pipeline id.
    pub fn id(&self) -> &RenderPipelineId {
        &self.id
    }

    /// Id of the owning scene, if attached.
    pub fn scene_id(&self) -> Option<SceneId> {
        *self.scene.lock()
    }

    /// Whether this pipeline is attached to a scene.
    pub fn is_owned(&self) -> bool {
        self.scene.lock().is_some()
    }

    /// Draw filter tag acquired by the owning scene, if attached.
    pub fn draw_filter_tag(&self) -> Option<DrawFilterTag> {
        *self.draw_filter_tag.lock()
    }

    /// Current render mode.
    pub fn render_mode(&self) -> RenderMode {
        *self.render_mode.lock()
    }

    /// Sets the render mode.
    pub fn set_render_mode(&self, mode: RenderMode) {
        *self.render_mode.lock() = mode;
    }

    /// Whether this pipeline participates in the next frame.
    pub fn needs_render(&self) -> bool {
        !matches!(*self.render_mode.lock(), RenderMode::NoRender)
    }

    /// Read access to the pass tree root.
    pub fn root(&self) -> RwLockReadGuard<'_, ParentPass> {
        self.root.read()
    }

    /// Write access to the pass tree root.
    ///
    /// Intended for construction-time setup and the scene's lookup rebuild;
    /// frame-time structural changes must go through
    /// [`queue_pass_edit`](Self::queue_pass_edit) instead.
    pub fn root_mut(&self) -> RwLockWriteGuard<'_, ParentPass> {
        self.root.write()
    }

    /// Queues a structural edit, applied at the next flush point.
    pub fn queue_pass_edit(&self, edit: PassEdit) {
        self.pending_edits.lock().push(edit);
    }

    /// Number of queued, unapplied edits.
    pub fn pending_edit_count(&self) -> usize {
        self.pending_edits.lock().len()
    }

    /// Drains and applies all queued structural edits.
    ///
    /// Called by the scene at flush points (pipeline add/remove, scene
    /// activation). Invalid edits are reported and skipped.
    pub fn process_queued_changes(&self) {
        let edits = std::mem::take(&mut *self.pending_edits.lock());
        if edits.is_empty() {
            return;
        }

        let mut root = self.root.write();
        for edit in edits {
            if let Err(err) = root.apply_edit(edit) {
                log::warn!("Pipeline '{}': dropping pass edit: {err}", self.id);
            }
        }
    }

    /// Registers a persistent view slot.
    pub fn mark_persistent_view(&self, tag: impl Into<PipelineViewTag>) {
        self.views
            .write()
            .entry(tag.into())
            .or_insert_with(|| PipelineViews::new(PipelineViewType::Persistent));
    }

    /// Binds the view of a persistent slot, returning the previous binding.
    pub fn set_persistent_view(
        &self,
        tag: impl Into<PipelineViewTag>,
        view: ViewPtr,
    ) -> Option<ViewPtr> {
        let tag = tag.into();
        let mut views = self.views.write();
        let entry = views
            .entry(tag)
            .or_insert_with(|| PipelineViews::new(PipelineViewType::Persistent));
        debug_assert!(
            entry.view_type == PipelineViewType::Persistent,
            "set_persistent_view called on a transient view slot"
        );
        let previous = entry.views.first().cloned();
        entry.views = vec![view];
        previous
    }

    /// Attaches a transient view for this frame.
    pub fn add_transient_view(&self, tag: impl Into<PipelineViewTag>, view: ViewPtr) {
        let tag = tag.into();
        let mut views = self.views.write();
        let entry = views
            .entry(tag)
            .or_insert_with(|| PipelineViews::new(PipelineViewType::Transient));
        debug_assert!(
            entry.view_type == PipelineViewType::Transient,
            "add_transient_view called on a persistent view slot"
        );
        entry.views.push(view);
    }

    /// Recomputes each view slot's draw list mask from the pass tree.
    ///
    /// A slot's mask is the union of the draw list tags of every raster pass
    /// that renders from it. Slots referenced by passes but not yet
    /// registered are created as persistent.
    pub fn build_pipeline_views(&self) {
        let root = self.root.read();
        let mut views = self.views.write();

        for entry in views.values_mut() {
            entry.draw_list_mask = DrawListMask::default();
        }

        fn visit(pass: &ParentPass, views: &mut HashMap<PipelineViewTag, PipelineViews>) {
            for child in pass.children() {
                match child {
                    Pass::Parent(parent) => visit(parent, views),
                    Pass::Raster(raster) => {
                        if let Some(view_tag) = raster.pipeline_view_tag() {
                            let entry = views
                                .entry(view_tag.clone())
                                .or_insert_with(|| PipelineViews::new(PipelineViewType::Persistent));
                            if let Some(tag) = raster.draw_list_tag() {
                                entry.draw_list_mask.insert(tag);
                            }
                        }
                    }
                    Pass::Compute(_) => {}
                }
            }
        }
        visit(&root, &mut views);
    }

    /// Collects persistent views with their masks, merging masks of views
    /// already present in `out` via bitwise OR.
    pub fn collect_persistent_views(&self, out: &mut Vec<(ViewPtr, DrawListMask)>) {
        let views = self.views.read();
        for entry in views.values() {
            if entry.view_type != PipelineViewType::Persistent {
                continue;
            }
            for view in &entry.views {
                match out.iter_mut().find(|(v, _)| Arc::ptr_eq(v, view)) {
                    Some((_, mask)) => *mask |= entry.draw_list_mask,
                    None => out.push((view.clone(), entry.draw_list_mask)),
                }
            }
        }
    }

    /// Persistent slots that currently have a bound view.
    pub fn persistent_views(&self) -> Vec<(PipelineViewTag, ViewPtr)> {
        let views = self.views.read();
        let mut result: Vec<_> = views
            .iter()
            .filter(|(_, e)| e.view_type == PipelineViewType::Persistent && e.views.len() == 1)
            .map(|(tag, e)| (tag.clone(), e.views[0].clone()))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        result
    }

    /// Snapshot of the pipeline view map.
    pub fn pipeline_views(&self) -> HashMap<PipelineViewTag, PipelineViews> {
        self.views.read().clone()
    }

    /// Called by the scene when the pipeline is added.
    pub(crate) fn on_added_to_scene(&self, scene: SceneId, filter_tag: DrawFilterTag) {
        debug_assert!(
            self.scene.lock().is_none(),
            "pipeline '{}' is already attached to a scene",
            self.id
        );
        *self.scene.lock() = Some(scene);
        *self.draw_filter_tag.lock() = Some(filter_tag);
        log::debug!("Pipeline '{}' added to scene {scene:?}", self.id);
    }

    /// Called by the scene when the pipeline is removed.
    pub(crate) fn on_removed_from_scene(&self) {
        *self.scene.lock() = None;
        *self.draw_filter_tag.lock() = None;
        log::debug!("Pipeline '{}' removed from its scene", self.id);
    }

    /// Frame-start hook: clears transient view bindings.
    pub(crate) fn on_start_frame(&self, _tick: crate::feature::TickTimeInfo) {
        let mut views = self.views.write();
        for entry in views.values_mut() {
            if entry.view_type == PipelineViewType::Transient {
                entry.views.clear();
            }
        }
    }

    /// Frame-end hook: a render-once pipeline stops rendering.
    pub(crate) fn on_frame_end(&self) {
        let mut mode = self.render_mode.lock();
        if *mode == RenderMode::RenderOnce {
            *mode = RenderMode::NoRender;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{Pass, RasterPass};
    use crate::tags::DrawListTagRegistry;
    use crate::view::{View, ViewUsageFlags};

    fn pipeline_with_passes(
        registry: &DrawListTagRegistry,
    ) -> (RenderPipelinePtr, crate::tags::DrawListTag, crate::tags::DrawListTag) {
        let opaque = registry.acquire_tag("opaque").unwrap();
        let shadow = registry.acquire_tag("shadow").unwrap();

        let pipeline = RenderPipeline::new("main", RenderMode::EveryFrame);
        {
            let mut root = pipeline.root_mut();
            root.add_child(Pass::Raster(
                RasterPass::new("forward")
                    .with_draw_list_tag(opaque)
                    .with_view_tag("MainCamera".into()),
            ));
            root.add_child(Pass::Raster(
                RasterPass::new("shadow")
                    .with_draw_list_tag(shadow)
                    .with_view_tag("MainCamera".into()),
            ));
        }
        pipeline.build_pipeline_views();
        (pipeline, opaque, shadow)
    }

    #[test]
    fn build_pipeline_views_unions_masks() {
        let registry = DrawListTagRegistry::new();
        let (pipeline, opaque, shadow) = pipeline_with_passes(&registry);

        let views = pipeline.pipeline_views();
        let entry = &views[&PipelineViewTag::new("MainCamera")];
        assert_eq!(entry.view_type, PipelineViewType::Persistent);
        assert!(entry.draw_list_mask.contains(opaque));
        assert!(entry.draw_list_mask.contains(shadow));
    }

    #[test]
    fn collect_persistent_views_merges_by_view() {
        let registry = DrawListTagRegistry::new();
        let (pipeline, opaque, shadow) = pipeline_with_passes(&registry);

        let camera = View::new("camera", ViewUsageFlags::CAMERA);
        pipeline.set_persistent_view("MainCamera", camera.clone());

        let mut out = Vec::new();
        pipeline.collect_persistent_views(&mut out);
        assert_eq!(out.len(), 1);
        assert!(Arc::ptr_eq(&out[0].0, &camera));
        assert!(out[0].1.contains(opaque));
        assert!(out[0].1.contains(shadow));
    }

    #[test]
    fn transient_views_cleared_at_frame_start() {
        let pipeline = RenderPipeline::new("main", RenderMode::EveryFrame);
        let probe = View::new("probe", ViewUsageFlags::REFLECTIVE_CUBEMAP);
        pipeline.add_transient_view("Probe", probe);

        assert_eq!(pipeline.pipeline_views()[&"Probe".into()].views.len(), 1);
        pipeline.on_start_frame(crate::feature::TickTimeInfo::default());
        assert!(pipeline.pipeline_views()[&"Probe".into()].views.is_empty());
    }

    #[test]
    fn render_once_degrades_to_no_render() {
        let pipeline = RenderPipeline::new("capture", RenderMode::RenderOnce);
        assert!(pipeline.needs_render());
        pipeline.on_frame_end();
        assert!(!pipeline.needs_render());
        assert_eq!(pipeline.render_mode(), RenderMode::NoRender);
    }

    #[test]
    fn queued_edits_apply_at_flush() {
        let pipeline = RenderPipeline::new("main", RenderMode::EveryFrame);
        pipeline.queue_pass_edit(PassEdit::AddChild {
            parent: vec![],
            pass: Pass::Raster(RasterPass::new("late")),
        });

        assert_eq!(pipeline.pending_edit_count(), 1);
        assert!(pipeline.root().children().is_empty());

        pipeline.process_queued_changes();
        assert_eq!(pipeline.pending_edit_count(), 0);
        assert_eq!(pipeline.root().children().len(), 1);
    }

    #[test]
    fn set_persistent_view_returns_previous() {
        let pipeline = RenderPipeline::new("main", RenderMode::EveryFrame);
        let first = View::new("first", ViewUsageFlags::CAMERA);
        let second = View::new("second", ViewUsageFlags::CAMERA);

        assert!(pipeline.set_persistent_view("MainCamera", first.clone()).is_none());
        let previous = pipeline.set_persistent_view("MainCamera", second).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
    }
}
