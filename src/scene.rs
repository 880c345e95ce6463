//! Scene orchestration.
//!
//! The scene owns a set of feature processors and a set of render pipelines
//! and drives the per-frame two-phase cycle:
//!
//! | Phase | Work | Concurrency |
//! |-------|------|-------------|
//! | [`Scene::simulate`] | one simulate step per processor | serial or one job per processor |
//! | [`Scene::prepare_render`] | view setup, draw-packet collection, culling, draw-list finalize | jobs with completion barriers |
//! | [`Scene::on_frame_end`] | frame-end hooks | orchestrator thread |
//!
//! The orchestrator thread is the only writer of scene-level state; pipeline
//! and processor membership only changes outside an in-flight frame. Parallel
//! simulation is not awaited when `simulate` returns — the completion barrier
//! is stored and awaited lazily by the next `simulate` or `prepare_render`
//! call.
//!
//! The scene also owns the pipeline-state lookup: for every draw list tag it
//! keeps the minimal list of distinct pipeline-state variants declared by
//! raster passes across all pipelines, so passes sharing a tag and shape
//! share one entry (see [`Scene::rebuild_pipeline_states_lookup`]).

use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::culling::CullingScene;
use crate::error::SceneError;
use crate::feature::{
    FeatureProcessorHandle, FeatureProcessorId, FeatureProcessorRegistry, PrepareViewsPacket,
    SimulatePacket, TickTimeInfo,
};
use crate::jobs::{JobPolicy, JobScheduler};
use crate::pass::{
    MultisampleState, Pass, PipelineStateDescriptor, RenderAttachmentConfiguration,
};
use crate::pipeline::{PipelineViewTag, RenderPipelineId, RenderPipelinePtr};
use crate::srg::ShaderResourceGroup;
use crate::tags::{DrawFilterTagRegistry, DrawListMask, DrawListTag};
use crate::view::ViewPtr;

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(1);

/// Non-owning identifier of a scene.
///
/// Handed to processors, pipelines and the culling scene as a back-reference;
/// never used to extend the scene's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(u64);

impl SceneId {
    /// Allocates a fresh process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Configuration for creating a scene.
#[derive(Debug, Clone, Default)]
pub struct SceneDescriptor {
    /// Feature processors enabled at creation.
    pub feature_processor_ids: Vec<FeatureProcessorId>,
}

/// One distinct pipeline-state variant for a draw list tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStateData {
    /// Multisample state of the contributing pass output.
    pub multisample_state: MultisampleState,
    /// Attachment layout of the contributing pass output.
    pub attachment_configuration: RenderAttachmentConfiguration,
}

/// Ordered list of distinct pipeline-state variants for one tag.
pub type PipelineStateList = Vec<PipelineStateData>;

/// Observer of scene-level events.
///
/// Dispatch is synchronous and in registration order, with no delivery
/// guarantee beyond the handlers registered at the time of the event.
pub trait SceneNotification: Send {
    /// A render pipeline was added to the scene.
    fn on_render_pipeline_added(&mut self, _pipeline: &RenderPipelinePtr) {}

    /// A render pipeline was removed from the scene.
    fn on_render_pipeline_removed(&mut self, _pipeline: &RenderPipelinePtr) {}

    /// A persistent view binding changed on a pipeline.
    fn on_render_pipeline_persistent_view_changed(
        &mut self,
        _pipeline: &RenderPipelinePtr,
        _view_tag: &PipelineViewTag,
        _new_view: Option<&ViewPtr>,
        _previous_view: Option<&ViewPtr>,
    ) {
    }

    /// Frame preparation is starting.
    fn on_begin_prepare_render(&mut self) {}

    /// Frame preparation finished; draw lists are final.
    fn on_end_prepare_render(&mut self) {}
}

/// Consumer of per-frame dynamic draw data.
pub trait DynamicDraw: Send + Sync {
    /// Submits dynamic draw data for all views of the frame.
    fn submit_draw_data(&self, scene: SceneId, views: &[ViewPtr]);
}

/// Per-frame transient aggregate handed to feature processor render jobs.
///
/// Rebuilt on every [`Scene::prepare_render`] call; never persisted across
/// frames.
#[derive(Debug)]
pub struct RenderPacket {
    /// All views rendered this frame (persistent then transient).
    pub views: Vec<ViewPtr>,
    /// Bitwise OR of the draw list masks of all contributing views.
    pub draw_list_mask: DrawListMask,
    /// The scene's culling scene.
    pub culling_scene: Arc<CullingScene>,
    /// Concurrency policy for this frame.
    pub job_policy: JobPolicy,
}

/// Callback filling the scene shader resource group each frame.
pub type ShaderResourceGroupCallback = Box<dyn FnMut(&mut ShaderResourceGroup) + Send>;

struct FeatureProcessorEntry {
    id: FeatureProcessorId,
    concrete_type: TypeId,
    interface_type: Option<TypeId>,
    instance: FeatureProcessorHandle,
}

/// Owner and per-frame driver of feature processors and render pipelines.
pub struct Scene {
    id: SceneId,
    activated: bool,
    feature_processors: Vec<FeatureProcessorEntry>,
    pipelines: Vec<RenderPipelinePtr>,
    default_pipeline: Option<RenderPipelinePtr>,
    culling_scene: Arc<CullingScene>,
    render_packet: Option<Arc<RenderPacket>>,
    simulation_completion: Option<crate::jobs::JobCompletion>,
    pipeline_states_lookup: HashMap<DrawListTag, PipelineStateList>,
    draw_filter_tag_registry: DrawFilterTagRegistry,
    registry: Arc<FeatureProcessorRegistry>,
    scheduler: Arc<JobScheduler>,
    notification_handlers: Vec<Box<dyn SceneNotification>>,
    srg: Option<ShaderResourceGroup>,
    srg_callback: Option<ShaderResourceGroupCallback>,
    dynamic_draw: Option<Arc<dyn DynamicDraw>>,
}

impl Scene {
    /// Creates an empty scene.
    pub fn new(registry: Arc<FeatureProcessorRegistry>, scheduler: Arc<JobScheduler>) -> Self {
        Self {
            id: SceneId::next(),
            activated: false,
            feature_processors: Vec::new(),
            pipelines: Vec::new(),
            default_pipeline: None,
            culling_scene: Arc::new(CullingScene::new()),
            render_packet: None,
            simulation_completion: None,
            pipeline_states_lookup: HashMap::new(),
            draw_filter_tag_registry: DrawFilterTagRegistry::new(),
            registry,
            scheduler,
            notification_handlers: Vec::new(),
            srg: Some(ShaderResourceGroup::new("scene_srg")),
            srg_callback: None,
            dynamic_draw: None,
        }
    }

    /// Creates a scene and enables the processors listed in the descriptor.
    pub fn create(
        descriptor: &SceneDescriptor,
        registry: Arc<FeatureProcessorRegistry>,
        scheduler: Arc<JobScheduler>,
    ) -> Self {
        let mut scene = Self::new(registry, scheduler);
        for id in &descriptor.feature_processor_ids {
            scene.enable_feature_processor(id);
        }
        scene
    }

    /// Scene identity.
    pub fn id(&self) -> SceneId {
        self.id
    }

    /// Whether the scene is activated.
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// The scene's culling scene.
    pub fn culling_scene(&self) -> &Arc<CullingScene> {
        &self.culling_scene
    }

    /// The render packet of the last prepared frame, if any.
    pub fn render_packet(&self) -> Option<&Arc<RenderPacket>> {
        self.render_packet.as_ref()
    }

    /// The scene shader resource group.
    pub fn shader_resource_group(&self) -> Option<&ShaderResourceGroup> {
        self.srg.as_ref()
    }

    /// Sets the callback filling the scene shader resource group each frame.
    pub fn set_shader_resource_group_callback(
        &mut self,
        callback: impl FnMut(&mut ShaderResourceGroup) + Send + 'static,
    ) {
        self.srg_callback = Some(Box::new(callback));
    }

    /// Registers the dynamic draw consumer.
    pub fn set_dynamic_draw(&mut self, dynamic_draw: Arc<dyn DynamicDraw>) {
        self.dynamic_draw = Some(dynamic_draw);
    }

    /// Registers a notification handler.
    ///
    /// The handler is immediately replayed pipeline-added and persistent-view
    /// events for state that existed before it connected.
    pub fn add_notification_handler(&mut self, mut handler: Box<dyn SceneNotification>) {
        for pipeline in &self.pipelines {
            handler.on_render_pipeline_added(pipeline);
            for (tag, view) in pipeline.persistent_views() {
                handler.on_render_pipeline_persistent_view_changed(
                    pipeline,
                    &tag,
                    Some(&view),
                    None,
                );
            }
        }
        self.notification_handlers.push(handler);
    }

    // ---- activation ------------------------------------------------------

    /// Activates the scene: culling comes online, pending pass edits are
    /// flushed and every owned processor activates.
    ///
    /// # Panics (debug builds only)
    ///
    /// Panics if the scene is already activated.
    pub fn activate(&mut self) {
        debug_assert!(!self.activated, "scene is already activated");
        self.activated = true;

        self.culling_scene.activate(self.id);

        // Pass edits must land before processors activate: activation may
        // read pipeline state derived from the pass tree.
        self.flush_pass_changes();

        for entry in &self.feature_processors {
            entry.instance.write().activate();
        }
    }

    /// Deactivates the scene. Safe to call when not activated.
    pub fn deactivate(&mut self) {
        if !self.activated {
            return;
        }

        for entry in &self.feature_processors {
            entry.instance.write().deactivate();
        }

        self.culling_scene.deactivate();
        self.activated = false;
        self.pipeline_states_lookup.clear();
    }

    // ---- feature processors ----------------------------------------------

    /// Enables the feature processor registered under `id`.
    ///
    /// Returns the existing instance (with a warning) when the same type is
    /// already enabled, the conflicting instance (with an error report) when
    /// a different type implementing the same interface is enabled, and
    /// `None` when construction fails.
    pub fn enable_feature_processor(
        &mut self,
        id: &FeatureProcessorId,
    ) -> Option<FeatureProcessorHandle> {
        if let Some(existing) = self.feature_processor(id) {
            log::warn!(
                "Feature processor '{id}' is already enabled for this scene; will not re-enable"
            );
            return Some(existing);
        }

        // Two implementations of one interface would make interface lookup
        // ambiguous; refuse and hand back the incumbent.
        if let Some(interface_type) = self.registry.interface_type_id(id) {
            if let Some(existing) = self.feature_processor_by_type(interface_type) {
                log::error!(
                    "Feature processor '{id}' implements an interface already provided by \
                     another processor in this scene; only one implementation per interface \
                     is allowed"
                );
                return Some(existing);
            }
        }

        let Some(concrete_type) = self.registry.concrete_type_id(id) else {
            log::error!(
                "Feature processor '{id}' is not registered and cannot be enabled for this scene"
            );
            return None;
        };
        let instance = match self.registry.create(id) {
            Ok(instance) => instance,
            Err(err) => {
                log::error!("Feature processor '{id}' could not be created: {err}");
                return None;
            }
        };

        let handle: FeatureProcessorHandle = Arc::new(RwLock::new(instance));
        handle.write().on_attached(self.id);
        if self.activated {
            handle.write().activate();
        }

        self.feature_processors.push(FeatureProcessorEntry {
            id: id.clone(),
            concrete_type,
            interface_type: self.registry.interface_type_id(id),
            instance: handle.clone(),
        });

        Some(handle)
    }

    /// Enables every processor registered with the factory.
    pub fn enable_all_feature_processors(&mut self) {
        for id in self.registry.registered_ids() {
            self.enable_feature_processor(&id);
        }
    }

    /// Disables and removes the processor enabled under `id`.
    pub fn disable_feature_processor(&mut self, id: &FeatureProcessorId) {
        match self.feature_processors.iter().position(|e| e.id == *id) {
            Some(index) => {
                let entry = self.feature_processors.remove(index);
                if self.activated {
                    entry.instance.write().deactivate();
                }
                entry.instance.write().on_detached();
            }
            None => {
                log::warn!(
                    "Feature processor '{id}' is already disabled for this scene; \
                     will not re-disable"
                );
            }
        }
    }

    /// Disables and removes every enabled processor.
    pub fn disable_all_feature_processors(&mut self) {
        for entry in self.feature_processors.drain(..) {
            if self.activated {
                entry.instance.write().deactivate();
            }
            entry.instance.write().on_detached();
        }
    }

    /// The processor enabled under `id`, by concrete or interface type.
    pub fn feature_processor(&self, id: &FeatureProcessorId) -> Option<FeatureProcessorHandle> {
        let concrete = self.registry.concrete_type_id(id)?;
        self.feature_processor_by_type(concrete)
    }

    /// The processor matching a concrete or declared interface type id.
    pub fn feature_processor_by_type(&self, type_id: TypeId) -> Option<FeatureProcessorHandle> {
        self.feature_processors
            .iter()
            .find(|e| e.concrete_type == type_id || e.interface_type == Some(type_id))
            .map(|e| e.instance.clone())
    }

    /// Number of enabled feature processors.
    pub fn feature_processor_count(&self) -> usize {
        self.feature_processors.len()
    }

    // ---- render pipelines ------------------------------------------------

    /// Adds a render pipeline to the scene.
    ///
    /// The first pipeline added becomes the default. The pipeline-state
    /// lookup is rebuilt, so any previously cached pipeline-state indices
    /// must be re-resolved by their passes.
    ///
    /// # Panics (debug builds only)
    ///
    /// Panics if the pipeline already belongs to a scene or a pipeline with
    /// the same id is already added. Release builds report and return.
    pub fn add_render_pipeline(&mut self, pipeline: RenderPipelinePtr) {
        if pipeline.is_owned() {
            debug_assert!(false, "pipeline '{}' was added to another scene", pipeline.id());
            log::error!("Pipeline '{}' was added to another scene", pipeline.id());
            return;
        }
        if self.render_pipeline(pipeline.id()).is_some() {
            debug_assert!(
                false,
                "pipeline '{}' is already added to this scene",
                pipeline.id()
            );
            log::error!(
                "Pipeline with id '{}' is already added to this scene; use a different id",
                pipeline.id()
            );
            return;
        }

        let filter_tag = match self.draw_filter_tag_registry.acquire_tag(pipeline.id().as_str()) {
            Ok(tag) => tag,
            Err(err) => {
                log::error!("Cannot add pipeline '{}': {err}", pipeline.id());
                return;
            }
        };

        self.pipelines.push(pipeline.clone());
        if self.default_pipeline.is_none() {
            self.default_pipeline = Some(pipeline.clone());
        }

        pipeline.on_added_to_scene(self.id, filter_tag);
        self.flush_pass_changes();
        pipeline.build_pipeline_views();

        // Adding a pipeline can introduce new pipeline-state variants for
        // tags other pipelines already use.
        self.rebuild_pipeline_states_lookup();

        for handler in &mut self.notification_handlers {
            handler.on_render_pipeline_added(&pipeline);
        }
    }

    /// Removes the render pipeline with the given id.
    ///
    /// # Panics (debug builds only)
    ///
    /// Panics if no pipeline with that id is in the scene.
    pub fn remove_render_pipeline(&mut self, id: &RenderPipelineId) {
        let Some(index) = self.pipelines.iter().position(|p| p.id() == id) else {
            debug_assert!(false, "pipeline '{id}' is not added to this scene");
            log::warn!("Pipeline '{id}' is not added to this scene");
            return;
        };

        // Land pending edits before tearing the pass tree out of the scene.
        self.flush_pass_changes();

        let pipeline = self.pipelines.remove(index);
        if let Some(default) = &self.default_pipeline {
            if Arc::ptr_eq(default, &pipeline) {
                self.default_pipeline = None;
            }
        }

        if let Some(tag) = pipeline.draw_filter_tag() {
            self.draw_filter_tag_registry.release_tag(tag);
        }
        pipeline.on_removed_from_scene();

        for handler in &mut self.notification_handlers {
            handler.on_render_pipeline_removed(&pipeline);
        }

        // The removed pipeline may have been the default.
        if self.default_pipeline.is_none() {
            self.default_pipeline = self.pipelines.first().cloned();
        }

        self.flush_pass_changes();
        self.rebuild_pipeline_states_lookup();
    }

    /// The pipeline with the given id, if present.
    pub fn render_pipeline(&self, id: &RenderPipelineId) -> Option<RenderPipelinePtr> {
        self.pipelines.iter().find(|p| p.id() == id).cloned()
    }

    /// All pipelines in insertion order.
    pub fn render_pipelines(&self) -> &[RenderPipelinePtr] {
        &self.pipelines
    }

    /// The default pipeline, if any.
    pub fn default_render_pipeline(&self) -> Option<&RenderPipelinePtr> {
        self.default_pipeline.as_ref()
    }

    /// Makes the pipeline with the given id the default.
    ///
    /// Returns false when no such pipeline exists.
    pub fn set_default_render_pipeline(&mut self, id: &RenderPipelineId) -> bool {
        match self.render_pipeline(id) {
            Some(pipeline) => {
                self.default_pipeline = Some(pipeline);
                true
            }
            None => false,
        }
    }

    /// Binds a persistent view on a pipeline and broadcasts the change.
    pub fn set_persistent_view(
        &mut self,
        pipeline_id: &RenderPipelineId,
        view_tag: impl Into<PipelineViewTag>,
        view: ViewPtr,
    ) -> Result<(), SceneError> {
        let pipeline = self
            .render_pipeline(pipeline_id)
            .ok_or_else(|| SceneError::PipelineNotFound(pipeline_id.to_string()))?;
        let view_tag = view_tag.into();
        let previous = pipeline.set_persistent_view(view_tag.clone(), view.clone());
        for handler in &mut self.notification_handlers {
            handler.on_render_pipeline_persistent_view_changed(
                &pipeline,
                &view_tag,
                Some(&view),
                previous.as_ref(),
            );
        }
        Ok(())
    }

    /// Drains deferred pass edits on every pipeline.
    pub fn flush_pass_changes(&self) {
        for pipeline in &self.pipelines {
            pipeline.process_queued_changes();
        }
    }

    // ---- frame phases ----------------------------------------------------

    /// Runs the simulation phase.
    ///
    /// Awaits any outstanding simulation from a previous call first. With
    /// [`JobPolicy::Parallel`] one job per processor is dispatched and the
    /// call returns without blocking; completion is awaited lazily by the
    /// next `simulate` or [`prepare_render`](Self::prepare_render) call.
    pub fn simulate(&mut self, tick: TickTimeInfo, policy: JobPolicy) {
        self.wait_for_simulation();

        let packet = SimulatePacket { tick };
        match policy {
            JobPolicy::Serial => {
                for entry in &self.feature_processors {
                    entry.instance.write().simulate(&packet);
                }
            }
            JobPolicy::Parallel => {
                let completion = self.scheduler.create_completion();
                for entry in &self.feature_processors {
                    let instance = entry.instance.clone();
                    self.scheduler.dispatch_with(&completion, move || {
                        instance.write().simulate(&packet);
                    });
                }
                self.simulation_completion = Some(completion);
            }
        }
    }

    fn wait_for_simulation(&mut self) {
        if let Some(completion) = self.simulation_completion.take() {
            completion.wait();
        }
    }

    /// Runs the prepare-render phase and finalizes all draw lists.
    pub fn prepare_render(&mut self, tick: TickTimeInfo, policy: JobPolicy) {
        self.wait_for_simulation();

        for handler in &mut self.notification_handlers {
            handler.on_begin_prepare_render();
        }

        if let (Some(srg), Some(callback)) = (self.srg.as_mut(), self.srg_callback.as_mut()) {
            callback(srg);
            srg.compile();
        }

        // Active pipelines are the ones that need rendering this frame.
        let mut active_pipelines: Vec<RenderPipelinePtr> = Vec::new();
        for pipeline in &self.pipelines {
            if pipeline.needs_render() {
                active_pipelines.push(pipeline.clone());
                pipeline.on_start_frame(tick);
            }
        }

        if active_pipelines.is_empty() {
            for handler in &mut self.notification_handlers {
                handler.on_end_prepare_render();
            }
            return;
        }

        let mut views: Vec<ViewPtr> = Vec::new();
        let mut draw_list_mask = DrawListMask::default();

        // Merge persistent views across pipelines; a view rendered by several
        // pipelines gets the OR of their requested masks.
        let mut persistent: Vec<(ViewPtr, DrawListMask)> = Vec::new();
        for pipeline in &active_pipelines {
            pipeline.collect_persistent_views(&mut persistent);
        }
        for (view, mask) in persistent {
            view.set_draw_list_mask(mask);
            draw_list_mask |= mask;
            views.push(view);
        }

        // Transient views requested by processors attach to every active
        // pipeline under their declared tag.
        let prepare_packet = PrepareViewsPacket { tick };
        let mut transient: Vec<(PipelineViewTag, ViewPtr)> = Vec::new();
        for entry in &self.feature_processors {
            entry
                .instance
                .write()
                .prepare_views(&prepare_packet, &mut transient);
        }
        for (view_tag, view) in transient {
            draw_list_mask |= view.draw_list_mask();
            views.push(view.clone());
            for pipeline in &active_pipelines {
                pipeline.add_transient_view(view_tag.clone(), view.clone());
            }
        }

        let packet = Arc::new(RenderPacket {
            views,
            draw_list_mask,
            culling_scene: self.culling_scene.clone(),
            job_policy: policy,
        });
        self.render_packet = Some(packet.clone());

        // Draw-packet collection: processor render jobs and per-view culling
        // jobs run concurrently under one barrier.
        {
            let completion = self.scheduler.create_completion();
            for entry in &self.feature_processors {
                let instance = entry.instance.clone();
                let packet = packet.clone();
                self.scheduler.dispatch_with(&completion, move || {
                    instance.write().render(&packet);
                });
            }

            self.culling_scene.begin_culling(&packet.views);
            let parallel_traversal = self
                .culling_scene
                .debug_context()
                .parallel_traversal
                .load(Ordering::Relaxed);
            for view in &packet.views {
                if parallel_traversal {
                    let culling = self.culling_scene.clone();
                    let view = view.clone();
                    self.scheduler.dispatch_with(&completion, move || {
                        culling.process_cullables(&view);
                    });
                } else {
                    self.culling_scene.process_cullables(view);
                }
            }

            completion.wait();
            self.culling_scene.end_culling();

            if let Some(dynamic_draw) = &self.dynamic_draw {
                dynamic_draw.submit_draw_data(self.id, &packet.views);
            }
        }

        match policy {
            JobPolicy::Serial => {
                for view in &packet.views {
                    view.finalize_draw_lists();
                }
            }
            JobPolicy::Parallel => {
                let completion = self.scheduler.create_completion();
                for view in &packet.views {
                    let view = view.clone();
                    self.scheduler.dispatch_with(&completion, move || {
                        view.finalize_draw_lists();
                    });
                }
                completion.wait();
            }
        }

        for handler in &mut self.notification_handlers {
            handler.on_end_prepare_render();
        }
    }

    /// Frame-end hooks for active pipelines, then every processor.
    pub fn on_frame_end(&mut self) {
        for pipeline in &self.pipelines {
            if pipeline.needs_render() {
                pipeline.on_frame_end();
            }
        }
        for entry in &self.feature_processors {
            entry.instance.write().on_render_end();
        }
    }

    /// Compiles the shader resource group of every view in the last frame.
    pub fn update_srgs(&self) {
        if let Some(packet) = &self.render_packet {
            for view in &packet.views {
                view.update_srg();
            }
        }
    }

    // ---- pipeline state lookup -------------------------------------------

    /// Rebuilds the per-tag pipeline-state lists from scratch.
    ///
    /// Breadth-first over every pipeline's pass tree: raster leaves with a
    /// draw list tag contribute their {multisample state, attachment
    /// configuration} pair; structurally equal pairs share one entry and each
    /// pass caches the index of its entry. Called after any pipeline
    /// add/remove; cached indices are stale until then.
    pub fn rebuild_pipeline_states_lookup(&mut self) {
        self.pipeline_states_lookup.clear();

        let mut parents: VecDeque<Vec<usize>> = VecDeque::new();
        for pipeline in &self.pipelines {
            let mut root = pipeline.root_mut();
            parents.clear();
            parents.push_back(Vec::new());

            while let Some(path) = parents.pop_front() {
                let Some(parent) = root.parent_at_path_mut(&path) else {
                    continue;
                };
                for index in 0..parent.children().len() {
                    match &mut parent.children_mut()[index] {
                        Pass::Parent(_) => {
                            let mut child_path = path.clone();
                            child_path.push(index);
                            parents.push_back(child_path);
                        }
                        Pass::Raster(raster) => {
                            let Some(tag) = raster.draw_list_tag() else {
                                continue;
                            };
                            let state = PipelineStateData {
                                multisample_state: raster.multisample_state(),
                                attachment_configuration: raster.attachment_configuration().clone(),
                            };
                            let list = self.pipeline_states_lookup.entry(tag).or_default();
                            match list.iter().position(|existing| *existing == state) {
                                Some(existing) => {
                                    raster.set_pipeline_state_index(existing as u32);
                                }
                                None => {
                                    list.push(state);
                                    raster.set_pipeline_state_index((list.len() - 1) as u32);
                                }
                            }
                        }
                        // Tagged non-raster passes have no pipeline-state shape.
                        Pass::Compute(_) => {}
                    }
                }
            }
        }

        log::debug!(
            "Rebuilt pipeline states lookup: {} tags across {} pipelines",
            self.pipeline_states_lookup.len(),
            self.pipelines.len()
        );
    }

    /// Copies the pipeline state for `tag` into `out`.
    ///
    /// Returns false and leaves `out` untouched when the tag is unknown. When
    /// several variants exist for the tag the first one is chosen
    /// deterministically and the ambiguity is reported.
    pub fn configure_pipeline_state(
        &self,
        tag: DrawListTag,
        out: &mut PipelineStateDescriptor,
    ) -> bool {
        let Some(list) = self.pipeline_states_lookup.get(&tag) else {
            return false;
        };

        if list.len() != 1 {
            log::error!(
                "configure_pipeline_state called for a draw list tag with {} different \
                 pipeline states; using the first by default",
                list.len()
            );
        }

        out.attachment_configuration = list[0].attachment_configuration.clone();
        out.multisample_state = list[0].multisample_state;
        true
    }

    /// The distinct pipeline-state variants recorded for `tag`.
    pub fn pipeline_states(&self, tag: DrawListTag) -> &[PipelineStateData] {
        self.pipeline_states_lookup
            .get(&tag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any pass output exists for `tag`.
    pub fn has_output_for_pipeline_state(&self, tag: DrawListTag) -> bool {
        self.pipeline_states_lookup.contains_key(&tag)
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.wait_for_simulation();

        // Detach pipelines with a flush on both sides so queued edits never
        // outlive their tree.
        self.flush_pass_changes();
        for pipeline in std::mem::take(&mut self.pipelines) {
            if let Some(tag) = pipeline.draw_filter_tag() {
                self.draw_filter_tag_registry.release_tag(tag);
            }
            pipeline.on_removed_from_scene();
        }
        self.default_pipeline = None;

        self.deactivate();
    }
}
