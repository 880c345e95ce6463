//! Render scene orchestration: feature processors, job-based frame phases and
//! pipeline state deduplication.
//!
//! A [`Scene`] owns pluggable [`FeatureProcessor`]s and a set of
//! [`RenderPipeline`]s and drives them through a two-phase frame cycle:
//! simulation, then render preparation with culling and draw list
//! finalization.
//!
//! # Features
//! - Feature processor registry with per-type and per-interface uniqueness
//! - Simulate / prepare-render phases, serial or on a worker pool with
//!   completion barriers
//! - Persistent and transient views with per-frame draw list masks
//! - Frustum culling feeding per-view, per-tag sorted draw lists
//! - Pass trees with deferred structural edits
//! - Per-draw-list-tag pipeline state deduplication across pipelines

pub mod culling;
pub mod error;
pub mod feature;
pub mod jobs;
pub mod pass;
pub mod pipeline;
pub mod scene;
pub mod srg;
pub mod tags;
pub mod view;

pub use culling::{BoundingSphere, Cullable, CullingDebugContext, CullingScene};
pub use error::SceneError;
pub use feature::{
    FeatureProcessor, FeatureProcessorHandle, FeatureProcessorId, FeatureProcessorRegistry,
    PrepareViewsPacket, SimulatePacket, TickTimeInfo,
};
pub use jobs::{JobCompletion, JobPolicy, JobScheduler};
pub use pass::{
    ComputePass, Format, MultisampleState, ParentPass, Pass, PassEdit, PipelineStateDescriptor,
    RasterPass, RenderAttachmentConfiguration,
};
pub use pipeline::{
    PipelineViewTag, PipelineViews, RenderMode, RenderPipeline, RenderPipelineId,
    RenderPipelinePtr,
};
pub use scene::{
    DynamicDraw, PipelineStateData, PipelineStateList, RenderPacket, Scene, SceneDescriptor,
    SceneId, SceneNotification,
};
pub use srg::ShaderResourceGroup;
pub use tags::{DrawFilterTag, DrawListMask, DrawListTag, DrawListTagRegistry};
pub use view::{DrawItem, Frustum, Plane, View, ViewPtr, ViewUsageFlags};
