//! Feature processors and their factory.
//!
//! A feature processor is a pluggable unit implementing one rendering or
//! simulation concern (lighting, meshes, particles, ...). Processors are
//! owned by a scene, created through the [`FeatureProcessorRegistry`] and
//! driven through the two-phase simulate / prepare-render cycle.
//!
//! A scene holds at most one processor per concrete type and per declared
//! interface type; the registry records both type ids so the scene can
//! enforce this when a processor is enabled.

use std::any::TypeId;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::SceneError;
use crate::pipeline::PipelineViewTag;
use crate::scene::{RenderPacket, SceneId};
use crate::view::ViewPtr;

/// Wall-clock information for one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickTimeInfo {
    /// Seconds since the game started.
    pub game_time_sec: f64,
    /// Seconds since the previous tick.
    pub delta_time_sec: f32,
}

/// Input to the simulation phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatePacket {
    /// Tick timing for this frame.
    pub tick: TickTimeInfo,
}

/// Input to the view preparation step.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareViewsPacket {
    /// Tick timing for this frame.
    pub tick: TickTimeInfo,
}

/// A pluggable unit owning domain-specific simulation and render logic.
///
/// All methods have empty defaults; processors implement the phases they
/// participate in. `simulate` and `render` run concurrently with the same
/// phase of other processors and must only touch processor-private or
/// packet-scoped state.
pub trait FeatureProcessor: Send + Sync + 'static {
    /// Called when the owning scene activates (or when the processor is
    /// enabled on an already-active scene).
    fn activate(&mut self) {}

    /// Called when the owning scene deactivates or the processor is disabled.
    fn deactivate(&mut self) {}

    /// Called when the processor is attached to a scene. The id is a
    /// non-owning back-reference; the scene outlives the processor.
    fn on_attached(&mut self, _scene: SceneId) {}

    /// Called when the processor is detached from its scene.
    fn on_detached(&mut self) {}

    /// Simulation step. May run on a worker thread.
    fn simulate(&mut self, _packet: &SimulatePacket) {}

    /// Requests transient views for this frame.
    fn prepare_views(
        &mut self,
        _packet: &PrepareViewsPacket,
        _out: &mut Vec<(PipelineViewTag, ViewPtr)>,
    ) {
    }

    /// Draw-packet collection step. Runs concurrently with culling.
    fn render(&mut self, _packet: &RenderPacket) {}

    /// Called after the frame's draw lists have been consumed.
    fn on_render_end(&mut self) {}
}

/// Shared handle to an enabled feature processor.
///
/// Shared so parallel simulate/render jobs can own their target while the
/// scene keeps the authoritative list.
pub type FeatureProcessorHandle = Arc<RwLock<Box<dyn FeatureProcessor>>>;

/// Identifier a feature processor type is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureProcessorId(String);

impl FeatureProcessorId {
    /// Creates an id from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeatureProcessorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureProcessorId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

type Constructor = Box<dyn Fn() -> Box<dyn FeatureProcessor> + Send + Sync>;

struct FeatureProcessorDescriptor {
    id: FeatureProcessorId,
    concrete_type: TypeId,
    interface_type: Option<TypeId>,
    constructor: Constructor,
}

/// Factory creating feature processors by identifier.
///
/// Registration records the concrete type id and, optionally, the id of the
/// interface trait the processor implements. The scene uses the interface id
/// to reject two different implementations of the same interface.
#[derive(Default)]
pub struct FeatureProcessorRegistry {
    descriptors: Mutex<Vec<FeatureProcessorDescriptor>>,
}

impl FeatureProcessorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor type with no declared interface.
    pub fn register<T: FeatureProcessor>(
        &self,
        id: impl Into<FeatureProcessorId>,
        constructor: impl Fn() -> T + Send + Sync + 'static,
    ) {
        self.register_inner::<T>(id.into(), None, constructor);
    }

    /// Registers a processor type implementing the interface `I`.
    ///
    /// `I` is typically a trait object type (`dyn SomeInterface`).
    pub fn register_with_interface<T: FeatureProcessor, I: ?Sized + 'static>(
        &self,
        id: impl Into<FeatureProcessorId>,
        constructor: impl Fn() -> T + Send + Sync + 'static,
    ) {
        self.register_inner::<T>(id.into(), Some(TypeId::of::<I>()), constructor);
    }

    fn register_inner<T: FeatureProcessor>(
        &self,
        id: FeatureProcessorId,
        interface_type: Option<TypeId>,
        constructor: impl Fn() -> T + Send + Sync + 'static,
    ) {
        let mut descriptors = self.descriptors.lock();
        if descriptors.iter().any(|d| d.id == id) {
            log::warn!("Feature processor '{id}' is already registered; ignoring");
            return;
        }
        descriptors.push(FeatureProcessorDescriptor {
            id,
            concrete_type: TypeId::of::<T>(),
            interface_type,
            constructor: Box::new(move || Box::new(constructor())),
        });
    }

    /// Creates a new instance of the processor registered under `id`.
    pub fn create(&self, id: &FeatureProcessorId) -> Result<Box<dyn FeatureProcessor>, SceneError> {
        let descriptors = self.descriptors.lock();
        descriptors
            .iter()
            .find(|d| d.id == *id)
            .map(|d| (d.constructor)())
            .ok_or_else(|| SceneError::FeatureProcessorNotRegistered(id.to_string()))
    }

    /// Concrete type id registered under `id`.
    pub fn concrete_type_id(&self, id: &FeatureProcessorId) -> Option<TypeId> {
        let descriptors = self.descriptors.lock();
        descriptors
            .iter()
            .find(|d| d.id == *id)
            .map(|d| d.concrete_type)
    }

    /// Declared interface type id registered under `id`, if any.
    pub fn interface_type_id(&self, id: &FeatureProcessorId) -> Option<TypeId> {
        let descriptors = self.descriptors.lock();
        descriptors
            .iter()
            .find(|d| d.id == *id)
            .and_then(|d| d.interface_type)
    }

    /// All registered ids in registration order.
    pub fn registered_ids(&self) -> Vec<FeatureProcessorId> {
        self.descriptors.lock().iter().map(|d| d.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MeshProcessor;
    impl FeatureProcessor for MeshProcessor {}

    #[derive(Default)]
    struct LightProcessor;
    impl FeatureProcessor for LightProcessor {}

    trait LightingInterface {}
    impl LightingInterface for LightProcessor {}

    #[test]
    fn create_registered_processor() {
        let registry = FeatureProcessorRegistry::new();
        registry.register("Mesh", MeshProcessor::default);

        let id = FeatureProcessorId::new("Mesh");
        assert!(registry.create(&id).is_ok());
        assert_eq!(
            registry.concrete_type_id(&id),
            Some(TypeId::of::<MeshProcessor>())
        );
        assert!(registry.interface_type_id(&id).is_none());
    }

    #[test]
    fn create_unregistered_is_an_error() {
        let registry = FeatureProcessorRegistry::new();
        let err = match registry.create(&"Missing".into()) {
            Ok(_) => panic!("expected an error"),
            Err(err) => err,
        };
        assert_eq!(
            err,
            SceneError::FeatureProcessorNotRegistered("Missing".to_string())
        );
    }

    #[test]
    fn interface_type_is_recorded() {
        let registry = FeatureProcessorRegistry::new();
        registry.register_with_interface::<LightProcessor, dyn LightingInterface>(
            "Light",
            LightProcessor::default,
        );

        assert_eq!(
            registry.interface_type_id(&"Light".into()),
            Some(TypeId::of::<dyn LightingInterface>())
        );
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let registry = FeatureProcessorRegistry::new();
        registry.register("Mesh", MeshProcessor::default);
        registry.register("Mesh", MeshProcessor::default);
        assert_eq!(registry.registered_ids().len(), 1);
    }

    #[test]
    fn registered_ids_keep_registration_order() {
        let registry = FeatureProcessorRegistry::new();
        registry.register("Mesh", MeshProcessor::default);
        registry.register("Light", LightProcessor::default);
        let ids = registry.registered_ids();
        assert_eq!(ids, vec!["Mesh".into(), "Light".into()]);
    }
}
