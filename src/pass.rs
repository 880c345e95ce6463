//! Pass tree and pipeline-state value types.
//!
//! A render pipeline owns a tree of passes rooted at a [`ParentPass`].
//! Composite passes hold children; leaf passes describe one unit of GPU work.
//! Raster leaves carry the pipeline-state shape (multisample state plus
//! attachment configuration) that the scene deduplicates per draw list tag.
//!
//! Structural edits are deferred: callers queue [`PassEdit`]s and the scene
//! drains them at well-defined flush points, so concurrent pass-tree readers
//! never observe a half-edited tree.

use crate::error::SceneError;
use crate::pipeline::PipelineViewTag;
use crate::tags::DrawListTag;

/// Attachment texture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// 8-bit RGBA, unsigned normalized.
    Rgba8Unorm,
    /// 8-bit BGRA, unsigned normalized.
    Bgra8Unorm,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// Packed 11/11/10 float RGB.
    Rg11B10Float,
    /// 32-bit float depth.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24UnormStencil8,
}

/// Multisample configuration of a raster pass output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultisampleState {
    /// Sample count per pixel.
    pub samples: u16,
    /// Vendor-specific quality level.
    pub quality: u16,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: 1,
            quality: 0,
        }
    }
}

/// Attachment layout a raster pass renders into.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderAttachmentConfiguration {
    /// Color attachment formats in slot order.
    pub color_formats: Vec<Format>,
    /// Depth/stencil attachment format, if any.
    pub depth_stencil_format: Option<Format>,
}

impl RenderAttachmentConfiguration {
    /// Configuration with the given color formats and no depth attachment.
    pub fn color(color_formats: Vec<Format>) -> Self {
        Self {
            color_formats,
            depth_stencil_format: None,
        }
    }

    /// Adds a depth/stencil attachment.
    pub fn with_depth_stencil(mut self, format: Format) -> Self {
        self.depth_stencil_format = Some(format);
        self
    }
}

/// GPU-facing configuration required to draw into a draw list tag's output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineStateDescriptor {
    /// Multisample state of the target.
    pub multisample_state: MultisampleState,
    /// Attachment layout of the target.
    pub attachment_configuration: RenderAttachmentConfiguration,
}

/// A pass in a pipeline's pass tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pass {
    /// Composite pass owning child passes.
    Parent(ParentPass),
    /// Raster pass (draws into attachments, carries pipeline-state shape).
    Raster(RasterPass),
    /// Compute pass (no pipeline-state shape).
    Compute(ComputePass),
}

impl Pass {
    /// Get the pass name.
    pub fn name(&self) -> &str {
        match self {
            Pass::Parent(p) => p.name(),
            Pass::Raster(p) => p.name(),
            Pass::Compute(p) => p.name(),
        }
    }

    /// Get this pass as a composite pass, if it is one.
    pub fn as_parent(&self) -> Option<&ParentPass> {
        if let Pass::Parent(p) = self {
            Some(p)
        } else {
            None
        }
    }

    /// Get this pass as a mutable composite pass, if it is one.
    pub fn as_parent_mut(&mut self) -> Option<&mut ParentPass> {
        if let Pass::Parent(p) = self {
            Some(p)
        } else {
            None
        }
    }

    /// Get this pass as a raster pass, if it is one.
    pub fn as_raster(&self) -> Option<&RasterPass> {
        if let Pass::Raster(p) = self {
            Some(p)
        } else {
            None
        }
    }

    /// Get this pass as a mutable raster pass, if it is one.
    pub fn as_raster_mut(&mut self) -> Option<&mut RasterPass> {
        if let Pass::Raster(p) = self {
            Some(p)
        } else {
            None
        }
    }

    /// Check if this is a composite pass.
    pub fn is_parent(&self) -> bool {
        matches!(self, Pass::Parent(_))
    }

    /// Draw list tag declared by this pass, if any.
    pub fn draw_list_tag(&self) -> Option<DrawListTag> {
        match self {
            Pass::Parent(_) => None,
            Pass::Raster(p) => p.draw_list_tag(),
            Pass::Compute(p) => p.draw_list_tag(),
        }
    }

    /// Whether this pass declares a draw list tag.
    pub fn has_draw_list_tag(&self) -> bool {
        self.draw_list_tag().is_some()
    }
}

/// Composite pass owning an ordered list of children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParentPass {
    name: String,
    children: Vec<Pass>,
}

impl ParentPass {
    /// Creates an empty composite pass.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Get the pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Child passes in declaration order.
    pub fn children(&self) -> &[Pass] {
        &self.children
    }

    /// Mutable child passes.
    pub fn children_mut(&mut self) -> &mut [Pass] {
        &mut self.children
    }

    /// Appends a child pass.
    pub fn add_child(&mut self, pass: Pass) {
        self.children.push(pass);
    }

    /// Removes the child at `index`, or `None` when out of range.
    pub fn remove_child(&mut self, index: usize) -> Option<Pass> {
        if index < self.children.len() {
            Some(self.children.remove(index))
        } else {
            None
        }
    }

    /// Navigates to the composite pass at `path` (child indices from here).
    ///
    /// The empty path resolves to `self`. Returns `None` when an index is out
    /// of range or the node on the path is not composite.
    pub fn parent_at_path_mut(&mut self, path: &[usize]) -> Option<&mut ParentPass> {
        let mut current = self;
        for &index in path {
            current = current.children.get_mut(index)?.as_parent_mut()?;
        }
        Some(current)
    }

    /// Immutable variant of [`parent_at_path_mut`](Self::parent_at_path_mut).
    pub fn parent_at_path(&self, path: &[usize]) -> Option<&ParentPass> {
        let mut current = self;
        for &index in path {
            current = current.children.get(index)?.as_parent()?;
        }
        Some(current)
    }

    /// Applies one deferred structural edit to this tree.
    pub fn apply_edit(&mut self, edit: PassEdit) -> Result<(), SceneError> {
        match edit {
            PassEdit::AddChild { parent, pass } => {
                let target = self.parent_at_path_mut(&parent).ok_or_else(|| {
                    SceneError::InvalidPassPath(format!("{parent:?} does not name a composite pass"))
                })?;
                target.add_child(pass);
                Ok(())
            }
            PassEdit::RemoveChild { parent, index } => {
                let target = self.parent_at_path_mut(&parent).ok_or_else(|| {
                    SceneError::InvalidPassPath(format!("{parent:?} does not name a composite pass"))
                })?;
                target.remove_child(index).map(|_| ()).ok_or_else(|| {
                    SceneError::InvalidPassPath(format!(
                        "child index {index} out of range under {parent:?}"
                    ))
                })
            }
        }
    }
}

/// Raster pass leaf.
///
/// Raster passes carry the pipeline-state shape for their draw list tag and
/// cache the index assigned by the scene's lookup rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPass {
    name: String,
    draw_list_tag: Option<DrawListTag>,
    pipeline_view_tag: Option<PipelineViewTag>,
    multisample_state: MultisampleState,
    attachment_configuration: RenderAttachmentConfiguration,
    pipeline_state_index: Option<u32>,
}

impl RasterPass {
    /// Creates a raster pass with default pipeline state and no tags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            draw_list_tag: None,
            pipeline_view_tag: None,
            multisample_state: MultisampleState::default(),
            attachment_configuration: RenderAttachmentConfiguration::default(),
            pipeline_state_index: None,
        }
    }

    /// Sets the draw list tag this pass drains.
    pub fn with_draw_list_tag(mut self, tag: DrawListTag) -> Self {
        self.draw_list_tag = Some(tag);
        self
    }

    /// Sets the pipeline view this pass renders from.
    pub fn with_view_tag(mut self, tag: PipelineViewTag) -> Self {
        self.pipeline_view_tag = Some(tag);
        self
    }

    /// Sets the multisample state.
    pub fn with_multisample_state(mut self, state: MultisampleState) -> Self {
        self.multisample_state = state;
        self
    }

    /// Sets the attachment configuration.
    pub fn with_attachment_configuration(mut self, config: RenderAttachmentConfiguration) -> Self {
        self.attachment_configuration = config;
        self
    }

    /// Get the pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Draw list tag this pass drains, if any.
    pub fn draw_list_tag(&self) -> Option<DrawListTag> {
        self.draw_list_tag
    }

    /// Pipeline view this pass renders from, if any.
    pub fn pipeline_view_tag(&self) -> Option<&PipelineViewTag> {
        self.pipeline_view_tag.as_ref()
    }

    /// Multisample state of this pass's output.
    pub fn multisample_state(&self) -> MultisampleState {
        self.multisample_state
    }

    /// Attachment configuration of this pass's output.
    pub fn attachment_configuration(&self) -> &RenderAttachmentConfiguration {
        &self.attachment_configuration
    }

    /// Index into the scene's per-tag pipeline state list, assigned on rebuild.
    ///
    /// Stale after any pipeline add/remove until the next rebuild resolves it.
    pub fn pipeline_state_index(&self) -> Option<u32> {
        self.pipeline_state_index
    }

    /// Records the deduplicated pipeline state index for this pass.
    pub fn set_pipeline_state_index(&mut self, index: u32) {
        self.pipeline_state_index = Some(index);
    }
}

/// Compute pass leaf.
///
/// May carry a draw list tag but has no pipeline-state shape, so the lookup
/// rebuild skips it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePass {
    name: String,
    draw_list_tag: Option<DrawListTag>,
}

impl ComputePass {
    /// Creates a compute pass with no tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            draw_list_tag: None,
        }
    }

    /// Sets the draw list tag this pass consumes.
    pub fn with_draw_list_tag(mut self, tag: DrawListTag) -> Self {
        self.draw_list_tag = Some(tag);
        self
    }

    /// Get the pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Draw list tag this pass consumes, if any.
    pub fn draw_list_tag(&self) -> Option<DrawListTag> {
        self.draw_list_tag
    }
}

/// Deferred structural edit to a pass tree.
///
/// Paths are child-index chains from the root and are resolved when the edit
/// is applied, not when it is queued.
#[derive(Debug, Clone)]
pub enum PassEdit {
    /// Append `pass` under the composite pass at `parent`.
    AddChild {
        /// Path to the target composite pass.
        parent: Vec<usize>,
        /// The pass to append.
        pass: Pass,
    },
    /// Remove the child at `index` under the composite pass at `parent`.
    RemoveChild {
        /// Path to the target composite pass.
        parent: Vec<usize>,
        /// Child index to remove.
        index: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::DrawListTagRegistry;

    fn tag(registry: &DrawListTagRegistry, name: &str) -> DrawListTag {
        registry.acquire_tag(name).unwrap()
    }

    #[test]
    fn path_navigation() {
        let mut root = ParentPass::new("root");
        let mut inner = ParentPass::new("inner");
        inner.add_child(Pass::Raster(RasterPass::new("leaf")));
        root.add_child(Pass::Parent(inner));
        root.add_child(Pass::Compute(ComputePass::new("sim")));

        assert_eq!(root.parent_at_path(&[]).unwrap().name(), "root");
        assert_eq!(root.parent_at_path(&[0]).unwrap().name(), "inner");
        // A leaf is not a composite pass.
        assert!(root.parent_at_path(&[1]).is_none());
        assert!(root.parent_at_path(&[5]).is_none());
    }

    #[test]
    fn apply_add_and_remove_edits() {
        let mut root = ParentPass::new("root");
        root.add_child(Pass::Parent(ParentPass::new("inner")));

        root.apply_edit(PassEdit::AddChild {
            parent: vec![0],
            pass: Pass::Raster(RasterPass::new("leaf")),
        })
        .unwrap();
        assert_eq!(root.parent_at_path(&[0]).unwrap().children().len(), 1);

        root.apply_edit(PassEdit::RemoveChild {
            parent: vec![0],
            index: 0,
        })
        .unwrap();
        assert!(root.parent_at_path(&[0]).unwrap().children().is_empty());
    }

    #[test]
    fn invalid_edit_paths_are_errors() {
        let mut root = ParentPass::new("root");

        let err = root
            .apply_edit(PassEdit::AddChild {
                parent: vec![3],
                pass: Pass::Compute(ComputePass::new("x")),
            })
            .unwrap_err();
        assert!(matches!(err, SceneError::InvalidPassPath(_)));

        let err = root
            .apply_edit(PassEdit::RemoveChild {
                parent: vec![],
                index: 0,
            })
            .unwrap_err();
        assert!(matches!(err, SceneError::InvalidPassPath(_)));
    }

    #[test]
    fn pipeline_state_structural_equality() {
        let registry = DrawListTagRegistry::new();
        let opaque = tag(&registry, "opaque");

        let a = RasterPass::new("a")
            .with_draw_list_tag(opaque)
            .with_multisample_state(MultisampleState {
                samples: 4,
                quality: 0,
            })
            .with_attachment_configuration(
                RenderAttachmentConfiguration::color(vec![Format::Rgba16Float])
                    .with_depth_stencil(Format::Depth32Float),
            );
        let b = a.clone();

        assert_eq!(a.multisample_state(), b.multisample_state());
        assert_eq!(a.attachment_configuration(), b.attachment_configuration());

        let c = b.with_multisample_state(MultisampleState {
            samples: 8,
            quality: 0,
        });
        assert_ne!(a.multisample_state(), c.multisample_state());
    }

    #[test]
    fn compute_pass_has_tag_but_no_state_shape() {
        let registry = DrawListTagRegistry::new();
        let sim = tag(&registry, "sim");
        let pass = Pass::Compute(ComputePass::new("particles").with_draw_list_tag(sim));

        assert!(pass.has_draw_list_tag());
        assert!(pass.as_raster().is_none());
    }
}
