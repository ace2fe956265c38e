//! The render tree produced by evaluation.

use std::fmt;

use glam::{Mat4, Vec3};

use super::shader::Expression;
use crate::graph::NodeId;

/// GPU resources consumed by a shader: texture samplers, coordinate
/// varyings and texture fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResourceUsage {
    pub buffers: usize,
    pub coords: usize,
    pub fetches: usize,
}

impl ResourceUsage {
    pub const fn new(buffers: usize, coords: usize, fetches: usize) -> Self {
        Self {
            buffers,
            coords,
            fetches,
        }
    }

    /// Sum every dimension.
    pub fn accumulate(&mut self, other: &ResourceUsage) {
        self.buffers += other.buffers;
        self.coords += other.coords;
        self.fetches += other.fetches;
    }

    /// Like `accumulate`, but fetches multiply: a filter samples its input
    /// once per tap.
    pub fn filter_accumulate(&mut self, other: &ResourceUsage) {
        self.buffers += other.buffers;
        self.coords += other.coords;
        self.fetches *= other.fetches;
    }

    pub fn set(&mut self, buffers: usize, coords: usize, fetches: usize) {
        *self = Self::new(buffers, coords, fetches);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn get(&self, dimension: Dimension) -> usize {
        match dimension {
            Dimension::Buffers => self.buffers,
            Dimension::Coords => self.coords,
            Dimension::Fetches => self.fetches,
        }
    }
}

/// One axis of `ResourceUsage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Buffers,
    Coords,
    Fetches,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderType {
    /// Children are composited with hardware blending.
    #[default]
    Blend,
    /// Children are merged into one shader.
    Merge,
    RecordOnly,
    Group,
    External,
    NoRender,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
    #[default]
    CurrentFrameBuffer,
    /// Off-screen target, rendered before the parent composites it.
    Intermediate,
    Temporary,
    Left,
    Right,
    Main,
    NoBuffer,
    OutputTexture,
    /// Written by a compute or CPU stage.
    DataBuffer,
}

impl Destination {
    /// Destinations that carry their own size.
    fn is_sized(self) -> bool {
        matches!(
            self,
            Self::Intermediate
                | Self::OutputTexture
                | Self::DataBuffer
                | Self::CurrentFrameBuffer
                | Self::Temporary
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Unspecified,
    Replace,
    Over,
    Add,
    Difference,
    ReverseDifference,
    Dissolve,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataType {
    #[default]
    None,
    Half,
    Float,
    UInt8,
    UInt16,
    UInt10A2,
    UInt10A2Rev,
}

/// Pixel source description. Pixels themselves never pass through here.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBufferInfo {
    pub width: usize,
    pub height: usize,
    pub planes: usize,
    /// The data window is smaller than the display window.
    pub cropped: bool,
}

impl FrameBufferInfo {
    pub fn new(width: usize, height: usize, planes: usize) -> Self {
        Self {
            width,
            height,
            planes,
            cropped: false,
        }
    }

    pub fn needs_uncrop(&self) -> bool {
        self.cropped
    }
}

/// An opaque paint stroke or annotation for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintCommand {
    pub name: String,
}

impl PaintCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A node of the render tree.
///
/// Built fresh by every evaluation and owned by whoever asked for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderImage {
    /// The node that produced this image.
    pub node: Option<NodeId>,
    pub render_type: RenderType,
    pub destination: Destination,
    pub blend_mode: BlendMode,
    pub data_type: DataType,
    pub width: usize,
    pub height: usize,
    pub pixel_aspect: f32,
    pub resource_usage: ResourceUsage,
    pub shader: Option<Expression>,
    pub merge: Option<Expression>,
    pub commands: Vec<PaintCommand>,
    pub frame_buffer: Option<FrameBufferInfo>,
    pub transform: Mat4,
    /// Never promote this image to an intermediate buffer.
    pub no_intermediate: bool,
    /// Set on placeholders.
    pub message: Option<String>,
    pub children: Vec<RenderImage>,
}

impl RenderImage {
    /// An empty blend composite.
    pub fn new(node: Option<NodeId>) -> Self {
        Self {
            node,
            render_type: RenderType::Blend,
            destination: Destination::CurrentFrameBuffer,
            blend_mode: BlendMode::Unspecified,
            data_type: DataType::None,
            width: 0,
            height: 0,
            pixel_aspect: 1.0,
            resource_usage: ResourceUsage::default(),
            shader: None,
            merge: None,
            commands: Vec::new(),
            frame_buffer: None,
            transform: Mat4::IDENTITY,
            no_intermediate: false,
            message: None,
            children: Vec::new(),
        }
    }

    /// A sized image rendering into `destination`.
    pub fn with_target(
        node: Option<NodeId>,
        render_type: RenderType,
        width: usize,
        height: usize,
        destination: Destination,
        data_type: DataType,
    ) -> Self {
        Self {
            render_type,
            width,
            height,
            destination,
            data_type,
            ..Self::new(node)
        }
    }

    /// A leaf image reading from a frame buffer.
    pub fn from_frame_buffer(node: Option<NodeId>, fb: FrameBufferInfo) -> Self {
        let mut image = Self {
            width: fb.width,
            height: fb.height,
            frame_buffer: Some(fb),
            ..Self::new(node)
        };
        image.record_resource_usage();
        image
    }

    /// Placeholder shown when a node has nothing to render.
    pub fn no_image(node: Option<NodeId>, message: impl Into<String>) -> Self {
        let mut image = Self::from_frame_buffer(node, FrameBufferInfo::new(1280, 720, 1));
        image.message = Some(message.into());
        image
    }

    pub fn is_no_image(&self) -> bool {
        self.message.is_some()
    }

    pub fn append_child(&mut self, child: RenderImage) {
        self.children.push(child);
    }

    /// This image and all of its descendants.
    pub fn image_count(&self) -> usize {
        1 + self.children.iter().map(Self::image_count).sum::<usize>()
    }

    pub fn display_width(&self) -> usize {
        if self.destination.is_sized() {
            self.width
        } else {
            self.children.first().map_or(720, Self::display_width)
        }
    }

    pub fn display_height(&self) -> usize {
        if self.destination.is_sized() {
            self.height
        } else {
            self.children.first().map_or(480, Self::display_height)
        }
    }

    pub fn display_aspect(&self) -> f32 {
        let height = self.display_height();
        if height == 0 {
            return 1.0;
        }
        self.display_width() as f32 / height as f32
    }

    /// Uniform scale shrinking this image to fit `aspect`. Identity when the
    /// image is already narrower.
    pub fn fit_to_aspect_matrix(&self, aspect: f32) -> Mat4 {
        let image_aspect = self.display_aspect();
        if image_aspect > aspect {
            let s = aspect / image_aspect;
            Mat4::from_scale(Vec3::new(s, s, 1.0))
        } else {
            Mat4::IDENTITY
        }
    }

    /// Apply the fit after the existing transform.
    pub fn fit_to_aspect(&mut self, aspect: f32) {
        self.transform = self.fit_to_aspect_matrix(aspect) * self.transform;
    }

    /// Derive `resource_usage` from the merge expression, the frame buffer,
    /// or the children of a blend composite, in that order.
    pub fn record_resource_usage(&mut self) {
        self.resource_usage = if let Some(merge) = &self.merge {
            merge.compute_resource_usage_recursive()
        } else if let Some(fb) = &self.frame_buffer {
            ResourceUsage::new(fb.planes, fb.planes, 1)
        } else if self.render_type == RenderType::Blend {
            let mut usage = ResourceUsage::default();
            for child in &self.children {
                usage.accumulate(&child.resource_usage);
            }
            usage
        } else {
            ResourceUsage::default()
        };
    }

    /// Whether any paint command sits below this image without an
    /// intermediate buffer in between.
    pub(crate) fn has_unbacked_paint(&self) -> bool {
        if !self.commands.is_empty() {
            return true;
        }
        self.destination != Destination::Intermediate
            && self.children.iter().any(Self::has_unbacked_paint)
    }
}

/// Sum of every image's usage.
pub fn accumulate(images: &[RenderImage]) -> ResourceUsage {
    let mut usage = ResourceUsage::default();
    for image in images {
        usage.accumulate(&image.resource_usage);
    }
    usage
}

/// Usage of a chain of filters: buffers and coordinates add, fetches
/// multiply.
pub fn filter_accumulate(images: &[RenderImage]) -> ResourceUsage {
    let mut usage = ResourceUsage::new(0, 0, 1);
    for image in images {
        usage.filter_accumulate(&image.resource_usage);
    }
    usage
}

/// Identifier tree used for cache fingerprints.
///
/// Children form a singly linked sibling chain: `children` points at the
/// first child, and each child points at the next through `next`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageId {
    pub node: Option<NodeId>,
    pub frame: i32,
    pub children: Option<Box<ImageId>>,
    pub next: Option<Box<ImageId>>,
}

impl ImageId {
    pub fn new(node: Option<NodeId>, frame: i32) -> Self {
        Self {
            node,
            frame,
            children: None,
            next: None,
        }
    }

    /// Link `children` into a sibling chain under a new parent.
    pub fn with_children(node: Option<NodeId>, frame: i32, children: Vec<ImageId>) -> Self {
        let head = children.into_iter().rev().fold(None, |next, mut child| {
            child.next = next;
            Some(Box::new(child))
        });
        Self {
            children: head,
            ..Self::new(node, frame)
        }
    }

    pub fn children(&self) -> Siblings<'_> {
        Siblings {
            current: self.children.as_deref(),
        }
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(node) => write!(f, "{}@{}", node.raw(), self.frame)?,
            None => write!(f, "_@{}", self.frame)?,
        }
        if self.children.is_some() {
            write!(f, "(")?;
            for (i, child) in self.children().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Iterator over a sibling chain.
pub struct Siblings<'a> {
    current: Option<&'a ImageId>,
}

impl<'a> Iterator for Siblings<'a> {
    type Item = &'a ImageId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = id.next.as_deref();
        Some(id)
    }
}
