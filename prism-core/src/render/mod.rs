//! Render Tree
//!
//! Evaluation produces a `RenderImage` tree describing how to draw a frame:
//! where each image renders, how much GPU resource its shader needs, which
//! expressions and paint commands it carries. No pixels are touched here;
//! the finished tree is handed to an external renderer.
//!
//! - `image`: the tree, resource usage and identifier chains
//! - `shader`: the expression collaborator used to build merge shaders
//! - `balance`: the resource balancer and merge assembler

pub mod balance;
pub mod image;
pub mod shader;

pub use balance::{
    assemble_merge_expressions, balance_resource_usage, convert_blend_render_type_to_intermediate,
    convert_blend_render_types_to_intermediate, insert_intermediate_renders_for_paint,
    will_convert_to_intermediate, ModifiedSet,
};
pub use image::{
    accumulate, filter_accumulate, BlendMode, DataType, Destination, Dimension, FrameBufferInfo,
    ImageId, PaintCommand, RenderImage, RenderType, ResourceUsage,
};
pub use shader::{Expression, FunctionKind};
