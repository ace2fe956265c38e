//! Resource balancing and merge assembly.
//!
//! After a multi-input node evaluates its children it has to fold them into
//! one shader without exceeding the GPU budget. Children that would blow the
//! budget are pushed into intermediate buffers, where each one costs a single
//! sampler, coordinate and fetch. What is left is assembled into the list of
//! sub-expressions for the parent's merge shader.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::image::{
    BlendMode, DataType, Destination, Dimension, RenderImage, RenderType, ResourceUsage,
};
use super::shader::Expression;
use crate::config::ResourceLimits;
use crate::eval::Context;
use crate::graph::NodeId;

/// Positions of images rewritten by the balancer.
pub type ModifiedSet = BTreeSet<usize>;

/// Push images into intermediate buffers until `limits` hold.
///
/// Buffers are checked first, then coordinates, then fetches, re-accumulating
/// after every pass. The sampler budget is reduced by `incoming_samplers`
/// already used by the parent's own stage. Overruns are best-effort: when no
/// image is left to convert the remaining usage is returned as is.
pub fn balance_resource_usage(
    accumulate: fn(&[RenderImage]) -> ResourceUsage,
    images: &mut [RenderImage],
    modified: &mut ModifiedSet,
    limits: &ResourceLimits,
    incoming_samplers: usize,
) -> ResourceUsage {
    let passes = [
        (Dimension::Buffers, limits.max_buffers.saturating_sub(incoming_samplers)),
        (Dimension::Coords, limits.max_coords),
        (Dimension::Fetches, limits.max_fetches),
    ];

    let mut usage = accumulate(images);
    for (dimension, max) in passes {
        if assign_by_resource_count(dimension, &usage, images, modified, max) {
            usage = accumulate(images);
        }
        if usage.get(dimension) > max {
            warn!(?dimension, usage = usage.get(dimension), max, "resource budget exceeded");
        }
    }
    usage
}

fn assign_by_resource_count(
    dimension: Dimension,
    usage: &ResourceUsage,
    images: &mut [RenderImage],
    modified: &mut ModifiedSet,
    max: usize,
) -> bool {
    let mut current = usage.get(dimension);
    if current <= max {
        return false;
    }

    let mut order: Vec<usize> = (0..images.len()).collect();
    order.sort_by(|&a, &b| {
        let ua = images[a].resource_usage.get(dimension);
        let ub = images[b].resource_usage.get(dimension);
        ub.cmp(&ua)
    });

    let mut changed = false;
    for index in order {
        if current <= max {
            break;
        }

        let image = &mut images[index];
        let count = image.resource_usage.get(dimension);
        if count <= 1 || (image.merge.is_none() && image.shader.is_none()) {
            continue;
        }

        current -= count - 1;
        image.destination = Destination::Intermediate;
        image.resource_usage.set(1, 1, 1);
        modified.insert(index);
        changed = true;
        debug!(?dimension, index, count, "image moved to intermediate buffer");
    }
    changed
}

/// Whether `convert_blend_render_type_to_intermediate` would act on `image`.
pub fn will_convert_to_intermediate(image: &RenderImage) -> bool {
    image.render_type == RenderType::Blend
        && image.shader.is_none()
        && image.merge.is_none()
        && !image.children.is_empty()
        && !image.no_intermediate
}

/// Turn a blend composite into an intermediate render read back through a
/// color source.
pub fn convert_blend_render_type_to_intermediate(image: &mut RenderImage) -> bool {
    if !will_convert_to_intermediate(image) {
        return false;
    }

    let shader = Expression::source_from_color(image);
    image.resource_usage = shader.compute_resource_usage_recursive();
    image.shader = Some(shader);
    image.destination = Destination::Intermediate;
    true
}

/// Convert every eligible image, recording its position in `modified`.
/// Returns whether `modified` is non-empty afterwards.
pub fn convert_blend_render_types_to_intermediate(
    images: &mut [RenderImage],
    modified: &mut ModifiedSet,
) -> bool {
    for (index, image) in images.iter_mut().enumerate() {
        if convert_blend_render_type_to_intermediate(image) {
            modified.insert(index);
        }
    }
    !modified.is_empty()
}

/// An intermediate of the given size whose shader reads back its child.
fn intermediate_wrapper(
    node: Option<NodeId>,
    width: usize,
    height: usize,
    child: RenderImage,
) -> RenderImage {
    let mut wrapper = RenderImage::with_target(
        node,
        RenderType::Blend,
        width,
        height,
        Destination::Intermediate,
        DataType::Float,
    );
    wrapper.append_child(child);
    let shader = Expression::source_from_color(&wrapper);
    wrapper.resource_usage = shader.compute_resource_usage_recursive();
    wrapper.shader = Some(shader);
    wrapper
}

/// Collect the sub-expressions of `images` for a merge shader owned by
/// `node`, detaching each from its image.
///
/// Images with paint commands or a cropped frame buffer are first wrapped
/// in an intermediate of their own size. Images in `modified` contribute
/// their shader opaquely. A merge expression with a single source and no
/// filter absorbs the image's shader and the image renders straight into
/// the current frame buffer; any other merge expression keeps its image in
/// an intermediate buffer with replace blending.
pub fn assemble_merge_expressions(
    node: Option<NodeId>,
    images: &mut [RenderImage],
    modified: &ModifiedSet,
) -> Vec<Expression> {
    let mut expressions = Vec::with_capacity(images.len());

    for (index, slot) in images.iter_mut().enumerate() {
        let needs_wrapper = !slot.commands.is_empty()
            || slot.frame_buffer.as_ref().is_some_and(|fb| fb.needs_uncrop());
        if needs_wrapper {
            let (width, height) = (slot.width, slot.height);
            let child = std::mem::replace(slot, RenderImage::new(node));
            *slot = intermediate_wrapper(node, width, height, child);
        }

        let image = slot;

        if !needs_wrapper && modified.contains(&index) {
            expressions.extend(image.shader.take());
        } else if let Some(mut merge) = image.merge.take() {
            let fusable =
                merge.source_function_count(2) == 1 && merge.filter_function_count(1) == 0;
            if fusable {
                if let Some(shader) = image.shader.take() {
                    if let Err(shader) = merge.substitute_source(shader) {
                        expressions.push(shader);
                    }
                }
                expressions.push(merge);
                image.destination = Destination::CurrentFrameBuffer;
            } else {
                image.merge = Some(merge);
                expressions.extend(image.shader.take());
                image.destination = Destination::Intermediate;
                image.blend_mode = BlendMode::Replace;
            }
        } else if matches!(
            image.destination,
            Destination::Intermediate | Destination::DataBuffer
        ) {
            expressions.extend(image.shader.take());
        } else {
            expressions.extend(image.shader.take());
            image.destination = Destination::CurrentFrameBuffer;
        }
    }

    expressions
}

/// Make sure paint strokes always have a backing buffer to sample.
///
/// When a paint command sits below `root` with no intermediate ancestor,
/// the whole tree is wrapped in a viewport sized intermediate and fitted to
/// its aspect. A root that is already intermediate is returned unchanged.
/// A root without children is wrapped only when it carries paint commands
/// itself; a bare leaf root passes through.
pub fn insert_intermediate_renders_for_paint(
    node: Option<NodeId>,
    mut root: RenderImage,
    context: &Context,
) -> RenderImage {
    if root.destination == Destination::Intermediate {
        return root;
    }

    let needs_insert = if root.children.is_empty() {
        !root.commands.is_empty()
    } else {
        root.children.iter().any(RenderImage::has_unbacked_paint)
    };
    if !needs_insert {
        return root;
    }

    debug!("wrapping paint in viewport intermediate");
    let viewport = RenderImage::with_target(
        node,
        RenderType::Blend,
        context.view_width,
        context.view_height,
        Destination::Intermediate,
        DataType::Float,
    );
    root.fit_to_aspect(viewport.display_aspect());
    intermediate_wrapper(node, context.view_width, context.view_height, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::image::{accumulate, FrameBufferInfo, PaintCommand};

    fn shaded(buffers: usize) -> RenderImage {
        let mut image = RenderImage::new(None);
        image.shader = Some(Expression::source("s"));
        image.resource_usage = ResourceUsage::new(buffers, buffers, buffers);
        image
    }

    fn limits(buffers: usize) -> ResourceLimits {
        ResourceLimits {
            max_buffers: buffers,
            max_coords: 100,
            max_fetches: 100,
        }
    }

    #[test]
    fn balancer_converts_largest_first() {
        let mut images = vec![shaded(2), shaded(5), shaded(3)];
        let mut modified = ModifiedSet::new();

        let usage = balance_resource_usage(accumulate, &mut images, &mut modified, &limits(7), 0);

        assert_eq!(usage.buffers, 6);
        assert_eq!(modified, ModifiedSet::from([1]));
        assert_eq!(images[1].destination, Destination::Intermediate);
        assert_eq!(images[1].resource_usage, ResourceUsage::new(1, 1, 1));
        assert_eq!(images[0].destination, Destination::CurrentFrameBuffer);
    }

    #[test]
    fn incoming_samplers_shrink_the_budget() {
        let mut images = vec![shaded(3), shaded(3)];
        let mut modified = ModifiedSet::new();

        let usage = balance_resource_usage(accumulate, &mut images, &mut modified, &limits(6), 2);
        assert!(usage.buffers <= 4);
    }

    #[test]
    fn images_without_expressions_are_left_alone() {
        let mut plain = RenderImage::new(None);
        plain.resource_usage = ResourceUsage::new(9, 9, 9);
        let mut images = vec![plain];
        let mut modified = ModifiedSet::new();

        let usage = balance_resource_usage(accumulate, &mut images, &mut modified, &limits(4), 0);
        assert_eq!(usage.buffers, 9);
        assert!(modified.is_empty());
    }

    #[test]
    fn blend_composites_convert_once() {
        let mut composite = RenderImage::new(None);
        composite.append_child(RenderImage::new(None));
        let mut images = vec![composite, RenderImage::new(None)];
        let mut modified = ModifiedSet::new();

        assert!(convert_blend_render_types_to_intermediate(&mut images, &mut modified));
        assert_eq!(modified, ModifiedSet::from([0]));
        assert!(images[0].shader.is_some());
        assert!(!will_convert_to_intermediate(&images[0]));
    }

    #[test]
    fn single_source_merge_is_fused() {
        let mut image = RenderImage::new(None);
        image.destination = Destination::Intermediate;
        image.merge = Some(Expression::color("over", Expression::source("in")));
        image.shader = Some(Expression::color("cdl", Expression::source("plate")));
        let mut images = vec![image];

        let exprs = assemble_merge_expressions(None, &mut images, &ModifiedSet::new());

        assert_eq!(exprs.len(), 1);
        assert_eq!(exprs[0].arguments()[0].name(), "cdl");
        assert!(images[0].merge.is_none() && images[0].shader.is_none());
        assert_eq!(images[0].destination, Destination::CurrentFrameBuffer);
    }

    #[test]
    fn multi_source_merge_stays_intermediate() {
        let mut image = RenderImage::new(None);
        image.merge = Some(Expression::merge(
            "over",
            vec![Expression::source("a"), Expression::source("b")],
        ));
        image.shader = Some(Expression::source("s"));
        let mut images = vec![image];

        let exprs = assemble_merge_expressions(None, &mut images, &ModifiedSet::new());

        assert_eq!(exprs.len(), 1);
        assert_eq!(exprs[0].name(), "s");
        assert_eq!(images[0].destination, Destination::Intermediate);
        assert_eq!(images[0].blend_mode, BlendMode::Replace);
        assert!(images[0].merge.is_some());
    }

    #[test]
    fn painted_images_are_wrapped() {
        let mut painted =
            RenderImage::from_frame_buffer(None, FrameBufferInfo::new(320, 240, 1));
        painted.commands.push(PaintCommand::new("stroke"));
        let mut images = vec![painted];

        let exprs = assemble_merge_expressions(None, &mut images, &ModifiedSet::new());

        assert_eq!(exprs.len(), 1);
        assert_eq!(images[0].destination, Destination::Intermediate);
        assert_eq!(images[0].width, 320);
        assert_eq!(images[0].children.len(), 1);
        assert_eq!(images[0].children[0].commands.len(), 1);
    }

    #[test]
    fn paint_below_blend_root_gets_viewport_buffer() {
        let context = Context {
            frame: 1,
            view_width: 1920,
            view_height: 1080,
            fps: 24.0,
        };

        let mut stroke = RenderImage::new(None);
        stroke.commands.push(PaintCommand::new("stroke"));
        let mut root = RenderImage::new(None);
        root.append_child(stroke);

        let wrapped = insert_intermediate_renders_for_paint(None, root, &context);
        assert_eq!(wrapped.destination, Destination::Intermediate);
        assert_eq!((wrapped.width, wrapped.height), (1920, 1080));
        assert_eq!(wrapped.children.len(), 1);

        let clean = insert_intermediate_renders_for_paint(None, RenderImage::new(None), &context);
        assert_eq!(clean.destination, Destination::CurrentFrameBuffer);
        assert!(clean.children.is_empty());

        // A painted leaf root is wrapped as a whole
        let mut leaf = RenderImage::new(None);
        leaf.commands.push(PaintCommand::new("stroke"));
        let wrapped_leaf = insert_intermediate_renders_for_paint(None, leaf, &context);
        assert_eq!(wrapped_leaf.destination, Destination::Intermediate);
        assert_eq!(wrapped_leaf.children.len(), 1);
        assert_eq!(wrapped_leaf.children[0].commands.len(), 1);
    }
}
