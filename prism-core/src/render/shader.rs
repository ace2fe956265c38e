//! Shader expressions attached to render images.
//!
//! Only construction and inspection live here. Code generation belongs to
//! the renderer.

use super::image::{RenderImage, ResourceUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Reads an image.
    Source,
    /// Samples its input more than once.
    Filter,
    /// Combines several inputs.
    Merge,
    /// Per-pixel color operation.
    Color,
}

/// A function applied to bound argument expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    name: String,
    kind: FunctionKind,
    usage: ResourceUsage,
    arguments: Vec<Expression>,
}

impl Expression {
    pub fn new(
        name: impl Into<String>,
        kind: FunctionKind,
        usage: ResourceUsage,
        arguments: Vec<Expression>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            usage,
            arguments,
        }
    }

    /// A source reading one image: one sampler, one coordinate, one fetch.
    pub fn source(name: impl Into<String>) -> Self {
        Self::new(name, FunctionKind::Source, ResourceUsage::new(1, 1, 1), Vec::new())
    }

    /// A source sampling the rendered color of `image`.
    pub fn source_from_color(image: &RenderImage) -> Self {
        let name = match image.node {
            Some(node) => format!("sourceRGBA_{}", node.raw()),
            None => "sourceRGBA".to_string(),
        };
        Self::source(name)
    }

    pub fn filter(name: impl Into<String>, taps: usize, input: Expression) -> Self {
        Self::new(
            name,
            FunctionKind::Filter,
            ResourceUsage::new(0, 0, taps),
            vec![input],
        )
    }

    pub fn color(name: impl Into<String>, input: Expression) -> Self {
        Self::new(name, FunctionKind::Color, ResourceUsage::default(), vec![input])
    }

    pub fn merge(name: impl Into<String>, inputs: Vec<Expression>) -> Self {
        Self::new(name, FunctionKind::Merge, ResourceUsage::default(), inputs)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn arguments(&self) -> &[Expression] {
        &self.arguments
    }

    /// Usage of the whole expression. Filters multiply the fetches of their
    /// arguments; everything else sums them.
    pub fn compute_resource_usage_recursive(&self) -> ResourceUsage {
        let mut usage = self.usage;
        for argument in &self.arguments {
            let u = argument.compute_resource_usage_recursive();
            usage.buffers += u.buffers;
            usage.coords += u.coords;
            if self.kind == FunctionKind::Filter {
                usage.fetches *= u.fetches;
            } else {
                usage.fetches += u.fetches;
            }
        }
        usage
    }

    /// Number of source functions, counting stops at `limit`.
    pub fn source_function_count(&self, limit: usize) -> usize {
        self.count_kind(FunctionKind::Source, limit)
    }

    /// Number of filter functions, counting stops at `limit`.
    pub fn filter_function_count(&self, limit: usize) -> usize {
        self.count_kind(FunctionKind::Filter, limit)
    }

    fn count_kind(&self, kind: FunctionKind, limit: usize) -> usize {
        let mut count = usize::from(self.kind == kind);
        for argument in &self.arguments {
            if count >= limit {
                break;
            }
            count += argument.count_kind(kind, limit - count);
        }
        count.min(limit)
    }

    /// Replace the first source function, depth first, with `replacement`.
    ///
    /// Hands `replacement` back when there is no source to replace.
    pub fn substitute_source(&mut self, replacement: Expression) -> Result<(), Expression> {
        match self.first_source_mut() {
            Some(slot) => {
                *slot = replacement;
                Ok(())
            }
            None => Err(replacement),
        }
    }

    fn first_source_mut(&mut self) -> Option<&mut Expression> {
        if self.kind == FunctionKind::Source {
            return Some(self);
        }
        self.arguments.iter_mut().find_map(Self::first_source_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_multiply_fetches() {
        let blur = Expression::filter("blur", 9, Expression::source("a"));
        assert_eq!(
            blur.compute_resource_usage_recursive(),
            ResourceUsage::new(1, 1, 9)
        );

        let over = Expression::merge("over", vec![blur, Expression::source("b")]);
        assert_eq!(
            over.compute_resource_usage_recursive(),
            ResourceUsage::new(2, 2, 10)
        );
    }

    #[test]
    fn counts_stop_at_limit() {
        let expr = Expression::merge(
            "stack",
            vec![
                Expression::source("a"),
                Expression::source("b"),
                Expression::source("c"),
            ],
        );
        assert_eq!(expr.source_function_count(2), 2);
        assert_eq!(expr.source_function_count(10), 3);
        assert_eq!(expr.filter_function_count(1), 0);
    }

    #[test]
    fn substitute_replaces_first_source() {
        let mut expr = Expression::color("gamma", Expression::source("in"));
        let shader = Expression::color("exposure", Expression::source("plate"));

        expr.substitute_source(shader).unwrap();
        assert_eq!(expr.arguments()[0].name(), "exposure");
        assert_eq!(expr.source_function_count(2), 1);

        let mut constant = Expression::merge("black", Vec::new());
        let back = constant.substitute_source(Expression::source("x")).unwrap_err();
        assert_eq!(back.name(), "x");
    }
}
