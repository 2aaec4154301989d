use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    error::{FiltraResult, ValidationError},
    image::Image,
    params::{ParameterSet, Params},
    registry::FilterRegistry,
};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one node within the process, used for per-render memoization.
/// Two structurally equal nodes built by separate calls have distinct ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

fn next_node_id() -> NodeId {
    NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Source(Image),
    Filter { name: String, params: ParameterSet },
}

/// One step in a pipeline: a source image, or a named filter application
/// referencing the nodes that feed it.
///
/// Nodes are immutable and shared by `Arc`; a node can only reference nodes
/// that existed before it, so the graph is acyclic by construction.
#[derive(Debug)]
pub struct FilterNode {
    id: NodeId,
    kind: NodeKind,
    inputs: Vec<Arc<FilterNode>>,
}

impl FilterNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn inputs(&self) -> &[Arc<FilterNode>] {
        &self.inputs
    }

    /// Filter name, or `None` for source nodes.
    pub fn filter_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Source(_) => None,
            NodeKind::Filter { name, .. } => Some(name),
        }
    }

    fn structurally_eq(&self, other: &FilterNode) -> bool {
        let kinds_match = match (&self.kind, &other.kind) {
            (NodeKind::Source(a), NodeKind::Source(b)) => {
                std::ptr::eq(a.data().as_ptr(), b.data().as_ptr()) && a.extent() == b.extent()
            }
            (NodeKind::Filter { name: a, params: pa }, NodeKind::Filter { name: b, params: pb }) => {
                a == b && pa.structurally_eq(pb)
            }
            _ => false,
        };
        kinds_match
            && self.inputs.len() == other.inputs.len()
            && self
                .inputs
                .iter()
                .zip(&other.inputs)
                .all(|(a, b)| a.structurally_eq(b))
    }
}

/// An immutable, lazily evaluated filter graph.
///
/// A pipeline wraps the terminal [`FilterNode`]; nothing executes until
/// [`crate::render`] is called. Every `apply` produces a **new** pipeline
/// that shares the prior nodes structurally — the value it was called on
/// stays valid and unchanged, so intermediate pipelines can be kept, reused
/// as auxiliary inputs, or extended in several directions:
///
/// ```no_run
/// # use filtra::{BackendKind, FilterRegistry, Image, Extent, Params, Pipeline};
/// # fn demo(img: Image) -> filtra::FiltraResult<()> {
/// let registry = FilterRegistry::with_builtin(BackendKind::Cpu)?;
/// let base = Pipeline::source(img);
/// let gray = base.apply(&registry, "grayscale", Params::new())?;
/// let soft = gray.apply(&registry, "gaussian_blur", Params::new().with("radius", 5.0))?;
/// // `base` and `gray` are still valid pipelines here.
/// # let _ = soft;
/// # Ok(())
/// # }
/// ```
///
/// Validation is eager: unknown filter names, bad parameters, and wrong
/// input arity fail the `apply` call itself, not the eventual render.
#[derive(Clone, Debug)]
pub struct Pipeline {
    terminal: Arc<FilterNode>,
}

impl Pipeline {
    /// Start a pipeline from a source image.
    pub fn source(image: Image) -> Pipeline {
        Pipeline {
            terminal: Arc::new(FilterNode {
                id: next_node_id(),
                kind: NodeKind::Source(image),
                inputs: Vec::new(),
            }),
        }
    }

    /// Start a pipeline from a zero-input (generator) filter.
    pub fn generate(registry: &FilterRegistry, name: &str, params: Params) -> FiltraResult<Pipeline> {
        let spec = registry.spec(name)?;
        if spec.arity() != 0 {
            return Err(ValidationError::InputArity {
                filter: name.to_string(),
                expected: spec.arity(),
                found: 0,
            }
            .into());
        }
        let params = ParameterSet::build(spec, params)?;
        Ok(Pipeline {
            terminal: Arc::new(FilterNode {
                id: next_node_id(),
                kind: NodeKind::Filter {
                    name: name.to_string(),
                    params,
                },
                inputs: Vec::new(),
            }),
        })
    }

    /// Append a single-input filter. See [`Pipeline::apply_with`] for
    /// filters that take auxiliary images.
    pub fn apply(
        &self,
        registry: &FilterRegistry,
        name: &str,
        params: Params,
    ) -> FiltraResult<Pipeline> {
        self.apply_with(registry, name, params, &[])
    }

    /// Append a filter whose primary input is this pipeline's terminal node
    /// and whose remaining image inputs are the terminal nodes of `aux`
    /// (mask, backdrop and similar), in the order the spec declares them.
    pub fn apply_with(
        &self,
        registry: &FilterRegistry,
        name: &str,
        params: Params,
        aux: &[&Pipeline],
    ) -> FiltraResult<Pipeline> {
        let spec = registry.spec(name)?;
        let found = 1 + aux.len();
        if spec.arity() != found {
            return Err(ValidationError::InputArity {
                filter: name.to_string(),
                expected: spec.arity(),
                found,
            }
            .into());
        }
        let params = ParameterSet::build(spec, params)?;

        let mut inputs = Vec::with_capacity(found);
        inputs.push(Arc::clone(&self.terminal));
        inputs.extend(aux.iter().map(|p| Arc::clone(&p.terminal)));

        Ok(Pipeline {
            terminal: Arc::new(FilterNode {
                id: next_node_id(),
                kind: NodeKind::Filter {
                    name: name.to_string(),
                    params,
                },
                inputs,
            }),
        })
    }

    pub fn terminal(&self) -> &Arc<FilterNode> {
        &self.terminal
    }

    /// Number of distinct nodes reachable from the terminal.
    pub fn node_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![Arc::clone(&self.terminal)];
        while let Some(node) = stack.pop() {
            if seen.insert(node.id()) {
                stack.extend(node.inputs().iter().cloned());
            }
        }
        seen.len()
    }

    /// Whether two pipelines describe the same graph: same filters, same
    /// parameters, same sources, same wiring. Node identity is ignored.
    pub fn structurally_eq(&self, other: &Pipeline) -> bool {
        self.terminal.structurally_eq(&other.terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        extent::Extent,
        registry::{BackendKind, FilterRegistry},
    };

    fn registry() -> FilterRegistry {
        FilterRegistry::with_builtin(BackendKind::Cpu).unwrap()
    }

    fn source() -> Pipeline {
        Pipeline::source(Image::filled(Extent::sized(4, 4), [8, 8, 8, 255]).unwrap())
    }

    #[test]
    fn apply_is_persistent() {
        let reg = registry();
        let base = source();
        let extended = base.apply(&reg, "invert", Params::new()).unwrap();

        assert_eq!(base.node_count(), 1);
        assert_eq!(extended.node_count(), 2);
        // The original terminal is shared, not copied.
        assert!(Arc::ptr_eq(base.terminal(), &extended.terminal().inputs()[0]));
    }

    #[test]
    fn apply_twice_yields_structurally_equal_independent_pipelines() {
        let reg = registry();
        let base = source();
        let params = || Params::new().with("radius", 5.0);

        let a = base.apply(&reg, "gaussian_blur", params()).unwrap();
        let b = base.apply(&reg, "gaussian_blur", params()).unwrap();

        assert!(a.structurally_eq(&b));
        assert_ne!(a.terminal().id(), b.terminal().id());
    }

    #[test]
    fn failed_apply_leaves_pipeline_usable() {
        let reg = registry();
        let base = source();

        assert!(base.apply(&reg, "nonexistent_filter", Params::new()).is_err());
        assert!(
            base.apply(
                &reg,
                "gaussian_blur",
                Params::new().with("radius", 5.0).with("bogus", 1)
            )
            .is_err()
        );

        // Prior value still extends cleanly.
        let ok = base
            .apply(&reg, "gaussian_blur", Params::new().with("radius", 5.0))
            .unwrap();
        assert_eq!(ok.node_count(), 2);
    }

    #[test]
    fn apply_with_checks_arity() {
        let reg = registry();
        let base = source();

        let err = base
            .apply(&reg, "composite_over", Params::new())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::FiltraError::Validation(ValidationError::InputArity {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn generate_rejects_filters_with_inputs() {
        let reg = registry();
        let err = Pipeline::generate(&reg, "invert", Params::new()).unwrap_err();
        assert!(matches!(
            err,
            crate::FiltraError::Validation(ValidationError::InputArity { .. })
        ));
    }

    #[test]
    fn diamond_shares_the_upstream_node() {
        let reg = registry();
        let base = source().apply(&reg, "grayscale", Params::new()).unwrap();
        let blurred = base
            .apply(&reg, "gaussian_blur", Params::new().with("radius", 2.0))
            .unwrap();
        let combined = blurred
            .apply_with(&reg, "composite_over", Params::new(), &[&base])
            .unwrap();

        // source + grayscale + blur + composite: the grayscale node appears
        // on both arms but is counted once.
        assert_eq!(combined.node_count(), 4);
    }
}
