use std::{
    collections::HashMap,
    sync::Arc,
    time::Instant,
};

use tracing::trace;

use crate::{
    error::{FiltraError, FiltraResult},
    extent::Extent,
    image::{Image, PixelFormat},
    pipeline::{FilterNode, NodeId, NodeKind, Pipeline},
    registry::FilterRegistry,
};

/// Options for one render call.
#[derive(Clone, Debug, Default)]
pub struct RenderOptions {
    /// Output region. Defaults to the union of all source image extents.
    pub extent: Option<Extent>,
}

/// The outcome of a render: an owned pixel buffer plus the extent it covers.
///
/// `data` is tightly packed, row-major, `stride` bytes per row. A result has
/// no further identity; rendering the same pipeline again produces an equal
/// but independent buffer.
#[derive(Clone, Debug)]
pub struct RenderResult {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub stride: usize,
    pub data: Vec<u8>,
    pub extent: Extent,
}

/// Execute a pipeline's DAG and produce a pixel buffer for the requested
/// region.
///
/// Nodes are evaluated in dependency order; each node's result is memoized
/// for the duration of this call, so a node shared by several downstream
/// nodes (diamond dependencies) executes exactly once. Intermediate nodes
/// operate on the unbounded working plane — clipping to the output extent
/// happens only at the final stage.
///
/// The first execution failure aborts the render and is surfaced as
/// [`FiltraError::Render`] naming the failed filter; no partial result is
/// returned. Rendering is pure: the pipeline may be rendered again, on this
/// or another thread, with identical output.
#[tracing::instrument(skip_all, fields(nodes = pipeline.node_count()))]
pub fn render(
    pipeline: &Pipeline,
    registry: &FilterRegistry,
    options: &RenderOptions,
) -> FiltraResult<RenderResult> {
    let mut memo: HashMap<NodeId, Image> = HashMap::new();
    let terminal = evaluate(pipeline.terminal(), registry, &mut memo)?;

    let extent = match options.extent {
        Some(extent) if !extent.is_empty() => extent,
        Some(_) => return Err(FiltraError::NoRenderExtent),
        None => {
            let inferred = source_extent_union(pipeline.terminal());
            if inferred.is_empty() {
                return Err(FiltraError::NoRenderExtent);
            }
            inferred
        }
    };

    let data = terminal.read_region(extent);
    Ok(RenderResult {
        width: extent.width,
        height: extent.height,
        format: terminal.format(),
        stride: extent.width as usize * terminal.format().bytes_per_pixel(),
        data,
        extent,
    })
}

/// Post-order DAG walk with per-call memoization.
fn evaluate(
    root: &Arc<FilterNode>,
    registry: &FilterRegistry,
    memo: &mut HashMap<NodeId, Image>,
) -> FiltraResult<Image> {
    enum Visit {
        Expand(Arc<FilterNode>),
        Execute(Arc<FilterNode>),
    }

    let mut stack = vec![Visit::Expand(Arc::clone(root))];
    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Expand(node) => {
                if memo.contains_key(&node.id()) {
                    continue;
                }
                let inputs = node.inputs().to_vec();
                stack.push(Visit::Execute(node));
                for input in inputs {
                    stack.push(Visit::Expand(input));
                }
            }
            Visit::Execute(node) => {
                if memo.contains_key(&node.id()) {
                    continue;
                }
                let result = match node.kind() {
                    NodeKind::Source(image) => image.clone(),
                    NodeKind::Filter { name, params } => {
                        let inputs: Vec<Image> = node
                            .inputs()
                            .iter()
                            .map(|input| memo[&input.id()].clone())
                            .collect();
                        let start = Instant::now();
                        let image = registry.execute(name, &inputs, params).map_err(|err| {
                            match err {
                                FiltraError::Execution { filter, source } => FiltraError::Render {
                                    filter: filter.clone(),
                                    source: Box::new(FiltraError::Execution { filter, source }),
                                },
                                other => other,
                            }
                        })?;
                        trace!(
                            filter = %name,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            extent = ?image.extent(),
                            "executed filter node"
                        );
                        image
                    }
                };
                memo.insert(node.id(), result);
            }
        }
    }

    Ok(memo[&root.id()].clone())
}

fn source_extent_union(terminal: &Arc<FilterNode>) -> Extent {
    let mut union = Extent::EMPTY;
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![Arc::clone(terminal)];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        if let NodeKind::Source(image) = node.kind() {
            union = union.union(&image.extent());
        }
        stack.extend(node.inputs().iter().cloned());
    }
    union
}
