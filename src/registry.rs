use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    error::{FiltraError, FiltraResult},
    image::Image,
    params::ParameterSet,
    spec::FilterSpec,
};

/// A filter implementation: given resolved input images (in the spec's
/// declared order) and a validated parameter set, produce one output image.
///
/// Implementations report failures through `anyhow`; the registry wraps them
/// as [`FiltraError::Execution`] with the filter name attached. They must be
/// pure with respect to their inputs — the renderer memoizes node results
/// within a render pass on that assumption.
pub trait FilterImpl: Send + Sync {
    fn execute(&self, inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image>;
}

impl<F> FilterImpl for F
where
    F: Fn(&[Image], &ParameterSet) -> anyhow::Result<Image> + Send + Sync,
{
    fn execute(&self, inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
        self(inputs, params)
    }
}

/// Which implementation pack backs the builtin filter table.
///
/// CPU raster is always available. The variants are interchangeable at
/// registry-construction time; nothing downstream branches on the kind.
#[derive(Clone, Copy, Debug, Default)]
pub enum BackendKind {
    #[default]
    Cpu,
}

struct RegisteredFilter {
    spec: FilterSpec,
    implementation: Box<dyn FilterImpl>,
}

/// Maps filter names to their spec and implementation.
///
/// Populated single-threaded at startup, then treated as read-only; shared
/// references can serve concurrent renders without synchronization.
#[derive(Default)]
pub struct FilterRegistry {
    filters: BTreeMap<String, RegisteredFilter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the builtin filter table.
    pub fn with_builtin(kind: BackendKind) -> FiltraResult<Self> {
        let mut registry = Self::new();
        crate::filters::register_builtin(&mut registry, kind)?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        spec: FilterSpec,
        implementation: impl FilterImpl + 'static,
    ) -> FiltraResult<()> {
        let name = spec.name().to_string();
        if self.filters.contains_key(&name) {
            return Err(FiltraError::DuplicateFilter(name));
        }
        debug!(filter = %name, arity = spec.arity(), "registered filter");
        self.filters.insert(
            name,
            RegisteredFilter {
                spec,
                implementation: Box::new(implementation),
            },
        );
        Ok(())
    }

    pub fn spec(&self, name: &str) -> FiltraResult<&FilterSpec> {
        self.filters
            .get(name)
            .map(|f| &f.spec)
            .ok_or_else(|| FiltraError::UnknownFilter(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered filter names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn specs(&self) -> impl Iterator<Item = &FilterSpec> {
        self.filters.values().map(|f| &f.spec)
    }

    /// Run a filter implementation directly.
    ///
    /// The renderer goes through this for every node; callers can too, for
    /// one-shot execution outside a pipeline.
    pub fn execute(
        &self,
        name: &str,
        inputs: &[Image],
        params: &ParameterSet,
    ) -> FiltraResult<Image> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| FiltraError::UnknownFilter(name.to_string()))?;
        filter
            .implementation
            .execute(inputs, params)
            .map_err(|source| FiltraError::execution(name, source))
    }
}
