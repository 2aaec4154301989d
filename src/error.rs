pub type FiltraResult<T> = Result<T, FiltraError>;

#[derive(thiserror::Error, Debug)]
pub enum FiltraError {
    #[error("filter '{0}' is already registered")]
    DuplicateFilter(String),

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("filter '{filter}' failed during execution")]
    Execution {
        filter: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("render failed at filter '{filter}'")]
    Render {
        filter: String,
        #[source]
        source: Box<FiltraError>,
    },

    #[error("render extent is empty and could not be inferred from any source image")]
    NoRenderExtent,

    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Eager, build-time parameter and graph validation failures.
///
/// Raised by [`crate::ParameterSet::build`], [`crate::Pipeline::apply`] and
/// the graph-document loader. The pipeline value being extended is left
/// untouched when one of these is returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("filter '{filter}' requires parameter '{name}'")]
    MissingParameter { filter: String, name: String },

    #[error("filter '{filter}' does not take a parameter named '{name}'")]
    UnknownParameter { filter: String, name: String },

    #[error("parameter '{name}' of filter '{filter}' expects a {expected} value, got {found}")]
    TagMismatch {
        filter: String,
        name: String,
        expected: crate::value::ValueTag,
        found: crate::value::ValueTag,
    },

    #[error("filter '{filter}' takes {expected} image input(s), got {found}")]
    InputArity {
        filter: String,
        expected: usize,
        found: usize,
    },

    #[error("graph document step '{step}' references unknown input '{reference}'")]
    UnknownReference { step: String, reference: String },

    #[error("graph document declares step id '{0}' more than once")]
    DuplicateStepId(String),

    #[error("graph document error: {0}")]
    Document(String),
}

impl FiltraError {
    pub fn execution(filter: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Execution {
            filter: filter.into(),
            source,
        }
    }

    /// The filter name a render aborted on, if this is a render failure.
    pub fn failed_filter(&self) -> Option<&str> {
        match self {
            Self::Render { filter, .. } => Some(filter),
            _ => None,
        }
    }
}
