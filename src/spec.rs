use crate::value::{ParameterValue, ValueTag};

/// Schema of one parameter a filter accepts.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: String,
    pub tag: ValueTag,
    pub required: bool,
    /// Filled into the parameter set when an optional parameter is absent.
    pub default: Option<ParameterValue>,
}

/// Static descriptor of a filter kind: its name, the image inputs it takes
/// (in order, the first being the primary input), and its parameter schema.
///
/// Specs are registered once and are immutable afterwards; the engine
/// validates every pipeline step against them at build time.
#[derive(Clone, Debug)]
pub struct FilterSpec {
    name: String,
    image_inputs: Vec<String>,
    params: Vec<ParamSpec>,
}

impl FilterSpec {
    /// A generator spec: no image inputs until [`FilterSpec::image_input`]
    /// or [`FilterSpec::unary`] adds them.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_inputs: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Shorthand for the common one-image-in case.
    pub fn unary(name: impl Into<String>) -> Self {
        Self::new(name).image_input("image")
    }

    pub fn image_input(mut self, name: impl Into<String>) -> Self {
        self.image_inputs.push(name.into());
        self
    }

    pub fn required(mut self, name: impl Into<String>, tag: ValueTag) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            tag,
            required: true,
            default: None,
        });
        self
    }

    pub fn optional(
        mut self,
        name: impl Into<String>,
        tag: ValueTag,
        default: Option<ParameterValue>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            tag,
            required: false,
            default,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered image input names; the length is the input arity.
    pub fn image_inputs(&self) -> &[String] {
        &self.image_inputs
    }

    pub fn arity(&self) -> usize {
        self.image_inputs.len()
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}
