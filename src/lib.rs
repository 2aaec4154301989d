//! Lazy image filter graphs.
//!
//! Build a [`Pipeline`] by chaining filter applications over source images;
//! nothing executes until [`render`] walks the graph against a
//! [`FilterRegistry`] and produces a pixel buffer. Parameters are typed and
//! validated eagerly, pipelines are persistent values (extending one never
//! invalidates it), and diamond-shaped graphs evaluate shared nodes once
//! per render.

#![forbid(unsafe_code)]

pub mod blur_cpu;
pub mod composite_cpu;
pub mod dsl;
pub mod error;
pub mod extent;
pub mod filters;
pub mod image;
pub mod params;
pub mod pipeline;
pub mod registry;
pub mod renderer;
pub mod spec;
pub mod transform_cpu;
pub mod value;

pub use dsl::{GraphDoc, ParamDoc, StepDoc};
pub use error::{FiltraError, FiltraResult, ValidationError};
pub use extent::Extent;
pub use filters::register_builtin;
pub use image::{Image, PixelFormat};
pub use params::{ParameterSet, Params};
pub use pipeline::{FilterNode, NodeId, Pipeline};
pub use registry::{BackendKind, FilterImpl, FilterRegistry};
pub use renderer::{RenderOptions, RenderResult, render};
pub use spec::{FilterSpec, ParamSpec};
pub use value::{ColorSpaceTag, ColorValue, ParameterValue, ValueTag};
