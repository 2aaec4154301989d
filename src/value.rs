use std::fmt;

use crate::image::Image;

/// The tag of a [`ParameterValue`], used by schemas to state what they expect.
///
/// Tags are strict: a vector of length one is not a scalar, an integer-looking
/// scalar is not a distinct type. Conversion happens at construction (the
/// `From` impls below), never between already-built values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueTag {
    Scalar,
    Vector,
    Color,
    Image,
    Matrix,
    Bytes,
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueTag::Scalar => "scalar",
            ValueTag::Vector => "vector",
            ValueTag::Color => "color",
            ValueTag::Image => "image",
            ValueTag::Matrix => "matrix",
            ValueTag::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// Color-space annotation carried by color parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpaceTag {
    Srgb,
    LinearSrgb,
}

/// A color parameter: four components plus the space they are expressed in.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColorValue {
    pub rgba: [f32; 4],
    #[serde(default = "ColorValue::default_space")]
    pub space: ColorSpaceTag,
}

impl ColorValue {
    fn default_space() -> ColorSpaceTag {
        ColorSpaceTag::Srgb
    }

    pub fn srgb(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            rgba: [r, g, b, a],
            space: ColorSpaceTag::Srgb,
        }
    }
}

/// A typed filter parameter.
///
/// Image values are usually wired as graph edges (source or upstream nodes)
/// rather than stored in a parameter map; the variant exists for filters that
/// take an image constant, such as a lookup table.
#[derive(Clone, Debug)]
pub enum ParameterValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Color(ColorValue),
    Image(Image),
    Matrix(kurbo::Affine),
    Bytes(Vec<u8>),
}

impl ParameterValue {
    pub fn tag(&self) -> ValueTag {
        match self {
            ParameterValue::Scalar(_) => ValueTag::Scalar,
            ParameterValue::Vector(_) => ValueTag::Vector,
            ParameterValue::Color(_) => ValueTag::Color,
            ParameterValue::Image(_) => ValueTag::Image,
            ParameterValue::Matrix(_) => ValueTag::Matrix,
            ParameterValue::Bytes(_) => ValueTag::Bytes,
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Scalar(v)
    }
}

impl From<f32> for ParameterValue {
    fn from(v: f32) -> Self {
        ParameterValue::Scalar(f64::from(v))
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Scalar(f64::from(v))
    }
}

impl From<u32> for ParameterValue {
    fn from(v: u32) -> Self {
        ParameterValue::Scalar(f64::from(v))
    }
}

impl From<Vec<f64>> for ParameterValue {
    fn from(v: Vec<f64>) -> Self {
        ParameterValue::Vector(v)
    }
}

impl From<&[f64]> for ParameterValue {
    fn from(v: &[f64]) -> Self {
        ParameterValue::Vector(v.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for ParameterValue {
    fn from(v: [f64; N]) -> Self {
        ParameterValue::Vector(v.to_vec())
    }
}

impl From<ColorValue> for ParameterValue {
    fn from(v: ColorValue) -> Self {
        ParameterValue::Color(v)
    }
}

impl From<Image> for ParameterValue {
    fn from(v: Image) -> Self {
        ParameterValue::Image(v)
    }
}

impl From<kurbo::Affine> for ParameterValue {
    fn from(v: kurbo::Affine) -> Self {
        ParameterValue::Matrix(v)
    }
}

impl From<Vec<u8>> for ParameterValue {
    fn from(v: Vec<u8>) -> Self {
        ParameterValue::Bytes(v)
    }
}
