use std::collections::BTreeMap;

use crate::{
    error::ValidationError,
    image::Image,
    spec::FilterSpec,
    value::{ColorValue, ParameterValue},
};

/// Caller-provided parameter values, before validation against a schema.
///
/// `with` replaces deterministically on repeated keys (it is a map, not a
/// merge of literals), so a mistyped duplicate cannot silently shadow a
/// different logical parameter.
#[derive(Clone, Debug, Default)]
pub struct Params(BTreeMap<String, ParameterValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<ParameterValue>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Params(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A parameter set validated against a [`FilterSpec`].
///
/// Construction checks presence of every required key, tag agreement for
/// every provided value, and rejects keys the schema does not declare.
/// Declared defaults are filled in, so filter implementations read a
/// complete mapping. Numeric ranges are deliberately not checked here;
/// they are implementation concerns.
#[derive(Clone, Debug)]
pub struct ParameterSet {
    values: BTreeMap<String, ParameterValue>,
}

impl ParameterSet {
    pub fn build(spec: &FilterSpec, params: Params) -> Result<ParameterSet, ValidationError> {
        let mut provided = params.0;
        let mut values = BTreeMap::new();

        for p in spec.params() {
            match provided.remove(&p.name) {
                Some(value) => {
                    if value.tag() != p.tag {
                        return Err(ValidationError::TagMismatch {
                            filter: spec.name().to_string(),
                            name: p.name.clone(),
                            expected: p.tag,
                            found: value.tag(),
                        });
                    }
                    values.insert(p.name.clone(), value);
                }
                None if p.required => {
                    return Err(ValidationError::MissingParameter {
                        filter: spec.name().to_string(),
                        name: p.name.clone(),
                    });
                }
                None => {
                    if let Some(default) = &p.default {
                        values.insert(p.name.clone(), default.clone());
                    }
                }
            }
        }

        if let Some((name, _)) = provided.pop_first() {
            return Err(ValidationError::UnknownParameter {
                filter: spec.name().to_string(),
                name,
            });
        }

        Ok(ParameterSet { values })
    }

    /// An empty set for schemas with no parameters.
    pub fn empty() -> ParameterSet {
        ParameterSet {
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(ParameterValue::Scalar(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn vector(&self, name: &str) -> Option<&[f64]> {
        match self.values.get(name) {
            Some(ParameterValue::Vector(v)) => Some(v),
            _ => None,
        }
    }

    pub fn color(&self, name: &str) -> Option<ColorValue> {
        match self.values.get(name) {
            Some(ParameterValue::Color(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn matrix(&self, name: &str) -> Option<kurbo::Affine> {
        match self.values.get(name) {
            Some(ParameterValue::Matrix(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn image(&self, name: &str) -> Option<&Image> {
        match self.values.get(name) {
            Some(ParameterValue::Image(v)) => Some(v),
            _ => None,
        }
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        match self.values.get(name) {
            Some(ParameterValue::Bytes(v)) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Structural comparison, ignoring nothing: same keys, same tags, same
    /// payloads. Image payloads compare by buffer identity.
    pub fn structurally_eq(&self, other: &ParameterSet) -> bool {
        if self.values.len() != other.values.len() {
            return false;
        }
        self.values.iter().all(|(k, a)| {
            other.values.get(k).is_some_and(|b| match (a, b) {
                (ParameterValue::Scalar(x), ParameterValue::Scalar(y)) => x == y,
                (ParameterValue::Vector(x), ParameterValue::Vector(y)) => x == y,
                (ParameterValue::Color(x), ParameterValue::Color(y)) => x == y,
                (ParameterValue::Matrix(x), ParameterValue::Matrix(y)) => x == y,
                (ParameterValue::Bytes(x), ParameterValue::Bytes(y)) => x == y,
                (ParameterValue::Image(x), ParameterValue::Image(y)) => {
                    std::ptr::eq(x.data().as_ptr(), y.data().as_ptr())
                }
                _ => false,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueTag;

    fn blur_spec() -> FilterSpec {
        FilterSpec::unary("gaussian_blur")
            .required("radius", ValueTag::Scalar)
            .optional("sigma", ValueTag::Scalar, None)
    }

    #[test]
    fn build_accepts_valid_params() {
        let set = ParameterSet::build(&blur_spec(), Params::new().with("radius", 5.0)).unwrap();
        assert_eq!(set.scalar("radius"), Some(5.0));
        assert_eq!(set.scalar("sigma"), None);
    }

    #[test]
    fn build_rejects_missing_required() {
        let err = ParameterSet::build(&blur_spec(), Params::new()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingParameter {
                filter: "gaussian_blur".to_string(),
                name: "radius".to_string(),
            }
        );
    }

    #[test]
    fn build_rejects_unknown_key() {
        let err = ParameterSet::build(
            &blur_spec(),
            Params::new().with("radius", 5.0).with("bogus", 1),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownParameter {
                filter: "gaussian_blur".to_string(),
                name: "bogus".to_string(),
            }
        );
    }

    #[test]
    fn build_rejects_tag_mismatch() {
        let err = ParameterSet::build(&blur_spec(), Params::new().with("radius", vec![5.0]))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TagMismatch { name, .. } if name == "radius"));
    }

    #[test]
    fn vector_of_one_is_not_a_scalar() {
        // Strict tagging: no implicit coercion in either direction.
        let spec = FilterSpec::unary("crop").required("rect", ValueTag::Vector);
        let err = ParameterSet::build(&spec, Params::new().with("rect", 4.0)).unwrap_err();
        assert!(matches!(err, ValidationError::TagMismatch { .. }));
    }

    #[test]
    fn build_fills_defaults() {
        let spec = FilterSpec::unary("sharpen")
            .required("radius", ValueTag::Scalar)
            .optional("amount", ValueTag::Scalar, Some(ParameterValue::Scalar(1.0)));
        let set = ParameterSet::build(&spec, Params::new().with("radius", 2.0)).unwrap();
        assert_eq!(set.scalar("amount"), Some(1.0));
    }

    #[test]
    fn repeated_with_replaces_deterministically() {
        let set = ParameterSet::build(
            &blur_spec(),
            Params::new().with("radius", 1.0).with("radius", 9.0),
        )
        .unwrap();
        assert_eq!(set.scalar("radius"), Some(9.0));
    }
}
