//! Declarative graph documents.
//!
//! A JSON form of a pipeline: named source slots plus an ordered step list.
//! Steps reference sources or earlier steps by name; an omitted `input`
//! means "the previous step" (or the sole source, for the first step).
//! Building a document performs the same eager validation as the fluent
//! API and yields an ordinary [`Pipeline`].
//!
//! ```json
//! {
//!   "sources": ["base", "overlay"],
//!   "steps": [
//!     { "id": "soft", "filter": "gaussian_blur", "params": { "radius": 4.0 } },
//!     { "filter": "composite_over", "input": "overlay", "aux": ["soft"] }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use crate::{
    error::{FiltraResult, ValidationError},
    image::Image,
    params::Params,
    pipeline::Pipeline,
    registry::FilterRegistry,
    value::{ColorValue, ParameterValue},
};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GraphDoc {
    #[serde(default)]
    pub sources: Vec<String>,
    pub steps: Vec<StepDoc>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StepDoc {
    /// Name later steps can reference this one by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub filter: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamDoc>,
    /// Primary input: a source name or an earlier step id. Defaults to the
    /// previous step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Auxiliary image inputs, in the filter spec's declared order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aux: Vec<String>,
}

/// Document spelling of a parameter value. Images are graph edges, never
/// document literals.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParamDoc {
    Scalar(f64),
    Vector(Vec<f64>),
    Color(ColorValue),
    Matrix { affine: kurbo::Affine },
    Bytes { bytes: Vec<u8> },
}

impl From<ParamDoc> for ParameterValue {
    fn from(doc: ParamDoc) -> Self {
        match doc {
            ParamDoc::Scalar(v) => ParameterValue::Scalar(v),
            ParamDoc::Vector(v) => ParameterValue::Vector(v),
            ParamDoc::Color(v) => ParameterValue::Color(v),
            ParamDoc::Matrix { affine } => ParameterValue::Matrix(affine),
            ParamDoc::Bytes { bytes } => ParameterValue::Bytes(bytes),
        }
    }
}

impl GraphDoc {
    pub fn from_json(json: &str) -> FiltraResult<GraphDoc> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::Document(format!("invalid graph JSON: {e}")).into())
    }

    /// Resolve the document against a registry and the named source images,
    /// producing the pipeline of the final step.
    pub fn build(
        &self,
        registry: &FilterRegistry,
        sources: &BTreeMap<String, Image>,
    ) -> FiltraResult<Pipeline> {
        if self.steps.is_empty() {
            return Err(ValidationError::Document("document has no steps".to_string()).into());
        }
        for declared in &self.sources {
            if !sources.contains_key(declared) {
                return Err(ValidationError::Document(format!(
                    "no image provided for declared source '{declared}'"
                ))
                .into());
            }
        }
        for provided in sources.keys() {
            if !self.sources.contains(provided) {
                return Err(ValidationError::Document(format!(
                    "image '{provided}' does not match any declared source"
                ))
                .into());
            }
        }

        let mut env: BTreeMap<String, Pipeline> = BTreeMap::new();
        for name in &self.sources {
            let image = sources[name].clone();
            env.insert(name.clone(), Pipeline::source(image));
        }

        let mut prev: Option<Pipeline> = None;
        for (index, step) in self.steps.iter().enumerate() {
            let label = step
                .id
                .clone()
                .unwrap_or_else(|| format!("#{index}"));

            let mut params = Params::new();
            for (name, value) in &step.params {
                params.set(name.clone(), ParameterValue::from(value.clone()));
            }

            let spec = registry.spec(&step.filter)?;
            let built = if spec.arity() == 0 {
                if step.input.is_some() || !step.aux.is_empty() {
                    return Err(ValidationError::Document(format!(
                        "step '{label}': generator '{}' takes no image inputs",
                        step.filter
                    ))
                    .into());
                }
                Pipeline::generate(registry, &step.filter, params)?
            } else {
                let primary = match &step.input {
                    Some(reference) => lookup(&env, &label, reference)?.clone(),
                    None => match (&prev, env.len()) {
                        (Some(p), _) => p.clone(),
                        (None, 1) => env.values().next().cloned().ok_or_else(|| {
                            ValidationError::Document("no source available".to_string())
                        })?,
                        (None, _) => {
                            return Err(ValidationError::Document(format!(
                                "step '{label}' has no input and there is no previous step or \
                                 unique source to default to"
                            ))
                            .into());
                        }
                    },
                };
                let aux: Vec<&Pipeline> = step
                    .aux
                    .iter()
                    .map(|reference| lookup(&env, &label, reference))
                    .collect::<FiltraResult<_>>()?;
                primary.apply_with(registry, &step.filter, params, &aux)?
            };

            if let Some(id) = &step.id {
                if env.contains_key(id) {
                    return Err(ValidationError::DuplicateStepId(id.clone()).into());
                }
                env.insert(id.clone(), built.clone());
            }
            prev = Some(built);
        }

        prev.ok_or_else(|| ValidationError::Document("document has no steps".to_string()).into())
    }
}

fn lookup<'e>(
    env: &'e BTreeMap<String, Pipeline>,
    step: &str,
    reference: &str,
) -> FiltraResult<&'e Pipeline> {
    env.get(reference).ok_or_else(|| {
        ValidationError::UnknownReference {
            step: step.to_string(),
            reference: reference.to_string(),
        }
        .into()
    })
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

    fn one_source() -> BTreeMap<String, Image> {
        let mut m = BTreeMap::new();
        m.insert(
            "base".to_string(),
            Image::filled(Extent::sized(4, 4), [50, 50, 50, 255]).unwrap(),
        );
        m
    }

    #[test]
    fn chain_defaults_to_previous_step() {
        let doc = GraphDoc::from_json(
            r#"{
                "sources": ["base"],
                "steps": [
                    { "filter": "grayscale" },
                    { "filter": "gaussian_blur", "params": { "radius": 2.0 } }
                ]
            }"#,
        )
        .unwrap();

        let pipeline = doc.build(&registry(), &one_source()).unwrap();
        assert_eq!(pipeline.node_count(), 3);
        assert_eq!(pipeline.terminal().filter_name(), Some("gaussian_blur"));
    }

    #[test]
    fn ids_enable_diamonds() {
        let doc = GraphDoc::from_json(
            r#"{
                "sources": ["base"],
                "steps": [
                    { "id": "gray", "filter": "grayscale" },
                    { "id": "soft", "filter": "gaussian_blur", "params": { "radius": 2.0 } },
                    { "filter": "composite_over", "input": "soft", "aux": ["gray"] }
                ]
            }"#,
        )
        .unwrap();

        let pipeline = doc.build(&registry(), &one_source()).unwrap();
        // source, grayscale, blur, composite — grayscale shared by both arms.
        assert_eq!(pipeline.node_count(), 4);
    }

    #[test]
    fn document_matches_fluent_api_structure() {
        let reg = registry();
        let sources = one_source();

        let doc = GraphDoc::from_json(
            r#"{
                "sources": ["base"],
                "steps": [
                    { "filter": "grayscale" },
                    { "filter": "gaussian_blur", "params": { "radius": 5.0 } }
                ]
            }"#,
        )
        .unwrap();
        let from_doc = doc.build(&reg, &sources).unwrap();

        let fluent = Pipeline::source(sources["base"].clone())
            .apply(&reg, "grayscale", Params::new())
            .unwrap()
            .apply(&reg, "gaussian_blur", Params::new().with("radius", 5.0))
            .unwrap();

        assert!(from_doc.structurally_eq(&fluent));
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let doc = GraphDoc::from_json(
            r#"{
                "sources": ["base"],
                "steps": [ { "filter": "grayscale", "input": "missing" } ]
            }"#,
        )
        .unwrap();

        let err = doc.build(&registry(), &one_source()).unwrap_err();
        assert!(matches!(
            err,
            crate::FiltraError::Validation(ValidationError::UnknownReference { reference, .. })
                if reference == "missing"
        ));
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let doc = GraphDoc::from_json(
            r#"{
                "sources": ["base"],
                "steps": [
                    { "id": "a", "filter": "grayscale" },
                    { "id": "a", "filter": "invert" }
                ]
            }"#,
        )
        .unwrap();

        let err = doc.build(&registry(), &one_source()).unwrap_err();
        assert!(matches!(
            err,
            crate::FiltraError::Validation(ValidationError::DuplicateStepId(id)) if id == "a"
        ));
    }

    #[test]
    fn undeclared_source_image_is_rejected() {
        let doc = GraphDoc::from_json(
            r#"{ "sources": [], "steps": [ { "filter": "grayscale" } ] }"#,
        )
        .unwrap();
        let err = doc.build(&registry(), &one_source()).unwrap_err();
        assert!(matches!(
            err,
            crate::FiltraError::Validation(ValidationError::Document(_))
        ));
    }

    #[test]
    fn param_docs_deserialize_by_shape() {
        let doc: ParamDoc = serde_json::from_str("3.5").unwrap();
        assert_eq!(doc, ParamDoc::Scalar(3.5));

        let doc: ParamDoc = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(doc, ParamDoc::Vector(vec![1.0, 2.0]));

        let doc: ParamDoc = serde_json::from_str(r#"{ "rgba": [1.0, 0.0, 0.0, 1.0] }"#).unwrap();
        assert!(matches!(doc, ParamDoc::Color(_)));

        let doc: ParamDoc =
            serde_json::from_str(r#"{ "affine": [1.0, 0.0, 0.0, 1.0, 10.0, 20.0] }"#).unwrap();
        assert!(matches!(doc, ParamDoc::Matrix { .. }));
    }

    #[test]
    fn doc_roundtrips_through_json() {
        let doc = GraphDoc {
            sources: vec!["base".to_string()],
            steps: vec![StepDoc {
                id: Some("soft".to_string()),
                filter: "gaussian_blur".to_string(),
                params: [("radius".to_string(), ParamDoc::Scalar(4.0))]
                    .into_iter()
                    .collect(),
                input: None,
                aux: Vec::new(),
            }],
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back = GraphDoc::from_json(&json).unwrap();
        assert_eq!(back.steps[0].filter, "gaussian_blur");
        assert_eq!(back.steps[0].params["radius"], ParamDoc::Scalar(4.0));
    }
}
