//! Compilation specs: which datasets of a namespace the caller controls.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use primed_catalog::{qualify, qualify_all, qualify_parameter, DatasetName};
use primed_pipeline::Pipeline;

/// Declares, for one namespace, which datasets are supplied per invocation
/// (`inputs`, `parameters`), which are returned (`outputs`) and which are
/// loaded once at compile time (`artifacts`).
///
/// Names are namespace-relative (`A`, not `n1.A`; `B`, not `params:n1.B`).
/// A single name may be given as a bare string in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationSpec {
    pub namespace: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub inputs: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub outputs: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub parameters: Vec<String>,
    /// Explicit artifact list. When non-empty, only these inputs are
    /// materialized and inference is skipped.
    #[serde(deserialize_with = "one_or_many")]
    pub artifacts: Vec<String>,
    pub infer_artifacts: bool,
}

impl Default for CompilationSpec {
    fn default() -> Self {
        Self {
            namespace: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
            artifacts: Vec::new(),
            infer_artifacts: true,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(name)) => vec![name],
        Some(OneOrMany::Many(names)) => names,
        None => Vec::new(),
    })
}

impl CompilationSpec {
    pub fn new(namespace: Option<&str>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn with_inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_artifacts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifacts = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_artifact_inference(mut self) -> Self {
        self.infer_artifacts = false;
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn namespaced_inputs(&self) -> Vec<String> {
        qualify_all(&self.inputs, self.namespace())
    }

    pub fn namespaced_outputs(&self) -> Vec<String> {
        qualify_all(&self.outputs, self.namespace())
    }

    /// Parameter keys qualified by namespace (`n1.B`).
    pub fn namespaced_parameters(&self) -> Vec<String> {
        qualify_all(&self.parameters, self.namespace())
    }

    /// Parameter dataset names (`params:n1.B`).
    pub fn prefixed_namespaced_parameters(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|key| qualify_parameter(key, self.namespace()))
            .collect()
    }

    pub fn namespaced_artifacts(&self) -> Vec<String> {
        qualify_all(&self.artifacts, self.namespace())
    }

    /// Whether `name` should be materialized as an artifact when it is not an
    /// input, a parameter or a template.
    pub fn is_artifact(&self, name: &str) -> bool {
        if self.artifacts.is_empty() {
            self.infer_artifacts
        } else {
            self.artifacts
                .iter()
                .any(|a| qualify(a, self.namespace()) == name)
        }
    }
}

/// Derive one spec per node namespace of `pipeline`, default namespace first.
///
/// Inside namespace `ns`, free inputs `params:ns.x` become parameters, free
/// inputs `ns.x` inputs and free outputs `ns.x` outputs. The default namespace
/// has no prefix to match on and only infers parameters.
pub fn infer_compilation_specs(pipeline: &Pipeline) -> Vec<CompilationSpec> {
    pipeline
        .namespaces()
        .into_iter()
        .map(|namespace| {
            let ns = namespace.as_deref();
            let sub = pipeline.filter(ns);
            let mut spec = CompilationSpec::new(ns);

            for raw in sub.inputs() {
                let name = DatasetName::parse(&raw, ns);
                match (ns, &name) {
                    (None, DatasetName::Parameter(key)) => spec.parameters.push(key.clone()),
                    (Some(_), DatasetName::Namespaced { name: local, .. }) => {
                        match local.as_ref() {
                            DatasetName::Parameter(key) => spec.parameters.push(key.clone()),
                            DatasetName::Plain(x) => spec.inputs.push(x.clone()),
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }

            if ns.is_some() {
                for raw in sub.outputs() {
                    if let DatasetName::Namespaced { name: local, .. } = DatasetName::parse(&raw, ns) {
                        if let DatasetName::Plain(x) = *local {
                            spec.outputs.push(x);
                        }
                    }
                }
            }

            debug!(
                namespace = ?spec.namespace,
                inputs = ?spec.inputs,
                outputs = ?spec.outputs,
                parameters = ?spec.parameters,
                "inferred compilation spec"
            );
            spec
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use primed_pipeline::{NamespaceMapping, Node};
    use serde_json::{json, Value};

    fn mock() -> Pipeline {
        let pass = |name: &str, inputs: &[&str], outputs: &[&str]| {
            let n = outputs.len();
            Node::new(
                name,
                inputs.iter().copied(),
                outputs.iter().copied(),
                move |_: &[Value]| Ok(vec![Value::Null; n]),
            )
        };
        Pipeline::new(vec![
            pass("identity", &["A", "params:B"], &["C"]),
            pass("square", &["C"], &["D"]),
            pass("cube", &["D"], &["E", "F"]),
        ])
        .unwrap()
    }

    #[test]
    fn derived_views_qualify_names() {
        let spec = CompilationSpec::new(Some("n1"))
            .with_inputs(["A"])
            .with_outputs(["E"])
            .with_parameters(["B"])
            .with_artifacts(["K"]);
        assert_eq!(spec.namespaced_inputs(), vec!["n1.A"]);
        assert_eq!(spec.namespaced_outputs(), vec!["n1.E"]);
        assert_eq!(spec.namespaced_parameters(), vec!["n1.B"]);
        assert_eq!(spec.prefixed_namespaced_parameters(), vec!["params:n1.B"]);
        assert_eq!(spec.namespaced_artifacts(), vec!["n1.K"]);
    }

    #[test]
    fn default_namespace_views_are_unqualified() {
        let spec = CompilationSpec::new(None).with_parameters(["B"]);
        assert_eq!(spec.prefixed_namespaced_parameters(), vec!["params:B"]);
        assert!(spec.infer_artifacts);
    }

    #[test]
    fn explicit_artifacts_override_inference() {
        let inferred = CompilationSpec::new(Some("n1"));
        assert!(inferred.is_artifact("n1.A"));

        let explicit = CompilationSpec::new(Some("n1")).with_artifacts(["A"]);
        assert!(explicit.is_artifact("n1.A"));
        assert!(!explicit.is_artifact("n1.Z"));

        let off = CompilationSpec::new(None).without_artifact_inference();
        assert!(!off.is_artifact("A"));
    }

    #[test]
    fn deserializes_with_defaults_and_bare_strings() {
        let spec: CompilationSpec =
            serde_json::from_value(json!({"namespace": "n1", "inputs": "A", "outputs": ["F"]}))
                .unwrap();
        assert_eq!(spec.inputs, vec!["A"]);
        assert_eq!(spec.outputs, vec!["F"]);
        assert!(spec.parameters.is_empty());
        assert!(spec.infer_artifacts);

        let spec: CompilationSpec = serde_json::from_value(json!({})).unwrap();
        assert_eq!(spec, CompilationSpec::default());
    }

    #[test]
    fn infers_default_namespace_parameters_only() {
        let specs = infer_compilation_specs(&mock());
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].namespace, None);
        assert_eq!(specs[0].parameters, vec!["B"]);
        assert!(specs[0].inputs.is_empty());
        assert!(specs[0].outputs.is_empty());
    }

    #[test]
    fn infers_namespaced_specs_in_order() {
        let n2 = mock()
            .namespaced("n2", NamespaceMapping::new().output_as("F", "report"))
            .unwrap();
        let n1 = mock().namespaced("n1", NamespaceMapping::new()).unwrap();
        let root = mock();
        let pipeline = Pipeline::concat([n2, n1, root]).unwrap();

        let specs = infer_compilation_specs(&pipeline);
        let namespaces: Vec<_> = specs.iter().map(|s| s.namespace.clone()).collect();
        assert_eq!(namespaces, vec![None, Some("n1".into()), Some("n2".into())]);

        assert_eq!(specs[1].inputs, vec!["A"]);
        assert_eq!(specs[1].parameters, vec!["B"]);
        assert_eq!(specs[1].outputs, vec!["E", "F"]);
        // F is bound outside n2, so it is not a namespaced output.
        assert_eq!(specs[2].outputs, vec!["E"]);
    }

    #[test]
    fn inputs_from_other_namespaces_are_not_inferred() {
        let n1 = mock()
            .namespaced("n1", NamespaceMapping::new().input_as("A", "n2.A"))
            .unwrap();
        let specs = infer_compilation_specs(&n1);
        assert!(specs[0].inputs.is_empty());
        assert_eq!(specs[0].parameters, vec!["B"]);
    }
}
