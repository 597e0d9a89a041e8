//! Wrapping a pipeline into a namespace.

use std::collections::BTreeMap;

use primed_catalog::{qualify, BULK_PARAMETERS, PARAMS_PREFIX};
use primed_types::{PrimedError, Result};

use crate::node::Node;
use crate::pipeline::Pipeline;

/// Dataset names that keep (or change to) an explicit name when a pipeline is
/// wrapped into a namespace, instead of receiving the `ns.` prefix.
///
/// Keys are names as the wrapped pipeline sees them; values are the names the
/// namespaced pipeline uses. Parameter keys are given without `params:`.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMapping {
    pub inputs: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
}

impl NamespaceMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep input `name` unqualified.
    pub fn input(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.input_as(name.clone(), name)
    }

    /// Bind input `name` to the dataset `target`.
    pub fn input_as(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), target.into());
        self
    }

    /// Keep output `name` unqualified.
    pub fn output(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.output_as(name.clone(), name)
    }

    pub fn output_as(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), target.into());
        self
    }

    /// Keep parameter `key` outside the namespace.
    pub fn parameter(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.parameter_as(key.clone(), key)
    }

    pub fn parameter_as(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.parameters.insert(
            key.into().trim_start_matches(PARAMS_PREFIX).to_string(),
            target.into().trim_start_matches(PARAMS_PREFIX).to_string(),
        );
        self
    }

    fn rename(&self, name: &str, namespace: &str) -> String {
        if name == BULK_PARAMETERS {
            return name.to_string();
        }
        if let Some(key) = name.strip_prefix(PARAMS_PREFIX) {
            return match self.parameters.get(key) {
                Some(target) => format!("{PARAMS_PREFIX}{target}"),
                None => format!("{PARAMS_PREFIX}{}", qualify(key, Some(namespace))),
            };
        }
        self.inputs
            .get(name)
            .or_else(|| self.outputs.get(name))
            .cloned()
            .unwrap_or_else(|| qualify(name, Some(namespace)))
    }
}

impl Pipeline {
    /// Copy of this pipeline scoped in `namespace`.
    ///
    /// Every dataset `x` becomes `namespace.x` and every parameter
    /// `params:x` becomes `params:namespace.x`, except names listed in
    /// `mapping`. Node names are prefixed and node namespaces nest
    /// (`outer.inner`). Mapped inputs must be free inputs of the pipeline,
    /// mapped outputs must be produced by it.
    pub fn namespaced(&self, namespace: &str, mapping: NamespaceMapping) -> Result<Pipeline> {
        let free_inputs = self.inputs();
        let produced = self.all_outputs();
        let parameters: Vec<String> = free_inputs
            .iter()
            .filter_map(|name| name.strip_prefix(PARAMS_PREFIX))
            .map(str::to_string)
            .collect();

        let checks = [
            (
                "inputs",
                unmatched(mapping.inputs.keys(), |n| free_inputs.contains(n)),
            ),
            (
                "outputs",
                unmatched(mapping.outputs.keys(), |n| produced.contains(n)),
            ),
            (
                "parameters",
                unmatched(mapping.parameters.keys(), |n| {
                    parameters.iter().any(|p| p == n)
                }),
            ),
        ];
        for (category, missing) in checks {
            if !missing.is_empty() {
                return Err(PrimedError::PipelineError(format!(
                    "cannot namespace '{namespace}': mapped {category} not found in the pipeline: {}",
                    missing.join(", ")
                )));
            }
        }

        let nodes = self
            .nodes()
            .iter()
            .map(|node| Node {
                name: qualify(&node.name, Some(namespace)),
                namespace: Some(match &node.namespace {
                    Some(inner) => qualify(inner, Some(namespace)),
                    None => namespace.to_string(),
                }),
                inputs: node
                    .inputs
                    .iter()
                    .map(|n| mapping.rename(n, namespace))
                    .collect(),
                outputs: node
                    .outputs
                    .iter()
                    .map(|n| mapping.rename(n, namespace))
                    .collect(),
                func: node.func.clone(),
            })
            .collect();
        Pipeline::new(nodes)
    }
}

fn unmatched<'a>(
    names: impl Iterator<Item = &'a String>,
    known: impl Fn(&str) -> bool,
) -> Vec<String> {
    names.filter(|n| !known(n)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn mock() -> Pipeline {
        let pass = |name: &str, inputs: &[&str], outputs: &[&str]| {
            let n = outputs.len();
            Node::new(
                name,
                inputs.iter().copied(),
                outputs.iter().copied(),
                move |_: &[Value]| Ok(vec![json!(null); n]),
            )
        };
        Pipeline::new(vec![
            pass("identity", &["A", "params:B"], &["C"]),
            pass("square", &["C"], &["D"]),
            pass("cube", &["D"], &["E", "F"]),
        ])
        .unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn qualifies_every_dataset() {
        let p = mock().namespaced("n1", NamespaceMapping::new()).unwrap();
        assert_eq!(
            p.inputs().into_iter().collect::<Vec<_>>(),
            strings(&["n1.A", "params:n1.B"])
        );
        assert_eq!(
            p.outputs().into_iter().collect::<Vec<_>>(),
            strings(&["n1.E", "n1.F"])
        );
        assert!(p.nodes().iter().all(|n| n.namespace.as_deref() == Some("n1")));
        assert_eq!(p.nodes()[0].name, "n1.identity");
    }

    #[test]
    fn mapped_names_stay_outside_the_namespace() {
        let mapping = NamespaceMapping::new().input("A").output("F");
        let p = mock().namespaced("n1", mapping).unwrap();
        assert!(p.inputs().contains("A"));
        assert!(p.outputs().contains("F"));
        assert!(p.outputs().contains("n1.E"));
    }

    #[test]
    fn inputs_can_be_bound_to_another_namespace() {
        let mapping = NamespaceMapping::new().input_as("A", "n2.A");
        let p = mock().namespaced("n1", mapping).unwrap();
        assert!(p.inputs().contains("n2.A"));
    }

    #[test]
    fn parameters_can_be_kept_global() {
        let mapping = NamespaceMapping::new().parameter("params:B");
        let p = mock().namespaced("n1", mapping).unwrap();
        assert!(p.inputs().contains("params:B"));
    }

    #[test]
    fn namespaces_nest() {
        let inner = mock().namespaced("inner", NamespaceMapping::new()).unwrap();
        let outer = inner.namespaced("outer", NamespaceMapping::new()).unwrap();
        assert_eq!(outer.nodes()[0].namespace.as_deref(), Some("outer.inner"));
        assert!(outer.inputs().contains("outer.inner.A"));
        assert!(outer.inputs().contains("params:outer.inner.B"));
    }

    #[test]
    fn unknown_mapping_is_rejected() {
        let err = mock()
            .namespaced("n1", NamespaceMapping::new().input("C"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid pipeline: cannot namespace 'n1': mapped inputs not found in the pipeline: C"
        );
    }
}
