//! The per-namespace result of catalog compilation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use primed_catalog::DatasetRef;

/// The role a dataset plays in a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Inputs,
    Outputs,
    Parameters,
    Artifacts,
    Templates,
    Unmanaged,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Inputs,
        Category::Outputs,
        Category::Parameters,
        Category::Artifacts,
        Category::Templates,
        Category::Unmanaged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Inputs => "inputs",
            Category::Outputs => "outputs",
            Category::Parameters => "parameters",
            Category::Artifacts => "artifacts",
            Category::Templates => "templates",
            Category::Unmanaged => "unmanaged",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Datasets of one namespace, classified by [`Category`].
///
/// Built by the compiler and read-only afterwards: outside this crate an
/// assembly can only be inspected or merged into a new one.
#[derive(Debug, Clone, Default)]
pub struct CatalogAssembly {
    inputs: BTreeMap<String, DatasetRef>,
    outputs: BTreeMap<String, DatasetRef>,
    parameters: BTreeMap<String, DatasetRef>,
    artifacts: BTreeMap<String, DatasetRef>,
    templates: BTreeMap<String, DatasetRef>,
    unmanaged: BTreeMap<String, DatasetRef>,
}

impl CatalogAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> &BTreeMap<String, DatasetRef> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, DatasetRef> {
        &self.outputs
    }

    pub fn parameters(&self) -> &BTreeMap<String, DatasetRef> {
        &self.parameters
    }

    pub fn artifacts(&self) -> &BTreeMap<String, DatasetRef> {
        &self.artifacts
    }

    pub fn templates(&self) -> &BTreeMap<String, DatasetRef> {
        &self.templates
    }

    pub fn unmanaged(&self) -> &BTreeMap<String, DatasetRef> {
        &self.unmanaged
    }

    pub fn category(&self, category: Category) -> &BTreeMap<String, DatasetRef> {
        match category {
            Category::Inputs => &self.inputs,
            Category::Outputs => &self.outputs,
            Category::Parameters => &self.parameters,
            Category::Artifacts => &self.artifacts,
            Category::Templates => &self.templates,
            Category::Unmanaged => &self.unmanaged,
        }
    }

    pub(crate) fn insert(&mut self, category: Category, name: impl Into<String>, dataset: DatasetRef) {
        let map = match category {
            Category::Inputs => &mut self.inputs,
            Category::Outputs => &mut self.outputs,
            Category::Parameters => &mut self.parameters,
            Category::Artifacts => &mut self.artifacts,
            Category::Templates => &mut self.templates,
            Category::Unmanaged => &mut self.unmanaged,
        };
        map.insert(name.into(), dataset);
    }

    /// Category-wise union; entries of `other` win on conflicting names.
    pub fn merge(mut self, other: CatalogAssembly) -> CatalogAssembly {
        self.inputs.extend(other.inputs);
        self.outputs.extend(other.outputs);
        self.parameters.extend(other.parameters);
        self.artifacts.extend(other.artifacts);
        self.templates.extend(other.templates);
        self.unmanaged.extend(other.unmanaged);
        self
    }

    /// Every dataset name across all categories.
    pub fn names(&self) -> BTreeSet<String> {
        Category::ALL
            .iter()
            .flat_map(|c| self.category(*c).keys().cloned())
            .collect()
    }

    /// The single category that owns `name`. Templates only count when the
    /// name is not also an input, output or parameter.
    pub fn primary_category(&self, name: &str) -> Option<Category> {
        [
            Category::Inputs,
            Category::Parameters,
            Category::Outputs,
            Category::Artifacts,
            Category::Unmanaged,
            Category::Templates,
        ]
        .into_iter()
        .find(|c| self.category(*c).contains_key(name))
    }

    pub fn report(&self, namespace: Option<&str>) -> AssemblyReport {
        let keys = |c: Category| -> Vec<String> { self.category(c).keys().cloned().collect() };
        AssemblyReport {
            namespace: namespace.map(str::to_string),
            inputs: keys(Category::Inputs),
            outputs: keys(Category::Outputs),
            parameters: keys(Category::Parameters),
            artifacts: keys(Category::Artifacts),
            templates: keys(Category::Templates),
            unmanaged: keys(Category::Unmanaged),
        }
    }
}

/// Dataset names per category, for logs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub namespace: Option<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub parameters: Vec<String>,
    pub artifacts: Vec<String>,
    pub templates: Vec<String>,
    pub unmanaged: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use primed_catalog::MemoryDataset;
    use std::sync::Arc;

    fn ds() -> DatasetRef {
        Arc::new(MemoryDataset::new())
    }

    #[test]
    fn merge_is_category_wise_and_later_wins() {
        let mut a = CatalogAssembly::new();
        a.insert(Category::Inputs, "A", ds());
        a.insert(Category::Unmanaged, "C", ds());
        let mut b = CatalogAssembly::new();
        let replacement = ds();
        b.insert(Category::Unmanaged, "C", replacement.clone());
        b.insert(Category::Outputs, "E", ds());

        let merged = a.merge(b);
        assert_eq!(merged.names().into_iter().collect::<Vec<_>>(), vec!["A", "C", "E"]);
        assert!(Arc::ptr_eq(&merged.unmanaged()["C"], &replacement));
    }

    #[test]
    fn templates_overlay_does_not_change_primary_category() {
        let mut assembly = CatalogAssembly::new();
        let f = ds();
        assembly.insert(Category::Outputs, "F", f.clone());
        assembly.insert(Category::Templates, "F", f);
        assembly.insert(Category::Templates, "G", ds());

        assert_eq!(assembly.primary_category("F"), Some(Category::Outputs));
        assert_eq!(assembly.primary_category("G"), Some(Category::Templates));
        assert_eq!(assembly.primary_category("Z"), None);
    }

    #[test]
    fn report_lists_names_per_category() {
        let mut assembly = CatalogAssembly::new();
        assembly.insert(Category::Parameters, "params:n1.B", ds());
        let report = assembly.report(Some("n1"));
        assert_eq!(report.parameters, vec!["params:n1.B"]);
        assert!(report.inputs.is_empty());
        assert_eq!(report.namespace.as_deref(), Some("n1"));
    }
}
