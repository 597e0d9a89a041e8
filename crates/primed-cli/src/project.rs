//! Project files: a catalog, pipeline declarations and optional compilation
//! specs in one JSON document.
//!
//! ```json
//! {
//!   "catalog": { "A": { "type": "memory", "data": 2 } },
//!   "pipelines": [
//!     { "namespace": "n1", "mapping": { "inputs": { "A": "A" } },
//!       "nodes": [ { "name": "double", "func": "sum", "inputs": ["A", "A"], "outputs": ["B"] } ] }
//!   ],
//!   "specs": [ { "namespace": "n1", "outputs": "B" } ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use primed_catalog::{CatalogConfig, DataCatalog};
use primed_pipeline::{NamespaceMapping, Node, Pipeline};
use primed_session::{CompilationSpec, Session};
use primed_types::{PrimedError, Result};

use crate::functions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub catalog: CatalogConfig,
    pub pipelines: Vec<PipelineConfig>,
    /// Inferred from the pipeline when absent.
    pub specs: Option<Vec<CompilationSpec>>,
    /// Directory relative file paths are resolved against. Set by
    /// [`Project::load`] to the project file's directory.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// A group of nodes, optionally wrapped into a namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub namespace: Option<String>,
    pub mapping: MappingConfig,
    pub nodes: Vec<NodeConfig>,
}

/// Names that keep (or change to) an explicit name inside a namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub inputs: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub func: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Project {
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let mut project: Project = serde_json::from_str(&source)?;
        project.base_dir = path.parent().map(Path::to_path_buf);
        Ok(project)
    }

    pub fn build_catalog(&self) -> DataCatalog {
        DataCatalog::from_config(&self.catalog, self.base_dir.as_deref())
    }

    pub fn build_pipeline(&self) -> Result<Pipeline> {
        let parts = self
            .pipelines
            .iter()
            .map(PipelineConfig::build)
            .collect::<Result<Vec<_>>>()?;
        Pipeline::concat(parts)
    }

    pub fn into_session(self) -> Result<(Session, Option<Vec<CompilationSpec>>)> {
        let session = Session::new(self.build_pipeline()?, self.build_catalog());
        Ok((session, self.specs))
    }
}

impl PipelineConfig {
    fn build(&self) -> Result<Pipeline> {
        let nodes = self
            .nodes
            .iter()
            .map(NodeConfig::build)
            .collect::<Result<Vec<_>>>()?;
        let pipeline = Pipeline::new(nodes)?;
        match &self.namespace {
            Some(namespace) => pipeline.namespaced(namespace, self.mapping.to_mapping()),
            None => Ok(pipeline),
        }
    }
}

impl MappingConfig {
    fn to_mapping(&self) -> NamespaceMapping {
        let mut mapping = NamespaceMapping::new();
        for (name, target) in &self.inputs {
            mapping = mapping.input_as(name, target);
        }
        for (name, target) in &self.outputs {
            mapping = mapping.output_as(name, target);
        }
        for (key, target) in &self.parameters {
            mapping = mapping.parameter_as(key, target);
        }
        mapping
    }
}

impl NodeConfig {
    fn build(&self) -> Result<Node> {
        let func = functions::lookup(&self.func).ok_or_else(|| {
            PrimedError::ConfigError(format!(
                "node '{}' uses unknown function '{}'; available: {}",
                self.name,
                self.func,
                functions::BUILTIN_NAMES.join(", ")
            ))
        })?;
        Ok(Node::new(
            self.name.clone(),
            self.inputs.iter().cloned(),
            self.outputs.iter().cloned(),
            func,
        ))
    }
}
