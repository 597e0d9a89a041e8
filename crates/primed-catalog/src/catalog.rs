//! Name → dataset registry and its configuration format.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use primed_types::{PrimedError, Result};

use crate::dataset::{DatasetKind, DatasetRef, JsonDataset, MemoryDataset};

/// A registry of named datasets.
///
/// Cloning a `DataCatalog` is shallow: both catalogs share the same dataset
/// handles.
#[derive(Debug, Clone, Default)]
pub struct DataCatalog {
    datasets: BTreeMap<String, DatasetRef>,
}

impl DataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from configuration. Relative file paths are resolved
    /// against `base_dir` when given.
    pub fn from_config(config: &CatalogConfig, base_dir: Option<&Path>) -> Self {
        let mut catalog = Self::new();
        for (name, entry) in &config.datasets {
            catalog.add_ref(name.clone(), entry.build(base_dir));
        }
        catalog
    }

    /// Register `dataset` under `name`, replacing any previous entry.
    pub fn add(&mut self, name: impl Into<String>, dataset: impl crate::Dataset + 'static) {
        self.datasets.insert(name.into(), Arc::new(dataset));
    }

    pub fn add_ref(&mut self, name: impl Into<String>, dataset: DatasetRef) {
        self.datasets.insert(name.into(), dataset);
    }

    pub fn add_all<I>(&mut self, datasets: I)
    where
        I: IntoIterator<Item = (String, DatasetRef)>,
    {
        self.datasets.extend(datasets);
    }

    pub fn get(&self, name: &str) -> Option<&DatasetRef> {
        self.datasets.get(name)
    }

    /// Like [`get`](Self::get) but fails with `DatasetNotFound`.
    pub fn dataset(&self, name: &str) -> Result<&DatasetRef> {
        self.datasets
            .get(name)
            .ok_or_else(|| PrimedError::DatasetNotFound { name: name.into() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    pub fn load(&self, name: &str) -> Result<Value> {
        self.dataset(name)?.load().map_err(|e| relabel(e, name))
    }

    pub fn save(&self, name: &str, data: Value) -> Result<()> {
        self.dataset(name)?.save(data).map_err(|e| relabel(e, name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DatasetRef)> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Attach the catalog name to dataset-level failures.
fn relabel(err: PrimedError, name: &str) -> PrimedError {
    match err {
        PrimedError::DatasetError { message, .. } => PrimedError::DatasetError {
            dataset: name.into(),
            message,
        },
        PrimedError::ReadOnlyDataset { .. } => PrimedError::ReadOnlyDataset {
            dataset: name.into(),
        },
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Catalog configuration: dataset name → entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogConfig {
    pub datasets: BTreeMap<String, DatasetConfig>,
}

/// One catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetConfig {
    Memory {
        #[serde(default)]
        data: Option<Value>,
        #[serde(default)]
        kind: DatasetKind,
    },
    Json {
        filepath: PathBuf,
        #[serde(default)]
        kind: DatasetKind,
    },
}

impl DatasetConfig {
    pub fn build(&self, base_dir: Option<&Path>) -> DatasetRef {
        match self {
            DatasetConfig::Memory { data, kind } => {
                let ds = match data {
                    Some(value) => MemoryDataset::with_data(value.clone()),
                    None => MemoryDataset::new(),
                };
                Arc::new(ds.with_kind(*kind))
            }
            DatasetConfig::Json { filepath, kind } => {
                let path = match base_dir {
                    Some(base) if filepath.is_relative() => base.join(filepath),
                    _ => filepath.clone(),
                };
                Arc::new(JsonDataset::new(path).with_kind(*kind))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_load_save() {
        let mut catalog = DataCatalog::new();
        catalog.add("A", MemoryDataset::with_data(json!(2)));
        catalog.add("B", MemoryDataset::new());
        assert_eq!(catalog.load("A").unwrap(), json!(2));
        catalog.save("B", json!("x")).unwrap();
        assert_eq!(catalog.load("B").unwrap(), json!("x"));
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn missing_dataset_is_reported_by_name() {
        let catalog = DataCatalog::new();
        let err = catalog.load("ghost").unwrap_err();
        assert!(matches!(err, PrimedError::DatasetNotFound { ref name } if name == "ghost"));
    }

    #[test]
    fn dataset_errors_carry_catalog_name() {
        let mut catalog = DataCatalog::new();
        catalog.add("empty", MemoryDataset::new());
        let err = catalog.load("empty").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Dataset 'empty' failed: no data has been saved yet"
        );
    }

    #[test]
    fn clone_is_shallow() {
        let mut catalog = DataCatalog::new();
        catalog.add("A", MemoryDataset::new());
        let copy = catalog.clone();
        copy.save("A", json!(1)).unwrap();
        assert_eq!(catalog.load("A").unwrap(), json!(1));
    }

    #[test]
    fn from_config_builds_entries() {
        let config: CatalogConfig = serde_json::from_value(json!({
            "A": {"type": "memory", "data": 2},
            "rows": {"type": "memory", "kind": "tabular"},
            "F": {"type": "json", "filepath": "out/f.json"}
        }))
        .unwrap();
        let catalog = DataCatalog::from_config(&config, Some(Path::new("/srv/project")));

        assert_eq!(catalog.load("A").unwrap(), json!(2));
        assert_eq!(catalog.get("rows").unwrap().kind(), DatasetKind::Tabular);
        let f = catalog.get("F").unwrap();
        assert!(!f.is_memory_resident());
        assert_eq!(
            f.attributes()[0].1.as_str(),
            Some("/srv/project/out/f.json")
        );
    }

    #[test]
    fn unknown_config_type_is_rejected() {
        let result: std::result::Result<CatalogConfig, _> =
            serde_json::from_value(json!({"A": {"type": "parquet"}}));
        assert!(result.is_err());
    }
}
