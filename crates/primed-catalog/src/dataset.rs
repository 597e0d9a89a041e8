//! The dataset capability interface and the built-in descriptors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use primed_types::{PrimedError, Result};

use crate::attributes::{find, AttributeValue, Attributes};

/// Shared handle to a dataset descriptor.
pub type DatasetRef = Arc<dyn Dataset>;

/// The declared shape of the data a dataset holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    #[default]
    Generic,
    /// Rows of flat records.
    Tabular,
}

impl DatasetKind {
    fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Generic => "generic",
            DatasetKind::Tabular => "tabular",
        }
    }

    fn from_attributes(attributes: &[(String, AttributeValue)]) -> Self {
        match find(attributes, "kind").and_then(AttributeValue::as_str) {
            Some("tabular") => DatasetKind::Tabular,
            _ => DatasetKind::Generic,
        }
    }
}

/// A named, loadable and saveable resource.
///
/// Every descriptor exposes its configuration through [`attributes`](Dataset::attributes)
/// so template detection can walk it uniformly, and can be rebuilt from
/// (possibly resolved) attributes with [`with_attributes`](Dataset::with_attributes).
pub trait Dataset: Send + Sync + fmt::Debug {
    /// Short type name used in logs (e.g. `"MemoryDataset"`).
    fn dataset_type(&self) -> &'static str;

    fn load(&self) -> Result<Value>;

    fn save(&self, data: Value) -> Result<()>;

    /// `true` when the data never leaves process memory.
    fn is_memory_resident(&self) -> bool;

    fn kind(&self) -> DatasetKind {
        DatasetKind::Generic
    }

    /// Configuration fields in declaration order.
    fn attributes(&self) -> Attributes;

    /// Build a new descriptor of the same type from `attributes`.
    fn with_attributes(&self, attributes: Attributes) -> Result<DatasetRef>;

    /// Deep copy, independent of `self`.
    fn fresh_copy(&self) -> DatasetRef;
}

// ---------------------------------------------------------------------------
// MemoryDataset
// ---------------------------------------------------------------------------

/// In-process data slot.
pub struct MemoryDataset {
    data: RwLock<Option<Value>>,
    kind: DatasetKind,
}

impl MemoryDataset {
    /// An empty slot, filled by the first `save`.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(None),
            kind: DatasetKind::Generic,
        }
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            data: RwLock::new(Some(data)),
            kind: DatasetKind::Generic,
        }
    }

    pub fn with_kind(mut self, kind: DatasetKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn has_data(&self) -> bool {
        self.data.read().is_some()
    }
}

impl Default for MemoryDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDataset")
            .field("data", &*self.data.read())
            .field("kind", &self.kind)
            .finish()
    }
}

impl Dataset for MemoryDataset {
    fn dataset_type(&self) -> &'static str {
        "MemoryDataset"
    }

    fn load(&self) -> Result<Value> {
        self.data
            .read()
            .clone()
            .ok_or_else(|| PrimedError::DatasetError {
                dataset: self.dataset_type().into(),
                message: "no data has been saved yet".into(),
            })
    }

    fn save(&self, data: Value) -> Result<()> {
        *self.data.write() = Some(data);
        Ok(())
    }

    fn is_memory_resident(&self) -> bool {
        true
    }

    fn kind(&self) -> DatasetKind {
        self.kind
    }

    fn attributes(&self) -> Attributes {
        vec![(
            "kind".into(),
            AttributeValue::String(self.kind.as_str().into()),
        )]
    }

    fn with_attributes(&self, attributes: Attributes) -> Result<DatasetRef> {
        Ok(Arc::new(MemoryDataset {
            data: RwLock::new(self.data.read().clone()),
            kind: DatasetKind::from_attributes(&attributes),
        }))
    }

    fn fresh_copy(&self) -> DatasetRef {
        Arc::new(MemoryDataset {
            data: RwLock::new(self.data.read().clone()),
            kind: self.kind,
        })
    }
}

// ---------------------------------------------------------------------------
// ArtifactDataset
// ---------------------------------------------------------------------------

/// A value loaded once at compile time and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct ArtifactDataset {
    value: Arc<Value>,
    kind: DatasetKind,
}

impl ArtifactDataset {
    pub fn new(value: Value, kind: DatasetKind) -> Self {
        Self {
            value: Arc::new(value),
            kind,
        }
    }

    /// The shared materialized value.
    pub fn value(&self) -> &Arc<Value> {
        &self.value
    }
}

impl Dataset for ArtifactDataset {
    fn dataset_type(&self) -> &'static str {
        "ArtifactDataset"
    }

    fn load(&self) -> Result<Value> {
        Ok(self.value.as_ref().clone())
    }

    fn save(&self, _data: Value) -> Result<()> {
        Err(PrimedError::ReadOnlyDataset {
            dataset: self.dataset_type().into(),
        })
    }

    fn is_memory_resident(&self) -> bool {
        true
    }

    fn kind(&self) -> DatasetKind {
        self.kind
    }

    fn attributes(&self) -> Attributes {
        Vec::new()
    }

    fn with_attributes(&self, _attributes: Attributes) -> Result<DatasetRef> {
        Ok(Arc::new(self.clone()))
    }

    fn fresh_copy(&self) -> DatasetRef {
        Arc::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// JsonDataset
// ---------------------------------------------------------------------------

/// A JSON document on the local filesystem.
#[derive(Debug, Clone)]
pub struct JsonDataset {
    filepath: PathBuf,
    kind: DatasetKind,
}

impl JsonDataset {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
            kind: DatasetKind::Generic,
        }
    }

    pub fn with_kind(mut self, kind: DatasetKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    fn error(&self, message: impl fmt::Display) -> PrimedError {
        PrimedError::DatasetError {
            dataset: self.filepath.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl Dataset for JsonDataset {
    fn dataset_type(&self) -> &'static str {
        "JsonDataset"
    }

    fn load(&self) -> Result<Value> {
        debug!(path = %self.filepath.display(), "loading JSON dataset");
        let data = std::fs::read_to_string(&self.filepath).map_err(|e| self.error(e))?;
        serde_json::from_str(&data).map_err(|e| self.error(e))
    }

    fn save(&self, data: Value) -> Result<()> {
        if let Some(parent) = self.filepath.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.error(e))?;
            }
        }
        debug!(path = %self.filepath.display(), "saving JSON dataset");
        let json = serde_json::to_string_pretty(&data)?;
        std::fs::write(&self.filepath, json).map_err(|e| self.error(e))
    }

    fn is_memory_resident(&self) -> bool {
        false
    }

    fn kind(&self) -> DatasetKind {
        self.kind
    }

    fn attributes(&self) -> Attributes {
        vec![
            ("filepath".into(), AttributeValue::Path(self.filepath.clone())),
            (
                "kind".into(),
                AttributeValue::String(self.kind.as_str().into()),
            ),
        ]
    }

    fn with_attributes(&self, attributes: Attributes) -> Result<DatasetRef> {
        let filepath = find(&attributes, "filepath")
            .and_then(AttributeValue::as_str)
            .map(PathBuf::from)
            .ok_or_else(|| self.error("attribute 'filepath' must be a path or string"))?;
        Ok(Arc::new(JsonDataset {
            filepath,
            kind: DatasetKind::from_attributes(&attributes),
        }))
    }

    fn fresh_copy(&self) -> DatasetRef {
        Arc::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_dataset_save_then_load() {
        let ds = MemoryDataset::new();
        assert!(!ds.has_data());
        assert!(ds.load().is_err());
        ds.save(json!({"x": 1})).unwrap();
        assert_eq!(ds.load().unwrap(), json!({"x": 1}));
    }

    #[test]
    fn memory_fresh_copy_is_independent() {
        let ds = MemoryDataset::with_data(json!(1));
        let copy = ds.fresh_copy();
        copy.save(json!(2)).unwrap();
        assert_eq!(ds.load().unwrap(), json!(1));
        assert_eq!(copy.load().unwrap(), json!(2));
    }

    #[test]
    fn memory_kind_survives_rebuild() {
        let ds = MemoryDataset::new().with_kind(DatasetKind::Tabular);
        let rebuilt = ds.with_attributes(ds.attributes()).unwrap();
        assert_eq!(rebuilt.kind(), DatasetKind::Tabular);
    }

    #[test]
    fn artifact_is_read_only_and_shared() {
        let ds = ArtifactDataset::new(json!([1, 2]), DatasetKind::Generic);
        let err = ds.save(json!(0)).unwrap_err();
        assert!(matches!(err, PrimedError::ReadOnlyDataset { .. }));
        let copy = ds.clone();
        assert!(Arc::ptr_eq(ds.value(), copy.value()));
        assert_eq!(copy.load().unwrap(), json!([1, 2]));
    }

    #[test]
    fn json_dataset_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ds = JsonDataset::new(dir.path().join("nested/out.json"));
        assert!(!ds.is_memory_resident());
        ds.save(json!({"results": 64})).unwrap();
        assert_eq!(ds.load().unwrap(), json!({"results": 64}));
    }

    #[test]
    fn json_dataset_missing_file_names_the_path() {
        let ds = JsonDataset::new("/definitely/not/here.json");
        let err = ds.load().unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }

    #[test]
    fn json_dataset_rebuilds_from_string_filepath() {
        let ds = JsonDataset::new("a.json");
        let rebuilt = ds
            .with_attributes(vec![(
                "filepath".into(),
                AttributeValue::String("b.json".into()),
            )])
            .unwrap();
        assert_eq!(
            rebuilt.attributes()[0].1,
            AttributeValue::Path(PathBuf::from("b.json"))
        );
    }
}
