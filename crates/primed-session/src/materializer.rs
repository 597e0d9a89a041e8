//! One-time loading of artifact datasets.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use primed_catalog::{ArtifactDataset, DatasetRef};
use primed_types::{PrimedError, Result};

use crate::assembly::{CatalogAssembly, Category};

/// An artifact loaded at compile time and the number of assemblies sharing it.
#[derive(Debug, Clone)]
pub struct MaterializedArtifact {
    pub name: String,
    pub dataset: DatasetRef,
    pub shared_by: usize,
}

/// Load every artifact listed by `assemblies` exactly once and substitute the
/// loaded, read-only dataset into each assembly that lists it.
///
/// Artifacts are deduplicated by name: two namespaces referring to the same
/// dataset share one [`ArtifactDataset`]. Any load failure aborts with
/// [`PrimedError::ArtifactLoad`] and leaves `assemblies` untouched.
pub fn materialize_artifacts(assemblies: &mut [CatalogAssembly]) -> Result<Vec<MaterializedArtifact>> {
    let mut pending: BTreeMap<String, (DatasetRef, usize)> = BTreeMap::new();
    for assembly in assemblies.iter() {
        for (name, dataset) in assembly.artifacts() {
            pending
                .entry(name.clone())
                .or_insert_with(|| (dataset.clone(), 0))
                .1 += 1;
        }
    }

    let mut loaded = Vec::with_capacity(pending.len());
    for (name, (dataset, shared_by)) in pending {
        let value = dataset.load().map_err(|e| PrimedError::ArtifactLoad {
            dataset: name.clone(),
            message: e.to_string(),
        })?;
        let artifact: DatasetRef = Arc::new(ArtifactDataset::new(value, dataset.kind()));
        info!(
            dataset = %name,
            source = dataset.dataset_type(),
            shared_by,
            "materialized artifact"
        );
        loaded.push(MaterializedArtifact {
            name,
            dataset: artifact,
            shared_by,
        });
    }

    for assembly in assemblies.iter_mut() {
        for artifact in &loaded {
            if assembly.artifacts().contains_key(&artifact.name) {
                assembly.insert(Category::Artifacts, artifact.name.clone(), artifact.dataset.clone());
            }
        }
    }
    Ok(loaded)
}
