//! Pipeline execution against a data catalog.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use primed_catalog::{DataCatalog, MemoryDataset};
use primed_types::{PrimedError, Result};

use crate::pipeline::Pipeline;

// ---------------------------------------------------------------------------
// Runner trait
// ---------------------------------------------------------------------------

/// Executes every node of a pipeline, reading and writing through `catalog`.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, pipeline: &Pipeline, catalog: &mut DataCatalog) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SequentialRunner
// ---------------------------------------------------------------------------

/// Runs nodes one at a time in topological order.
///
/// Free inputs must already be registered in the catalog. Outputs without a
/// dataset get a fresh [`MemoryDataset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialRunner;

impl SequentialRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runner for SequentialRunner {
    async fn run(&self, pipeline: &Pipeline, catalog: &mut DataCatalog) -> Result<()> {
        if let Some(missing) = pipeline.inputs().into_iter().find(|n| !catalog.contains(n)) {
            return Err(PrimedError::DatasetNotFound { name: missing });
        }
        for name in pipeline.all_outputs() {
            if !catalog.contains(&name) {
                catalog.add(name, MemoryDataset::new());
            }
        }

        for node in pipeline.nodes() {
            debug!(node = %node.name, inputs = ?node.inputs, "running node");
            let args = node
                .inputs
                .iter()
                .map(|name| catalog.load(name))
                .collect::<Result<Vec<Value>>>()?;

            let results = node.call(&args).map_err(|message| PrimedError::NodeError {
                node: node.name.clone(),
                message,
            })?;

            for (name, value) in node.outputs.iter().zip(results) {
                catalog.save(name, value)?;
            }
            debug!(node = %node.name, outputs = ?node.outputs, "node completed");
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
