//! Classification of a namespace's datasets into a [`CatalogAssembly`].
//!
//! Compilation is purely structural: it never loads data. Artifacts are only
//! marked here and loaded afterwards by the materializer.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use primed_catalog::{
    scan_dataset_for_placeholders, DataCatalog, DatasetName, DatasetRef, MemoryDataset,
};
use primed_pipeline::Pipeline;
use primed_types::{namespace_label, PrimedError, Result};

use crate::advisory::{Advisory, AdvisoryKind};
use crate::assembly::{CatalogAssembly, Category};
use crate::spec::CompilationSpec;

// ---------------------------------------------------------------------------
// Consistency check
// ---------------------------------------------------------------------------

/// Fail fast when `spec` names datasets the pipeline does not have.
///
/// Inputs, parameters and artifacts are checked against the free inputs of
/// the namespace's pipeline, outputs against everything it produces.
pub fn check_spec_against_pipeline(
    spec: &CompilationSpec,
    pipeline_inputs: &BTreeSet<String>,
    all_outputs: &BTreeSet<String>,
) -> Result<()> {
    let checks = [
        ("inputs", spec.namespaced_inputs(), pipeline_inputs),
        ("parameters", spec.prefixed_namespaced_parameters(), pipeline_inputs),
        ("artifacts", spec.namespaced_artifacts(), pipeline_inputs),
        ("outputs", spec.namespaced_outputs(), all_outputs),
    ];
    for (category, declared, available) in checks {
        let missing: BTreeSet<String> = declared
            .into_iter()
            .filter(|name| !available.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(PrimedError::SpecMismatch {
                namespace: namespace_label(spec.namespace()),
                category: category.to_string(),
                missing: missing.into_iter().collect(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn is_spec_parameter(name: &str, spec: &CompilationSpec) -> bool {
    let parsed = DatasetName::parse(name, spec.namespace());
    if parsed.is_bulk_parameters() {
        return true;
    }
    parsed
        .parameter_key()
        .is_some_and(|key| spec.namespaced_parameters().contains(&key))
}

/// Classify the free inputs of a namespace. First match wins: inputs,
/// parameters, templates, artifacts, unmanaged.
pub fn compile_with_pipeline_inputs(
    pipeline_inputs: &BTreeMap<String, DatasetRef>,
    spec: &CompilationSpec,
) -> CatalogAssembly {
    let inputs = spec.namespaced_inputs();
    let mut assembly = CatalogAssembly::new();

    for (name, dataset) in pipeline_inputs {
        let category = if inputs.contains(name) {
            Category::Inputs
        } else if is_spec_parameter(name, spec) {
            Category::Parameters
        } else if scan_dataset_for_placeholders(dataset.as_ref()) {
            Category::Templates
        } else if spec.is_artifact(name) {
            Category::Artifacts
        } else {
            Category::Unmanaged
        };
        assembly.insert(category, name.clone(), dataset.clone());
    }
    assembly
}

/// Classify everything the namespace produces.
///
/// Requested outputs go to `outputs` (and also to `templates` when they carry
/// placeholders); the rest go to `templates` or `unmanaged`. Non-memory
/// outputs raise I/O advisories.
pub fn compile_with_all_pipeline_outputs(
    all_outputs: &BTreeMap<String, DatasetRef>,
    spec: &CompilationSpec,
) -> (CatalogAssembly, Vec<Advisory>) {
    let requested = spec.namespaced_outputs();
    let mut assembly = CatalogAssembly::new();
    let mut io_cost = Vec::new();
    let mut unrequested = Vec::new();

    for (name, dataset) in all_outputs {
        let templated = scan_dataset_for_placeholders(dataset.as_ref());
        if requested.contains(name) {
            if !dataset.is_memory_resident() {
                io_cost.push(name.clone());
            }
            assembly.insert(Category::Outputs, name.clone(), dataset.clone());
            if templated {
                assembly.insert(Category::Templates, name.clone(), dataset.clone());
            }
        } else {
            if !dataset.is_memory_resident() && !requested.is_empty() {
                unrequested.push(name.clone());
            }
            let category = if templated {
                Category::Templates
            } else {
                Category::Unmanaged
            };
            assembly.insert(category, name.clone(), dataset.clone());
        }
    }

    let mut advisories = Vec::new();
    if !io_cost.is_empty() {
        advisories.push(Advisory::new(
            AdvisoryKind::OutputIoCost,
            spec.namespace(),
            "requested outputs are not memory-resident and cost an I/O operation per invocation",
            io_cost,
        ));
    }
    if !unrequested.is_empty() {
        advisories.push(Advisory::new(
            AdvisoryKind::UnrequestedOutput,
            spec.namespace(),
            format!(
                "outputs cost an I/O operation without being requested; requested outputs are {}",
                requested.join(", ")
            ),
            unrequested,
        ));
    }
    (assembly, advisories)
}

// ---------------------------------------------------------------------------
// Namespace compilation
// ---------------------------------------------------------------------------

/// Compile one namespace of `pipeline` against the base `catalog`.
///
/// `pipeline` must already be filtered to the namespace. Declared inputs and
/// outputs absent from the catalog get an empty [`MemoryDataset`]; any other
/// missing free input is an error.
pub fn compile_namespace(
    pipeline: &Pipeline,
    catalog: &DataCatalog,
    spec: &CompilationSpec,
) -> Result<(CatalogAssembly, Vec<Advisory>)> {
    let free_inputs = pipeline.inputs();
    let produced = pipeline.all_outputs();
    check_spec_against_pipeline(spec, &free_inputs, &produced)?;

    let declared_inputs = spec.namespaced_inputs();
    let mut inputs = BTreeMap::new();
    for name in free_inputs {
        let dataset = match catalog.get(&name) {
            Some(ds) => ds.clone(),
            None if declared_inputs.contains(&name) => Arc::new(MemoryDataset::new()) as DatasetRef,
            None => return Err(PrimedError::DatasetNotFound { name }),
        };
        inputs.insert(name, dataset);
    }

    let outputs: BTreeMap<String, DatasetRef> = produced
        .into_iter()
        .map(|name| {
            let dataset = catalog
                .get(&name)
                .cloned()
                .unwrap_or_else(|| Arc::new(MemoryDataset::new()) as DatasetRef);
            (name, dataset)
        })
        .collect();

    let from_inputs = compile_with_pipeline_inputs(&inputs, spec);
    let (from_outputs, advisories) = compile_with_all_pipeline_outputs(&outputs, spec);
    let assembly = from_inputs.merge(from_outputs);

    let report = assembly.report(spec.namespace());
    info!(
        namespace = %namespace_label(spec.namespace()),
        inputs = ?report.inputs,
        outputs = ?report.outputs,
        parameters = ?report.parameters,
        artifacts = ?report.artifacts,
        templates = ?report.templates,
        unmanaged = ?report.unmanaged,
        "compiled catalog"
    );
    Ok((assembly, advisories))
}
