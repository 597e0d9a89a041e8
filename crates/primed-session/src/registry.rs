//! The immutable result of compiling a session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use primed_pipeline::Pipeline;
use primed_types::{namespace_label, PrimedError, Result};

use crate::advisory::Advisory;
use crate::assembly::{AssemblyReport, CatalogAssembly};
use crate::spec::CompilationSpec;

/// Everything needed to serve invocations of one namespace.
#[derive(Debug)]
pub struct NamespaceEntry {
    pub(crate) namespace: Option<String>,
    pub(crate) pipeline: Pipeline,
    pub(crate) assembly: CatalogAssembly,
    pub(crate) declared_outputs: Vec<String>,
    pub(crate) spec: CompilationSpec,
}

impl NamespaceEntry {
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The namespace's sub-pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn assembly(&self) -> &CatalogAssembly {
        &self.assembly
    }

    /// Qualified names of the outputs an invocation returns.
    pub fn declared_outputs(&self) -> &[String] {
        &self.declared_outputs
    }

    pub fn spec(&self) -> &CompilationSpec {
        &self.spec
    }
}

/// Compiled namespaces keyed by namespace, `None` being the default one.
///
/// Built once by [`Session::compile`](crate::Session::compile) and shared
/// behind an `Arc`; nothing in it changes afterwards.
#[derive(Debug)]
pub struct NamespaceRegistry {
    entries: BTreeMap<Option<String>, NamespaceEntry>,
    advisories: Vec<Advisory>,
    compiled_at: DateTime<Utc>,
}

impl NamespaceRegistry {
    pub(crate) fn new(entries: Vec<NamespaceEntry>, advisories: Vec<Advisory>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.namespace.clone(), entry))
                .collect(),
            advisories,
            compiled_at: Utc::now(),
        }
    }

    pub fn get(&self, namespace: Option<&str>) -> Result<&NamespaceEntry> {
        self.entries
            .get(&namespace.map(str::to_string))
            .ok_or_else(|| PrimedError::UnknownNamespace {
                namespace: namespace_label(namespace),
            })
    }

    pub fn contains(&self, namespace: Option<&str>) -> bool {
        self.entries.contains_key(&namespace.map(str::to_string))
    }

    pub fn namespaces(&self) -> Vec<Option<String>> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamespaceEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advisories raised while compiling.
    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    pub fn compiled_at(&self) -> DateTime<Utc> {
        self.compiled_at
    }

    pub fn reports(&self) -> Vec<AssemblyReport> {
        self.iter()
            .map(|entry| entry.assembly.report(entry.namespace()))
            .collect()
    }
}
