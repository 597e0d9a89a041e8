//! The session: compile once, then render and run per invocation.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use primed_catalog::{DataCatalog, ValueMap};
use primed_pipeline::{Pipeline, Runner, SequentialRunner};
use primed_types::{namespace_label, PrimedError, Result};

use crate::advisory::{Advisory, AdvisoryKind};
use crate::compiler::compile_namespace;
use crate::events::{EventEmitter, SessionEvent};
use crate::materializer::materialize_artifacts;
use crate::registry::{NamespaceEntry, NamespaceRegistry};
use crate::renderer::{self, Rendered, RUN_ID_VARIABLE};
use crate::spec::{infer_compilation_specs, CompilationSpec};

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One request against a compiled namespace.
///
/// Input and parameter names are namespace-relative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Invocation {
    pub namespace: Option<String>,
    pub inputs: ValueMap,
    pub parameters: ValueMap,
    pub template_variables: ValueMap,
    /// Generated when absent.
    pub run_id: Option<String>,
}

impl Invocation {
    /// An invocation of the default namespace.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn with_inputs(mut self, inputs: ValueMap) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: ValueMap) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_template_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.template_variables.insert(name.into(), value);
        self
    }

    pub fn with_template_variables(mut self, variables: ValueMap) -> Self {
        self.template_variables.extend(variables);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// Timing and diagnostics of a finished invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub run_id: String,
    pub namespace: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub advisories: usize,
}

/// What [`Session::run`] returns.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub output: Value,
    pub advisories: Vec<Advisory>,
    pub record: InvocationRecord,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Owns a pipeline and its base catalog, compiles them into a
/// [`NamespaceRegistry`] and serves invocations against it.
///
/// Compilation needs `&mut self`; rendering and running only read the
/// registry, so a compiled session can be shared behind an `Arc`.
pub struct Session {
    pipeline: Pipeline,
    catalog: DataCatalog,
    runner: Arc<dyn Runner>,
    registry: Option<Arc<NamespaceRegistry>>,
    events: EventEmitter,
}

impl Session {
    pub fn new(pipeline: Pipeline, catalog: DataCatalog) -> Self {
        Self {
            pipeline,
            catalog,
            runner: Arc::new(SequentialRunner::new()),
            registry: None,
            events: EventEmitter::default(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn is_compiled(&self) -> bool {
        self.registry.is_some()
    }

    /// The compiled registry, for callers that pass it around explicitly.
    pub fn registry(&self) -> Result<Arc<NamespaceRegistry>> {
        self.registry.clone().ok_or(PrimedError::NotCompiled)
    }

    /// Drop the compiled registry so the session can be compiled again.
    pub fn reset(&mut self) {
        self.registry = None;
    }

    /// Compile every namespace named by `specs`, or by the specs inferred from
    /// the pipeline when `specs` is `None`.
    ///
    /// The registry is stored only when every namespace compiled and every
    /// artifact loaded.
    pub fn compile(&mut self, specs: Option<Vec<CompilationSpec>>) -> Result<Arc<NamespaceRegistry>> {
        if self.registry.is_some() {
            return Err(PrimedError::AlreadyCompiled);
        }
        let started = Instant::now();

        let mut advisories = Vec::new();
        let specs = match specs {
            None => infer_compilation_specs(&self.pipeline),
            Some(specs) => {
                check_unique_namespaces(&specs)?;
                if let Some(advisory) = namespace_mismatch(&specs, &self.pipeline) {
                    advisories.push(advisory);
                }
                specs
            }
        };

        let mut pipelines = Vec::with_capacity(specs.len());
        let mut assemblies = Vec::with_capacity(specs.len());
        for spec in &specs {
            let sub = self.pipeline.filter(spec.namespace());
            let (assembly, found) = compile_namespace(&sub, &self.catalog, spec)?;
            advisories.extend(found);
            pipelines.push(sub);
            assemblies.push(assembly);
        }
        let artifacts = materialize_artifacts(&mut assemblies)?;

        let entries = specs
            .into_iter()
            .zip(pipelines)
            .zip(assemblies)
            .map(|((spec, pipeline), assembly)| NamespaceEntry {
                namespace: spec.namespace.clone(),
                declared_outputs: spec.namespaced_outputs(),
                pipeline,
                assembly,
                spec,
            })
            .collect();
        let registry = Arc::new(NamespaceRegistry::new(entries, advisories));

        for advisory in registry.advisories() {
            advisory.log();
            self.events.emit(SessionEvent::AdvisoryRaised {
                advisory: advisory.clone(),
            });
        }
        for artifact in &artifacts {
            self.events.emit(SessionEvent::ArtifactMaterialized {
                dataset: artifact.name.clone(),
                shared_by: artifact.shared_by,
            });
        }
        let namespaces: Vec<String> = registry
            .namespaces()
            .iter()
            .map(|ns| namespace_label(ns.as_deref()))
            .collect();
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            namespaces = ?namespaces,
            artifacts = artifacts.len(),
            duration_ms,
            "session compiled"
        );
        self.events.emit(SessionEvent::CompileCompleted {
            namespaces,
            artifacts: artifacts.len(),
            duration_ms,
        });

        self.registry = Some(registry.clone());
        Ok(registry)
    }

    /// Render the executable catalog for `invocation` without running it.
    pub fn render(&self, invocation: &Invocation) -> Result<Rendered> {
        let registry = self.registry()?;
        let entry = registry.get(invocation.namespace.as_deref())?;
        renderer::render(entry.assembly(), invocation)
    }

    /// Qualified names of the outputs `namespace` returns.
    pub fn outputs_for(&self, namespace: Option<&str>) -> Result<Vec<String>> {
        let registry = self.registry()?;
        let entry = registry.get(namespace)?;
        Ok(entry.declared_outputs().to_vec())
    }

    /// Render, execute and extract the outputs of one invocation.
    pub async fn run(&self, mut invocation: Invocation) -> Result<RunOutcome> {
        let registry = self.registry()?;
        let run_id = invocation
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        invocation.run_id = Some(run_id.clone());
        invocation
            .template_variables
            .entry(RUN_ID_VARIABLE)
            .or_insert_with(|| Value::String(run_id.clone()));

        let namespace = namespace_label(invocation.namespace.as_deref());
        let started_at = Utc::now();
        let started = Instant::now();
        self.events.emit(SessionEvent::InvocationStarted {
            run_id: run_id.clone(),
            namespace: namespace.clone(),
        });

        let (output, advisories) = match self.execute(&registry, &invocation).await {
            Ok(result) => result,
            Err(e) => {
                warn!(run_id = %run_id, namespace = %namespace, error = %e, "invocation failed");
                self.events.emit(SessionEvent::InvocationFailed {
                    run_id,
                    namespace,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        for advisory in &advisories {
            self.events.emit(SessionEvent::AdvisoryRaised {
                advisory: advisory.clone(),
            });
        }
        let duration_ms = started.elapsed().as_millis() as u64;
        self.events.emit(SessionEvent::InvocationCompleted {
            run_id: run_id.clone(),
            namespace,
            duration_ms,
        });

        let record = InvocationRecord {
            run_id: run_id.clone(),
            namespace: invocation.namespace.clone(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            advisories: advisories.len(),
        };
        Ok(RunOutcome {
            run_id,
            output,
            advisories,
            record,
        })
    }

    /// Compile with inferred specs unless already compiled, then run.
    pub async fn compile_and_run(&mut self, invocation: Invocation) -> Result<RunOutcome> {
        if !self.is_compiled() {
            self.compile(None)?;
        }
        self.run(invocation).await
    }

    async fn execute(
        &self,
        registry: &NamespaceRegistry,
        invocation: &Invocation,
    ) -> Result<(Value, Vec<Advisory>)> {
        let entry = registry.get(invocation.namespace.as_deref())?;
        let Rendered {
            mut catalog,
            advisories,
        } = renderer::render(entry.assembly(), invocation)?;
        self.runner.run(entry.pipeline(), &mut catalog).await?;
        let output = extract_outputs(entry, &catalog)?;
        Ok((output, advisories))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_unique_namespaces(specs: &[CompilationSpec]) -> Result<()> {
    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<String> = specs
        .iter()
        .filter(|spec| !seen.insert(spec.namespace.clone()))
        .map(|spec| namespace_label(spec.namespace()))
        .collect();
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(PrimedError::DuplicateNamespace {
            namespaces: duplicates.into_iter().collect(),
        })
    }
}

fn namespace_mismatch(specs: &[CompilationSpec], pipeline: &Pipeline) -> Option<Advisory> {
    let given: BTreeSet<Option<String>> = specs.iter().map(|s| s.namespace.clone()).collect();
    let actual = pipeline.namespaces();
    if given == actual {
        return None;
    }
    Some(Advisory::new(
        AdvisoryKind::NamespaceMismatch,
        None,
        format!(
            "compilation specs name namespaces [{}] but the pipeline has [{}]",
            labels(&given),
            labels(&actual)
        ),
        given
            .symmetric_difference(&actual)
            .map(|ns| namespace_label(ns.as_deref())),
    ))
}

fn labels(namespaces: &BTreeSet<Option<String>>) -> String {
    namespaces
        .iter()
        .map(|ns| namespace_label(ns.as_deref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Several declared outputs give an object keyed by qualified name, one gives
/// its bare value, none gives every memory-resident free output.
fn extract_outputs(entry: &NamespaceEntry, catalog: &DataCatalog) -> Result<Value> {
    match entry.declared_outputs() {
        [] => {
            let mut outputs = Map::new();
            for name in entry.pipeline().outputs() {
                if let Some(dataset) = catalog.get(&name) {
                    if dataset.is_memory_resident() {
                        let value = dataset.load()?;
                        outputs.insert(name, value);
                    }
                }
            }
            Ok(Value::Object(outputs))
        }
        [single] => catalog.load(single),
        many => many
            .iter()
            .map(|name| Ok((name.clone(), catalog.load(name)?)))
            .collect::<Result<Map<String, Value>>>()
            .map(Value::Object),
    }
}
