//! Catalog compilation and per-invocation rendering.
//!
//! A [`Session`] compiles a pipeline's dataset bindings once per namespace
//! into [`CatalogAssembly`] values, loads shared artifacts a single time, and
//! then serves any number of invocations by rendering a fresh catalog from the
//! assembly, running the namespace's sub-pipeline and extracting its outputs.

pub mod advisory;
pub mod assembly;
pub mod compiler;
pub mod events;
pub mod materializer;
pub mod registry;
pub mod renderer;
pub mod session;
pub mod spec;

pub use advisory::{Advisory, AdvisoryKind};
pub use assembly::{AssemblyReport, CatalogAssembly, Category};
pub use compiler::{
    check_spec_against_pipeline, compile_namespace, compile_with_all_pipeline_outputs,
    compile_with_pipeline_inputs,
};
pub use events::{EventEmitter, SessionEvent};
pub use materializer::{materialize_artifacts, MaterializedArtifact};
pub use registry::{NamespaceEntry, NamespaceRegistry};
pub use renderer::{render, Rendered};
pub use session::{Invocation, InvocationRecord, RunOutcome, Session};
pub use spec::{infer_compilation_specs, CompilationSpec};
