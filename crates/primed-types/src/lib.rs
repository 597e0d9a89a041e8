//! Shared types and errors for the primed catalog compiler.
//!
//! This crate provides the foundational types used across all other primed crates:
//! - `PrimedError`: unified error taxonomy for compile, render and run
//! - `Result`: crate-wide result alias
//! - `namespace_label`: how a namespace is spelled in diagnostics

/// Label used in diagnostics for the default (unnamed) namespace.
pub const DEFAULT_NAMESPACE_LABEL: &str = "<default>";

/// Render an optional namespace for error messages and logs.
pub fn namespace_label(namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => ns.to_string(),
        _ => DEFAULT_NAMESPACE_LABEL.to_string(),
    }
}

/// Unified error type for all primed subsystems.
#[derive(Debug, thiserror::Error)]
pub enum PrimedError {
    // === Compile-time errors ===
    #[error(
        "Compilation spec for namespace '{namespace}' declares {category} not found in the pipeline: {}",
        .missing.join(", ")
    )]
    SpecMismatch {
        namespace: String,
        category: String,
        missing: Vec<String>,
    },

    #[error("Duplicate namespaces in compilation specs: {}", .namespaces.join(", "))]
    DuplicateNamespace { namespaces: Vec<String> },

    #[error("Failed to materialize artifact '{dataset}': {message}")]
    ArtifactLoad { dataset: String, message: String },

    #[error("Session is already compiled; call reset() before compiling again")]
    AlreadyCompiled,

    // === Invocation errors ===
    #[error(
        "Missing inputs for namespace '{namespace}': {}",
        .missing.join(", ")
    )]
    MissingInputs {
        namespace: String,
        missing: Vec<String>,
    },

    #[error("Namespace '{namespace}' is not present in the compiled registry")]
    UnknownNamespace { namespace: String },

    #[error("Session is not compiled")]
    NotCompiled,

    // === Dataset errors ===
    #[error("Dataset '{name}' not found in the catalog")]
    DatasetNotFound { name: String },

    #[error("Dataset '{dataset}' is read-only")]
    ReadOnlyDataset { dataset: String },

    #[error("Dataset '{dataset}' failed: {message}")]
    DatasetError { dataset: String, message: String },

    // === Pipeline errors ===
    #[error("Node '{node}' failed: {message}")]
    NodeError { node: String, message: String },

    #[error("Invalid pipeline: {0}")]
    PipelineError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl PrimedError {
    /// Returns `true` if the error concerns a single invocation and leaves the
    /// compiled session usable.
    pub fn is_invocation_error(&self) -> bool {
        matches!(
            self,
            PrimedError::MissingInputs { .. }
                | PrimedError::UnknownNamespace { .. }
                | PrimedError::NodeError { .. }
        )
    }

    /// Returns `true` if the error was raised by the one-time compile phase.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            PrimedError::SpecMismatch { .. }
                | PrimedError::DuplicateNamespace { .. }
                | PrimedError::ArtifactLoad { .. }
                | PrimedError::AlreadyCompiled
        )
    }

    /// Maps the error to an HTTP status code for server mode.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            PrimedError::MissingInputs { .. } => Some(400),
            PrimedError::UnknownNamespace { .. } => Some(404),
            PrimedError::NotCompiled => Some(503),
            PrimedError::NodeError { .. } | PrimedError::DatasetError { .. } => Some(500),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, PrimedError>`.
pub type Result<T> = std::result::Result<T, PrimedError>;
