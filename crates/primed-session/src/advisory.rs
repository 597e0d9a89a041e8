use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use primed_types::namespace_label;

/// What an [`Advisory`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    /// A requested output is not memory-resident and costs an I/O round trip.
    OutputIoCost,
    /// A non-memory output is written although the namespace does not request it.
    UnrequestedOutput,
    /// Compilation specs name namespaces that differ from the pipeline's.
    NamespaceMismatch,
    UnusedInputs,
    UnusedParameters,
    /// Catalog parameters rendered from their defaults.
    DefaultParameters,
    /// Template variables referenced but not supplied.
    MissingTemplateVariables,
    UnusedTemplateVariables,
}

impl fmt::Display for AdvisoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdvisoryKind::OutputIoCost => "output_io_cost",
            AdvisoryKind::UnrequestedOutput => "unrequested_output",
            AdvisoryKind::NamespaceMismatch => "namespace_mismatch",
            AdvisoryKind::UnusedInputs => "unused_inputs",
            AdvisoryKind::UnusedParameters => "unused_parameters",
            AdvisoryKind::DefaultParameters => "default_parameters",
            AdvisoryKind::MissingTemplateVariables => "missing_template_variables",
            AdvisoryKind::UnusedTemplateVariables => "unused_template_variables",
        };
        f.write_str(s)
    }
}

/// A non-fatal finding raised while compiling or rendering.
///
/// `names` is always sorted so messages are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub namespace: Option<String>,
    pub message: String,
    pub names: Vec<String>,
}

impl Advisory {
    pub fn new<I, S>(
        kind: AdvisoryKind,
        namespace: Option<&str>,
        message: impl Into<String>,
        names: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self {
            kind,
            namespace: namespace.map(str::to_string),
            message: message.into(),
            names,
        }
    }

    pub fn log(&self) {
        warn!(
            kind = %self.kind,
            namespace = %namespace_label(self.namespace.as_deref()),
            names = ?self.names,
            "{}",
            self.message
        );
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            namespace_label(self.namespace.as_deref()),
            self.kind,
            self.message,
            self.names.join(", ")
        )
    }
}
