//! Namespace qualification and parameter naming.
//!
//! Dataset names live in a flat string space. A namespace `ns` scopes a
//! dataset `x` as `ns.x`; parameters are spelled `params:x` (or `params:ns.x`
//! inside a namespace) and the literal `parameters` is the bulk mapping of all
//! parameters. [`DatasetName`] parses that convention once so callers never
//! re-inspect raw strings.

use std::fmt;

/// Prefix marking a single-parameter dataset.
pub const PARAMS_PREFIX: &str = "params:";

/// Name of the dataset holding every parameter as one mapping.
pub const BULK_PARAMETERS: &str = "parameters";

/// Qualify `name` with `namespace` (`ns.name`); unchanged without a namespace.
pub fn qualify(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
        _ => name.to_string(),
    }
}

/// Qualify every name of `names` with `namespace`.
pub fn qualify_all<I, S>(names: I, namespace: Option<&str>) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| qualify(name.as_ref(), namespace))
        .collect()
}

/// Strip the `ns.` prefix from `name` when present.
pub fn dequalify<'a>(name: &'a str, namespace: Option<&str>) -> &'a str {
    match namespace {
        Some(ns) if !ns.is_empty() => name
            .strip_prefix(ns)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name),
        _ => name,
    }
}

/// Dataset name of the parameter `key` inside `namespace` (`params:ns.key`).
pub fn qualify_parameter(key: &str, namespace: Option<&str>) -> String {
    format!("{PARAMS_PREFIX}{}", qualify(key, namespace))
}

/// A dataset name with its role made explicit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatasetName {
    /// An ordinary dataset.
    Plain(String),
    /// A single parameter, keyed by what follows `params:`.
    Parameter(String),
    /// The `parameters` mapping.
    BulkParameters,
    /// A name scoped inside a namespace.
    Namespaced {
        namespace: String,
        name: Box<DatasetName>,
    },
}

impl DatasetName {
    /// Parse a raw catalog name as seen from `namespace`.
    ///
    /// The `params:` marker is only recognised as a prefix, so a plain dataset
    /// whose name merely contains `params:` stays plain.
    pub fn parse(raw: &str, namespace: Option<&str>) -> Self {
        if raw == BULK_PARAMETERS {
            return DatasetName::BulkParameters;
        }
        if let Some(key) = raw.strip_prefix(PARAMS_PREFIX) {
            let local = dequalify(key, namespace);
            return DatasetName::Parameter(local.to_string())
                .qualified(namespace.filter(|_| local.len() != key.len()));
        }
        let local = dequalify(raw, namespace);
        DatasetName::Plain(local.to_string())
            .qualified(namespace.filter(|_| local.len() != raw.len()))
    }

    /// Wrap this name in `namespace`. The bulk parameters mapping is never
    /// namespaced.
    pub fn qualified(self, namespace: Option<&str>) -> Self {
        match (namespace, self) {
            (_, DatasetName::BulkParameters) => DatasetName::BulkParameters,
            (Some(ns), name) if !ns.is_empty() => DatasetName::Namespaced {
                namespace: ns.to_string(),
                name: Box::new(name),
            },
            (_, name) => name,
        }
    }

    /// The innermost, unscoped name.
    pub fn local(&self) -> &DatasetName {
        match self {
            DatasetName::Namespaced { name, .. } => name.local(),
            other => other,
        }
    }

    /// The namespace this name is scoped in, if any.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            DatasetName::Namespaced { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(
            self.local(),
            DatasetName::Parameter(_) | DatasetName::BulkParameters
        )
    }

    pub fn is_bulk_parameters(&self) -> bool {
        matches!(self, DatasetName::BulkParameters)
    }

    /// Qualified key of a single parameter (`ns.key`), `None` otherwise.
    pub fn parameter_key(&self) -> Option<String> {
        match self.local() {
            DatasetName::Parameter(_) => self
                .to_string()
                .strip_prefix(PARAMS_PREFIX)
                .map(str::to_string),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetName::Plain(name) => f.write_str(name),
            DatasetName::Parameter(key) => write!(f, "{PARAMS_PREFIX}{key}"),
            DatasetName::BulkParameters => f.write_str(BULK_PARAMETERS),
            DatasetName::Namespaced { namespace, name } => match name.as_ref() {
                DatasetName::Parameter(key) => write!(f, "{PARAMS_PREFIX}{namespace}.{key}"),
                DatasetName::BulkParameters => f.write_str(BULK_PARAMETERS),
                inner => write!(f, "{namespace}.{inner}"),
            },
        }
    }
}
