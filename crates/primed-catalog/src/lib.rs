//! Dataset descriptors and the data catalog consumed by the primed compiler.
//!
//! Provides the pieces the compiler and renderer reason about:
//! [`Dataset`] (the closed capability interface every descriptor implements),
//! [`DataCatalog`] (name → descriptor registry), [`DatasetName`] (tagged
//! dataset names) and the [`template`] module that detects and resolves
//! `${oc.select:var,default}` placeholders inside descriptor attributes.
//!
//! # Example
//! ```
//! use primed_catalog::{DataCatalog, MemoryDataset};
//!
//! let mut catalog = DataCatalog::new();
//! catalog.add("A", MemoryDataset::with_data(serde_json::json!(2)));
//! assert_eq!(catalog.load("A").unwrap(), serde_json::json!(2));
//! ```

pub mod attributes;
pub mod catalog;
pub mod dataset;
pub mod names;
pub mod template;

pub use attributes::{AttributeValue, Attributes};
pub use catalog::{CatalogConfig, DataCatalog, DatasetConfig};
pub use dataset::{ArtifactDataset, Dataset, DatasetKind, DatasetRef, JsonDataset, MemoryDataset};
pub use names::{
    dequalify, qualify, qualify_all, qualify_parameter, DatasetName, BULK_PARAMETERS,
    PARAMS_PREFIX,
};
pub use template::{
    contains_placeholder, extract_variable_names, parse_template, render_dataset,
    scan_dataset_for_placeholders, Interpolation, Segment,
};

/// Invocation-time values keyed by dataset, parameter or variable name.
pub type ValueMap = serde_json::Map<String, serde_json::Value>;
