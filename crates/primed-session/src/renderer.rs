//! Per-invocation rendering of a compiled assembly into a fresh catalog.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use primed_catalog::{
    dequalify, extract_variable_names, qualify, qualify_parameter, render_dataset, DataCatalog,
    DatasetKind, DatasetName, DatasetRef, MemoryDataset, ValueMap, BULK_PARAMETERS,
    PARAMS_PREFIX,
};
use primed_types::{namespace_label, PrimedError, Result};

use crate::advisory::{Advisory, AdvisoryKind};
use crate::assembly::CatalogAssembly;
use crate::session::Invocation;

/// Template variable that is always supplied by the session.
pub const RUN_ID_VARIABLE: &str = "run_id";

/// The executable catalog for one invocation, plus what was noticed while
/// building it.
#[derive(Debug)]
pub struct Rendered {
    pub catalog: DataCatalog,
    pub advisories: Vec<Advisory>,
}

/// Build a fresh catalog from `assembly` for `invocation`.
///
/// The assembly is only read. Every returned dataset is newly allocated,
/// except artifacts, which are shared.
pub fn render(assembly: &CatalogAssembly, invocation: &Invocation) -> Result<Rendered> {
    let namespace = invocation.namespace.as_deref();
    let mut advisories = Vec::new();

    let inputs = render_inputs(assembly, invocation, &mut advisories)?;
    let outputs = fresh_copies(assembly.outputs().iter());
    let parameters = render_parameters(assembly, invocation, &mut advisories);
    let templates = render_templates(assembly, invocation, &mut advisories)?;
    let artifacts: Vec<(String, DatasetRef)> = assembly
        .artifacts()
        .iter()
        .map(|(name, ds)| (name.clone(), ds.clone()))
        .collect();
    let unmanaged = fresh_copies(assembly.unmanaged().iter());

    let mut catalog = DataCatalog::new();
    for layer in [inputs, outputs, parameters, templates, artifacts, unmanaged] {
        catalog.add_all(layer);
    }

    for advisory in &advisories {
        advisory.log();
    }
    debug!(
        namespace = %namespace_label(namespace),
        datasets = catalog.len(),
        advisories = advisories.len(),
        "rendered catalog"
    );
    Ok(Rendered {
        catalog,
        advisories,
    })
}

fn fresh_copies<'a>(
    datasets: impl Iterator<Item = (&'a String, &'a DatasetRef)>,
) -> Vec<(String, DatasetRef)> {
    datasets
        .map(|(name, ds)| (name.clone(), ds.fresh_copy()))
        .collect()
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

fn render_inputs(
    assembly: &CatalogAssembly,
    invocation: &Invocation,
    advisories: &mut Vec<Advisory>,
) -> Result<Vec<(String, DatasetRef)>> {
    let namespace = invocation.namespace.as_deref();
    let expected = assembly.inputs();

    // Caller names are namespace-relative; the qualified spelling wins over a
    // raw name that happens to match.
    let mut supplied: Map<String, Value> = Map::new();
    let mut unused = Vec::new();
    for (key, value) in &invocation.inputs {
        let qualified = qualify(key, namespace);
        if expected.contains_key(&qualified) {
            supplied.insert(qualified, value.clone());
        } else if expected.contains_key(key) {
            supplied.entry(key.clone()).or_insert_with(|| value.clone());
        } else {
            unused.push(key.clone());
        }
    }

    let missing: Vec<String> = expected
        .keys()
        .filter(|name| !supplied.contains_key(*name))
        .map(|name| dequalify(name, namespace).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PrimedError::MissingInputs {
            namespace: namespace_label(namespace),
            missing,
        });
    }
    if !unused.is_empty() {
        advisories.push(Advisory::new(
            AdvisoryKind::UnusedInputs,
            namespace,
            format!(
                "inputs are not used by the namespace; expected inputs are {}",
                expected.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            unused,
        ));
    }

    Ok(expected
        .iter()
        .filter_map(|(name, target)| {
            let value = supplied.remove(name)?;
            let dataset: DatasetRef = match target.kind() {
                DatasetKind::Tabular => {
                    let value = normalize_records(&value).unwrap_or(value);
                    debug!(dataset = %name, "injecting tabular input");
                    Arc::new(MemoryDataset::with_data(value).with_kind(DatasetKind::Tabular))
                }
                DatasetKind::Generic => {
                    debug!(dataset = %name, "injecting input");
                    Arc::new(MemoryDataset::with_data(value))
                }
            };
            Some((name.clone(), dataset))
        })
        .collect())
}

/// Flatten a record, or a list of records, into a list of flat records whose
/// nested keys are joined with `.`. Returns `None` for any other shape.
pub fn normalize_records(value: &Value) -> Option<Value> {
    match value {
        Value::Object(record) => Some(Value::Array(vec![Value::Object(flatten(record))])),
        Value::Array(items) if items.iter().all(Value::is_object) => Some(Value::Array(
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|record| Value::Object(flatten(record)))
                .collect(),
        )),
        _ => None,
    }
}

fn flatten(record: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in record {
        match value {
            Value::Object(nested) if !nested.is_empty() => {
                for (sub, v) in flatten(nested) {
                    flat.insert(format!("{key}.{sub}"), v);
                }
            }
            other => {
                flat.insert(key.clone(), other.clone());
            }
        }
    }
    flat
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Recursively merge `patch` into `base`. Objects merge key by key, anything
/// else replaces.
pub fn merge_values(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) if value.is_object() => merge_values(existing, value),
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

fn render_parameters(
    assembly: &CatalogAssembly,
    invocation: &Invocation,
    advisories: &mut Vec<Advisory>,
) -> Vec<(String, DatasetRef)> {
    let namespace = invocation.namespace.as_deref();
    let catalog_params = assembly.parameters();
    let caller = &invocation.parameters;

    // Same rule as inputs: the qualified spelling wins over a raw key that
    // already names a catalog parameter. The flag marks a qualified match.
    let target_of = |key: &str| -> Option<(String, bool)> {
        let qualified = qualify_parameter(key, namespace);
        if catalog_params.contains_key(&qualified) {
            return Some((qualified, true));
        }
        let raw = format!("{PARAMS_PREFIX}{key}");
        catalog_params.contains_key(&raw).then_some((raw, false))
    };
    let mut targeted: Map<String, Value> = Map::new();
    for (key, value) in caller {
        match target_of(key) {
            Some((target, true)) => {
                targeted.insert(target, value.clone());
            }
            Some((target, false)) => {
                targeted.entry(target).or_insert_with(|| value.clone());
            }
            None => {}
        }
    }
    let has_bulk = catalog_params.contains_key(BULK_PARAMETERS);

    let mut rendered = Vec::with_capacity(catalog_params.len());
    let mut defaulted = Vec::new();
    for (name, dataset) in catalog_params {
        let supplied = if DatasetName::parse(name, namespace).is_bulk_parameters() {
            Some(Value::Object(caller.clone())).filter(|_| !caller.is_empty())
        } else {
            targeted.get(name).cloned()
        };

        match supplied {
            Some(value) => {
                let merged = match dataset.load() {
                    Ok(mut base) if base.is_object() && value.is_object() => {
                        merge_values(&mut base, &value);
                        base
                    }
                    _ => value,
                };
                rendered.push((name.clone(), Arc::new(MemoryDataset::with_data(merged)) as DatasetRef));
            }
            None => {
                defaulted.push(name.clone());
                rendered.push((name.clone(), dataset.fresh_copy()));
            }
        }
    }

    let unused: Vec<String> = if has_bulk && catalog_params.len() == 1 {
        let known = catalog_params[BULK_PARAMETERS]
            .load()
            .ok()
            .and_then(|v| v.as_object().map(|m| m.keys().cloned().collect::<BTreeSet<_>>()))
            .unwrap_or_default();
        caller.keys().filter(|k| !known.contains(*k)).cloned().collect()
    } else if has_bulk {
        Vec::new()
    } else {
        caller
            .keys()
            .filter(|k| target_of(k).is_none())
            .cloned()
            .collect()
    };

    if !defaulted.is_empty() {
        advisories.push(Advisory::new(
            AdvisoryKind::DefaultParameters,
            namespace,
            "catalog parameters were not supplied and keep their default values",
            defaulted,
        ));
    }
    if !unused.is_empty() {
        advisories.push(Advisory::new(
            AdvisoryKind::UnusedParameters,
            namespace,
            format!(
                "parameters are not used by the namespace; catalog parameters are {}",
                catalog_params.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
            unused,
        ));
    }
    rendered
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

fn render_templates(
    assembly: &CatalogAssembly,
    invocation: &Invocation,
    advisories: &mut Vec<Advisory>,
) -> Result<Vec<(String, DatasetRef)>> {
    let namespace = invocation.namespace.as_deref();
    let variables: &ValueMap = &invocation.template_variables;

    let referenced: BTreeSet<String> = assembly
        .templates()
        .values()
        .flat_map(|ds| extract_variable_names(ds.as_ref()))
        .collect();

    let missing: Vec<&String> = referenced
        .iter()
        .filter(|name| !variables.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        advisories.push(Advisory::new(
            AdvisoryKind::MissingTemplateVariables,
            namespace,
            "template variables were not supplied; declared defaults are used where present",
            missing.into_iter().cloned(),
        ));
    }

    let unused: Vec<&String> = variables
        .keys()
        .filter(|k| k.as_str() != RUN_ID_VARIABLE && !referenced.contains(*k))
        .collect();
    if !unused.is_empty() {
        advisories.push(Advisory::new(
            AdvisoryKind::UnusedTemplateVariables,
            namespace,
            "template variables are not referenced by any templated dataset",
            unused.into_iter().cloned(),
        ));
    }

    assembly
        .templates()
        .iter()
        .map(|(name, ds)| Ok((name.clone(), render_dataset(ds.as_ref(), variables)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Category;
    use primed_catalog::{Dataset, JsonDataset};
    use serde_json::json;

    fn assembly(entries: Vec<(Category, &str, DatasetRef)>) -> CatalogAssembly {
        let mut assembly = CatalogAssembly::new();
        for (category, name, ds) in entries {
            assembly.insert(category, name, ds);
        }
        assembly
    }

    fn memory(value: Value) -> DatasetRef {
        Arc::new(MemoryDataset::with_data(value))
    }

    fn kinds(rendered: &Rendered) -> Vec<AdvisoryKind> {
        rendered.advisories.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn inputs_are_injected_under_qualified_names() {
        let a = assembly(vec![(Category::Inputs, "n1.A", Arc::new(MemoryDataset::new()) as DatasetRef)]);
        let invocation = Invocation::for_namespace("n1").with_input("A", json!(3));
        let rendered = render(&a, &invocation).unwrap();
        assert_eq!(rendered.catalog.load("n1.A").unwrap(), json!(3));
        assert!(rendered.advisories.is_empty());
    }

    #[test]
    fn missing_inputs_fail_with_the_exact_set() {
        let a = assembly(vec![
            (Category::Inputs, "n1.A", Arc::new(MemoryDataset::new()) as DatasetRef),
            (Category::Inputs, "n1.Z", Arc::new(MemoryDataset::new()) as DatasetRef),
        ]);
        let invocation = Invocation::for_namespace("n1").with_input("A", json!(1));
        let err = render(&a, &invocation).unwrap_err();
        match err {
            PrimedError::MissingInputs { namespace, missing } => {
                assert_eq!(namespace, "n1");
                assert_eq!(missing, vec!["Z"]);
            }
            other => panic!("expected MissingInputs, got: {other:?}"),
        }
    }

    #[test]
    fn extra_inputs_raise_an_advisory() {
        let a = assembly(vec![(Category::Inputs, "A", Arc::new(MemoryDataset::new()) as DatasetRef)]);
        let invocation = Invocation::new()
            .with_input("A", json!(1))
            .with_input("Q", json!(2));
        let rendered = render(&a, &invocation).unwrap();
        assert_eq!(kinds(&rendered), vec![AdvisoryKind::UnusedInputs]);
        assert_eq!(rendered.advisories[0].names, vec!["Q"]);
        assert!(!rendered.catalog.contains("Q"));
    }

    #[test]
    fn tabular_inputs_are_normalized() {
        let target: DatasetRef = Arc::new(MemoryDataset::new().with_kind(DatasetKind::Tabular));
        let a = assembly(vec![(Category::Inputs, "rows", target)]);
        let invocation = Invocation::new().with_input(
            "rows",
            json!([{"id": 1, "shipping": {"city": "Oslo", "zip": "0150"}}]),
        );
        let rendered = render(&a, &invocation).unwrap();
        assert_eq!(
            rendered.catalog.load("rows").unwrap(),
            json!([{"id": 1, "shipping.city": "Oslo", "shipping.zip": "0150"}])
        );
        assert_eq!(rendered.catalog.get("rows").unwrap().kind(), DatasetKind::Tabular);
    }

    #[test]
    fn normalize_records_rejects_scalars() {
        assert_eq!(normalize_records(&json!(3)), None);
        assert_eq!(normalize_records(&json!([1, {"a": 1}])), None);
        assert_eq!(
            normalize_records(&json!({"a": {"b": 1}})),
            Some(json!([{"a.b": 1}]))
        );
    }

    #[test]
    fn parameters_override_and_merge() {
        let a = assembly(vec![
            (Category::Parameters, "params:n1.B", memory(json!(1))),
            (
                Category::Parameters,
                "params:n1.model",
                memory(json!({"depth": 3, "opts": {"lr": 0.1, "seed": 7}})),
            ),
        ]);
        let invocation = Invocation::for_namespace("n1")
            .with_parameter("B", json!(2))
            .with_parameter("model", json!({"opts": {"lr": 0.5}}));
        let rendered = render(&a, &invocation).unwrap();

        assert_eq!(rendered.catalog.load("params:n1.B").unwrap(), json!(2));
        assert_eq!(
            rendered.catalog.load("params:n1.model").unwrap(),
            json!({"depth": 3, "opts": {"lr": 0.5, "seed": 7}})
        );
        assert!(rendered.advisories.is_empty());
        // The compiled default is untouched.
        assert_eq!(a.parameters()["params:n1.B"].load().unwrap(), json!(1));
    }

    #[test]
    fn qualified_parameter_keys_are_accepted() {
        let a = assembly(vec![
            (Category::Parameters, "params:n1.B", memory(json!(1))),
            (Category::Parameters, "params:C", memory(json!(0))),
        ]);
        let invocation = Invocation::for_namespace("n1")
            .with_parameter("n1.B", json!(2))
            .with_parameter("C", json!(5));
        let rendered = render(&a, &invocation).unwrap();

        assert_eq!(rendered.catalog.load("params:n1.B").unwrap(), json!(2));
        assert_eq!(rendered.catalog.load("params:C").unwrap(), json!(5));
        assert!(rendered.advisories.is_empty());
    }

    #[test]
    fn namespaced_key_wins_over_raw_spelling() {
        let a = assembly(vec![(Category::Parameters, "params:n1.B", memory(json!(1)))]);
        let invocation = Invocation::for_namespace("n1")
            .with_parameter("B", json!(3))
            .with_parameter("n1.B", json!(9));
        let rendered = render(&a, &invocation).unwrap();
        assert_eq!(rendered.catalog.load("params:n1.B").unwrap(), json!(3));
        assert!(rendered.advisories.is_empty());
    }

    #[test]
    fn falsy_parameter_values_still_override() {
        let a = assembly(vec![(Category::Parameters, "params:flag", memory(json!(true)))]);
        let invocation = Invocation::new().with_parameter("flag", json!(false));
        let rendered = render(&a, &invocation).unwrap();
        assert_eq!(rendered.catalog.load("params:flag").unwrap(), json!(false));
    }

    #[test]
    fn unsupplied_and_unused_parameters_are_reported() {
        let a = assembly(vec![(Category::Parameters, "params:B", memory(json!(1)))]);
        let invocation = Invocation::new().with_parameter("C", json!(2));
        let rendered = render(&a, &invocation).unwrap();
        assert_eq!(
            kinds(&rendered),
            vec![AdvisoryKind::DefaultParameters, AdvisoryKind::UnusedParameters]
        );
        assert_eq!(rendered.advisories[1].names, vec!["C"]);
        assert_eq!(rendered.catalog.load("params:B").unwrap(), json!(1));
    }

    #[test]
    fn bulk_parameters_absorb_the_caller_map() {
        let a = assembly(vec![(
            Category::Parameters,
            "parameters",
            memory(json!({"B": 1, "nested": {"x": 1, "y": 2}})),
        )]);
        let invocation = Invocation::new()
            .with_parameter("nested", json!({"y": 5}))
            .with_parameter("extra", json!(0));
        let rendered = render(&a, &invocation).unwrap();
        assert_eq!(
            rendered.catalog.load("parameters").unwrap(),
            json!({"B": 1, "nested": {"x": 1, "y": 5}, "extra": 0})
        );
        assert_eq!(kinds(&rendered), vec![AdvisoryKind::UnusedParameters]);
        assert_eq!(rendered.advisories[0].names, vec!["extra"]);
    }

    #[test]
    fn templates_are_rendered_with_variables() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("report_${oc.select:date_param,01_01_1960}.json");
        let template: DatasetRef = Arc::new(JsonDataset::new(pattern));
        let a = assembly(vec![
            (Category::Outputs, "F", template.clone()),
            (Category::Templates, "F", template),
        ]);

        let rendered = render(
            &a,
            &Invocation::new()
                .with_template_variable("date_param", json!("2024_01_01"))
                .with_template_variable(RUN_ID_VARIABLE, json!("abc")),
        )
        .unwrap();
        assert!(rendered.advisories.is_empty());
        rendered.catalog.save("F", json!({"results": 1})).unwrap();
        assert!(dir.path().join("report_2024_01_01.json").exists());

        let rendered = render(&a, &Invocation::new().with_template_variable("unused", json!(1))).unwrap();
        assert_eq!(
            kinds(&rendered),
            vec![
                AdvisoryKind::MissingTemplateVariables,
                AdvisoryKind::UnusedTemplateVariables
            ]
        );
        rendered.catalog.save("F", json!({"results": 2})).unwrap();
        assert!(dir.path().join("report_01_01_1960.json").exists());
    }

    #[test]
    fn artifacts_are_shared_and_others_copied() {
        let artifact: DatasetRef = Arc::new(primed_catalog::ArtifactDataset::new(
            json!([1, 2, 3]),
            DatasetKind::Generic,
        ));
        let scratch = memory(json!("seed"));
        let a = assembly(vec![
            (Category::Artifacts, "K", artifact.clone()),
            (Category::Unmanaged, "C", scratch.clone()),
        ]);

        let first = render(&a, &Invocation::new()).unwrap();
        let second = render(&a, &Invocation::new()).unwrap();
        assert!(Arc::ptr_eq(first.catalog.get("K").unwrap(), &artifact));
        assert!(Arc::ptr_eq(second.catalog.get("K").unwrap(), &artifact));

        first.catalog.save("C", json!("changed")).unwrap();
        assert_eq!(second.catalog.load("C").unwrap(), json!("seed"));
        assert_eq!(scratch.load().unwrap(), json!("seed"));
    }

    #[test]
    fn merge_values_replaces_non_objects() {
        let mut base = json!({"a": 1, "b": {"c": 2}});
        merge_values(&mut base, &json!({"b": 3, "d": {"e": 4}}));
        assert_eq!(base, json!({"a": 1, "b": 3, "d": {"e": 4}}));
    }
}
