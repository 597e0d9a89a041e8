//! Placeholder detection and rendering for dataset attributes.
//!
//! A template string interleaves literal text with interpolations:
//!
//! ```text
//! data/${oc.select:date_param,01_01_1960}/report_${run_id}.json
//! ```
//!
//! `${oc.select:NAME,DEFAULT}` resolves `NAME` against the invocation's
//! template variables and falls back to `DEFAULT`; `${NAME}` has no fallback.
//! `\${` is an escaped, literal `${`. A string only counts as a template when
//! the whole of it parses under this grammar and at least one interpolation
//! is present, so a stray or malformed `${` never marks a dataset as templated.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde_json::Value;
use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, not, opt, preceded, repeat};
use winnow::token::{literal, take_till, take_while};
use winnow::{ModalResult, Parser};

use primed_types::Result;

use crate::attributes::AttributeValue;
use crate::dataset::{Dataset, DatasetRef};
use crate::ValueMap;

/// One `${...}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolation {
    pub variable: String,
    pub default: Option<String>,
    /// Source text, including `${` and `}`.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Interpolation(Interpolation),
}

// ---------------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------------

fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

/// [A-Za-z_][A-Za-z0-9_.-]*
fn variable_name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
        }),
    )
        .take()
        .parse_next(input)
}

fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

fn default_value(input: &mut &str) -> ModalResult<String> {
    let raw: &str = take_till(0.., |c: char| c == '}').parse_next(input)?;
    Ok(unquote(raw.trim()).to_string())
}

/// `oc.select : NAME ( , DEFAULT )?`
fn select_body(input: &mut &str) -> ModalResult<(String, Option<String>)> {
    let _ = literal("oc.select").parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let _ = ':'.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let name = variable_name.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    let default = opt(preceded(',', default_value)).parse_next(input)?;
    Ok((name.to_string(), default))
}

fn bare_body(input: &mut &str) -> ModalResult<(String, Option<String>)> {
    variable_name
        .map(|name: &str| (name.to_string(), None))
        .parse_next(input)
}

fn interpolation(input: &mut &str) -> ModalResult<Interpolation> {
    let ((variable, default), raw) = delimited(("${", ws), alt((select_body, bare_body)), (ws, '}'))
        .with_taken()
        .parse_next(input)?;
    Ok(Interpolation {
        variable,
        default,
        raw: raw.to_string(),
    })
}

fn segment(input: &mut &str) -> ModalResult<Segment> {
    alt((
        literal("\\${").value(Segment::Literal("${".into())),
        interpolation.map(Segment::Interpolation),
        take_till(1.., |c: char| c == '$' || c == '\\')
            .map(|s: &str| Segment::Literal(s.to_string())),
        literal("\\").value(Segment::Literal("\\".into())),
        ('$', not('{')).value(Segment::Literal("$".into())),
    ))
    .parse_next(input)
}

/// Parse `input` as a template. Returns `None` when the string does not fit
/// the grammar (e.g. an unterminated `${`).
pub fn parse_template(input: &str) -> Option<Vec<Segment>> {
    let mut remaining = input;
    let segments: Vec<Segment> = repeat(0.., segment).parse_next(&mut remaining).ok()?;
    if !remaining.is_empty() {
        return None;
    }

    // Adjacent literals are merged so callers see one run of text.
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for seg in segments {
        match (merged.last_mut(), seg) {
            (Some(Segment::Literal(prev)), Segment::Literal(text)) => prev.push_str(&text),
            (_, seg) => merged.push(seg),
        }
    }
    Some(merged)
}

fn interpolations(text: &str) -> Vec<Interpolation> {
    parse_template(text)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Interpolation(i) => Some(i),
            Segment::Literal(_) => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

fn is_template_text(text: &str) -> bool {
    !interpolations(text).is_empty()
}

/// `true` if `value` (or anything nested in it) is an unresolved template.
pub fn contains_placeholder(value: &AttributeValue) -> bool {
    match value {
        AttributeValue::String(s) => is_template_text(s),
        AttributeValue::Path(p) => p.to_str().is_some_and(is_template_text),
        AttributeValue::List(items) => items.iter().any(contains_placeholder),
        AttributeValue::Map(map) => map.values().any(contains_placeholder),
        AttributeValue::Nested(attrs) => attrs.iter().any(|(_, v)| contains_placeholder(v)),
        _ => false,
    }
}

/// `true` if any attribute of `dataset` holds a placeholder.
pub fn scan_dataset_for_placeholders(dataset: &dyn Dataset) -> bool {
    dataset
        .attributes()
        .iter()
        .any(|(_, value)| contains_placeholder(value))
}

fn collect_variables(value: &AttributeValue, out: &mut BTreeSet<String>) {
    match value {
        AttributeValue::String(s) => out.extend(interpolations(s).into_iter().map(|i| i.variable)),
        AttributeValue::Path(p) => {
            if let Some(s) = p.to_str() {
                out.extend(interpolations(s).into_iter().map(|i| i.variable));
            }
        }
        AttributeValue::List(items) => items.iter().for_each(|v| collect_variables(v, out)),
        AttributeValue::Map(map) => map.values().for_each(|v| collect_variables(v, out)),
        AttributeValue::Nested(attrs) => attrs.iter().for_each(|(_, v)| collect_variables(v, out)),
        _ => {}
    }
}

/// Names of every variable referenced by `dataset`'s placeholders.
pub fn extract_variable_names(dataset: &dyn Dataset) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for (_, value) in dataset.attributes() {
        collect_variables(&value, &mut names);
    }
    names
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn resolve(interp: &Interpolation, variables: &ValueMap) -> Value {
    match (variables.get(&interp.variable), &interp.default) {
        (Some(value), _) => value.clone(),
        (None, Some(default)) => Value::String(default.clone()),
        (None, None) => Value::String(interp.raw.clone()),
    }
}

/// Like [`resolve`], but a fallback default is read as a JSON scalar so the
/// result has the same type whether or not the variable is supplied.
fn resolve_typed(interp: &Interpolation, variables: &ValueMap) -> Value {
    match (variables.get(&interp.variable), &interp.default) {
        (None, Some(default)) => match serde_json::from_str::<Value>(default) {
            Ok(value) if !value.is_object() && !value.is_array() => value,
            _ => Value::String(default.clone()),
        },
        _ => resolve(interp, variables),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a template string. A string that is exactly one interpolation
/// takes the typed variable value, and with `typed` a typed default too;
/// otherwise the result is text.
fn render_text(text: &str, variables: &ValueMap, typed: bool) -> Option<Value> {
    let segments = parse_template(text)?;
    if !segments
        .iter()
        .any(|s| matches!(s, Segment::Interpolation(_)))
    {
        return None;
    }
    if let [Segment::Interpolation(only)] = segments.as_slice() {
        let value = if typed {
            resolve_typed(only, variables)
        } else {
            resolve(only, variables)
        };
        return Some(value);
    }
    let mut out = String::with_capacity(text.len());
    for seg in &segments {
        match seg {
            Segment::Literal(s) => out.push_str(s),
            Segment::Interpolation(i) => out.push_str(&stringify(&resolve(i, variables))),
        }
    }
    Some(Value::String(out))
}

/// Resolve every placeholder inside `value`, leaving everything else as is.
pub fn render_value(value: &AttributeValue, variables: &ValueMap) -> AttributeValue {
    match value {
        AttributeValue::String(s) => match render_text(s, variables, true) {
            Some(rendered) => AttributeValue::from_json(&rendered),
            None => value.clone(),
        },
        AttributeValue::Path(p) => match p.to_str().and_then(|s| render_text(s, variables, false)) {
            Some(rendered) => AttributeValue::Path(PathBuf::from(stringify(&rendered))),
            None => value.clone(),
        },
        AttributeValue::List(items) => {
            AttributeValue::List(items.iter().map(|v| render_value(v, variables)).collect())
        }
        AttributeValue::Map(map) => AttributeValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, variables)))
                .collect(),
        ),
        AttributeValue::Nested(attrs) => AttributeValue::Nested(
            attrs
                .iter()
                .map(|(k, v)| (k.clone(), render_value(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// A new descriptor with every placeholder of `dataset` resolved against
/// `variables`. `dataset` itself is left untouched.
pub fn render_dataset(dataset: &dyn Dataset, variables: &ValueMap) -> Result<DatasetRef> {
    let rendered = dataset
        .attributes()
        .into_iter()
        .map(|(key, value)| {
            let value = render_value(&value, variables);
            (key, value)
        })
        .collect();
    dataset.with_attributes(rendered)
}
