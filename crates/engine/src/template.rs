//! `{{step:<nodeId>.<path>}}` placeholder resolution.
//!
//! A path is a dot-separated list of keys, each optionally followed by one
//! `[<n>]` array index: `{{step:search.results[0].url}}`. Without a path the
//! placeholder stands for the node's whole response.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::warn;

use crate::outputs::OutputsBag;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*step:([^.}\s]+)(?:\.([^}\s]+))?\s*\}\}").expect("valid placeholder regex")
});

static SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\[\]]+)(?:\[(\d+)\])?$").expect("valid segment regex"));

/// A placeholder found in an input payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub node_id: String,
    pub path: Option<String>,
}

/// Substitute every placeholder in `input` with values from `bag`.
///
/// Strings are spliced in raw; anything else as compact JSON text. A
/// placeholder naming a node or path that does not exist becomes the empty
/// string. Object keys are left alone.
pub fn resolve_templates(input: &Value, bag: &OutputsBag) -> Value {
    match input {
        Value::String(s) => Value::String(resolve_str(s, bag)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_templates(v, bag)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_templates(v, bag)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Every placeholder in `input`, in document order.
pub fn placeholders(input: &Value) -> Vec<Placeholder> {
    let mut found = Vec::new();
    collect(input, &mut found);
    found
}

fn collect(value: &Value, found: &mut Vec<Placeholder>) {
    match value {
        Value::String(s) => found.extend(PLACEHOLDER.captures_iter(s).map(|caps| Placeholder {
            node_id: caps[1].to_owned(),
            path: caps.get(2).map(|m| m.as_str().to_owned()),
        })),
        Value::Array(items) => items.iter().for_each(|v| collect(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect(v, found)),
        _ => {}
    }
}

fn resolve_str(text: &str, bag: &OutputsBag) -> String {
    if !text.contains("{{") {
        return text.to_owned();
    }

    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            let node_id = &caps[1];
            let path = caps.get(2).map(|m| m.as_str());

            match lookup(bag, node_id, path) {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => {
                    warn!(placeholder = &caps[0], "unresolved placeholder, substituting empty string");
                    String::new()
                }
            }
        })
        .into_owned()
}

fn lookup(bag: &OutputsBag, node_id: &str, path: Option<&str>) -> Option<Value> {
    let entry = bag.get(node_id)?;
    let root = match &entry.response {
        Some(response) => response.clone(),
        None => serde_json::to_value(entry).ok()?,
    };

    let Some(path) = path else {
        return Some(root);
    };

    let mut current = &root;
    for segment in path.split('.') {
        let caps = SEGMENT.captures(segment)?;
        current = current.get(&caps[1])?;
        if let Some(index) = caps.get(2) {
            current = current.get(index.as_str().parse::<usize>().ok()?)?;
        }
    }
    Some(current.clone())
}
