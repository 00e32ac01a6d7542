//! Run-scoped store of completed step outputs.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// Node id under which linear runs expose the previous step's result.
pub const PREV: &str = "prev";

/// What one completed step left behind for later placeholders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutput {
    pub request: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// Returned when a node is recorded twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("output for node '{0}' already recorded")]
pub struct AlreadyRecorded(pub String);

/// Node id → output of every step that has finished so far.
///
/// Append-only: entries are never replaced or removed, so a placeholder can
/// only ever observe nodes that ran before the current one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputsBag {
    entries: HashMap<String, StepOutput>,
}

impl OutputsBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bag holding just one entry, as linear runs use for [`PREV`].
    pub fn single(node_id: &str, request: Value, response: Option<Value>) -> Self {
        let mut entries = HashMap::with_capacity(1);
        entries.insert(node_id.to_owned(), StepOutput { request, response });
        Self { entries }
    }

    pub fn record(
        &mut self,
        node_id: &str,
        request: Value,
        response: Option<Value>,
    ) -> Result<(), AlreadyRecorded> {
        if self.entries.contains_key(node_id) {
            return Err(AlreadyRecorded(node_id.to_owned()));
        }
        self.entries
            .insert(node_id.to_owned(), StepOutput { request, response });
        Ok(())
    }

    pub fn get(&self, node_id: &str) -> Option<&StepOutput> {
        self.entries.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.entries.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn second_record_for_same_node_is_rejected() {
        let mut bag = OutputsBag::new();
        bag.record("a", json!({}), Some(json!({ "text": "one" }))).unwrap();

        let err = bag
            .record("a", json!({}), Some(json!({ "text": "two" })))
            .unwrap_err();
        assert_eq!(err, AlreadyRecorded("a".into()));
        assert_eq!(bag.get("a").unwrap().response, Some(json!({ "text": "one" })));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn single_exposes_prev() {
        let bag = OutputsBag::single(PREV, json!("q"), None);
        assert!(bag.contains("prev"));
        assert_eq!(bag.get("prev").unwrap().request, json!("q"));
    }
}
