//! Boolean tag predicates compiled from the JSON filter document.
//!
//! The document grammar is tiny: a `value` leaf matches presence of one tag
//! key; `and`/`or` nodes combine operands. The compiled AST is immutable and
//! evaluated by a pure recursive function, so worker threads share it by
//! reference without synchronization or cloning.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::poi::TagMap;

/// Raw filter document as written on disk.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterDoc {
    Value { value: String },
    And { operands: Vec<FilterDoc> },
    Or { operands: Vec<FilterDoc> },
}

/// Compiled filter AST.
#[derive(Debug, Clone, PartialEq)]
pub enum TagFilter {
    Key(String),
    And(Vec<TagFilter>),
    Or(Vec<TagFilter>),
}

impl TagFilter {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Filter: failed to read {:?}", path))?;
        let doc: FilterDoc = serde_json::from_str(&raw)
            .with_context(|| format!("Filter: invalid filter document {:?}", path))?;
        Ok(Self::compile(&doc))
    }

    pub fn compile(doc: &FilterDoc) -> Self {
        match doc {
            FilterDoc::Value { value } => TagFilter::Key(value.clone()),
            FilterDoc::And { operands } => {
                TagFilter::And(operands.iter().map(Self::compile).collect())
            }
            FilterDoc::Or { operands } => {
                TagFilter::Or(operands.iter().map(Self::compile).collect())
            }
        }
    }

    pub fn matches(&self, tags: &TagMap) -> bool {
        match self {
            TagFilter::Key(key) => tags.contains_key(key),
            TagFilter::And(children) => children.iter().all(|child| child.matches(tags)),
            TagFilter::Or(children) => children.iter().any(|child| child.matches(tags)),
        }
    }

    /// Collect every key the filter can look at, for tag selection.
    pub fn collect_keys(&self, keys: &mut HashSet<String>) {
        match self {
            TagFilter::Key(key) => {
                keys.insert(key.clone());
            }
            TagFilter::And(children) | TagFilter::Or(children) => {
                for child in children {
                    child.collect_keys(keys);
                }
            }
        }
    }

    pub fn key(key: &str) -> Self {
        TagFilter::Key(key.to_string())
    }
}

/// Built-in node filter: `name AND (place OR amenity)`.
pub fn default_node_filter() -> TagFilter {
    TagFilter::And(vec![
        TagFilter::key("name"),
        TagFilter::Or(vec![TagFilter::key("place"), TagFilter::key("amenity")]),
    ])
}

/// Built-in relation filter: `place OR amenity OR name`. The
/// `type=multipolygon` gate is applied by the relation extractor itself.
pub fn default_area_filter() -> TagFilter {
    TagFilter::Or(vec![
        TagFilter::key("place"),
        TagFilter::key("amenity"),
        TagFilter::key("name"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn compiles_document_tree() {
        let doc: FilterDoc = serde_json::from_str(
            r#"{
                "type": "and",
                "operands": [
                    {"type": "value", "value": "name"},
                    {"type": "or", "operands": [
                        {"type": "value", "value": "place"},
                        {"type": "value", "value": "amenity"}
                    ]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(TagFilter::compile(&doc), default_node_filter());
    }

    #[test]
    fn rejects_unknown_filter_type() {
        let result: Result<FilterDoc, _> =
            serde_json::from_str(r#"{"type": "xor", "operands": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn key_leaf_matches_presence_only() {
        let filter = TagFilter::key("place");
        assert!(filter.matches(&tags(&[("place", "city")])));
        assert!(filter.matches(&tags(&[("place", "")])));
        assert!(!filter.matches(&tags(&[("amenity", "cafe")])));
    }

    #[test]
    fn node_filter_requires_name_and_category() {
        let filter = default_node_filter();
        assert!(filter.matches(&tags(&[("name", "Essen"), ("place", "city")])));
        assert!(filter.matches(&tags(&[("name", "Cafe X"), ("amenity", "cafe")])));
        assert!(!filter.matches(&tags(&[("place", "city")])));
        assert!(!filter.matches(&tags(&[("name", "Somewhere")])));
    }

    #[test]
    fn collect_keys_walks_the_whole_tree() {
        let mut keys = HashSet::new();
        default_node_filter().collect_keys(&mut keys);
        let mut sorted: Vec<&str> = keys.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        assert_eq!(sorted, vec!["amenity", "name", "place"]);
    }
}
