//! Constraint tree construction and lookup.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::poi::TagMap;
use crate::utils::leading_int;

/// Raw mapping document node. Absence of `sublevels` marks a leaf.
#[derive(Debug, Deserialize)]
pub struct LevelDoc {
    pub level: String,
    #[serde(default)]
    pub factor: Option<i32>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDoc>,
    pub sublevels: Option<Vec<LevelDoc>>,
}

/// Raw constraint. Exactly one of `equals`/`greater`/`less` selects the
/// predicate kind; a bare `tag` is a presence check.
#[derive(Debug, Deserialize)]
pub struct ConstraintDoc {
    pub tag: String,
    #[serde(default)]
    pub equals: Option<String>,
    #[serde(default)]
    pub greater: Option<i64>,
    #[serde(default)]
    pub less: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    Exists,
    Equals(String),
    /// Historical name; the comparison is >=.
    GreaterEq(i64),
    Less(i64),
}

/// A predicate over one tag key. Evaluates to false when the key is absent,
/// except the presence check which is defined by it.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub key: String,
    pub kind: ConstraintKind,
}

impl Constraint {
    fn compile(doc: &ConstraintDoc) -> Self {
        let kind = if let Some(expected) = &doc.equals {
            ConstraintKind::Equals(expected.clone())
        } else if let Some(threshold) = doc.greater {
            ConstraintKind::GreaterEq(threshold)
        } else if let Some(threshold) = doc.less {
            ConstraintKind::Less(threshold)
        } else {
            ConstraintKind::Exists
        };
        Self {
            key: doc.tag.clone(),
            kind,
        }
    }

    pub fn matches(&self, tags: &TagMap) -> bool {
        let Some(value) = tags.get(&self.key) else {
            return false;
        };
        match &self.kind {
            ConstraintKind::Exists => true,
            ConstraintKind::Equals(expected) => value == expected,
            ConstraintKind::GreaterEq(threshold) => leading_int(value) >= *threshold,
            ConstraintKind::Less(threshold) => leading_int(value) < *threshold,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConstraintKind::Exists => write!(f, "(tag {} exists)", self.key),
            ConstraintKind::Equals(expected) => write!(f, "(tag {} == {})", self.key, expected),
            ConstraintKind::GreaterEq(threshold) => write!(f, "(tag {} >= {})", self.key, threshold),
            ConstraintKind::Less(threshold) => write!(f, "(tag {} < {})", self.key, threshold),
        }
    }
}

/// Stable id into the Level registry. Ids start at 1 and encode strict
/// depth-first declaration order; smaller id means declared earlier and, by
/// convention, more important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LevelId(pub u32);

/// One classification bucket. Shared read-only; POIs reference it by id.
#[derive(Debug, Clone)]
pub struct Level {
    pub id: LevelId,
    pub name: String,
    pub factor: i32,
    pub icon: Option<String>,
    /// Full root-to-leaf constraint chain, kept for diagnostics. Lookup gates
    /// on each tree node's local constraints only.
    pub constraints: Vec<Constraint>,
}

impl Level {
    pub fn has_icon(&self) -> bool {
        self.icon.is_some()
    }
}

#[derive(Debug)]
struct TreeNode {
    name: String,
    constraints: Vec<Constraint>,
    kind: NodeKind,
}

#[derive(Debug)]
enum NodeKind {
    Internal(Vec<usize>),
    Leaf(LevelId),
}

/// The compiled constraint tree plus its append-only Level registry. Built
/// once, single-threaded, and read-only afterwards.
#[derive(Debug)]
pub struct LevelClassifier {
    nodes: Vec<TreeNode>,
    root: usize,
    registry: Vec<Level>,
    default_level: LevelId,
}

impl LevelClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Mapping: failed to read {:?}", path))?;
        let doc: LevelDoc = serde_json::from_str(&raw)
            .with_context(|| format!("Mapping: invalid mapping document {:?}", path))?;
        Self::from_doc(&doc)
    }

    pub fn from_doc(doc: &LevelDoc) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut registry = Vec::new();
        let root = build_node(doc, &[], &mut nodes, &mut registry)?;
        let Some(last) = registry.last() else {
            bail!("Mapping: document declares no leaf levels");
        };
        // The last-declared leaf is the implicit catch-all bucket.
        let default_level = last.id;
        Ok(Self {
            nodes,
            root,
            registry,
            default_level,
        })
    }

    /// Walk the tree and return the first non-default Level whose branch
    /// accepts the tag set; falls through to the last-declared leaf.
    pub fn classify(&self, tags: &TagMap) -> &Level {
        let id = self.classify_node(self.root, tags);
        self.level(id)
    }

    fn classify_node(&self, index: usize, tags: &TagMap) -> LevelId {
        let node = &self.nodes[index];
        // Local constraints are OR'd; a node without any is trivially
        // satisfied.
        let satisfied = node.constraints.is_empty()
            || node.constraints.iter().any(|c| c.matches(tags));
        if !satisfied {
            return self.default_level;
        }
        match &node.kind {
            NodeKind::Leaf(id) => *id,
            NodeKind::Internal(children) => {
                for &child in children {
                    let found = self.classify_node(child, tags);
                    if found != self.default_level {
                        return found;
                    }
                }
                self.default_level
            }
        }
    }

    pub fn level(&self, id: LevelId) -> &Level {
        &self.registry[id.0 as usize - 1]
    }

    pub fn default_level(&self) -> &Level {
        self.level(self.default_level)
    }

    /// Whether the id is the undefined/catch-all bucket.
    pub fn is_default(&self, id: LevelId) -> bool {
        id == self.default_level
    }

    pub fn levels(&self) -> &[Level] {
        &self.registry
    }

    /// Union of all constraint keys, used to select which tags the
    /// extractors retain.
    pub fn required_keys(&self) -> HashSet<String> {
        self.registry
            .iter()
            .flat_map(|level| level.constraints.iter().map(|c| c.key.clone()))
            .collect()
    }

    /// Indented tree dump for startup logging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out);
        out
    }

    fn dump_node(&self, index: usize, depth: usize, out: &mut String) {
        let node = &self.nodes[index];
        let constraints: Vec<String> = node.constraints.iter().map(|c| c.to_string()).collect();
        let prefix = "\t".repeat(depth);
        match &node.kind {
            NodeKind::Leaf(id) => {
                out.push_str(&format!(
                    "{}LEAF {} '{}' [{}]\n",
                    prefix,
                    id.0,
                    node.name,
                    constraints.join(", ")
                ));
            }
            NodeKind::Internal(children) => {
                out.push_str(&format!(
                    "{}SUBTREE '{}' [{}]\n",
                    prefix,
                    node.name,
                    constraints.join(", ")
                ));
                for &child in children {
                    self.dump_node(child, depth + 1, out);
                }
            }
        }
    }
}

fn build_node(
    doc: &LevelDoc,
    ancestors: &[Constraint],
    nodes: &mut Vec<TreeNode>,
    registry: &mut Vec<Level>,
) -> Result<usize> {
    let local: Vec<Constraint> = doc.constraints.iter().map(Constraint::compile).collect();
    let mut chain = ancestors.to_vec();
    chain.extend(local.iter().cloned());

    match &doc.sublevels {
        Some(sublevels) => {
            if sublevels.is_empty() {
                bail!(
                    "Mapping: level '{}' declares an empty sublevels list",
                    doc.level
                );
            }
            let mut children = Vec::with_capacity(sublevels.len());
            for sublevel in sublevels {
                children.push(build_node(sublevel, &chain, nodes, registry)?);
            }
            nodes.push(TreeNode {
                name: doc.level.clone(),
                constraints: local,
                kind: NodeKind::Internal(children),
            });
        }
        None => {
            // Single shared counter: ids follow depth-first declaration order.
            let id = LevelId(registry.len() as u32 + 1);
            if doc.factor.is_none() {
                tracing::warn!("Mapping: level '{}' (id {}) has no factor", doc.level, id.0);
            }
            registry.push(Level {
                id,
                name: doc.level.clone(),
                factor: doc.factor.unwrap_or(1),
                icon: doc.icon.clone(),
                constraints: chain,
            });
            nodes.push(TreeNode {
                name: doc.level.clone(),
                constraints: local,
                kind: NodeKind::Leaf(id),
            });
        }
    }
    Ok(nodes.len() - 1)
}
