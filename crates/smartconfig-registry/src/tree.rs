//! Hierarchical configuration tree
//!
//! A namespace maps path segments to either a nested namespace or an
//! attribute leaf. Leaves remember whether they were written as a default
//! (fill-if-absent) or as an override (unconditional set), which is what
//! lets an entry unload its own defaults without touching anything else.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Who wrote a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Default,
    Override,
}

/// An attribute value stored in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub value: Value,
    pub origin: Origin,
}

/// A tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Namespace(BTreeMap<String, Node>),
    Leaf(Leaf),
}

impl Node {
    fn to_value(&self) -> Value {
        match self {
            Node::Namespace(children) => namespace_to_value(children),
            Node::Leaf(leaf) => leaf.value.clone(),
        }
    }
}

/// Split a dotted path into its segments.
///
/// Empty paths and empty segments are rejected.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return Err(Error::invalid_operation("configuration path must not be empty"));
    }
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::invalid_operation(format!(
            "configuration path '{}' contains an empty segment",
            path
        )));
    }
    Ok(segments)
}

/// Check that `name` can live directly inside a namespace.
///
/// A name holding the separator or an empty name could never be reached by
/// a dotted path, so both are rejected.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_operation("configuration name must not be empty"));
    }
    if name.contains(PATH_SEPARATOR) {
        return Err(Error::invalid_operation(format!(
            "configuration name '{}' must not contain '{}'",
            name, PATH_SEPARATOR
        )));
    }
    Ok(())
}

/// Join the first `depth` segments back into a dotted path.
fn location(segments: &[&str], depth: usize) -> String {
    segments[..depth].join(".")
}

fn namespace_to_value(children: &BTreeMap<String, Node>) -> Value {
    let map: Map<String, Value> = children
        .iter()
        .map(|(k, v)| (k.clone(), v.to_value()))
        .collect();
    Value::Object(map)
}

/// Outcome of [`ConfigTree::fill`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filled {
    /// Names that were actually written.
    pub written: BTreeSet<String>,

    /// Number of trailing path segments created as new namespaces.
    pub created: usize,
}

/// The root of the configuration tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: BTreeMap<String, Node>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk to the namespace at `segments` without creating anything.
    ///
    /// Returns `Ok(None)` when a segment is missing and a CONFIGURATION
    /// error when a segment holds a value instead of a namespace.
    fn namespace(&self, segments: &[&str]) -> Result<Option<&BTreeMap<String, Node>>> {
        let mut current = &self.root;
        for (depth, segment) in segments.iter().enumerate() {
            current = match current.get(*segment) {
                Some(Node::Namespace(children)) => children,
                Some(Node::Leaf(_)) => {
                    return Err(Error::configuration(
                        location(segments, depth + 1),
                        "expected a namespace, found a value",
                    ))
                }
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    fn namespace_mut(&mut self, segments: &[&str]) -> Option<&mut BTreeMap<String, Node>> {
        let mut current = &mut self.root;
        for segment in segments {
            current = match current.get_mut(*segment)? {
                Node::Namespace(children) => children,
                Node::Leaf(_) => return None,
            };
        }
        Some(current)
    }

    /// Walk to the namespace at `segments`, creating missing namespaces.
    ///
    /// Existing namespaces are never replaced. Also returns how many
    /// trailing segments had to be created.
    fn namespace_or_create(
        &mut self,
        segments: &[&str],
    ) -> Result<(&mut BTreeMap<String, Node>, usize)> {
        let mut current = &mut self.root;
        let mut created = 0;
        for (depth, segment) in segments.iter().enumerate() {
            let node = current.entry((*segment).to_string()).or_insert_with(|| {
                created += 1;
                Node::Namespace(BTreeMap::new())
            });
            current = match node {
                Node::Namespace(children) => children,
                Node::Leaf(_) => {
                    return Err(Error::configuration(
                        location(segments, depth + 1),
                        "expected a namespace, found a value",
                    ))
                }
            };
        }
        Ok((current, created))
    }

    /// Resolve `name` in the namespace at `segments`.
    pub fn get(&self, segments: &[&str], name: &str) -> Result<&Value> {
        let path = segments.join(".");
        let namespace = self
            .namespace(segments)?
            .ok_or_else(|| Error::configuration_key(&path, name))?;
        match namespace.get(name) {
            Some(Node::Leaf(leaf)) => Ok(&leaf.value),
            Some(Node::Namespace(_)) => Err(Error::configuration(
                format!("{}.{}", path, name),
                "expected a value, found a namespace",
            )),
            None => Err(Error::configuration_key(path, name)),
        }
    }

    /// Write each default whose name is not already present.
    ///
    /// Every name is checked before anything is written.
    pub fn fill<'a, I>(&mut self, segments: &[&str], defaults: I) -> Result<Filled>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let defaults: Vec<_> = defaults.into_iter().collect();
        for (name, _) in &defaults {
            validate_name(name)?;
        }

        let (namespace, created) = self.namespace_or_create(segments)?;
        let mut written = BTreeSet::new();
        for (name, value) in defaults {
            if namespace.contains_key(name) {
                continue;
            }
            namespace.insert(
                name.clone(),
                Node::Leaf(Leaf {
                    value: value.clone(),
                    origin: Origin::Default,
                }),
            );
            written.insert(name.clone());
        }
        Ok(Filled { written, created })
    }

    /// Write `value` at `name` regardless of what is there.
    pub fn set(&mut self, segments: &[&str], name: &str, value: Value) -> Result<()> {
        validate_name(name)?;
        let (namespace, _) = self.namespace_or_create(segments)?;
        if let Some(Node::Namespace(_)) = namespace.get(name) {
            let mut full = segments.to_vec();
            full.push(name);
            return Err(Error::configuration(
                full.join("."),
                "expected a value, found a namespace",
            ));
        }
        namespace.insert(
            name.to_string(),
            Node::Leaf(Leaf {
                value,
                origin: Origin::Override,
            }),
        );
        Ok(())
    }

    /// Create the namespace at `segments` if it is missing.
    pub fn ensure_namespace(&mut self, segments: &[&str]) -> Result<()> {
        self.namespace_or_create(segments).map(|_| ())
    }

    /// Origin of the leaf at `name`, if there is one.
    pub fn origin(&self, segments: &[&str], name: &str) -> Option<Origin> {
        match self.namespace(segments).ok()??.get(name)? {
            Node::Leaf(leaf) => Some(leaf.origin),
            Node::Namespace(_) => None,
        }
    }

    /// Remove the named leaves at `segments` that are still defaults.
    ///
    /// Returns how many leaves were removed.
    pub fn remove_defaults(&mut self, segments: &[&str], names: &BTreeSet<String>) -> usize {
        let Some(namespace) = self.namespace_mut(segments) else {
            return 0;
        };
        let before = namespace.len();
        namespace.retain(|name, node| {
            !(names.contains(name)
                && matches!(node, Node::Leaf(leaf) if leaf.origin == Origin::Default))
        });
        before - namespace.len()
    }

    /// Remove empty namespaces from `segments` upward.
    ///
    /// Stops at the first non-empty namespace or at any prefix for which
    /// `keep` returns true.
    pub fn prune<F>(&mut self, segments: &[&str], keep: F)
    where
        F: Fn(&str) -> bool,
    {
        for depth in (1..=segments.len()).rev() {
            if keep(&location(segments, depth)) {
                return;
            }
            let Some(parent) = self.namespace_mut(&segments[..depth - 1]) else {
                return;
            };
            let empty = matches!(
                parent.get(segments[depth - 1]),
                Some(Node::Namespace(children)) if children.is_empty()
            );
            if !empty {
                return;
            }
            parent.remove(segments[depth - 1]);
        }
    }

    /// Render the whole tree as a nested JSON object.
    pub fn to_value(&self) -> Value {
        namespace_to_value(&self.root)
    }
}
