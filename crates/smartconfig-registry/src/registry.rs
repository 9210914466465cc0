//! Shared registry of configuration entries.
//!
//! The registry owns the configuration tree plus the bookkeeping of which
//! entry currently claims which path. All state sits behind one lock so a
//! declaration (claim, merge, validate) is atomic with respect to other
//! threads, and reads never observe a half-registered entry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::tree::{split_path, validate_name, ConfigTree, Origin, PATH_SEPARATOR};

/// Names starting with this prefix never enter the configuration surface.
pub const PRIVATE_PREFIX: &str = "_";

/// Source of unique owner identifiers.
static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Process-wide registry.
static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Whether `name` is private by convention.
pub fn is_private(name: &str) -> bool {
    name.starts_with(PRIVATE_PREFIX)
}

/// Identity of the entry holding a claim.
///
/// Releasing through an [`OwnerId`] only succeeds while that same claim is
/// live, so a stale handle can never free a path someone else reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(u64);

impl OwnerId {
    fn next() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Bookkeeping for a claimed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRecord {
    /// Claim identity.
    pub id: OwnerId,

    /// Name of the owning entry.
    pub entry: String,

    /// Default keys this entry wrote into the tree.
    pub contributed: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    tree: ConfigTree,
    owners: BTreeMap<String, OwnerRecord>,
}

impl RegistryInner {
    fn claim(&mut self, path: &str, entry: &str) -> Result<OwnerId> {
        split_path(path)?;
        if self.owners.contains_key(path) {
            return Err(Error::path_conflict(path));
        }
        let id = OwnerId::next();
        self.owners.insert(
            path.to_string(),
            OwnerRecord {
                id,
                entry: entry.to_string(),
                contributed: BTreeSet::new(),
            },
        );
        debug!(path, entry, "claimed configuration path");
        Ok(id)
    }

    /// Drop the claim on `path` and unload the defaults it contributed.
    fn release(&mut self, path: &str) -> bool {
        self.release_above(path, 0)
    }

    /// Like [`RegistryInner::release`], but never prunes namespaces at or
    /// above `floor` segments deep.
    fn release_above(&mut self, path: &str, floor: usize) -> bool {
        let Some(record) = self.owners.remove(path) else {
            return false;
        };
        let Ok(segments) = split_path(path) else {
            return true;
        };

        let RegistryInner { tree, owners } = self;
        let removed = tree.remove_defaults(&segments, &record.contributed);
        tree.prune(&segments, |prefix| {
            prefix.split(PATH_SEPARATOR).count() <= floor
                || owners.keys().any(|owned| {
                    owned == prefix
                        || (owned.starts_with(prefix)
                            && owned[prefix.len()..].starts_with(PATH_SEPARATOR))
                })
        });
        debug!(path, entry = %record.entry, removed, "released configuration path");
        true
    }
}

/// The shared configuration registry.
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl Registry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget every value and every claim.
    pub fn reset(&self) {
        let mut inner = self.write();
        *inner = RegistryInner::default();
        debug!("registry reset");
    }

    /// Fill in defaults at `path` for names that have no value yet.
    ///
    /// Existing values win, whether they are earlier defaults or overrides.
    /// Private names are skipped.
    pub fn merge_defaults(&self, path: &str, defaults: &BTreeMap<String, Value>) -> Result<()> {
        let segments = split_path(path)?;
        let mut inner = self.write();
        let filled = inner
            .tree
            .fill(&segments, defaults.iter().filter(|(name, _)| !is_private(name)))?;
        debug!(path, written = filled.written.len(), "merged defaults");
        Ok(())
    }

    /// Resolve attribute `name` at `path`.
    pub fn get_attribute(&self, path: &str, name: &str) -> Result<Value> {
        let segments = split_path(path)?;
        let inner = self.read();
        inner.tree.get(&segments, name).cloned()
    }

    /// Claim `path` for the entry named `entry`.
    pub fn claim_path(&self, path: &str, entry: &str) -> Result<OwnerId> {
        self.write().claim(path, entry)
    }

    /// Release the claim on `path` whoever holds it.
    ///
    /// Returns false if the path was not claimed.
    pub fn release_path(&self, path: &str) -> bool {
        self.write().release(path)
    }

    /// Release the claim on `path` only if `id` still holds it.
    pub fn release_owned(&self, path: &str, id: OwnerId) -> bool {
        let mut inner = self.write();
        match inner.owners.get(path) {
            Some(record) if record.id == id => inner.release(path),
            _ => false,
        }
    }

    /// Claim `path`, merge `defaults`, then check that every public default
    /// and every name in `required` resolves.
    ///
    /// Runs under a single lock. On any failure the claim is released, the
    /// defaults written here are removed again and only namespaces created
    /// here are pruned.
    pub fn register_entry(
        &self,
        path: &str,
        entry: &str,
        defaults: &BTreeMap<String, Value>,
        required: &BTreeSet<String>,
    ) -> Result<OwnerId> {
        let segments = split_path(path)?;
        let declared: Vec<&String> = defaults
            .keys()
            .chain(required.iter())
            .filter(|name| !is_private(name))
            .collect();
        for name in &declared {
            validate_name(name)?;
        }

        let mut inner = self.write();
        let id = inner.claim(path, entry)?;

        let filled = match inner
            .tree
            .fill(&segments, defaults.iter().filter(|(name, _)| !is_private(name)))
        {
            Ok(filled) => filled,
            Err(err) => {
                inner.release_above(path, segments.len());
                warn!(path, entry, error = %err, "entry rolled back");
                return Err(err);
            }
        };
        let floor = segments.len() - filled.created;
        if let Some(record) = inner.owners.get_mut(path) {
            record.contributed = filled.written;
        }

        for name in declared {
            if inner.tree.get(&segments, name).is_err() {
                inner.release_above(path, floor);
                warn!(path, entry, attribute = %name, "entry rolled back");
                return Err(Error::configuration_key(path, name.as_str()));
            }
        }

        Ok(id)
    }

    /// Write `value` at `(path, name)` regardless of what is there.
    pub fn set_override(&self, path: &str, name: &str, value: Value) -> Result<()> {
        if is_private(name) {
            return Err(Error::invalid_operation(format!(
                "private attribute '{}' can't be overridden",
                name
            )));
        }
        let segments = split_path(path)?;
        self.write().tree.set(&segments, name, value)?;
        debug!(path, name, "override set");
        Ok(())
    }

    /// Apply a nested override document.
    ///
    /// Objects denote namespaces; every other value is written with
    /// unconditional-set semantics. Keys are checked before anything is
    /// written: an empty key or one holding the separator is an
    /// INVALID_OPERATION. Conflicts with the existing tree are found while
    /// writing, and writes made before such a failure stay in place.
    pub fn apply_overrides(&self, document: &Value) -> Result<usize> {
        let Value::Object(map) = document else {
            return Err(Error::configuration(
                "<root>",
                "override document must be a table of namespaces",
            ));
        };
        check_object(map, 0)?;
        let mut inner = self.write();
        let mut segments = Vec::new();
        let count = apply_object(&mut inner.tree, &mut segments, map)?;
        debug!(count, "applied override document");
        Ok(count)
    }

    /// Paths currently claimed by a live entry.
    pub fn used_paths(&self) -> BTreeSet<String> {
        self.read().owners.keys().cloned().collect()
    }

    /// Whether `path` is claimed.
    pub fn is_claimed(&self, path: &str) -> bool {
        self.read().owners.contains_key(path)
    }

    /// Owner bookkeeping for `path`.
    pub fn owner_of(&self, path: &str) -> Option<OwnerRecord> {
        self.read().owners.get(path).cloned()
    }

    /// Origin of the value at `(path, name)`, if there is one.
    pub fn origin(&self, path: &str, name: &str) -> Option<Origin> {
        let segments = split_path(path).ok()?;
        self.read().tree.origin(&segments, name)
    }

    /// The whole tree as a nested JSON object.
    pub fn snapshot(&self) -> Value {
        self.read().tree.to_value()
    }
}

fn check_object(map: &serde_json::Map<String, Value>, depth: usize) -> Result<()> {
    for (key, value) in map {
        validate_name(key)?;
        match value {
            Value::Object(children) => check_object(children, depth + 1)?,
            _ if depth == 0 => {
                return Err(Error::configuration(
                    key.as_str(),
                    "top-level override must be a namespace, found a value",
                ))
            }
            _ if is_private(key) => {
                return Err(Error::invalid_operation(format!(
                    "private attribute '{}' can't be overridden",
                    key
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply_object(
    tree: &mut ConfigTree,
    segments: &mut Vec<String>,
    map: &serde_json::Map<String, Value>,
) -> Result<usize> {
    let mut count = 0;
    for (key, value) in map {
        match value {
            Value::Object(children) => {
                segments.push(key.clone());
                let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
                tree.ensure_namespace(&refs)?;
                count += apply_object(tree, segments, children)?;
                segments.pop();
            }
            _ => {
                let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
                tree.set(&refs, key, value.clone())?;
                count += 1;
            }
        }
    }
    Ok(count)
}
