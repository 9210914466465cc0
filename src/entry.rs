//! Configuration entries
//!
//! An entry is a named bundle of defaults and required attributes living
//! at one dotted path. Declaring it merges its defaults into the registry
//! and validates every attribute; reading an attribute always goes back to
//! the registry, so values written by a loader after declaration are seen
//! immediately.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;

use smartconfig_registry::{is_private, Error, OwnerId, Registry, Result};

/// Start an [`EntryBuilder`] whose default path is the calling module.
///
/// ```
/// use smartconfig::{config_entry, Registry};
///
/// let registry = Registry::new();
/// let entry = config_entry!("Timeout")
///     .path("svc.timeout")
///     .default("retries", 3)
///     .register(&registry)
///     .unwrap();
/// assert_eq!(entry.get("retries").unwrap(), 3);
/// ```
#[macro_export]
macro_rules! config_entry {
    ($name:expr) => {
        $crate::EntryBuilder::new($name, module_path!())
    };
}

/// Convert a Rust module path (`a::b::c`) into a dotted path (`a.b.c`).
pub fn module_to_path(module: &str) -> String {
    module.replace("::", ".")
}

/// Builder for a [`ConfigEntry`].
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    name: String,
    module: String,
    path: Option<String>,
    defaults: BTreeMap<String, Value>,
    annotated: BTreeSet<String>,
    private: BTreeMap<String, Value>,
}

impl EntryBuilder {
    /// New builder for entry `name` declared in `module`.
    ///
    /// `module` may use either `::` or `.` as separator.
    pub fn new(name: impl Into<String>, module: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            module: module_to_path(module.as_ref()),
            path: None,
            defaults: BTreeMap::new(),
            annotated: BTreeSet::new(),
            private: BTreeMap::new(),
        }
    }

    /// Use `path` instead of the declaring module's path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Declare an attribute with a default value.
    ///
    /// Private names are kept on the entry and never reach the registry.
    pub fn default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if is_private(&name) {
            self.private.insert(name, value.into());
        } else {
            self.defaults.insert(name, value.into());
        }
        self
    }

    /// Declare an attribute with no default; some loader must supply it.
    pub fn annotated(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !is_private(&name) {
            self.annotated.insert(name);
        }
        self
    }

    /// Attach a private attribute.
    ///
    /// Fails with INVALID_OPERATION at registration if `name` is not
    /// private-prefixed.
    pub fn private(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.private.insert(name.into(), value.into());
        self
    }

    /// The path this entry will claim.
    pub fn resolved_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.module)
    }

    /// Claim the path, merge defaults and validate against `registry`.
    ///
    /// Nothing stays registered when this fails.
    pub fn register(self, registry: &Registry) -> Result<ConfigEntry> {
        if let Some(name) = self.private.keys().find(|name| !is_private(name)) {
            return Err(Error::invalid_operation(format!(
                "'{}' is not a private attribute name",
                name
            )));
        }

        let path = self.resolved_path().to_string();
        let owner = registry.register_entry(&path, &self.name, &self.defaults, &self.annotated)?;

        let mut attributes: BTreeSet<String> = self.defaults.into_keys().collect();
        attributes.extend(self.annotated);

        Ok(ConfigEntry {
            registry: registry.clone(),
            name: self.name,
            path,
            owner: Some(owner),
            attributes,
            private: self.private,
        })
    }
}

/// A live configuration entry.
///
/// The claim on its path is released by [`ConfigEntry::unload`] or, failing
/// that, when the entry is dropped.
pub struct ConfigEntry {
    registry: Registry,
    name: String,
    path: String,
    owner: Option<OwnerId>,
    attributes: BTreeSet<String>,
    private: BTreeMap<String, Value>,
}

impl ConfigEntry {
    /// Entry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved dotted path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Public attributes declared by this entry.
    pub fn attribute_names(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    /// Resolve `name` against the registry.
    ///
    /// Private names resolve from the entry itself.
    pub fn get(&self, name: &str) -> Result<Value> {
        if is_private(name) {
            return self
                .private
                .get(name)
                .cloned()
                .ok_or_else(|| Error::configuration_key(&self.path, name));
        }
        self.registry.get_attribute(&self.path, name)
    }

    /// Whether `name` currently resolves.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Release the path and unload this entry's defaults.
    ///
    /// Returns false if the claim had already been dropped, e.g. by
    /// [`Registry::reset`].
    pub fn unload(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        match self.owner.take() {
            Some(owner) => self.registry.release_owned(&self.path, owner),
            None => false,
        }
    }
}

impl Drop for ConfigEntry {
    fn drop(&mut self) {
        self.release();
    }
}

impl PartialEq for ConfigEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ConfigEntry {}

impl fmt::Debug for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigEntry")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl fmt::Display for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ConfigEntry {} at '{}'>", self.name, self.path)
    }
}
