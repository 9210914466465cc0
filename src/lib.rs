//! smartconfig - declarative configuration defaults with live overrides
//!
//! Code modules declare [`ConfigEntry`] values holding defaults under a
//! dotted path. Defaults only fill keys nobody has set yet; overrides
//! loaded into the [`Registry`] always take precedence, before or after
//! the entry is declared, because every read resolves against the
//! registry tree.

pub mod entry;
pub mod loader;

pub use entry::{module_to_path, ConfigEntry, EntryBuilder};
pub use loader::{LoadError, OverrideFormat, OverrideSource};
pub use smartconfig_registry::{
    Error, ErrorKind, Origin, OwnerId, OwnerRecord, Registry, Result, PRIVATE_PREFIX,
};
