//! Path-keyed configuration registry.
//!
//! Independent entries declare defaults under dotted paths; an external
//! loader writes overrides into the same tree. Defaults only fill absent
//! keys, overrides always win, and reads resolve against the live tree.

mod error;
mod registry;
mod tree;

pub use error::{Error, ErrorKind, Result};
pub use registry::{is_private, OwnerId, OwnerRecord, Registry, PRIVATE_PREFIX};
pub use tree::{split_path, validate_name, ConfigTree, Filled, Leaf, Node, Origin, PATH_SEPARATOR};
