//! Reads external trees of files (local directories, git checkouts, zip
//! and tarball archives, VCS checkouts over a CLI) through a uniform
//! [`accessor::InputAccessor`] interface, and resolves flake-style
//! `Input`s to locked store paths through a registry of per-scheme
//! fetchers.

pub mod accessor;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod input;
pub mod lock;
pub mod registry;
pub mod scheme;
pub mod schemes;

pub use error::{Error, Result};
pub use fetch::fetch_to_accessor;
pub use input::{AttrValue, Attrs, Input};
pub use lock::LockedInput;
pub use registry::Registry;
pub use scheme::{InputScheme, SchemeRegistry};
