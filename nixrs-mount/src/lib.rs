//! Bind-mount option algebra and Linux mount-syscall realisation for the
//! sandboxed builder.
//!
//! [`flags::MountOpts`] models the option set (flags with a "reversed" bit
//! and a recursion bit, compacted so only the last option per key class
//! survives); [`bind::BindMount`] realises one onto the filesystem, picking
//! the legacy `mount(MS_BIND)`/remount pair or the newer
//! `open_tree`/`mount_setattr`/`move_mount` triple depending on what the
//! option set needs.

mod bind;
mod error;
mod flags;
mod raw;
#[cfg(target_os = "linux")]
mod syscall;

pub use bind::BindMount;
#[cfg(target_os = "linux")]
pub use bind::file_mount_flags;
pub use error::MountError;
pub use flags::{MountOpt, MountOpts, DEFAULT_OPTIONS};
