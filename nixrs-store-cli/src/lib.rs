//! Thin smoke-test commands wired directly against `nixrs`'s [`Store`]
//! trait, mirroring how the daemon binary exercised the pre-refactor
//! `nixrs-store`/`nixrs-util` crates one command at a time.
//!
//! [`Store`]: nixrs::store::Store

pub mod build;
pub mod substitute;
pub mod verify_path;
