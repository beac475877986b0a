use nixrs::store_path::StorePath;

use crate::input::Input;

/// The result of a successful fetch: the locked form of the [`Input`] (with
/// `rev`/`narHash`/whatever else pins it) plus the store path its tree was
/// ingested under. Kept separate from `Input` itself because most of a
/// fetch's callers want both "the thing to write back into `flake.lock`"
/// and "the thing to build against" without re-deriving one from the
/// other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedInput {
    pub input: Input,
    pub store_path: StorePath,
}

impl LockedInput {
    pub fn new(input: Input, store_path: StorePath) -> Self {
        LockedInput { input, store_path }
    }

    pub fn is_locked(&self) -> bool {
        self.input.has_narhash() || self.input.get_str("rev").is_some()
    }
}
