//! Bind-mount option algebra.
//!
//! Options are flag bits with a "reversed" meaning (e.g. `nosuid` vs `suid`)
//! and a "key class" (atime mode, propagation mode, ...) such that only the
//! last option of a given class survives when a set is compacted. This is
//! the same shape as the upstream `MOUNT_OPTION_LIST` table, translated from
//! a macro-generated C++ enum into a plain Rust table.

use std::fmt;

use crate::raw;

/// A single named bind-mount option, as it would appear on a sandbox-path
/// declaration (`ro`, `norec`, `private`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountOpt {
    Unknown,
    Ro,
    RoRec,
    Rw,
    RwRec,
    Suid,
    SuidRec,
    NoSuid,
    NoSuidRec,
    Dev,
    DevRec,
    NoDev,
    NoDevRec,
    Exec,
    ExecRec,
    NoExec,
    NoExecRec,
    SymFollow,
    SymFollowRec,
    NoSymFollow,
    NoSymFollowRec,
    DirAtime,
    DirAtimeRec,
    NoDirAtime,
    NoDirAtimeRec,
    NoAtime,
    NoAtimeRec,
    RelAtime,
    RelAtimeRec,
    StrictAtime,
    StrictAtimeRec,
    CanonSrc,
    NoCanonSrc,
    CanonDst,
    NoCanonDst,
    Private,
    PrivateRec,
    Slave,
    SlaveRec,
    Unbindable,
    UnbindableRec,
}

use MountOpt::*;

/// `(option, key string, raw flag bits)`, mirroring the upstream
/// `MOUNT_OPTION_LIST` table row for row.
const TABLE: &[(MountOpt, &str, u64)] = &[
    (Unknown, "", 0),
    (Ro, "ro", raw::MS_RDONLY),
    (RoRec, "ro=rec", raw::MS_RDONLY | raw::MS_REC),
    (Rw, "rw", raw::MS_RDONLY | raw::MS_REV),
    (RwRec, "rw=rec", raw::MS_RDONLY | raw::MS_REV | raw::MS_REC),
    (Suid, "suid", raw::MS_NOSUID | raw::MS_REV),
    (SuidRec, "suid=rec", raw::MS_NOSUID | raw::MS_REV | raw::MS_REC),
    (NoSuid, "nosuid", raw::MS_NOSUID),
    (NoSuidRec, "nosuid=rec", raw::MS_NOSUID | raw::MS_REC),
    (Dev, "dev", raw::MS_NODEV | raw::MS_REV),
    (DevRec, "dev=rec", raw::MS_NODEV | raw::MS_REV | raw::MS_REC),
    (NoDev, "nodev", raw::MS_NODEV),
    (NoDevRec, "nodev=rec", raw::MS_NODEV | raw::MS_REC),
    (Exec, "exec", raw::MS_NOEXEC | raw::MS_REV),
    (ExecRec, "exec=rec", raw::MS_NOEXEC | raw::MS_REV | raw::MS_REC),
    (NoExec, "noexec", raw::MS_NOEXEC),
    (NoExecRec, "noexec=rec", raw::MS_NOEXEC | raw::MS_REC),
    (SymFollow, "symfollow", raw::MS_NOSYMFOLLOW | raw::MS_REV),
    (
        SymFollowRec,
        "symfollow=rec",
        raw::MS_NOSYMFOLLOW | raw::MS_REV | raw::MS_REC,
    ),
    (NoSymFollow, "nosymfollow", raw::MS_NOSYMFOLLOW),
    (NoSymFollowRec, "nosymfollow=rec", raw::MS_NOSYMFOLLOW | raw::MS_REC),
    (DirAtime, "diratime", raw::MS_NODIRATIME | raw::MS_REV),
    (
        DirAtimeRec,
        "diratime=rec",
        raw::MS_NODIRATIME | raw::MS_REV | raw::MS_REC,
    ),
    (NoDirAtime, "nodiratime", raw::MS_NODIRATIME),
    (NoDirAtimeRec, "nodiratime=rec", raw::MS_NODIRATIME | raw::MS_REC),
    (NoAtime, "noatime", raw::MS_NOATIME),
    (NoAtimeRec, "noatime=rec", raw::MS_NOATIME | raw::MS_REC),
    (RelAtime, "relatime", raw::MS_RELATIME),
    (RelAtimeRec, "relatime=rec", raw::MS_RELATIME | raw::MS_REC),
    (StrictAtime, "strictatime", raw::MS_STRICTATIME),
    (StrictAtimeRec, "strictatime=rec", raw::MS_STRICTATIME | raw::MS_REC),
    (CanonSrc, "canonsrc", raw::MS_SOURCE_NOCANON | raw::MS_REV),
    (NoCanonSrc, "nocanonsrc", raw::MS_SOURCE_NOCANON),
    (CanonDst, "canondst", raw::MS_TARGET_NOCANON | raw::MS_REV),
    (NoCanonDst, "nocanondst", raw::MS_TARGET_NOCANON),
    (Private, "private", raw::MS_PRIVATE),
    (PrivateRec, "rprivate", raw::MS_PRIVATE | raw::MS_REC),
    (Slave, "slave", raw::MS_SLAVE),
    (SlaveRec, "rslave", raw::MS_SLAVE | raw::MS_REC),
    (Unbindable, "unbindable", raw::MS_UNBINDABLE),
    (UnbindableRec, "runbindable", raw::MS_UNBINDABLE | raw::MS_REC),
];

impl MountOpt {
    pub fn bits(self) -> u64 {
        TABLE.iter().find(|(o, _, _)| *o == self).map(|(_, _, b)| *b).unwrap_or(0)
    }

    pub fn as_str(self) -> &'static str {
        TABLE.iter().find(|(o, _, _)| *o == self).map(|(_, s, _)| *s).unwrap_or("")
    }

    /// The key class two options collide on: at most one option per class
    /// survives compaction (e.g. `noatime` and `relatime` can't both apply).
    fn key(self) -> u64 {
        let bits = self.bits() & !raw::MS_REV;
        let rec = bits & raw::MS_REC;
        if bits & raw::MOUNT_OPTIONS_ATIME != 0 {
            raw::MS_NOATIME | rec
        } else if bits & raw::MOUNT_OPTIONS_PROPAGATION != 0 {
            raw::MS_PRIVATE | rec
        } else {
            bits
        }
    }
}

impl fmt::Display for MountOpt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compacted, order-independent set of [`MountOpt`]s plus the resolved
/// `mount_setattr` attribute structs it reduces to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOpts {
    opts: Vec<MountOpt>,
    recursive: bool,
}

impl MountOpts {
    pub fn new(opts: Vec<MountOpt>, recursive: bool) -> Self {
        MountOpts {
            opts: compact(opts),
            recursive,
        }
    }

    pub fn opts(&self) -> &[MountOpt] {
        &self.opts
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn append(&mut self, extra: &[MountOpt]) {
        let mut merged = self.opts.clone();
        merged.extend_from_slice(extra);
        self.opts = compact(merged);
    }

    /// Flattens the set into a plain legacy `mount(2)` flag word, as used by
    /// the `MS_BIND` remount path.
    pub fn legacy_flags(&self) -> u64 {
        self.opts.iter().fold(0u64, |acc, o| merge_flag(acc, *o))
    }

    /// Splits the set into `(attr_set, attr_clr, propagation)` for
    /// `mount_setattr`, non-recursive and recursive variants separately
    /// (`rec` selects which).
    pub fn mount_attr(&self, want_rec: bool) -> raw::MountAttr {
        let mut attr = raw::MountAttr::default();
        for opt in &self.opts {
            let bits = opt.bits();
            let opt_rec = bits & raw::MS_REC != 0 && self.recursive;
            if opt_rec != want_rec {
                continue;
            }
            apply_attr(&mut attr, bits);
        }
        attr
    }

    pub fn canon_source(&self) -> bool {
        !self
            .opts
            .iter()
            .any(|o| o.bits() & raw::MS_SOURCE_NOCANON != 0 && o.bits() & raw::MS_REV == 0)
    }

    pub fn canon_target(&self) -> bool {
        self.opts
            .iter()
            .any(|o| o.bits() & raw::MS_TARGET_NOCANON != 0 && o.bits() & raw::MS_REV == 0)
    }

    /// Whether any option needs propagation control or symlink-following
    /// control that the legacy `mount(MS_BIND)`/remount pair can't express,
    /// meaning the `open_tree`/`mount_setattr` path must be used instead.
    pub fn needs_new_api(&self) -> bool {
        let attr = self.mount_attr(false);
        let attr_rec = self.mount_attr(true);
        attr.propagation != 0
            || attr_rec.propagation != 0
            || !self.canon_source()
            || self.canon_target()
            || attr_rec.attr_set != 0
            || attr_rec.attr_clr != 0
    }
}

impl fmt::Display for MountOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strs: Vec<&str> = self.opts.iter().map(|o| o.as_str()).collect();
        write!(f, "{}", strs.join(","))
    }
}

fn merge_flag(res: u64, opt: MountOpt) -> u64 {
    let bits = opt.bits();
    if bits & raw::MS_SOURCE_NOCANON != 0 || bits & raw::MS_TARGET_NOCANON != 0 {
        res
    } else if bits & raw::MS_REV != 0 {
        res & !(bits & !raw::MS_REV)
    } else if bits & raw::MOUNT_OPTIONS_ATIME != 0 {
        (res & !raw::MOUNT_OPTIONS_ATIME) | bits
    } else if bits & raw::MOUNT_OPTIONS_PROPAGATION != 0 {
        (res & !raw::MOUNT_OPTIONS_PROPAGATION) | bits
    } else {
        res | bits
    }
}

fn apply_attr(attr: &mut raw::MountAttr, bits: u64) {
    let rev = bits & raw::MS_REV != 0;
    if bits & raw::MOUNT_OPTIONS_PROPAGATION != 0 {
        attr.propagation = bits & raw::MOUNT_OPTIONS_PROPAGATION;
        return;
    }
    let mut set_attr = 0u64;
    for (ms, ma) in raw::MOUNT_ATTRS {
        if ms & bits != 0 {
            set_attr |= ma;
        }
    }
    if set_attr == 0 {
        return;
    }
    if rev {
        attr.attr_clr |= set_attr;
        attr.attr_set &= !set_attr;
    } else if set_attr & raw::MOUNT_ATTR__ATIME != 0 {
        attr.attr_clr |= raw::MOUNT_ATTR__ATIME;
        attr.attr_set &= !raw::MOUNT_ATTR__ATIME;
        attr.attr_set |= set_attr;
    } else {
        attr.attr_clr &= !set_attr;
        attr.attr_set |= set_attr;
    }
}

/// Walks `opts` from the end, keeping only the last option of each key
/// class and re-deriving whether a recursive option shadows a redundant
/// non-recursive one of the same class.
fn compact(opts: Vec<MountOpt>) -> Vec<MountOpt> {
    let mut result: Vec<MountOpt> = Vec::new();
    let mut seen_keys: Vec<u64> = vec![0];
    for opt in opts.into_iter().rev() {
        let key = opt.key();
        if seen_keys.contains(&key) {
            continue;
        }
        seen_keys.push(key);
        if key & raw::MS_REC != 0 {
            let non_rec_key = key & !raw::MS_REC;
            seen_keys.push(non_rec_key);
            result.retain(|o| o.key() != non_rec_key);
        }
        result.insert(0, opt);
    }
    result
}

/// Default options applied to every sandbox bind mount unless overridden:
/// deny setuid binaries, and isolate mount propagation recursively.
pub const DEFAULT_OPTIONS: &[MountOpt] = &[NoSuid, PrivateRec];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_drops_shadowed_atime_option() {
        let opts = MountOpts::new(vec![NoAtime, RelAtime], false);
        assert_eq!(opts.opts(), &[RelAtime]);
    }

    #[test]
    fn compact_recursive_shadows_non_recursive_of_same_key() {
        let opts = MountOpts::new(vec![NoSuid, NoSuidRec], false);
        assert_eq!(opts.opts(), &[NoSuidRec]);
    }

    #[test]
    fn legacy_flags_reverses_suid_over_nosuid() {
        let opts = MountOpts::new(vec![NoSuid, Suid], false);
        assert_eq!(opts.legacy_flags() & raw::MS_NOSUID, 0);
    }

    #[test]
    fn default_options_deny_setuid_and_isolate_propagation() {
        let opts = MountOpts::new(DEFAULT_OPTIONS.to_vec(), true);
        assert!(opts.needs_new_api());
    }

    #[test]
    fn display_joins_option_keys() {
        let opts = MountOpts::new(vec![Ro, NoSuid], false);
        assert_eq!(opts.to_string(), "ro,nosuid");
    }
}
