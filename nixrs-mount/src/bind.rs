//! Realising a [`MountOpts`]-tagged bind mount onto the filesystem.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::MountError;
use crate::flags::{MountOpts, DEFAULT_OPTIONS};
use crate::raw;

/// One entry of the sandbox's bind-mount table: `source` is bound onto
/// `target` with `options` applied, optionally recursively, and silently
/// skipped if `source` doesn't exist and `optional` is set.
#[derive(Debug, Clone)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub options: MountOpts,
    pub optional: bool,
}

impl BindMount {
    /// A bind mount with the default sandbox options (`nosuid`,
    /// `private`+recursive) and no further overrides.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        BindMount {
            source: source.into(),
            target: target.into(),
            options: MountOpts::new(DEFAULT_OPTIONS.to_vec(), true),
            optional: false,
        }
    }

    pub fn with_options(mut self, options: MountOpts) -> Self {
        self.options = options;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Performs the bind mount, choosing the legacy `mount(MS_BIND)`/remount
    /// pair or the `open_tree`/`mount_setattr`/`move_mount` triple depending
    /// on whether the requested options need propagation control or
    /// asymmetric symlink resolution that the legacy path can't express.
    #[cfg(target_os = "linux")]
    pub fn realize(&self) -> Result<(), MountError> {
        if self.optional && !self.source.exists() {
            debug!(source = %self.source.display(), "skipping optional bind mount, source missing");
            return Ok(());
        }

        if self.options.needs_new_api() {
            self.realize_new_api()
        } else {
            self.realize_legacy()
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn realize(&self) -> Result<(), MountError> {
        unimplemented!("bind mounts are only realised on Linux")
    }

    #[cfg(target_os = "linux")]
    fn realize_legacy(&self) -> Result<(), MountError> {
        use nix::mount::{mount, MsFlags};

        mount::<Path, Path, Path, Path>(
            Some(self.source.as_path()),
            self.target.as_path(),
            None,
            MsFlags::MS_BIND | if self.options.recursive() { MsFlags::MS_REC } else { MsFlags::empty() },
            None,
        )
        .map_err(|e| MountError::Mount(self.target.clone(), std::io::Error::from(e)))?;

        let flags = self.options.legacy_flags();
        if flags != 0 {
            let remount_flags = MsFlags::from_bits_truncate(flags as libc::c_ulong)
                | MsFlags::MS_BIND
                | MsFlags::MS_REMOUNT
                | if self.options.recursive() { MsFlags::MS_REC } else { MsFlags::empty() };
            mount::<Path, Path, Path, Path>(None, self.target.as_path(), None, remount_flags, None)
                .map_err(|e| MountError::Remount(self.target.clone(), std::io::Error::from(e)))?;
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn realize_new_api(&self) -> Result<(), MountError> {
        use crate::syscall;

        let recursive = self.options.recursive();
        let fd = syscall::open_tree(&self.source, recursive, self.options.canon_source())
            .map_err(|e| MountError::OpenTree(self.source.clone(), e))?;

        let apply = |rec: bool| -> Result<(), MountError> {
            let attr = self.options.mount_attr(rec);
            if attr.attr_set != 0 || attr.attr_clr != 0 || attr.propagation != 0 {
                syscall::mount_setattr(fd, rec, &attr)
                    .map_err(|e| MountError::MountSetattr(self.target.clone(), e))?;
            }
            Ok(())
        };
        apply(false)?;
        if recursive {
            apply(true)?;
        }

        let result = syscall::move_mount(fd, &self.target)
            .map_err(|e| MountError::MoveMount(self.target.clone(), e));
        unsafe {
            libc::close(fd);
        }
        result
    }

    /// Lazily detaches the mount at `target`, ignoring a missing mountpoint.
    #[cfg(target_os = "linux")]
    pub fn teardown(&self) -> Result<(), MountError> {
        use nix::mount::{umount2, MntFlags};
        match umount2(self.target.as_path(), MntFlags::MNT_DETACH) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::EINVAL) => Ok(()),
            Err(e) => Err(MountError::Unmount(self.target.clone(), std::io::Error::from(e))),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn teardown(&self) -> Result<(), MountError> {
        Ok(())
    }
}

/// Current mount flags of the filesystem containing `path`, read via
/// `statfs(2)`; used to seed a [`MountOpts`] from the ambient mount rather
/// than from an explicit option list.
#[cfg(target_os = "linux")]
pub fn file_mount_flags(path: &Path) -> std::io::Result<u64> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;
    let mut buf: libc::statfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statfs(c_path.as_ptr(), &mut buf) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    let f_flags = buf.f_flags as u64;
    let mut res = 0u64;
    const ST_RDONLY: u64 = 0x0001;
    const ST_NOSUID: u64 = 0x0002;
    const ST_NODEV: u64 = 0x0004;
    const ST_NOEXEC: u64 = 0x0008;
    const ST_NOATIME: u64 = 0x0400;
    const ST_NODIRATIME: u64 = 0x0800;
    const ST_RELATIME: u64 = 0x1000;
    for (st, ms) in [
        (ST_RDONLY, raw::MS_RDONLY),
        (ST_NOSUID, raw::MS_NOSUID),
        (ST_NODEV, raw::MS_NODEV),
        (ST_NOEXEC, raw::MS_NOEXEC),
        (ST_NOATIME, raw::MS_NOATIME),
        (ST_NODIRATIME, raw::MS_NODIRATIME),
    ] {
        if f_flags & st != 0 {
            res |= ms;
        }
    }
    if f_flags & ST_RELATIME != 0 {
        res |= raw::MS_RELATIME;
    }
    Ok(res)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::flags::MountOpt;

    #[test]
    fn readonly_bind_does_not_need_new_api() {
        let opts = MountOpts::new(vec![MountOpt::Ro, MountOpt::NoSuid], false);
        let bind = BindMount::new("/nix/store", "/sandbox/nix/store").with_options(opts);
        assert!(!bind.options.needs_new_api());
    }

    #[test]
    fn shared_propagation_needs_new_api() {
        let opts = MountOpts::new(vec![MountOpt::Slave], true);
        let bind = BindMount::new("/nix/store", "/sandbox/nix/store").with_options(opts);
        assert!(bind.options.needs_new_api());
    }
}
