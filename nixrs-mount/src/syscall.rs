//! Raw wrappers for the `open_tree`/`mount_setattr`/`move_mount` syscall
//! trio. None of the three has made it into a released `nix` crate yet, so
//! they're invoked directly via `libc::syscall`, the same escape hatch
//! `nix` itself uses internally for syscalls it hasn't wrapped.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::raw::{self, MountAttr};

#[cfg(target_arch = "x86_64")]
mod nr {
    pub const OPEN_TREE: i64 = 428;
    pub const MOVE_MOUNT: i64 = 429;
    pub const MOUNT_SETATTR: i64 = 442;
}
#[cfg(target_arch = "aarch64")]
mod nr {
    pub const OPEN_TREE: i64 = 428;
    pub const MOVE_MOUNT: i64 = 429;
    pub const MOUNT_SETATTR: i64 = 442;
}
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod nr {
    pub const OPEN_TREE: i64 = -1;
    pub const MOVE_MOUNT: i64 = -1;
    pub const MOUNT_SETATTR: i64 = -1;
}

fn path_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

fn check(nr: i64, ret: i64) -> io::Result<i64> {
    if nr < 0 {
        return Err(io::Error::from_raw_os_error(libc::ENOSYS));
    }
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// `open_tree(2)`: clones the mount at `path` into a detached mount fd,
/// optionally recursive and/or without following a trailing symlink.
pub fn open_tree(path: &Path, recursive: bool, follow_symlinks: bool) -> io::Result<i32> {
    let c_path = path_cstring(path)?;
    let flags = raw::OPEN_TREE_CLONE
        | raw::OPEN_TREE_CLOEXEC
        | raw::AT_EMPTY_PATH
        | if recursive { raw::AT_RECURSIVE } else { 0 }
        | if follow_symlinks { 0 } else { raw::AT_SYMLINK_NOFOLLOW };
    let ret = unsafe {
        libc::syscall(
            nr::OPEN_TREE,
            raw::AT_FDCWD,
            c_path.as_ptr(),
            flags as libc::c_uint,
        )
    };
    check(nr::OPEN_TREE, ret).map(|fd| fd as i32)
}

/// `mount_setattr(2)` on an `open_tree` fd.
pub fn mount_setattr(fd: i32, recursive: bool, attr: &MountAttr) -> io::Result<()> {
    let flags: u32 = if recursive { raw::AT_RECURSIVE as u32 } else { 0 } | raw::AT_EMPTY_PATH as u32;
    let ret = unsafe {
        libc::syscall(
            nr::MOUNT_SETATTR,
            fd,
            c"".as_ptr(),
            flags,
            attr as *const MountAttr,
            std::mem::size_of::<MountAttr>(),
        )
    };
    check(nr::MOUNT_SETATTR, ret).map(|_| ())
}

/// `move_mount(2)`: attaches a detached mount fd at `target`.
pub fn move_mount(fd: i32, target: &Path) -> io::Result<()> {
    let c_target = path_cstring(target)?;
    let ret = unsafe {
        libc::syscall(
            nr::MOVE_MOUNT,
            fd,
            c"".as_ptr(),
            raw::AT_FDCWD,
            c_target.as_ptr(),
            raw::MOVE_MOUNT_F_EMPTY_PATH as libc::c_uint,
        )
    };
    check(nr::MOVE_MOUNT, ret).map(|_| ())
}
