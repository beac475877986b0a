use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("mount({0}): {1}")]
    Mount(PathBuf, #[source] std::io::Error),
    #[error("remount({0}): {1}")]
    Remount(PathBuf, #[source] std::io::Error),
    #[error("open_tree({0}): {1}")]
    OpenTree(PathBuf, #[source] std::io::Error),
    #[error("mount_setattr({0}): {1}")]
    MountSetattr(PathBuf, #[source] std::io::Error),
    #[error("move_mount({0}): {1}")]
    MoveMount(PathBuf, #[source] std::io::Error),
    #[error("unmount({0}): {1}")]
    Unmount(PathBuf, #[source] std::io::Error),
}
