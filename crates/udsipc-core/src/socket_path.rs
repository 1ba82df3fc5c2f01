//! Socket path shortening.
//!
//! `bind(2)` and `connect(2)` on a Unix domain socket take the path inside a
//! fixed `sun_path` buffer (104 bytes on Darwin, 108 on Linux, terminator
//! included). Sockets living deep inside a shared container directory do not
//! fit, so [`SocketPathShortener`] places a symlink to the socket's directory
//! in a short base directory and hands back the path through that link.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Result type for socket path operations.
pub type SocketPathResult<T> = Result<T, SocketPathError>;

/// Errors produced while shortening a socket path.
#[derive(Debug, Error)]
pub enum SocketPathError {
    /// Filesystem error while inspecting or creating the alias.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A regular file or directory already sits at the alias location.
    #[error("alias path is occupied by a non-symlink entry: {path}")]
    AliasOccupied { path: String },

    /// The socket path has no file name component.
    #[error("socket path has no file name: {path}")]
    NoFileName { path: String },

    /// Even the shortened path exceeds the platform limit.
    #[error("socket path too long: {len} bytes (max: {max}): {path}")]
    TooLong { path: String, len: usize, max: usize },
}

/// Maximum usable socket path length in bytes, excluding the terminator.
#[cfg(unix)]
pub fn max_socket_path_len() -> usize {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len() - 1
}

/// Maximum usable socket path length in bytes, excluding the terminator.
#[cfg(not(unix))]
pub fn max_socket_path_len() -> usize {
    103
}

/// Returns true if `path` can be used directly as a socket address.
pub fn fits_socket_path(path: &Path) -> bool {
    path.as_os_str().len() <= max_socket_path_len()
}

/// Creates short symlink aliases for socket directories.
#[derive(Debug, Clone)]
pub struct SocketPathShortener {
    base_dir: PathBuf,
}

impl Default for SocketPathShortener {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl SocketPathShortener {
    /// Creates a shortener placing aliases inside `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the directory aliases are created in.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns a usable path for `socket_path`.
    ///
    /// Paths that already fit are returned unchanged. Otherwise a symlink
    /// named `alias` pointing at the socket's directory is ensured inside the
    /// base directory and the alias joined with the socket file name is
    /// returned. Calling this repeatedly with the same arguments is safe.
    pub fn shorten(&self, socket_path: &Path, alias: &str) -> SocketPathResult<PathBuf> {
        if fits_socket_path(socket_path) {
            return Ok(socket_path.to_path_buf());
        }

        let file_name = socket_path
            .file_name()
            .ok_or_else(|| SocketPathError::NoFileName {
                path: socket_path.display().to_string(),
            })?;
        let target_dir = match socket_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        // Relative link targets resolve against the link's own directory.
        let target_dir = std::path::absolute(target_dir)?;

        let link = self.base_dir.join(alias);
        ensure_symlink(&link, &target_dir)?;

        let shortened = link.join(file_name);
        let len = shortened.as_os_str().len();
        let max = max_socket_path_len();
        if len > max {
            return Err(SocketPathError::TooLong {
                path: shortened.display().to_string(),
                len,
                max,
            });
        }

        debug!(
            original = %socket_path.display(),
            shortened = %shortened.display(),
            "Shortened socket path"
        );
        Ok(shortened)
    }
}

/// Makes `link` a symlink to `target`, reusing a correct existing link and
/// replacing one that points elsewhere. Non-symlink entries are left alone.
fn ensure_symlink(link: &Path, target: &Path) -> SocketPathResult<()> {
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            if std::fs::read_link(link)? == target {
                return Ok(());
            }
            info!(
                link = %link.display(),
                target = %target.display(),
                "Replacing socket alias pointing elsewhere"
            );
            std::fs::remove_file(link)?;
        }
        Ok(_) => {
            return Err(SocketPathError::AliasOccupied {
                path: link.display().to_string(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    match create_symlink(target, link) {
        Ok(()) => Ok(()),
        // Lost a race with another process creating the same alias.
        Err(e)
            if e.kind() == io::ErrorKind::AlreadyExists
                && std::fs::read_link(link).is_ok_and(|current| current == target) =>
        {
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "socket path aliases require symlink support",
    ))
}
