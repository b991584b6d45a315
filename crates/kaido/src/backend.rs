//! The backend contract.
//!
//! Every backend implements the mandatory [`Backend`] core. Capabilities a
//! backend may or may not have natively (an object store has no owners, the
//! memory engine has no symlinks) are small single-purpose traits exposed
//! through `as_*` accessors that return `None` by default. Callers probe with
//! [`Backend::supports`] or the accessor and get [`FsError::Unsupported`]
//! instead of a panic when a capability is missing.
//!
//! Paths passed to a backend are backend-relative: the registry has already
//! stripped the scheme prefix.

use std::any::Any;
use std::io::{Read, Seek, Write};

use strum::{Display, EnumIter};
use tokio_util::sync::CancellationToken;

use crate::error::{FsError, FsResult};
use crate::location::Location;
use crate::pattern;
use crate::types::{FileInfo, Permissions, WatchEvent};

/// Callback invoked once per listed entry.
///
/// Returning an error aborts the listing. Backends propagate every callback
/// error unchanged, [`FsError::StopListing`] included; the listing entry
/// points on [`Location`] and in [`ops`](crate::ops) swallow `StopListing`.
pub type ListCallback<'a> = &'a mut dyn FnMut(FileInfo) -> FsResult<()>;

/// Callback receiving change notifications from a [`Watch`].
pub type WatchCallback = Box<dyn FnMut(WatchEvent) + Send + 'static>;

/// Readable, seekable handle returned by [`Backend::open_reader`].
pub trait FileReader: Read + Seek + Send {
    /// Release the handle. Calling it twice is a no-op.
    fn close(&mut self) -> FsResult<()>;
}

/// Writable handle returned by [`Backend::open_writer`].
pub trait FileWriter: Write + Send {
    /// Flush buffered content to the backend and release the handle.
    fn close(&mut self) -> FsResult<()>;
}

/// Random-access handle returned by [`Backend::open_read_writer`].
pub trait FileReadWriter: Read + Write + Seek + Send {
    /// Flush buffered content to the backend and release the handle.
    fn close(&mut self) -> FsResult<()>;
}

/// Optional capabilities, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    SetPermissions,
    Owner,
    Rename,
    Move,
    Truncate,
    Symlinks,
    Watch,
    CopyFile,
    MakeAllDirs,
    Touch,
}

/// Change permission bits.
pub trait SetPermissions {
    fn set_permissions(&self, path: &str, perm: Permissions) -> FsResult<()>;
}

/// Numeric user/group ownership.
pub trait Owner {
    /// Returns `(uid, gid)`.
    fn owner(&self, path: &str) -> FsResult<(u32, u32)>;

    /// Change owner and/or group; `None` leaves that id unchanged.
    fn set_owner(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()>;
}

/// Rename an entry within its directory.
pub trait Rename {
    /// `new_name` is a bare name without separators. Returns the new path.
    fn rename(&self, path: &str, new_name: &str) -> FsResult<String>;
}

/// Move an entry to another directory of the same backend.
pub trait Move {
    fn move_to(&self, from: &str, to: &str) -> FsResult<()>;
}

/// Resize a file in place.
pub trait Truncate {
    /// Shrinks or zero-pads to `size`.
    fn truncate(&self, path: &str, size: u64) -> FsResult<()>;
}

/// Symbolic link introspection.
pub trait Symlinks {
    fn is_symlink(&self, path: &str) -> FsResult<bool>;
    fn read_link(&self, path: &str) -> FsResult<String>;
}

/// Change notification.
pub trait Watch {
    /// Deliver events under `path` to `on_event` until the handle is dropped.
    fn watch(&self, path: &str, on_event: WatchCallback) -> FsResult<WatchHandle>;
}

/// Copy a file in one backend call.
pub trait CopyFile {
    fn copy_file(&self, src: &str, dst: &str) -> FsResult<()>;
}

/// Create a directory and every missing parent.
pub trait MakeAllDirs {
    fn make_all_dirs(&self, path: &str, perm: Permissions) -> FsResult<()>;
}

/// Create an empty file or bump the modification time of an existing one.
pub trait Touch {
    fn touch(&self, path: &str, perm: Permissions) -> FsResult<()>;
}

/// Keeps a watch alive. Dropping it (or calling [`stop`](Self::stop)) ends
/// the watch.
pub struct WatchHandle {
    _guard: Box<dyn Any + Send>,
}

impl WatchHandle {
    /// Wrap whatever object keeps the underlying watcher running.
    pub fn new(guard: impl Any + Send) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }

    /// Stop watching.
    pub fn stop(self) {}
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

/// Clean a separator-delimited path: collapse repeated separators, drop `.`
/// segments and resolve `..` lexically. Absolute input stays absolute;
/// `..` never climbs above the root.
pub fn clean_path(path: &str, separator: char) -> String {
    let absolute = path.starts_with(separator);
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(separator) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let sep = separator.to_string();
    let joined = segments.join(&sep);
    match (absolute, joined.is_empty()) {
        (true, _) => format!("{sep}{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Storage backend contract.
pub trait Backend: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Scheme prefix this backend is registered under, e.g. `mem://3f2a`.
    fn prefix(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Path separator used in backend-relative paths.
    fn separator(&self) -> char {
        '/'
    }

    /// True if every mutating operation fails with [`FsError::ReadOnly`].
    fn is_read_only(&self) -> bool {
        false
    }

    /// Full location for a backend-relative path.
    fn location(&self, path: &str) -> Location {
        Location::new(format!("{}{}", self.prefix(), path))
    }

    // ========================================================================
    // Path handling
    // ========================================================================

    /// Clean a backend-relative path.
    fn clean_path(&self, path: &str) -> String {
        clean_path(path, self.separator())
    }

    /// Join parts with the separator and clean the result.
    fn join_clean(&self, parts: &[&str]) -> String {
        self.clean_path(&parts.join(&self.separator().to_string()))
    }

    /// Split into non-empty segments.
    fn split_path(&self, path: &str) -> Vec<String> {
        self.clean_path(path)
            .split(self.separator())
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect()
    }

    fn is_abs_path(&self, path: &str) -> bool {
        path.starts_with(self.separator())
    }

    /// True if `name` matches any of `patterns` (empty set matches all).
    fn match_any_pattern(&self, name: &str, patterns: &[&str]) -> FsResult<bool> {
        pattern::match_any_pattern(name, patterns)
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Metadata for a path; [`FsError::NotFound`] if absent.
    fn stat(&self, path: &str) -> FsResult<FileInfo>;

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok_and(|info| info.exists)
    }

    /// Invoke `callback` for each entry of `dir` whose name matches `patterns`.
    fn list_dir_info(
        &self,
        dir: &str,
        callback: ListCallback<'_>,
        patterns: &[&str],
        cancel: &CancellationToken,
    ) -> FsResult<()>;

    /// Invoke `callback` for every non-directory entry below `dir` whose name
    /// matches `patterns`. Every directory is descended regardless of patterns.
    fn list_dir_info_recursive(
        &self,
        dir: &str,
        callback: ListCallback<'_>,
        patterns: &[&str],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        pattern::validate_patterns(patterns)?;
        let mut subdirs = Vec::new();
        self.list_dir_info(
            dir,
            &mut |info| {
                if info.is_dir {
                    subdirs.push(self.join_clean(&[dir, info.name.as_str()]));
                    Ok(())
                } else if self.match_any_pattern(&info.name, patterns)? {
                    callback(info)
                } else {
                    Ok(())
                }
            },
            &[],
            cancel,
        )?;

        for subdir in subdirs {
            if cancel.is_cancelled() {
                return Err(FsError::Canceled);
            }
            self.list_dir_info_recursive(&subdir, callback, patterns, cancel)?;
        }
        Ok(())
    }

    fn read_all(&self, path: &str) -> FsResult<Vec<u8>>;

    fn open_reader(&self, path: &str) -> FsResult<Box<dyn FileReader>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a single directory; the parent must exist.
    fn make_dir(&self, path: &str, perm: Permissions) -> FsResult<()>;

    /// Create or replace a file.
    fn write_all(&self, path: &str, data: &[u8], perm: Permissions) -> FsResult<()>;

    /// Append to a file, creating it if absent.
    fn append(&self, path: &str, data: &[u8], perm: Permissions) -> FsResult<()>;

    /// Writer that replaces the file content.
    fn open_writer(&self, path: &str, perm: Permissions) -> FsResult<Box<dyn FileWriter>>;

    /// Writer positioned at the end of the existing content.
    fn open_append_writer(&self, path: &str, perm: Permissions) -> FsResult<Box<dyn FileWriter>>;

    fn open_read_writer(&self, path: &str, perm: Permissions)
    -> FsResult<Box<dyn FileReadWriter>>;

    /// Remove a file or directory.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Release the backend. Idempotent.
    fn close(&self) -> FsResult<()> {
        Ok(())
    }

    // ========================================================================
    // Optional capabilities
    // ========================================================================

    fn as_set_permissions(&self) -> Option<&dyn SetPermissions> {
        None
    }

    fn as_owner(&self) -> Option<&dyn Owner> {
        None
    }

    fn as_rename(&self) -> Option<&dyn Rename> {
        None
    }

    fn as_move(&self) -> Option<&dyn Move> {
        None
    }

    fn as_truncate(&self) -> Option<&dyn Truncate> {
        None
    }

    fn as_symlinks(&self) -> Option<&dyn Symlinks> {
        None
    }

    fn as_watch(&self) -> Option<&dyn Watch> {
        None
    }

    fn as_copy_file(&self) -> Option<&dyn CopyFile> {
        None
    }

    fn as_make_all_dirs(&self) -> Option<&dyn MakeAllDirs> {
        None
    }

    fn as_touch(&self) -> Option<&dyn Touch> {
        None
    }

    /// True if the backend implements `capability`.
    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::SetPermissions => self.as_set_permissions().is_some(),
            Capability::Owner => self.as_owner().is_some(),
            Capability::Rename => self.as_rename().is_some(),
            Capability::Move => self.as_move().is_some(),
            Capability::Truncate => self.as_truncate().is_some(),
            Capability::Symlinks => self.as_symlinks().is_some(),
            Capability::Watch => self.as_watch().is_some(),
            Capability::CopyFile => self.as_copy_file().is_some(),
            Capability::MakeAllDirs => self.as_make_all_dirs().is_some(),
            Capability::Touch => self.as_touch().is_some(),
        }
    }

    /// The [`FsError::Unsupported`] error for `capability` on this backend.
    fn unsupported(&self, capability: Capability) -> FsError {
        FsError::unsupported(capability, self.name())
    }
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("prefix", &self.prefix())
            .field("name", &self.name())
            .finish()
    }
}
