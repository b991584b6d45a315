//! Core value types.
//!
//! These are plain data and serialize with serde so listings can be shipped
//! across process boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::location::Location;

/// Unix-style permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u32);

impl Permissions {
    pub const USER_READ: Self = Self(0o400);
    pub const USER_WRITE: Self = Self(0o200);
    pub const USER_EXECUTE: Self = Self(0o100);
    pub const GROUP_READ: Self = Self(0o040);
    pub const GROUP_WRITE: Self = Self(0o020);
    pub const GROUP_EXECUTE: Self = Self(0o010);
    pub const OTHERS_READ: Self = Self(0o004);
    pub const OTHERS_WRITE: Self = Self(0o002);
    pub const OTHERS_EXECUTE: Self = Self(0o001);

    pub const ALL_READ: Self = Self(0o444);
    pub const ALL_WRITE: Self = Self(0o222);
    pub const ALL_EXECUTE: Self = Self(0o111);

    /// `rw-r--r--`, used for new files.
    pub const FILE_DEFAULT: Self = Self(0o644);
    /// `rwxr-xr-x`, used for new directories.
    pub const DIR_DEFAULT: Self = Self(0o755);

    /// Wrap raw mode bits (only the low nine bits are kept).
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o777)
    }

    /// Raw mode bits.
    pub const fn mode(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn can_user_read(self) -> bool {
        self.contains(Self::USER_READ)
    }

    pub fn can_user_write(self) -> bool {
        self.contains(Self::USER_WRITE)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const FLAGS: [(u32, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];
        for (bit, c) in FLAGS {
            let c = if self.0 & bit != 0 { c } else { '-' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Metadata about a location, as returned by `stat` and directory listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Location this info was produced for.
    pub location: Location,
    /// Entry name (last path segment).
    pub name: String,
    /// False only for infos describing a missing location.
    pub exists: bool,
    pub is_dir: bool,
    pub is_regular: bool,
    /// Name starts with `.`.
    pub is_hidden: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub modified: SystemTime,
    pub permissions: Permissions,
    /// Precomputed content hash, if the backend has one at hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl FileInfo {
    /// Info for a regular file.
    pub fn file(
        location: Location,
        name: impl Into<String>,
        size: u64,
        modified: SystemTime,
        permissions: Permissions,
    ) -> Self {
        let name = name.into();
        Self {
            location,
            is_hidden: name.starts_with('.'),
            name,
            exists: true,
            is_dir: false,
            is_regular: true,
            size,
            modified,
            permissions,
            content_hash: None,
        }
    }

    /// Info for a directory.
    pub fn directory(
        location: Location,
        name: impl Into<String>,
        modified: SystemTime,
        permissions: Permissions,
    ) -> Self {
        let name = name.into();
        Self {
            location,
            is_hidden: name.starts_with('.'),
            name,
            exists: true,
            is_dir: true,
            is_regular: false,
            size: 0,
            modified,
            permissions,
            content_hash: None,
        }
    }

    /// Attach a precomputed content hash.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}

/// Kind of change reported by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventKind {
    Created,
    Modified,
    Removed,
}

/// A change notification delivered to a watch callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub location: Location,
    pub kind: WatchEventKind,
}

/// A backend bound in a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredBackend {
    pub prefix: String,
    pub name: String,
}
