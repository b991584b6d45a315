//! Sentinel backend for the empty location.
//!
//! Every operation fails with [`FsError::EmptyPath`].

use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, FileReadWriter, FileReader, FileWriter, ListCallback};
use crate::error::{FsError, FsResult};
use crate::location::Location;
use crate::types::{FileInfo, Permissions};

/// Prefix of the invalid sentinel.
pub const INVALID_PREFIX: &str = "invalid://";

#[derive(Debug, Clone, Copy, Default)]
pub struct InvalidFs;

impl Backend for InvalidFs {
    fn prefix(&self) -> &str {
        INVALID_PREFIX
    }

    fn name(&self) -> &str {
        "invalid file system"
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn location(&self, _path: &str) -> Location {
        Location::default()
    }

    fn stat(&self, _path: &str) -> FsResult<FileInfo> {
        Err(FsError::EmptyPath)
    }

    fn exists(&self, _path: &str) -> bool {
        false
    }

    fn list_dir_info(
        &self,
        _dir: &str,
        _callback: ListCallback<'_>,
        _patterns: &[&str],
        _cancel: &CancellationToken,
    ) -> FsResult<()> {
        Err(FsError::EmptyPath)
    }

    fn list_dir_info_recursive(
        &self,
        _dir: &str,
        _callback: ListCallback<'_>,
        _patterns: &[&str],
        _cancel: &CancellationToken,
    ) -> FsResult<()> {
        Err(FsError::EmptyPath)
    }

    fn read_all(&self, _path: &str) -> FsResult<Vec<u8>> {
        Err(FsError::EmptyPath)
    }

    fn open_reader(&self, _path: &str) -> FsResult<Box<dyn FileReader>> {
        Err(FsError::EmptyPath)
    }

    fn make_dir(&self, _path: &str, _perm: Permissions) -> FsResult<()> {
        Err(FsError::EmptyPath)
    }

    fn write_all(&self, _path: &str, _data: &[u8], _perm: Permissions) -> FsResult<()> {
        Err(FsError::EmptyPath)
    }

    fn append(&self, _path: &str, _data: &[u8], _perm: Permissions) -> FsResult<()> {
        Err(FsError::EmptyPath)
    }

    fn open_writer(&self, _path: &str, _perm: Permissions) -> FsResult<Box<dyn FileWriter>> {
        Err(FsError::EmptyPath)
    }

    fn open_append_writer(&self, _path: &str, _perm: Permissions) -> FsResult<Box<dyn FileWriter>> {
        Err(FsError::EmptyPath)
    }

    fn open_read_writer(
        &self,
        _path: &str,
        _perm: Permissions,
    ) -> FsResult<Box<dyn FileReadWriter>> {
        Err(FsError::EmptyPath)
    }

    fn remove(&self, _path: &str) -> FsResult<()> {
        Err(FsError::EmptyPath)
    }
}
