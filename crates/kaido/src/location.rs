//! Location strings.
//!
//! A [`Location`] is a prefix-qualified path such as `mem://scratch/a/b.txt`
//! or a bare local path like `/tmp/x`. It carries no backend reference:
//! every operation takes the [`Registry`] and resolves on each call, so a
//! location outlives the backend it names and fails cleanly once that
//! backend is gone.
//!
//! The empty location is the null value. Every operation on it fails with
//! [`FsError::EmptyPath`] before any backend is touched, and
//! [`exists`](Location::exists) returns false.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    Backend, Capability, FileReadWriter, FileReader, FileWriter, WatchHandle,
};
use crate::error::{FsError, FsResult};
use crate::hash;
use crate::ops;
use crate::registry::Registry;
use crate::types::{FileInfo, Permissions, WatchEvent};

/// A prefix-qualified path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Backend serving this location and the backend-relative path.
    pub fn resolve(&self, registry: &Registry) -> FsResult<(Arc<dyn Backend>, String)> {
        if self.is_empty() {
            return Err(FsError::EmptyPath);
        }
        Ok(registry.resolve(&self.0))
    }

    pub fn backend(&self, registry: &Registry) -> FsResult<Arc<dyn Backend>> {
        self.resolve(registry).map(|(backend, _)| backend)
    }

    /// Backend-relative path.
    pub fn path(&self, registry: &Registry) -> FsResult<String> {
        self.resolve(registry).map(|(_, path)| path)
    }

    /// Last path segment; empty for a backend root.
    pub fn name(&self, registry: &Registry) -> FsResult<String> {
        let (backend, path) = self.resolve(registry)?;
        Ok(backend.split_path(&path).pop().unwrap_or_default())
    }

    /// Extension of the last segment, without the dot. Dotfiles such as
    /// `.profile` have none.
    pub fn ext(&self, registry: &Registry) -> FsResult<Option<String>> {
        let name = self.name(registry)?;
        Ok(match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Some(ext.to_string()),
            _ => None,
        })
    }

    /// Parent directory.
    pub fn dir(&self, registry: &Registry) -> FsResult<Location> {
        let (backend, path) = self.resolve(registry)?;
        let sep = backend.separator();
        let cleaned = backend.clean_path(&path);
        let parent = match cleaned.rfind(sep) {
            Some(0) => sep.to_string(),
            Some(i) => cleaned[..i].to_string(),
            None => ".".to_string(),
        };
        Ok(backend.location(&parent))
    }

    /// Child location built from `parts`, cleaned with the backend's rules.
    pub fn join(&self, registry: &Registry, parts: &[&str]) -> FsResult<Location> {
        let (backend, path) = self.resolve(registry)?;
        let mut all = Vec::with_capacity(parts.len() + 1);
        all.push(path.as_str());
        all.extend_from_slice(parts);
        Ok(backend.location(&backend.join_clean(&all)))
    }

    pub fn stat(&self, registry: &Registry) -> FsResult<FileInfo> {
        let (backend, path) = self.resolve(registry)?;
        backend.stat(&path)
    }

    pub fn exists(&self, registry: &Registry) -> bool {
        match self.resolve(registry) {
            Ok((backend, path)) => backend.exists(&path),
            Err(_) => false,
        }
    }

    pub fn is_dir(&self, registry: &Registry) -> bool {
        self.stat(registry).is_ok_and(|info| info.is_dir)
    }

    pub fn is_regular(&self, registry: &Registry) -> bool {
        self.stat(registry).is_ok_and(|info| info.is_regular)
    }

    pub fn size(&self, registry: &Registry) -> FsResult<u64> {
        self.stat(registry).map(|info| info.size)
    }

    /// Visit the direct children whose names match any of `patterns` (all
    /// children if empty), sorted by name.
    ///
    /// Returning [`FsError::StopListing`] from the callback ends the listing
    /// early and is not reported as an error.
    pub fn list_dir_info(
        &self,
        registry: &Registry,
        mut callback: impl FnMut(FileInfo) -> FsResult<()>,
        patterns: &[&str],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        stop_is_ok(backend.list_dir_info(&path, &mut callback, patterns, cancel))
    }

    /// Like [`list_dir_info`](Self::list_dir_info) but descends into
    /// subdirectories. `patterns` filter what is reported, not what is
    /// descended into.
    pub fn list_dir_info_recursive(
        &self,
        registry: &Registry,
        mut callback: impl FnMut(FileInfo) -> FsResult<()>,
        patterns: &[&str],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        stop_is_ok(backend.list_dir_info_recursive(&path, &mut callback, patterns, cancel))
    }

    /// Collect the matching direct children.
    pub fn list_dir(&self, registry: &Registry, patterns: &[&str]) -> FsResult<Vec<FileInfo>> {
        let mut entries = Vec::new();
        self.list_dir_info(
            registry,
            |info| {
                entries.push(info);
                Ok(())
            },
            patterns,
            &CancellationToken::new(),
        )?;
        Ok(entries)
    }

    /// Collect at most `max` matching direct children.
    pub fn list_dir_max(
        &self,
        registry: &Registry,
        max: usize,
        patterns: &[&str],
        cancel: &CancellationToken,
    ) -> FsResult<Vec<FileInfo>> {
        ops::list_dir_max(registry, self, max, patterns, cancel)
    }

    pub fn make_dir(&self, registry: &Registry) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        backend.make_dir(&path, Permissions::DIR_DEFAULT)
    }

    /// Create this directory and any missing parents. Existing directories
    /// are fine.
    pub fn make_all_dirs(&self, registry: &Registry) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        ops::make_all_dirs(backend.as_ref(), &path, Permissions::DIR_DEFAULT)
    }

    pub fn read_all(&self, registry: &Registry) -> FsResult<Vec<u8>> {
        let (backend, path) = self.resolve(registry)?;
        backend.read_all(&path)
    }

    pub fn read_all_string(&self, registry: &Registry) -> FsResult<String> {
        let bytes = self.read_all(registry)?;
        String::from_utf8(bytes)
            .map_err(|e| FsError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Replace the content, creating the file if needed. The parent must
    /// exist.
    pub fn write_all(&self, registry: &Registry, data: impl AsRef<[u8]>) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        backend.write_all(&path, data.as_ref(), Permissions::FILE_DEFAULT)
    }

    pub fn append(&self, registry: &Registry, data: impl AsRef<[u8]>) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        backend.append(&path, data.as_ref(), Permissions::FILE_DEFAULT)
    }

    /// Create an empty file, or bump the modification time of an existing
    /// one.
    pub fn touch(&self, registry: &Registry) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        match backend.as_touch() {
            Some(native) => native.touch(&path, Permissions::FILE_DEFAULT),
            None => backend.append(&path, &[], Permissions::FILE_DEFAULT),
        }
    }

    pub fn truncate(&self, registry: &Registry, size: u64) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        backend
            .as_truncate()
            .ok_or_else(|| backend.unsupported(Capability::Truncate))?
            .truncate(&path, size)
    }

    pub fn open_reader(&self, registry: &Registry) -> FsResult<Box<dyn FileReader>> {
        let (backend, path) = self.resolve(registry)?;
        backend.open_reader(&path)
    }

    pub fn open_writer(&self, registry: &Registry) -> FsResult<Box<dyn FileWriter>> {
        let (backend, path) = self.resolve(registry)?;
        backend.open_writer(&path, Permissions::FILE_DEFAULT)
    }

    pub fn open_append_writer(&self, registry: &Registry) -> FsResult<Box<dyn FileWriter>> {
        let (backend, path) = self.resolve(registry)?;
        backend.open_append_writer(&path, Permissions::FILE_DEFAULT)
    }

    pub fn open_read_writer(&self, registry: &Registry) -> FsResult<Box<dyn FileReadWriter>> {
        let (backend, path) = self.resolve(registry)?;
        backend.open_read_writer(&path, Permissions::FILE_DEFAULT)
    }

    pub fn remove(&self, registry: &Registry) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        backend.remove(&path)
    }

    /// Remove a file or a directory tree. A missing location is not an
    /// error.
    pub fn remove_recursive(
        &self,
        registry: &Registry,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        ops::remove_recursive(registry, self, cancel)
    }

    /// Rename within the same directory and return the new location.
    pub fn rename(&self, registry: &Registry, new_name: &str) -> FsResult<Location> {
        let (backend, path) = self.resolve(registry)?;
        let renamed = backend
            .as_rename()
            .ok_or_else(|| backend.unsupported(Capability::Rename))?
            .rename(&path, new_name)?;
        Ok(backend.location(&renamed))
    }

    /// Move to `dst`, which may be on another backend.
    pub fn move_to(
        &self,
        registry: &Registry,
        dst: &Location,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        ops::move_to(registry, self, dst, cancel)
    }

    /// Copy a file or directory tree to `dst`, which may be on another
    /// backend.
    pub fn copy_to(
        &self,
        registry: &Registry,
        dst: &Location,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        ops::copy_recursive(registry, self, dst, cancel)
    }

    pub fn set_permissions(&self, registry: &Registry, perm: Permissions) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        backend
            .as_set_permissions()
            .ok_or_else(|| backend.unsupported(Capability::SetPermissions))?
            .set_permissions(&path, perm)
    }

    /// `(uid, gid)` of the entry.
    pub fn owner(&self, registry: &Registry) -> FsResult<(u32, u32)> {
        let (backend, path) = self.resolve(registry)?;
        backend
            .as_owner()
            .ok_or_else(|| backend.unsupported(Capability::Owner))?
            .owner(&path)
    }

    pub fn set_owner(
        &self,
        registry: &Registry,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> FsResult<()> {
        let (backend, path) = self.resolve(registry)?;
        backend
            .as_owner()
            .ok_or_else(|| backend.unsupported(Capability::Owner))?
            .set_owner(&path, uid, gid)
    }

    /// False on backends without symbolic links.
    pub fn is_symlink(&self, registry: &Registry) -> FsResult<bool> {
        let (backend, path) = self.resolve(registry)?;
        match backend.as_symlinks() {
            Some(native) => native.is_symlink(&path),
            None => backend.stat(&path).map(|_| false),
        }
    }

    pub fn read_link(&self, registry: &Registry) -> FsResult<Location> {
        let (backend, path) = self.resolve(registry)?;
        let target = backend
            .as_symlinks()
            .ok_or_else(|| backend.unsupported(Capability::Symlinks))?
            .read_link(&path)?;
        Ok(backend.location(&target))
    }

    /// Content hash: the backend's cached value if it reports one, otherwise
    /// computed by streaming the file.
    pub fn content_hash(&self, registry: &Registry) -> FsResult<String> {
        let (backend, path) = self.resolve(registry)?;
        let info = backend.stat(&path)?;
        if info.is_dir {
            return Err(FsError::is_a_directory(self.as_str()));
        }
        if let Some(hash) = info.content_hash {
            return Ok(hash);
        }

        let mut reader = backend.open_reader(&path)?;
        let hash = hash::content_hash(&mut reader)?;
        reader.close()?;
        Ok(hash)
    }

    /// Deliver change events under this location until the handle is
    /// dropped.
    pub fn watch(
        &self,
        registry: &Registry,
        on_event: impl FnMut(WatchEvent) + Send + 'static,
    ) -> FsResult<WatchHandle> {
        let (backend, path) = self.resolve(registry)?;
        backend
            .as_watch()
            .ok_or_else(|| backend.unsupported(Capability::Watch))?
            .watch(&path, Box::new(on_event))
    }

    pub fn read_json<T: DeserializeOwned>(&self, registry: &Registry) -> FsResult<T> {
        let bytes = self.read_all(registry)?;
        serde_json::from_slice(&bytes).map_err(|e| FsError::Io(io::Error::from(e)))
    }

    /// Write `value` as pretty-printed JSON.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        registry: &Registry,
        value: &T,
    ) -> FsResult<()> {
        let data = serde_json::to_vec_pretty(value).map_err(io::Error::from)?;
        self.write_all(registry, data)
    }
}

fn stop_is_ok(result: FsResult<()>) -> FsResult<()> {
    match result {
        Err(FsError::StopListing) => Ok(()),
        other => other,
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Location {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryFs;
    use crate::config::MemoryFsConfig;
    use std::io::{Read, Write};

    fn setup() -> (Arc<Registry>, Arc<MemoryFs>) {
        let registry = Arc::new(Registry::new());
        let fs = MemoryFs::create(&registry, MemoryFsConfig::default().with_id("t"));
        (registry, fs)
    }

    #[test]
    fn path_parts() {
        let (registry, _) = setup();
        let loc = Location::new("mem://t/docs/report.tar.gz");

        assert_eq!(loc.name(&registry).unwrap(), "report.tar.gz");
        assert_eq!(loc.ext(&registry).unwrap().as_deref(), Some("gz"));
        assert_eq!(loc.dir(&registry).unwrap().as_str(), "mem://t/docs");
        assert_eq!(
            loc.dir(&registry).unwrap().dir(&registry).unwrap().as_str(),
            "mem://t/"
        );
        assert_eq!(Location::new("mem://t/.profile").ext(&registry).unwrap(), None);
        assert_eq!(
            Location::new("mem://t/docs")
                .join(&registry, &["a", "..", "b.txt"])
                .unwrap()
                .as_str(),
            "mem://t/docs/b.txt"
        );
    }

    #[test]
    fn empty_location_is_null() {
        let registry = Registry::new();
        let empty = Location::default();

        assert!(!empty.exists(&registry));
        assert!(!empty.is_dir(&registry));
        assert!(matches!(empty.stat(&registry), Err(FsError::EmptyPath)));
        assert!(matches!(empty.write_all(&registry, b"x"), Err(FsError::EmptyPath)));
        assert!(matches!(empty.name(&registry), Err(FsError::EmptyPath)));
        assert!(empty.read_all(&registry).unwrap_err().is_not_found());
    }

    #[test]
    fn write_read_and_metadata() {
        let (registry, _) = setup();
        let dir = Location::new("mem://t/docs");
        dir.make_dir(&registry).unwrap();

        let file = dir.join(&registry, &["a.txt"]).unwrap();
        file.write_all(&registry, "hello").unwrap();
        file.append(&registry, " world").unwrap();

        assert!(file.exists(&registry));
        assert!(file.is_regular(&registry));
        assert!(dir.is_dir(&registry));
        assert_eq!(file.size(&registry).unwrap(), 11);
        assert_eq!(file.read_all_string(&registry).unwrap(), "hello world");
    }

    #[test]
    fn write_requires_parent() {
        let (registry, _) = setup();
        let err = Location::new("mem://t/missing/a.txt")
            .write_all(&registry, "x")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn make_all_dirs_is_idempotent() {
        let (registry, fs) = setup();
        let deep = Location::new("mem://t/a/b/c");
        deep.make_all_dirs(&registry).unwrap();
        deep.make_all_dirs(&registry).unwrap();
        assert!(fs.stat("/a/b").unwrap().is_dir);
    }

    #[test]
    fn listing_can_stop_early() {
        let (registry, fs) = setup();
        fs.seed_files([("d/1", ""), ("d/2", ""), ("d/3", "")]).unwrap();
        let dir = Location::new("mem://t/d");

        let mut seen = Vec::new();
        dir.list_dir_info(
            &registry,
            |info| {
                seen.push(info.name);
                if seen.len() == 2 {
                    Err(FsError::StopListing)
                } else {
                    Ok(())
                }
            },
            &[],
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(seen, ["1", "2"]);
    }

    #[test]
    fn listing_errors_propagate() {
        let (registry, fs) = setup();
        fs.seed_files([("d/1", "")]).unwrap();

        let err = Location::new("mem://t/d")
            .list_dir_info(
                &registry,
                |_| Err(FsError::other("boom")),
                &[],
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn list_dir_filters() {
        let (registry, fs) = setup();
        fs.seed_files([("d/a.txt", ""), ("d/b.md", ""), ("d/c.txt", "")])
            .unwrap();

        let names: Vec<_> = Location::new("mem://t/d")
            .list_dir(&registry, &["*.txt"])
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, ["a.txt", "c.txt"]);
    }

    #[test]
    fn touch_and_truncate() {
        let (registry, _) = setup();
        let file = Location::new("mem://t/f");
        file.touch(&registry).unwrap();
        assert_eq!(file.size(&registry).unwrap(), 0);

        file.truncate(&registry, 4).unwrap();
        assert_eq!(file.read_all(&registry).unwrap(), vec![0; 4]);
    }

    #[test]
    fn handles_round_trip_through_backend() {
        let (registry, _) = setup();
        let file = Location::new("mem://t/h.txt");

        let mut writer = file.open_writer(&registry).unwrap();
        writer.write_all(b"abc").unwrap();
        writer.close().unwrap();

        let mut reader = file.open_reader(&registry).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn rename_returns_new_location() {
        let (registry, _) = setup();
        let file = Location::new("mem://t/old.txt");
        file.write_all(&registry, "x").unwrap();

        let renamed = file.rename(&registry, "new.txt").unwrap();
        assert_eq!(renamed.as_str(), "mem://t/new.txt");
        assert!(!file.exists(&registry));
        assert!(renamed.exists(&registry));
    }

    #[test]
    fn missing_capability_is_unsupported() {
        let (registry, _) = setup();
        let file = Location::new("mem://t/f");
        file.touch(&registry).unwrap();

        let err = file.watch(&registry, |_| {}).unwrap_err();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("watch"));
        assert!(!file.is_symlink(&registry).unwrap());
    }

    #[test]
    fn content_hash_matches_bytes() {
        let (registry, _) = setup();
        let file = Location::new("mem://t/f");
        file.write_all(&registry, "content").unwrap();
        assert_eq!(
            file.content_hash(&registry).unwrap(),
            hash::content_hash_bytes(b"content")
        );
        assert!(Location::new("mem://t/").content_hash(&registry).is_err());
    }

    #[test]
    fn json_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Doc {
            title: String,
            pages: u32,
        }

        let (registry, _) = setup();
        let file = Location::new("mem://t/doc.json");
        let doc = Doc {
            title: "notes".into(),
            pages: 3,
        };
        file.write_json(&registry, &doc).unwrap();
        assert_eq!(file.read_json::<Doc>(&registry).unwrap(), doc);

        file.write_all(&registry, "not json").unwrap();
        assert!(file.read_json::<Doc>(&registry).is_err());
    }

    #[test]
    fn unregistered_backend_fails_cleanly() {
        let (registry, fs) = setup();
        let file = Location::new("mem://t/f");
        file.write_all(&registry, "x").unwrap();
        fs.close().unwrap();

        // Falls through to the local backend, where `mem:/t/f` does not exist.
        assert!(!file.exists(&registry));
    }
}
