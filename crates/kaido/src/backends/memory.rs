//! In-memory file system.
//!
//! Used for scratch space and testing. All data is lost on close.
//!
//! The tree is a single owned [`Node`]: directories own their children
//! outright, so removing a directory drops its whole subtree. One
//! reader-writer lock guards the tree. Reads run concurrently, mutations are
//! exclusive.

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    Backend, CopyFile, FileReadWriter, FileReader, FileWriter, ListCallback, MakeAllDirs, Move,
    Rename, SetPermissions, Touch, Truncate, clean_path,
};
use crate::buffer::{FileBuffer, ReadWriteAllBuffer, ReadonlyBuffer};
use crate::config::MemoryFsConfig;
use crate::error::{FsError, FsResult};
use crate::location::Location;
use crate::pattern;
use crate::registry::Registry;
use crate::types::{FileInfo, Permissions};

/// Scheme of memory backend prefixes: `mem://<id>`.
pub const MEMORY_SCHEME: &str = "mem://";

#[derive(Debug)]
enum Node {
    File {
        data: Vec<u8>,
        modified: SystemTime,
        perm: Permissions,
    },
    Dir {
        children: HashMap<String, Node>,
        modified: SystemTime,
        perm: Permissions,
    },
}

impl Node {
    fn file(data: Vec<u8>, perm: Permissions) -> Self {
        Node::File {
            data,
            modified: SystemTime::now(),
            perm,
        }
    }

    fn dir(perm: Permissions) -> Self {
        Node::Dir {
            children: HashMap::new(),
            modified: SystemTime::now(),
            perm,
        }
    }

    fn info(&self, location: Location, name: &str) -> FileInfo {
        match self {
            Node::File {
                data,
                modified,
                perm,
            } => FileInfo::file(location, name, data.len() as u64, *modified, *perm),
            Node::Dir { modified, perm, .. } => {
                FileInfo::directory(location, name, *modified, *perm)
            }
        }
    }

    fn touch(&mut self) {
        match self {
            Node::File { modified, .. } | Node::Dir { modified, .. } => {
                *modified = SystemTime::now();
            }
        }
    }

    fn set_perm(&mut self, new: Permissions) {
        match self {
            Node::File { perm, .. } | Node::Dir { perm, .. } => *perm = new,
        }
    }
}

/// Descend from `node` through `segments`.
fn walk<'a>(mut node: &'a Node, segments: &[String], path: &str) -> FsResult<&'a Node> {
    for segment in segments {
        node = match node {
            Node::Dir { children, .. } => children
                .get(segment)
                .ok_or_else(|| FsError::not_found(path))?,
            Node::File { .. } => return Err(FsError::not_a_directory(path)),
        };
    }
    Ok(node)
}

fn walk_mut<'a>(mut node: &'a mut Node, segments: &[String], path: &str) -> FsResult<&'a mut Node> {
    for segment in segments {
        node = match node {
            Node::Dir { children, .. } => children
                .get_mut(segment)
                .ok_or_else(|| FsError::not_found(path))?,
            Node::File { .. } => return Err(FsError::not_a_directory(path)),
        };
    }
    Ok(node)
}

/// Resolve everything but the last segment. Yields the parent's children
/// and the final name, whether or not a node exists under that name, so
/// creators can attach without walking again.
fn parent_mut<'a, 's>(
    root: &'a mut Node,
    segments: &'s [String],
    path: &str,
) -> FsResult<(&'a mut HashMap<String, Node>, &'s str)> {
    let Some((name, parents)) = segments.split_last() else {
        return Err(FsError::invalid_path(format!("{path}: root has no parent")));
    };
    match walk_mut(root, parents, path)? {
        Node::Dir { children, .. } => Ok((children, name.as_str())),
        Node::File { .. } => Err(FsError::not_a_directory(path)),
    }
}

/// Create-or-update a file node.
fn put_file(
    root: &mut Node,
    segments: &[String],
    path: &str,
    perm: Permissions,
    update: impl FnOnce(&mut Vec<u8>),
) -> FsResult<()> {
    if segments.is_empty() {
        return Err(FsError::is_a_directory(path));
    }
    let (children, name) = parent_mut(root, segments, path)?;
    match children.get_mut(name) {
        Some(Node::Dir { .. }) => Err(FsError::is_a_directory(path)),
        Some(Node::File { data, modified, .. }) => {
            update(data);
            *modified = SystemTime::now();
            Ok(())
        }
        None => {
            let mut data = Vec::new();
            update(&mut data);
            children.insert(name.to_string(), Node::file(data, perm));
            Ok(())
        }
    }
}

fn make_all(root: &mut Node, segments: &[String], path: &str, perm: Permissions) -> FsResult<()> {
    let mut node = root;
    for segment in segments {
        node = match node {
            Node::Dir { children, .. } => children
                .entry(segment.clone())
                .or_insert_with(|| Node::dir(perm)),
            Node::File { .. } => return Err(FsError::not_a_directory(path)),
        };
    }
    match node {
        Node::Dir { .. } => Ok(()),
        Node::File { .. } => Err(FsError::not_a_directory(path)),
    }
}

/// The tree plus what is needed to name things in it. Shared with open
/// handles so their write-back can reach the tree.
#[derive(Debug)]
struct Tree {
    root: RwLock<Option<Node>>,
    prefix: String,
    separator: char,
    read_only: bool,
}

impl Tree {
    fn new(prefix: String, separator: char, read_only: bool) -> Self {
        Self {
            root: RwLock::new(Some(Node::dir(Permissions::DIR_DEFAULT))),
            prefix,
            separator,
            read_only,
        }
    }

    fn read(&self) -> FsResult<MappedRwLockReadGuard<'_, Node>> {
        RwLockReadGuard::try_map(self.root.read(), Option::as_ref)
            .map_err(|_| FsError::closed(&self.prefix))
    }

    fn write(&self) -> FsResult<MappedRwLockWriteGuard<'_, Node>> {
        let root = self.write_unchecked()?;
        if self.read_only {
            return Err(FsError::read_only(&self.prefix));
        }
        Ok(root)
    }

    fn write_unchecked(&self) -> FsResult<MappedRwLockWriteGuard<'_, Node>> {
        RwLockWriteGuard::try_map(self.root.write(), Option::as_mut)
            .map_err(|_| FsError::closed(&self.prefix))
    }

    /// Returns true if the tree was open.
    fn close(&self) -> bool {
        self.root.write().take().is_some()
    }

    fn is_closed(&self) -> bool {
        self.root.read().is_none()
    }

    /// Cleaned segments, always relative to the root.
    fn segments(&self, path: &str) -> Vec<String> {
        let sep = self.separator;
        clean_path(&format!("{sep}{path}"), sep)
            .split(sep)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Canonical absolute form of `segments`.
    fn display(&self, segments: &[String]) -> String {
        let sep = self.separator;
        format!("{sep}{}", segments.join(&sep.to_string()))
    }

    fn location(&self, path: &str) -> Location {
        if path.starts_with(self.separator) {
            Location::new(format!("{}{path}", self.prefix))
        } else {
            Location::new(format!("{}{}{path}", self.prefix, self.separator))
        }
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let root = self.read()?;
        let node = walk(&root, &segments, &display)?;
        let name = segments.last().map_or("", String::as_str);
        Ok(node.info(self.location(&display), name))
    }

    /// Matching entries of `dir` in name order.
    fn list(&self, dir: &str, patterns: &[&str]) -> FsResult<Vec<FileInfo>> {
        pattern::validate_patterns(patterns)?;

        let segments = self.segments(dir);
        let display = self.display(&segments);
        let root = self.read()?;
        let Node::Dir { children, .. } = walk(&root, &segments, &display)? else {
            return Err(FsError::not_a_directory(&display));
        };

        let mut names: Vec<&String> = Vec::with_capacity(children.len());
        for name in children.keys() {
            if pattern::match_any_pattern(name, patterns)? {
                names.push(name);
            }
        }
        names.sort();

        let base = display.trim_end_matches(self.separator);
        Ok(names
            .into_iter()
            .map(|name| {
                let location = self.location(&format!("{base}{}{name}", self.separator));
                children[name].info(location, name)
            })
            .collect())
    }

    fn read_all(&self, path: &str) -> FsResult<Vec<u8>> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let root = self.read()?;
        match walk(&root, &segments, &display)? {
            Node::File { data, .. } => Ok(data.clone()),
            Node::Dir { .. } => Err(FsError::is_a_directory(&display)),
        }
    }

    fn make_dir(&self, path: &str, perm: Permissions) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write()?;
        if segments.is_empty() {
            return Err(FsError::already_exists(&display));
        }
        let (children, name) = parent_mut(&mut root, &segments, &display)?;
        if children.contains_key(name) {
            return Err(FsError::already_exists(&display));
        }
        children.insert(name.to_string(), Node::dir(perm));
        Ok(())
    }

    fn make_all_dirs(&self, path: &str, perm: Permissions) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write()?;
        make_all(&mut root, &segments, &display, perm)
    }

    fn write_all(&self, path: &str, data: &[u8], perm: Permissions) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write()?;
        put_file(&mut root, &segments, &display, perm, |content| {
            content.clear();
            content.extend_from_slice(data);
        })
    }

    fn append(&self, path: &str, data: &[u8], perm: Permissions) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write()?;
        put_file(&mut root, &segments, &display, perm, |content| {
            content.extend_from_slice(data);
        })
    }

    fn touch(&self, path: &str, perm: Permissions) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write()?;
        if segments.is_empty() {
            root.touch();
            return Ok(());
        }
        let (children, name) = parent_mut(&mut root, &segments, &display)?;
        match children.get_mut(name) {
            Some(node) => node.touch(),
            None => {
                children.insert(name.to_string(), Node::file(Vec::new(), perm));
            }
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write()?;
        if segments.is_empty() {
            return Err(FsError::permission_denied(format!(
                "{display}: cannot remove the root directory"
            )));
        }
        let (children, name) = parent_mut(&mut root, &segments, &display)?;
        // Dropping the detached node releases its subtree.
        children
            .remove(name)
            .map(drop)
            .ok_or_else(|| FsError::not_found(&display))
    }

    fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let size = usize::try_from(size)
            .map_err(|_| FsError::invalid_path(format!("{display}: size {size} too large")))?;
        let mut root = self.write()?;
        match walk_mut(&mut root, &segments, &display)? {
            Node::File { data, modified, .. } => {
                if data.len() != size {
                    data.resize(size, 0);
                    *modified = SystemTime::now();
                }
                Ok(())
            }
            Node::Dir { .. } => Err(FsError::is_a_directory(&display)),
        }
    }

    fn rename(&self, path: &str, new_name: &str) -> FsResult<String> {
        if new_name.is_empty()
            || new_name == "."
            || new_name == ".."
            || new_name.contains(self.separator)
        {
            return Err(FsError::invalid_path(format!(
                "{new_name:?} is not a valid file name"
            )));
        }

        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write()?;
        if segments.is_empty() {
            return Err(FsError::permission_denied(format!(
                "{display}: cannot rename the root directory"
            )));
        }

        let mut renamed = segments.clone();
        if let Some(last) = renamed.last_mut() {
            *last = new_name.to_string();
        }
        let new_display = self.display(&renamed);

        let (children, name) = parent_mut(&mut root, &segments, &display)?;
        if name == new_name {
            return if children.contains_key(name) {
                Ok(new_display)
            } else {
                Err(FsError::not_found(&display))
            };
        }
        if children.contains_key(new_name) {
            return Err(FsError::already_exists(&new_display));
        }
        let node = children
            .remove(name)
            .ok_or_else(|| FsError::not_found(&display))?;
        children.insert(new_name.to_string(), node);
        Ok(new_display)
    }

    fn move_to(&self, from: &str, to: &str) -> FsResult<()> {
        let from_segments = self.segments(from);
        let to_segments = self.segments(to);
        let from_display = self.display(&from_segments);
        let to_display = self.display(&to_segments);

        let mut root = self.write()?;
        if from_segments.is_empty() {
            return Err(FsError::permission_denied(format!(
                "{from_display}: cannot move the root directory"
            )));
        }
        if from_segments == to_segments {
            walk(&root, &from_segments, &from_display)?;
            return Ok(());
        }
        if to_segments.starts_with(&from_segments) {
            return Err(FsError::invalid_path(format!(
                "cannot move {from_display} into itself ({to_display})"
            )));
        }

        // Check the destination before detaching anything.
        let (children, name) = parent_mut(&mut root, &to_segments, &to_display)?;
        if children.contains_key(name) {
            return Err(FsError::already_exists(&to_display));
        }

        let (children, name) = parent_mut(&mut root, &from_segments, &from_display)?;
        let node = children
            .remove(name)
            .ok_or_else(|| FsError::not_found(&from_display))?;

        let (children, name) = parent_mut(&mut root, &to_segments, &to_display)?;
        children.insert(name.to_string(), node);
        Ok(())
    }

    fn copy_file(&self, src: &str, dst: &str) -> FsResult<()> {
        let src_segments = self.segments(src);
        let dst_segments = self.segments(dst);
        let src_display = self.display(&src_segments);
        let dst_display = self.display(&dst_segments);

        let mut root = self.write()?;
        let (data, perm) = match walk(&root, &src_segments, &src_display)? {
            Node::File { data, perm, .. } => (data.clone(), *perm),
            Node::Dir { .. } => return Err(FsError::is_a_directory(&src_display)),
        };
        put_file(&mut root, &dst_segments, &dst_display, perm, |content| {
            *content = data;
        })?;
        // An existing destination takes the source's permissions too.
        walk_mut(&mut root, &dst_segments, &dst_display)?.set_perm(perm);
        Ok(())
    }

    fn set_permissions(&self, path: &str, perm: Permissions) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write()?;
        walk_mut(&mut root, &segments, &display)?.set_perm(perm);
        Ok(())
    }

    /// Create `path` and any missing parents, ignoring read-only.
    fn seed(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let segments = self.segments(path);
        let display = self.display(&segments);
        let mut root = self.write_unchecked()?;
        if let Some((_, parents)) = segments.split_last() {
            make_all(&mut root, parents, &display, Permissions::DIR_DEFAULT)?;
        }
        put_file(
            &mut root,
            &segments,
            &display,
            Permissions::FILE_DEFAULT,
            |content| {
                content.clear();
                content.extend_from_slice(data);
            },
        )
    }
}

/// In-memory file system backend.
///
/// Registered under `mem://<id>`. Locations look like
/// `mem://3f2a.../docs/readme.txt`.
#[derive(Debug)]
pub struct MemoryFs {
    id: String,
    name: String,
    tree: Arc<Tree>,
    registry: Weak<Registry>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new(MemoryFsConfig::default())
    }
}

impl MemoryFs {
    /// Create an empty file system that is not bound in any registry.
    pub fn new(config: MemoryFsConfig) -> Self {
        Self::build(config, Weak::new())
    }

    /// Create an empty file system and register it.
    ///
    /// [`close`](Backend::close) unregisters it again.
    pub fn create(registry: &Arc<Registry>, config: MemoryFsConfig) -> Arc<Self> {
        let fs = Arc::new(Self::build(config, Arc::downgrade(registry)));
        registry.register(fs.clone());
        fs
    }

    fn build(config: MemoryFsConfig, registry: Weak<Registry>) -> Self {
        let prefix = format!("{MEMORY_SCHEME}{}", config.id);
        Self {
            name: format!("memory file system {}", config.id),
            tree: Arc::new(Tree::new(prefix, config.separator, config.read_only)),
            id: config.id,
            registry,
        }
    }

    /// Seed files, creating parent directories as needed.
    pub fn with_files<P, D>(self, files: impl IntoIterator<Item = (P, D)>) -> FsResult<Self>
    where
        P: AsRef<str>,
        D: AsRef<[u8]>,
    {
        self.seed_files(files)?;
        Ok(self)
    }

    /// Seed files into an already shared file system. Works on read-only
    /// file systems too.
    pub fn seed_files<P, D>(&self, files: impl IntoIterator<Item = (P, D)>) -> FsResult<()>
    where
        P: AsRef<str>,
        D: AsRef<[u8]>,
    {
        for (path, data) in files {
            self.tree.seed(path.as_ref(), data.as_ref())?;
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tree.is_closed()
    }

    /// Location of the root directory.
    pub fn root(&self) -> Location {
        self.tree.location("")
    }
}

impl Backend for MemoryFs {
    fn prefix(&self) -> &str {
        &self.tree.prefix
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn separator(&self) -> char {
        self.tree.separator
    }

    fn is_read_only(&self) -> bool {
        self.tree.read_only
    }

    fn location(&self, path: &str) -> Location {
        self.tree.location(path)
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        self.tree.stat(path)
    }

    fn list_dir_info(
        &self,
        dir: &str,
        callback: ListCallback<'_>,
        patterns: &[&str],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        if cancel.is_cancelled() {
            return Err(FsError::Canceled);
        }
        // Callbacks run without the lock held so they may call back in.
        for info in self.tree.list(dir, patterns)? {
            if cancel.is_cancelled() {
                return Err(FsError::Canceled);
            }
            callback(info)?;
        }
        Ok(())
    }

    fn read_all(&self, path: &str) -> FsResult<Vec<u8>> {
        self.tree.read_all(path)
    }

    fn open_reader(&self, path: &str) -> FsResult<Box<dyn FileReader>> {
        Ok(Box::new(ReadonlyBuffer::new(self.tree.read_all(path)?)))
    }

    fn make_dir(&self, path: &str, perm: Permissions) -> FsResult<()> {
        self.tree.make_dir(path, perm)
    }

    fn write_all(&self, path: &str, data: &[u8], perm: Permissions) -> FsResult<()> {
        self.tree.write_all(path, data, perm)
    }

    fn append(&self, path: &str, data: &[u8], perm: Permissions) -> FsResult<()> {
        self.tree.append(path, data, perm)
    }

    fn open_writer(&self, path: &str, perm: Permissions) -> FsResult<Box<dyn FileWriter>> {
        // Create or truncate now so errors surface at open time.
        self.tree.write_all(path, &[], perm)?;
        let tree = Arc::clone(&self.tree);
        let path = path.to_string();
        Ok(Box::new(FileBuffer::with_write_back(
            Vec::new(),
            move |data| tree.write_all(&path, data, perm),
        )))
    }

    fn open_append_writer(&self, path: &str, perm: Permissions) -> FsResult<Box<dyn FileWriter>> {
        // Holds only the new bytes; close appends them to whatever is there.
        self.tree.append(path, &[], perm)?;
        let tree = Arc::clone(&self.tree);
        let path = path.to_string();
        Ok(Box::new(FileBuffer::with_write_back(
            Vec::new(),
            move |data| tree.append(&path, data, perm),
        )))
    }

    fn open_read_writer(
        &self,
        path: &str,
        perm: Permissions,
    ) -> FsResult<Box<dyn FileReadWriter>> {
        self.tree.append(path, &[], perm)?;
        let fetch_tree = Arc::clone(&self.tree);
        let fetch_path = path.to_string();
        let tree = Arc::clone(&self.tree);
        let path = path.to_string();
        Ok(Box::new(ReadWriteAllBuffer::new(
            move || fetch_tree.read_all(&fetch_path),
            move |data| tree.write_all(&path, data, perm),
        )))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        self.tree.remove(path)
    }

    fn close(&self) -> FsResult<()> {
        if self.tree.close() {
            if let Some(registry) = self.registry.upgrade() {
                registry.unregister(self);
            }
            tracing::debug!(prefix = %self.tree.prefix, "closed memory file system");
        }
        Ok(())
    }

    fn as_set_permissions(&self) -> Option<&dyn SetPermissions> {
        Some(self)
    }

    fn as_rename(&self) -> Option<&dyn Rename> {
        Some(self)
    }

    fn as_move(&self) -> Option<&dyn Move> {
        Some(self)
    }

    fn as_truncate(&self) -> Option<&dyn Truncate> {
        Some(self)
    }

    fn as_copy_file(&self) -> Option<&dyn CopyFile> {
        Some(self)
    }

    fn as_make_all_dirs(&self) -> Option<&dyn MakeAllDirs> {
        Some(self)
    }

    fn as_touch(&self) -> Option<&dyn Touch> {
        Some(self)
    }
}

impl SetPermissions for MemoryFs {
    fn set_permissions(&self, path: &str, perm: Permissions) -> FsResult<()> {
        self.tree.set_permissions(path, perm)
    }
}

impl Rename for MemoryFs {
    fn rename(&self, path: &str, new_name: &str) -> FsResult<String> {
        self.tree.rename(path, new_name)
    }
}

impl Move for MemoryFs {
    fn move_to(&self, from: &str, to: &str) -> FsResult<()> {
        self.tree.move_to(from, to)
    }
}

impl Truncate for MemoryFs {
    fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        self.tree.truncate(path, size)
    }
}

impl CopyFile for MemoryFs {
    fn copy_file(&self, src: &str, dst: &str) -> FsResult<()> {
        self.tree.copy_file(src, dst)
    }
}

impl MakeAllDirs for MemoryFs {
    fn make_all_dirs(&self, path: &str, perm: Permissions) -> FsResult<()> {
        self.tree.make_all_dirs(path, perm)
    }
}

impl Touch for MemoryFs {
    fn touch(&self, path: &str, perm: Permissions) -> FsResult<()> {
        self.tree.touch(path, perm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Capability;
    use std::io::{Read, Seek, SeekFrom, Write};

    const FILE: Permissions = Permissions::FILE_DEFAULT;
    const DIR: Permissions = Permissions::DIR_DEFAULT;

    fn fs() -> MemoryFs {
        MemoryFs::new(MemoryFsConfig::default().with_id("test"))
    }

    fn names(fs: &MemoryFs, dir: &str, patterns: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        fs.list_dir_info(
            dir,
            &mut |info| {
                out.push(info.name);
                Ok(())
            },
            patterns,
            &CancellationToken::new(),
        )
        .unwrap();
        out
    }

    #[test]
    fn test_write_and_read() {
        let fs = fs();
        fs.write_all("f", b"data", FILE).unwrap();
        assert_eq!(fs.read_all("f").unwrap(), b"data");

        fs.append("f", b"more", FILE).unwrap();
        assert_eq!(fs.read_all("f").unwrap(), b"datamore");

        fs.truncate("f", 2).unwrap();
        assert_eq!(fs.read_all("f").unwrap(), b"da");

        fs.truncate("f", 4).unwrap();
        assert_eq!(fs.read_all("f").unwrap(), b"da\0\0");
    }

    #[test]
    fn test_write_needs_parent() {
        let fs = fs();
        let err = fs.write_all("missing/f.txt", b"x", FILE).unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));

        fs.write_all("file", b"x", FILE).unwrap();
        let err = fs.write_all("file/child", b"x", FILE).unwrap_err();
        assert!(matches!(err, FsError::NotADirectory(_)));

        fs.make_dir("dir", DIR).unwrap();
        let err = fs.write_all("dir", b"x", FILE).unwrap_err();
        assert!(matches!(err, FsError::IsADirectory(_)));
    }

    #[test]
    fn test_make_dir() {
        let fs = fs();
        fs.make_dir("a", DIR).unwrap();
        assert!(matches!(
            fs.make_dir("a", DIR),
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.make_dir("x/y", DIR),
            Err(FsError::NotFound(_))
        ));
        fs.write_all("a/f", b"", FILE).unwrap();
        assert!(matches!(
            fs.make_dir("a/f", DIR),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_make_all_dirs_is_idempotent() {
        let fs = fs();
        fs.make_all_dirs("a/b/c", DIR).unwrap();
        assert!(fs.stat("a/b/c").unwrap().is_dir);
        fs.make_all_dirs("a/b/c", DIR).unwrap();
        fs.make_all_dirs("/a/./b/../b/c", DIR).unwrap();

        fs.write_all("a/file", b"", FILE).unwrap();
        assert!(matches!(
            fs.make_all_dirs("a/file/d", DIR),
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(
            fs.make_all_dirs("a/file", DIR),
            Err(FsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_stat() {
        let fs = fs();
        fs.make_dir("docs", DIR).unwrap();
        fs.write_all("docs/.hidden", b"abc", FILE).unwrap();

        let info = fs.stat("docs/.hidden").unwrap();
        assert_eq!(info.name, ".hidden");
        assert_eq!(info.size, 3);
        assert!(info.is_hidden);
        assert!(info.is_regular);
        assert_eq!(info.location.as_str(), "mem://test/docs/.hidden");

        let root = fs.stat("").unwrap();
        assert!(root.is_dir);
        assert_eq!(root.location.as_str(), "mem://test/");

        assert!(fs.stat("nope").unwrap_err().is_not_found());
        assert!(!fs.exists("nope"));
    }

    #[test]
    fn test_list_is_sorted_and_filtered() {
        let fs = fs();
        for name in ["b.txt", "a.txt", "c.rs"] {
            fs.write_all(name, b"", FILE).unwrap();
        }
        fs.make_dir("sub", DIR).unwrap();

        assert_eq!(names(&fs, "/", &[]), vec!["a.txt", "b.txt", "c.rs", "sub"]);
        assert_eq!(names(&fs, "", &["*.txt"]), vec!["a.txt", "b.txt"]);
        assert_eq!(names(&fs, "", &["*.rs", "s*"]), vec!["c.rs", "sub"]);

        let err = fs
            .list_dir_info("a.txt", &mut |_| Ok(()), &[], &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, FsError::NotADirectory(_)));
    }

    #[test]
    fn test_list_callback_error_aborts() {
        let fs = fs();
        for name in ["a", "b", "c"] {
            fs.write_all(name, b"", FILE).unwrap();
        }
        let mut seen = 0;
        let err = fs
            .list_dir_info(
                "",
                &mut |_| {
                    seen += 1;
                    Err(FsError::other("boom"))
                },
                &[],
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_list_cancellation() {
        let fs = fs();
        for name in ["a", "b", "c"] {
            fs.write_all(name, b"", FILE).unwrap();
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fs
            .list_dir_info("", &mut |_| Ok(()), &[], &cancel)
            .unwrap_err();
        assert!(err.is_canceled());

        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let err = fs
            .list_dir_info(
                "",
                &mut |info| {
                    seen.push(info.name);
                    cancel.cancel();
                    Ok(())
                },
                &[],
                &cancel,
            )
            .unwrap_err();
        assert!(err.is_canceled());
        assert_eq!(seen, vec!["a"]);
    }

    #[test]
    fn test_callback_may_reenter() {
        let fs = fs();
        fs.write_all("a", b"", FILE).unwrap();
        fs.write_all("b", b"", FILE).unwrap();
        fs.list_dir_info(
            "",
            &mut |info| fs.remove(&info.name),
            &[],
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(names(&fs, "", &[]).is_empty());
    }

    #[test]
    fn test_recursive_listing_scenario() {
        let fs = MemoryFs::new(MemoryFsConfig::default().with_separator('/'));
        fs.make_dir("docs", DIR).unwrap();
        fs.write_all("docs/readme.txt", b"hello", FILE).unwrap();
        fs.write_all("docs/notes.md", b"# notes", FILE).unwrap();

        let mut found = Vec::new();
        fs.list_dir_info_recursive(
            "",
            &mut |info| {
                found.push(info);
                Ok(())
            },
            &["*.txt"],
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "readme.txt");
        assert_eq!(found[0].size, 5);

        fs.remove("docs").unwrap();
        assert!(fs.stat("docs/readme.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_recursive_listing_rejects_bad_pattern() {
        let fs = fs();
        fs.make_dir("only", DIR).unwrap();
        fs.make_dir("only/dirs", DIR).unwrap();

        let err = fs
            .list_dir_info_recursive("", &mut |_| Ok(()), &["[abc"], &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, FsError::InvalidPattern(_)));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let fs = fs()
            .with_files([("a/b/c.txt", "c"), ("a/b/d/e.txt", "e"), ("a/f.txt", "f")])
            .unwrap();
        fs.remove("a/b").unwrap();
        for gone in ["a/b", "a/b/c.txt", "a/b/d", "a/b/d/e.txt"] {
            assert!(fs.stat(gone).unwrap_err().is_not_found(), "{gone}");
        }
        assert!(fs.exists("a/f.txt"));

        assert!(matches!(fs.remove("/"), Err(FsError::PermissionDenied(_))));
        assert!(matches!(fs.remove("a/b"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_touch() {
        let fs = fs();
        fs.touch("new", FILE).unwrap();
        assert_eq!(fs.stat("new").unwrap().size, 0);

        fs.write_all("new", b"keep", FILE).unwrap();
        fs.touch("new", FILE).unwrap();
        assert_eq!(fs.read_all("new").unwrap(), b"keep");

        assert!(fs.touch("missing/new", FILE).unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_and_move() {
        let fs = fs()
            .with_files([("src/old.txt", "content"), ("dst/keep.txt", "k")])
            .unwrap();

        let renamed = fs.rename("src/old.txt", "new.txt").unwrap();
        assert_eq!(renamed, "/src/new.txt");
        assert!(!fs.exists("src/old.txt"));
        assert_eq!(fs.read_all("src/new.txt").unwrap(), b"content");

        assert!(matches!(
            fs.rename("src/new.txt", "a/b"),
            Err(FsError::InvalidPath(_))
        ));

        fs.move_to("src", "dst/src").unwrap();
        assert_eq!(fs.read_all("dst/src/new.txt").unwrap(), b"content");
        assert!(!fs.exists("src"));

        assert!(matches!(
            fs.move_to("dst", "dst/src/inner"),
            Err(FsError::InvalidPath(_))
        ));
        assert!(matches!(
            fs.move_to("dst/keep.txt", "dst/src/new.txt"),
            Err(FsError::AlreadyExists(_))
        ));
        assert!(fs.exists("dst/keep.txt"));
    }

    #[test]
    fn test_copy_file_and_permissions() {
        let fs = fs().with_files([("a.txt", "abc")]).unwrap();
        fs.set_permissions("a.txt", Permissions::from_mode(0o600))
            .unwrap();
        fs.copy_file("a.txt", "b.txt").unwrap();

        let b = fs.stat("b.txt").unwrap();
        assert_eq!(b.size, 3);
        assert_eq!(b.permissions.mode(), 0o600);

        fs.make_dir("d", DIR).unwrap();
        assert!(matches!(
            fs.copy_file("d", "e"),
            Err(FsError::IsADirectory(_))
        ));
    }

    #[test]
    fn test_append_writer_keeps_concurrent_appends() {
        let fs = fs();
        fs.write_all("log", b"start\n", FILE).unwrap();

        let mut writer = fs.open_append_writer("log", FILE).unwrap();
        writer.write_all(b"from handle\n").unwrap();
        fs.append("log", b"from elsewhere\n", FILE).unwrap();
        writer.close().unwrap();

        assert_eq!(
            fs.read_all("log").unwrap(),
            b"start\nfrom elsewhere\nfrom handle\n"
        );
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let fs = fs();
        fs.make_dir("scratch", DIR).unwrap();
        fs.write_all("log", b"", FILE).unwrap();
        fs.write_all("whole", b"aaaa", FILE).unwrap();

        const WRITERS: usize = 4;
        const APPENDS: usize = 200;

        std::thread::scope(|s| {
            for w in 0..WRITERS {
                let fs = &fs;
                s.spawn(move || {
                    for i in 0..APPENDS {
                        fs.append("log", b"x", FILE).unwrap();
                        let fill = if (w + i) % 2 == 0 { b"aaaa" } else { b"bbbb" };
                        fs.write_all("whole", fill, FILE).unwrap();
                        let tmp = format!("scratch/{w}-{i}");
                        fs.write_all(&tmp, b"t", FILE).unwrap();
                        fs.remove(&tmp).unwrap();
                    }
                });
            }

            for _ in 0..4 {
                let fs = &fs;
                s.spawn(move || {
                    let mut last_len = 0;
                    for _ in 0..APPENDS {
                        let log = fs.read_all("log").unwrap();
                        assert!(log.len() >= last_len);
                        assert!(log.iter().all(|b| *b == b'x'));
                        last_len = log.len();

                        let whole = fs.read_all("whole").unwrap();
                        assert!(whole == b"aaaa" || whole == b"bbbb", "torn read: {whole:?}");
                        assert_eq!(fs.stat("whole").unwrap().size, 4);

                        fs.list_dir_info(
                            "scratch",
                            &mut |info| {
                                assert!(info.is_regular);
                                Ok(())
                            },
                            &[],
                            &CancellationToken::new(),
                        )
                        .unwrap();
                    }
                });
            }
        });

        assert_eq!(fs.read_all("log").unwrap().len(), WRITERS * APPENDS);
        assert!(names(&fs, "scratch", &[]).is_empty());
    }

    #[test]
    fn test_handles_write_back() {
        let fs = fs();

        let mut w = fs.open_writer("w.txt", FILE).unwrap();
        w.write_all(b"hello").unwrap();
        w.close().unwrap();
        assert_eq!(fs.read_all("w.txt").unwrap(), b"hello");

        let mut a = fs.open_append_writer("w.txt", FILE).unwrap();
        a.write_all(b" world").unwrap();
        drop(a);
        assert_eq!(fs.read_all("w.txt").unwrap(), b"hello world");

        let mut rw = fs.open_read_writer("w.txt", FILE).unwrap();
        rw.seek(SeekFrom::Start(6)).unwrap();
        rw.write_all(b"there").unwrap();
        rw.seek(SeekFrom::Start(0)).unwrap();
        let mut s = String::new();
        rw.read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello there");
        rw.close().unwrap();
        assert_eq!(fs.read_all("w.txt").unwrap(), b"hello there");

        let mut r = fs.open_reader("w.txt").unwrap();
        let mut s = String::new();
        r.read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello there");
    }

    #[test]
    fn test_read_only() {
        let fs = MemoryFs::new(MemoryFsConfig::default().read_only())
            .with_files([("seeded.txt", "x")])
            .unwrap();
        assert!(fs.is_read_only());
        assert_eq!(fs.read_all("seeded.txt").unwrap(), b"x");
        assert!(matches!(
            fs.write_all("seeded.txt", b"y", FILE),
            Err(FsError::ReadOnly(_))
        ));
        assert!(matches!(fs.open_writer("n", FILE), Err(FsError::ReadOnly(_))));
        assert!(matches!(fs.remove("seeded.txt"), Err(FsError::ReadOnly(_))));
    }

    #[test]
    fn test_custom_separator() {
        let fs = MemoryFs::new(MemoryFsConfig::default().with_id("w").with_separator('\\'));
        fs.make_all_dirs(r"a\b", DIR).unwrap();
        fs.write_all(r"a\b\c.txt", b"x", FILE).unwrap();
        let info = fs.stat(r"\a\b\c.txt").unwrap();
        assert_eq!(info.location.as_str(), r"mem://w\a\b\c.txt");
        // '/' is an ordinary character here.
        assert!(fs.stat("a/b").unwrap_err().is_not_found());
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let registry = Arc::new(Registry::new());
        let fs = MemoryFs::create(&registry, MemoryFsConfig::default().with_id("closing"));
        fs.write_all("f", b"x", FILE).unwrap();
        assert!(registry.is_registered("mem://closing"));

        fs.close().unwrap();
        fs.close().unwrap();
        assert!(fs.is_closed());
        assert!(!registry.is_registered("mem://closing"));
        assert!(matches!(fs.stat("f"), Err(FsError::Closed(_))));
        assert!(matches!(
            fs.write_all("g", b"", FILE),
            Err(FsError::Closed(_))
        ));
    }

    #[test]
    fn test_capabilities() {
        let fs = fs();
        assert!(fs.supports(Capability::Rename));
        assert!(fs.supports(Capability::MakeAllDirs));
        assert!(!fs.supports(Capability::Watch));
        assert!(!fs.supports(Capability::Symlinks));
        assert!(fs.unsupported(Capability::Owner).is_unsupported());
    }
}
