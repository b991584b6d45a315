//! Local disk backend.
//!
//! A thin layer over `std::fs`. Locations without a registered scheme land
//! here verbatim, and `file://` locations have the scheme stripped. A
//! leading `~` is expanded to the home directory.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    Backend, CopyFile, FileReadWriter, FileReader, FileWriter, ListCallback, MakeAllDirs, Move,
    Owner, Rename, SetPermissions, Symlinks, Touch, Truncate, Watch, WatchCallback, WatchHandle,
    clean_path,
};
use crate::config::LocalFsConfig;
use crate::error::{FsError, FsResult};
use crate::location::Location;
use crate::pattern;
use crate::types::{FileInfo, Permissions, WatchEvent, WatchEventKind};

/// Prefix of the local backend.
pub const LOCAL_PREFIX: &str = "file://";

/// Attach the path to an OS error before mapping it into the taxonomy.
fn os_error(e: io::Error, path: &Path) -> FsError {
    FsError::from(io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}

fn info_from_metadata(path: &Path, meta: &fs::Metadata) -> FileInfo {
    let location = Location::new(path.to_string_lossy());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let perm = Permissions::from_mode(meta.permissions().mode());

    if meta.is_dir() {
        FileInfo::directory(location, name, modified, perm)
    } else {
        let mut info = FileInfo::file(location, name, meta.len(), modified, perm);
        info.is_regular = meta.is_file();
        info
    }
}

/// Open file handle. Implements every handle trait; which ones work
/// depends on the options it was opened with.
#[derive(Debug)]
struct LocalFile {
    file: Option<File>,
    path: PathBuf,
}

impl LocalFile {
    fn open(path: PathBuf, options: &OpenOptions) -> FsResult<Self> {
        let file = options.open(&path).map_err(|e| os_error(e, &path))?;
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("{}: file is closed", self.path.display())))
    }

    fn close(&mut self) -> FsResult<()> {
        match self.file.take() {
            Some(mut file) => file.flush().map_err(|e| os_error(e, &self.path)),
            None => Ok(()),
        }
    }
}

impl Read for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Write for LocalFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Seek for LocalFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl FileReader for LocalFile {
    fn close(&mut self) -> FsResult<()> {
        LocalFile::close(self)
    }
}

impl FileWriter for LocalFile {
    fn close(&mut self) -> FsResult<()> {
        LocalFile::close(self)
    }
}

impl FileReadWriter for LocalFile {
    fn close(&mut self) -> FsResult<()> {
        LocalFile::close(self)
    }
}

/// Local disk backend.
#[derive(Debug, Clone, Default)]
pub struct LocalFs {
    config: LocalFsConfig,
}

impl LocalFs {
    pub fn new(config: LocalFsConfig) -> Self {
        Self { config }
    }

    /// Native path for a backend-relative path.
    pub fn native_path(&self, path: &str) -> PathBuf {
        let expanded = if self.config.expand_home {
            shellexpand::tilde(path)
        } else {
            path.into()
        };
        PathBuf::from(clean_path(&expanded, MAIN_SEPARATOR))
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> FsResult<()> {
        if self.config.read_only {
            Err(FsError::read_only(self.name()))
        } else {
            Ok(())
        }
    }

    fn open(&self, path: &str, options: &OpenOptions) -> FsResult<LocalFile> {
        LocalFile::open(self.native_path(path), options)
    }

    fn write_options(perm: Permissions) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.write(true).create(true).mode(perm.mode());
        options
    }
}

impl Backend for LocalFs {
    fn prefix(&self) -> &str {
        LOCAL_PREFIX
    }

    fn name(&self) -> &str {
        "local file system"
    }

    fn separator(&self) -> char {
        MAIN_SEPARATOR
    }

    fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Local locations are bare paths.
    fn location(&self, path: &str) -> Location {
        Location::new(path)
    }

    fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let native = self.native_path(path);
        let meta = fs::metadata(&native).map_err(|e| os_error(e, &native))?;
        Ok(info_from_metadata(&native, &meta))
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
        pattern::validate_patterns(patterns)?;

        let native = self.native_path(dir);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&native).map_err(|e| os_error(e, &native))? {
            let entry = entry.map_err(|e| os_error(e, &native))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if pattern::match_any_pattern(&name, patterns)? {
                entries.push((name, entry.path()));
            }
        }
        entries.sort();

        for (_, path) in entries {
            if cancel.is_cancelled() {
                return Err(FsError::Canceled);
            }
            // Follow symlinks; an entry removed since read_dir is skipped.
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(os_error(e, &path)),
            };
            callback(info_from_metadata(&path, &meta))?;
        }
        Ok(())
    }

    fn read_all(&self, path: &str) -> FsResult<Vec<u8>> {
        let native = self.native_path(path);
        fs::read(&native).map_err(|e| os_error(e, &native))
    }

    fn open_reader(&self, path: &str) -> FsResult<Box<dyn FileReader>> {
        Ok(Box::new(self.open(path, OpenOptions::new().read(true))?))
    }

    fn make_dir(&self, path: &str, perm: Permissions) -> FsResult<()> {
        self.check_writable()?;
        let native = self.native_path(path);
        fs::DirBuilder::new()
            .mode(perm.mode())
            .create(&native)
            .map_err(|e| os_error(e, &native))
    }

    fn write_all(&self, path: &str, data: &[u8], perm: Permissions) -> FsResult<()> {
        self.check_writable()?;
        let mut file = self.open(path, Self::write_options(perm).truncate(true))?;
        file.write_all(data)?;
        file.close()
    }

    fn append(&self, path: &str, data: &[u8], perm: Permissions) -> FsResult<()> {
        self.check_writable()?;
        let mut file = self.open(path, Self::write_options(perm).append(true))?;
        file.write_all(data)?;
        file.close()
    }

    fn open_writer(&self, path: &str, perm: Permissions) -> FsResult<Box<dyn FileWriter>> {
        self.check_writable()?;
        Ok(Box::new(
            self.open(path, Self::write_options(perm).truncate(true))?,
        ))
    }

    fn open_append_writer(&self, path: &str, perm: Permissions) -> FsResult<Box<dyn FileWriter>> {
        self.check_writable()?;
        Ok(Box::new(
            self.open(path, Self::write_options(perm).append(true))?,
        ))
    }

    fn open_read_writer(
        &self,
        path: &str,
        perm: Permissions,
    ) -> FsResult<Box<dyn FileReadWriter>> {
        self.check_writable()?;
        Ok(Box::new(
            self.open(path, Self::write_options(perm).read(true))?,
        ))
    }

    /// Removes files, and directories with everything below them.
    fn remove(&self, path: &str) -> FsResult<()> {
        self.check_writable()?;
        let native = self.native_path(path);
        let meta = fs::symlink_metadata(&native).map_err(|e| os_error(e, &native))?;
        let result = if meta.is_dir() {
            fs::remove_dir_all(&native)
        } else {
            fs::remove_file(&native)
        };
        result.map_err(|e| os_error(e, &native))
    }

    fn as_set_permissions(&self) -> Option<&dyn SetPermissions> {
        Some(self)
    }

    fn as_owner(&self) -> Option<&dyn Owner> {
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

    fn as_symlinks(&self) -> Option<&dyn Symlinks> {
        Some(self)
    }

    fn as_watch(&self) -> Option<&dyn Watch> {
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

impl SetPermissions for LocalFs {
    fn set_permissions(&self, path: &str, perm: Permissions) -> FsResult<()> {
        self.check_writable()?;
        let native = self.native_path(path);
        fs::set_permissions(&native, fs::Permissions::from_mode(perm.mode()))
            .map_err(|e| os_error(e, &native))
    }
}

impl Owner for LocalFs {
    fn owner(&self, path: &str) -> FsResult<(u32, u32)> {
        let native = self.native_path(path);
        let meta = fs::metadata(&native).map_err(|e| os_error(e, &native))?;
        Ok((meta.uid(), meta.gid()))
    }

    fn set_owner(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.check_writable()?;
        let native = self.native_path(path);
        std::os::unix::fs::chown(&native, uid, gid).map_err(|e| os_error(e, &native))
    }
}

impl Rename for LocalFs {
    fn rename(&self, path: &str, new_name: &str) -> FsResult<String> {
        self.check_writable()?;
        if new_name.is_empty() || new_name == "." || new_name == ".." || new_name.contains('/') {
            return Err(FsError::invalid_path(format!(
                "{new_name:?} is not a valid file name"
            )));
        }
        let native = self.native_path(path);
        let target = native.with_file_name(new_name);
        if target == native {
            return Ok(path.to_string());
        }
        if fs::symlink_metadata(&target).is_ok() {
            return Err(FsError::already_exists(target.display().to_string()));
        }
        fs::rename(&native, &target).map_err(|e| os_error(e, &native))?;
        Ok(target.to_string_lossy().into_owned())
    }
}

impl Move for LocalFs {
    fn move_to(&self, from: &str, to: &str) -> FsResult<()> {
        self.check_writable()?;
        let from = self.native_path(from);
        let to = self.native_path(to);
        if from == to {
            return fs::symlink_metadata(&from)
                .map(drop)
                .map_err(|e| os_error(e, &from));
        }
        if fs::symlink_metadata(&to).is_ok() {
            return Err(FsError::already_exists(to.display().to_string()));
        }
        fs::rename(&from, &to).map_err(|e| os_error(e, &from))
    }
}

impl Truncate for LocalFs {
    fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        self.check_writable()?;
        let native = self.native_path(path);
        let file = OpenOptions::new()
            .write(true)
            .open(&native)
            .map_err(|e| os_error(e, &native))?;
        if file.metadata().map_err(|e| os_error(e, &native))?.len() != size {
            file.set_len(size).map_err(|e| os_error(e, &native))?;
        }
        Ok(())
    }
}

impl Symlinks for LocalFs {
    fn is_symlink(&self, path: &str) -> FsResult<bool> {
        let native = self.native_path(path);
        let meta = fs::symlink_metadata(&native).map_err(|e| os_error(e, &native))?;
        Ok(meta.file_type().is_symlink())
    }

    fn read_link(&self, path: &str) -> FsResult<String> {
        let native = self.native_path(path);
        let target = fs::read_link(&native).map_err(|e| os_error(e, &native))?;
        Ok(target.to_string_lossy().into_owned())
    }
}

impl Watch for LocalFs {
    fn watch(&self, path: &str, mut on_event: WatchCallback) -> FsResult<WatchHandle> {
        let native = self.native_path(path);
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let kind = match event.kind {
                        EventKind::Create(_) => WatchEventKind::Created,
                        EventKind::Modify(_) => WatchEventKind::Modified,
                        EventKind::Remove(_) => WatchEventKind::Removed,
                        _ => return,
                    };
                    for path in event.paths {
                        on_event(WatchEvent {
                            location: Location::new(path.to_string_lossy()),
                            kind,
                        });
                    }
                }
                Err(e) => tracing::warn!(error = %e, "file watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| FsError::other(format!("watch {}: {e}", native.display())))?;

        watcher
            .watch(&native, RecursiveMode::Recursive)
            .map_err(|e| FsError::other(format!("watch {}: {e}", native.display())))?;
        tracing::debug!(path = %native.display(), "watching");
        Ok(WatchHandle::new(watcher))
    }
}

impl CopyFile for LocalFs {
    fn copy_file(&self, src: &str, dst: &str) -> FsResult<()> {
        self.check_writable()?;
        let src = self.native_path(src);
        let dst = self.native_path(dst);
        fs::copy(&src, &dst).map_err(|e| os_error(e, &src))?;
        Ok(())
    }
}

impl MakeAllDirs for LocalFs {
    fn make_all_dirs(&self, path: &str, perm: Permissions) -> FsResult<()> {
        self.check_writable()?;
        let native = self.native_path(path);
        fs::DirBuilder::new()
            .mode(perm.mode())
            .recursive(true)
            .create(&native)
            .map_err(|e| os_error(e, &native))
    }
}

impl Touch for LocalFs {
    fn touch(&self, path: &str, perm: Permissions) -> FsResult<()> {
        self.check_writable()?;
        let native = self.native_path(path);
        let file = Self::write_options(perm)
            .open(&native)
            .map_err(|e| os_error(e, &native))?;
        file.set_modified(SystemTime::now())
            .map_err(|e| os_error(e, &native))
    }
}
