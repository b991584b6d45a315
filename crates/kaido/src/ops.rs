//! Generic algorithms over the backend contract.
//!
//! These work with any pair of backends and use an optional capability when
//! the backend has it: a same-backend copy goes through [`CopyFile`], a
//! same-backend move through [`Move`] or [`Rename`].
//!
//! "Does not exist" is benign while walking a tree: an entry that vanishes
//! mid-traversal is skipped rather than failing the whole operation.
//!
//! [`CopyFile`]: crate::backend::CopyFile
//! [`Move`]: crate::backend::Move
//! [`Rename`]: crate::backend::Rename

use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::error::{FsError, FsResult};
use crate::location::Location;
use crate::registry::Registry;
use crate::types::{FileInfo, Permissions};

fn check_cancel(cancel: &CancellationToken) -> FsResult<()> {
    if cancel.is_cancelled() {
        Err(FsError::Canceled)
    } else {
        Ok(())
    }
}

/// Map a not-found error to `Ok`, logging what was skipped.
fn skip_not_found(result: FsResult<()>, what: &Location) -> FsResult<()> {
    match result {
        Err(e) if e.is_not_found() => {
            tracing::debug!(location = %what, "skipping vanished entry");
            Ok(())
        }
        other => other,
    }
}

/// Split a cleaned path into parent and name.
fn split_parent(backend: &dyn Backend, path: &str) -> (String, String) {
    let cleaned = backend.clean_path(path);
    let sep = backend.separator();
    match cleaned.rfind(sep) {
        Some(0) => (sep.to_string(), cleaned[sep.len_utf8()..].to_string()),
        Some(i) => (cleaned[..i].to_string(), cleaned[i + sep.len_utf8()..].to_string()),
        None => (".".to_string(), cleaned),
    }
}

/// Create a directory and its missing parents.
///
/// Uses [`MakeAllDirs`](crate::backend::MakeAllDirs) if the backend has it,
/// otherwise creates one level at a time with `make_dir`.
pub fn make_all_dirs(backend: &dyn Backend, path: &str, perm: Permissions) -> FsResult<()> {
    if let Some(native) = backend.as_make_all_dirs() {
        return native.make_all_dirs(path, perm);
    }

    let sep = backend.separator();
    let mut current = if backend.is_abs_path(path) {
        sep.to_string()
    } else {
        String::new()
    };
    for segment in backend.split_path(path) {
        if !current.is_empty() && !current.ends_with(sep) {
            current.push(sep);
        }
        current.push_str(&segment);
        match backend.make_dir(&current, perm) {
            Ok(()) => {}
            Err(FsError::AlreadyExists(_)) => {
                if !backend.stat(&current)?.is_dir {
                    return Err(FsError::not_a_directory(current));
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// List at most `max` entries of `dir`.
pub fn list_dir_max(
    registry: &Registry,
    dir: &Location,
    max: usize,
    patterns: &[&str],
    cancel: &CancellationToken,
) -> FsResult<Vec<FileInfo>> {
    let (backend, path) = dir.resolve(registry)?;
    let mut found = Vec::new();
    if max == 0 {
        return Ok(found);
    }

    let result = backend.list_dir_info(
        &path,
        &mut |info| {
            found.push(info);
            if found.len() >= max {
                Err(FsError::StopListing)
            } else {
                Ok(())
            }
        },
        patterns,
        cancel,
    );
    match result {
        Ok(()) | Err(FsError::StopListing) => Ok(found),
        Err(e) => Err(e),
    }
}

/// Copy one file, possibly across backends. Keeps the source permissions.
#[tracing::instrument(level = "debug", skip(registry), fields(src = %src, dst = %dst))]
pub fn copy_file(registry: &Registry, src: &Location, dst: &Location) -> FsResult<()> {
    let (src_fs, src_path) = src.resolve(registry)?;
    let (dst_fs, dst_path) = dst.resolve(registry)?;

    if Arc::ptr_eq(&src_fs, &dst_fs) {
        if let Some(native) = src_fs.as_copy_file() {
            return native.copy_file(&src_path, &dst_path);
        }
    }

    let info = src_fs.stat(&src_path)?;
    if info.is_dir {
        return Err(FsError::is_a_directory(src.as_str()));
    }

    let mut reader = src_fs.open_reader(&src_path)?;
    let mut writer = dst_fs.open_writer(&dst_path, info.permissions)?;
    io::copy(&mut reader, &mut writer)?;
    reader.close()?;
    writer.close()
}

/// Copy a file or a whole directory tree, possibly across backends.
#[tracing::instrument(level = "debug", skip(registry, cancel), fields(src = %src, dst = %dst))]
pub fn copy_recursive(
    registry: &Registry,
    src: &Location,
    dst: &Location,
    cancel: &CancellationToken,
) -> FsResult<()> {
    check_cancel(cancel)?;
    reject_nested(registry, src, dst)?;
    if src.stat(registry)?.is_dir {
        copy_tree(registry, src, dst, cancel)
    } else {
        copy_file(registry, src, dst)
    }
}

/// Fail if `dst` is `src` or lies below it on the same backend.
fn reject_nested(registry: &Registry, src: &Location, dst: &Location) -> FsResult<()> {
    let (src_fs, src_path) = src.resolve(registry)?;
    let (dst_fs, dst_path) = dst.resolve(registry)?;
    if !Arc::ptr_eq(&src_fs, &dst_fs) {
        return Ok(());
    }

    let sep = src_fs.separator();
    let mut parent = src_fs.clean_path(&src_path);
    let child = dst_fs.clean_path(&dst_path);
    if child == parent {
        return Err(FsError::invalid_path(format!("cannot copy {src} onto itself")));
    }
    if !parent.ends_with(sep) {
        parent.push(sep);
    }
    if child.starts_with(&parent) {
        return Err(FsError::invalid_path(format!("cannot copy {src} into itself ({dst})")));
    }
    Ok(())
}

fn copy_tree(
    registry: &Registry,
    src: &Location,
    dst: &Location,
    cancel: &CancellationToken,
) -> FsResult<()> {
    check_cancel(cancel)?;
    dst.make_all_dirs(registry)?;

    let mut entries = Vec::new();
    src.list_dir_info(
        registry,
        |info| {
            entries.push(info);
            Ok(())
        },
        &[],
        cancel,
    )?;

    for entry in entries {
        check_cancel(cancel)?;
        let target = dst.join(registry, &[&entry.name])?;
        let result = if entry.is_dir {
            copy_tree(registry, &entry.location, &target, cancel)
        } else {
            copy_file(registry, &entry.location, &target)
        };
        skip_not_found(result, &entry.location)?;
    }
    Ok(())
}

/// Remove a file or a whole directory tree. A missing location is not an
/// error.
#[tracing::instrument(level = "debug", skip(registry, cancel), fields(location = %location))]
pub fn remove_recursive(
    registry: &Registry,
    location: &Location,
    cancel: &CancellationToken,
) -> FsResult<()> {
    let (backend, path) = location.resolve(registry)?;
    remove_tree(backend.as_ref(), &path, cancel)
}

fn remove_tree(backend: &dyn Backend, path: &str, cancel: &CancellationToken) -> FsResult<()> {
    check_cancel(cancel)?;
    let info = match backend.stat(path) {
        Ok(info) => info,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e),
    };

    if info.is_dir {
        let mut children = Vec::new();
        let listed = backend.list_dir_info(
            path,
            &mut |child| {
                children.push(child.name);
                Ok(())
            },
            &[],
            cancel,
        );
        match listed {
            Err(e) if e.is_not_found() => return Ok(()),
            other => other?,
        }
        for name in children {
            remove_tree(backend, &backend.join_clean(&[path, name.as_str()]), cancel)?;
        }
    }

    match backend.remove(path) {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Move a file or directory tree.
///
/// Within one backend this uses [`Move`](crate::backend::Move), or
/// [`Rename`](crate::backend::Rename) when only the name changes. Anything
/// else is a copy followed by a delete, which is not atomic: if the delete
/// fails both copies remain.
#[tracing::instrument(level = "debug", skip(registry, cancel), fields(src = %src, dst = %dst))]
pub fn move_to(
    registry: &Registry,
    src: &Location,
    dst: &Location,
    cancel: &CancellationToken,
) -> FsResult<()> {
    let (src_fs, src_path) = src.resolve(registry)?;
    let (dst_fs, dst_path) = dst.resolve(registry)?;

    if Arc::ptr_eq(&src_fs, &dst_fs) {
        if let Some(native) = src_fs.as_move() {
            return native.move_to(&src_path, &dst_path);
        }
        if let Some(native) = src_fs.as_rename() {
            let (src_dir, _) = split_parent(src_fs.as_ref(), &src_path);
            let (dst_dir, dst_name) = split_parent(src_fs.as_ref(), &dst_path);
            if src_dir == dst_dir {
                return native.rename(&src_path, &dst_name).map(drop);
            }
        }
    }

    if dst_fs.exists(&dst_path) {
        return Err(FsError::already_exists(dst.as_str()));
    }
    copy_recursive(registry, src, dst, cancel)?;
    remove_recursive(registry, src, cancel)
}
