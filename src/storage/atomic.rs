use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use super::{backup_path, StorageError};

/// Data files hold personal notes; keep them owner-only.
pub const DATA_FILE_MODE: u32 = 0o600;

/// Replaces `path` with `bytes` so readers see either the old or the new
/// content. The temp file lives in the destination directory so the final
/// rename never crosses filesystems.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<(), StorageError> {
    write_atomic_inner(path, bytes, mode, false)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|err| StorageError::json(path, err))?;
    bytes.push(b'\n');
    write_atomic(path, &bytes, DATA_FILE_MODE)
}

/// Runs every step up to the rename, then fails as if the process died there.
#[cfg(test)]
pub(crate) fn write_atomic_interrupted(
    path: &Path,
    bytes: &[u8],
    mode: u32,
) -> Result<(), StorageError> {
    write_atomic_inner(path, bytes, mode, true)
}

fn write_atomic_inner(
    path: &Path,
    bytes: &[u8],
    mode: u32,
    fail_before_rename: bool,
) -> Result<(), StorageError> {
    let dir = parent_dir(path);
    let temp_path = temp_path_for(path, &dir);

    let result = write_temp(&temp_path, bytes, mode).and_then(|()| {
        if fail_before_rename {
            return Err(StorageError::io(
                path,
                std::io::Error::other("injected failure before rename"),
            ));
        }
        replace(&temp_path, path)
    });

    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    sync_dir(&dir);
    Ok(())
}

fn write_temp(temp_path: &Path, bytes: &[u8], mode: u32) -> Result<(), StorageError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .map_err(|err| StorageError::io(temp_path, err))?;
    set_mode(&file, mode).map_err(|err| StorageError::io(temp_path, err))?;
    file.write_all(bytes)
        .map_err(|err| StorageError::io(temp_path, err))?;
    file.sync_all()
        .map_err(|err| StorageError::io(temp_path, err))?;
    Ok(())
}

#[cfg(unix)]
fn replace(temp_path: &Path, path: &Path) -> Result<(), StorageError> {
    fs::rename(temp_path, path).map_err(|err| StorageError::io(path, err))
}

// Some platforms refuse to rename over an existing file. Removing first opens
// a short window where `path` is missing; the temp file still holds the data.
#[cfg(not(unix))]
fn replace(temp_path: &Path, path: &Path) -> Result<(), StorageError> {
    match fs::rename(temp_path, path) {
        Ok(()) => Ok(()),
        Err(_) if path.exists() => {
            tracing::debug!(path = %path.display(), "rename over destination failed; removing first");
            fs::remove_file(path).map_err(|err| StorageError::io(path, err))?;
            fs::rename(temp_path, path).map_err(|err| StorageError::io(path, err))
        }
        Err(err) => Err(StorageError::io(path, err)),
    }
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    let synced = File::open(dir).and_then(|handle| handle.sync_all());
    if let Err(err) = synced {
        tracing::debug!(dir = %dir.display(), error = %err, "directory sync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_path_for(path: &Path, dir: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("data");
    dir.join(format!(".{}.tmp-{}", name, Uuid::now_v7().simple()))
}

/// Copies the current content of `path` to its `.bak` sibling. Every failure
/// is ignored: a missing backup only weakens recovery.
pub fn backup_existing(path: &Path) {
    let bytes = match fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => return,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "skipping backup; read failed");
            return;
        }
    };
    if let Err(err) = write_atomic(&backup_path(path), &bytes, DATA_FILE_MODE) {
        tracing::debug!(path = %path.display(), error = %err, "backup write failed");
    }
}
