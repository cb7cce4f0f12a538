//! Durable file replacement and appends shared by the credential store,
//! the resume ledger and sidecar descriptors.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Sibling path used while a replacement is being written.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `contents` so that readers only ever observe the old
/// or the new file, never a prefix of it.
///
/// The data is flushed to stable storage before the rename. With
/// `owner_only`, the temp file is created with mode 0600 on Unix so secrets
/// are never readable by other users, not even briefly.
pub fn write_atomic(path: &Path, contents: &[u8], owner_only: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path_for(path);
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if owner_only {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = owner_only;

    let mut file = options.open(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    #[cfg(unix)]
    if owner_only {
        // mode() only applies on creation; a stale temp file keeps its old bits
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    sync_parent_dir(path)
}

/// Append `line` plus a newline to `path` and flush it to stable storage.
///
/// On failure the file is cut back to its previous length so a torn line
/// never sits in front of the next append.
pub fn append_durable(path: &Path, line: &[u8]) -> std::io::Result<()> {
    let created = !path.exists();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let before = file.metadata()?.len();

    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line);
    buf.push(b'\n');
    let written = file.write_all(&buf).and_then(|()| file.sync_data());
    if let Err(e) = written {
        let _ = file.set_len(before);
        return Err(e);
    }
    if created {
        sync_parent_dir(path)?;
    }
    Ok(())
}

/// Flush the directory entry for `path`, so a rename or creation survives a
/// crash. A no-op where directories cannot be opened.
pub fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        std::fs::File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
