//! Owner-only file writes shared by the key files and the record snapshot.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Atomically replace `path` with `data`, readable by the owner only.
///
/// The data goes to a uniquely named `tempfile::NamedTempFile` in the target
/// directory (created exclusively with mode `0o600` on Unix), is synced, and
/// is then persisted over `path`. A failed write leaves `path` untouched.
pub fn write_owner_only(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
