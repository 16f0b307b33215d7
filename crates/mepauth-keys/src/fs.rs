//! Owner-only key-material files.

use std::fs;
use std::path::Path;

use zeroize::Zeroizing;

use crate::error::KeyError;

/// Read a key-material file into a wiping buffer.
pub(crate) fn read_file(path: &Path) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    fs::read(path).map(Zeroizing::new).map_err(|source| KeyError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Atomically replace `path` with `data`, readable by the owner only.
pub(crate) fn write_owner_only(path: &Path, data: &[u8]) -> Result<(), KeyError> {
    mepauth_core::write_owner_only(path, data).map_err(|source| KeyError::Io {
        path: path.to_owned(),
        source,
    })
}
