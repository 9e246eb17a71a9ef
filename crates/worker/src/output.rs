// SPDX-License-Identifier: MIT

//! Atomic output writes.

use std::io::Write;
use std::path::Path;

/// Write `bytes` to `path` via a temp file in the same directory plus a
/// rename, so readers never observe a half-written artifact. Parent
/// directories are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path.file_name().map(|f| f.to_string_lossy().to_string()).ok_or_else(
        || std::io::Error::new(std::io::ErrorKind::InvalidInput, "output path has no file name"),
    )?;
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    match std::fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            std::fs::remove_file(&tmp).ok();
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
