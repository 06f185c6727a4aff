//! Atomic file writes with automatic parent creation.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

/// Write to a temp file beside `dest`, then rename over it.
pub fn atomic_write(dest: impl AsRef<Path>, bytes: impl AsRef<[u8]>) -> io::Result<()> {
    let dest = dest.as_ref();
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes.as_ref())?;
    tmp.flush()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Pretty JSON, newline-terminated.
pub fn write_json<T: Serialize>(dest: impl AsRef<Path>, value: &T) -> io::Result<()> {
    let mut txt = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    txt.push('\n');
    atomic_write(dest, txt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("out.json");
        atomic_write(&dest, b"first").unwrap();
        write_json(&dest, &vec![1, 2]).unwrap();
        let txt = fs::read_to_string(&dest).unwrap();
        assert!(txt.starts_with('['));
        assert!(txt.ends_with("]\n"));
    }
}
