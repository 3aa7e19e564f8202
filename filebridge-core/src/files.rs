//! Small filesystem helpers shared by the watchers, recovery and the dispatcher.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Read a whole file as text. A missing, locked or non-UTF-8 file reads as
/// empty, which every caller treats as "nothing new".
pub fn read_text(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "read failed, treating as empty");
            String::new()
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `content` to `path` through a `.tmp` sibling and a rename, so a
/// reader sees either the old or the new content, never a partial write.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        e
    })
}

/// Delete a file. A file that is already gone counts as deleted.
pub fn remove(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
