//! Session-credential directory lifecycle.
//!
//! The bridge persists its multi-file session credentials under a
//! configured directory. This process only ever creates the directory at
//! startup and wipes its contents on logout — invalidated credentials
//! must not be reused on the next start.

use std::fs;
use std::path::Path;

pub fn ensure_session_dir(path: &str) -> Result<(), String> {
    fs::create_dir_all(path)
        .map_err(|e| format!("Failed to create session directory {}: {}", path, e))
}

/// Remove everything inside the session directory, keeping the directory
/// itself. Returns the number of entries removed.
pub fn clear_session_dir(path: &str) -> Result<usize, String> {
    let dir = Path::new(path);
    if !dir.exists() {
        return Ok(0);
    }

    let entries = fs::read_dir(dir)
        .map_err(|e| format!("Failed to read session directory {}: {}", path, e))?;

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read session entry: {}", e))?;
        let entry_path = entry.path();
        let result = if entry_path.is_dir() {
            fs::remove_dir_all(&entry_path)
        } else {
            fs::remove_file(&entry_path)
        };
        result.map_err(|e| format!("Failed to remove {}: {}", entry_path.display(), e))?;
        removed += 1;
    }

    log::info!("Cleared {} session credential file(s) from {}", removed, path);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_removes_files_keeps_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();

        fs::write(dir.path().join("creds.json"), "{}").unwrap();
        fs::write(dir.path().join("app-state-sync-key-1.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("keys")).unwrap();
        fs::write(dir.path().join("keys").join("session-1.json"), "{}").unwrap();

        assert_eq!(clear_session_dir(&path).unwrap(), 3);
        assert!(dir.path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn clear_missing_directory_is_noop() {
        assert_eq!(clear_session_dir("./does-not-exist-anywhere").unwrap(), 0);
    }

    #[test]
    fn ensure_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let path = nested.to_str().unwrap().to_string();
        ensure_session_dir(&path).unwrap();
        assert!(nested.is_dir());
    }
}
