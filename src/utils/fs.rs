//! Filesystem helpers

use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Write `content` to `path` atomically.
///
/// Parent directories are created. The bytes go to a sibling temp file
/// which is synced and then renamed over the target, so a failed write
/// never leaves a truncated artifact behind.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let write_result = (|| {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()
    })();

    if let Err(e) = write_result.and_then(|_| std::fs::rename(&tmp_path, path)) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    debug!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_parent_directories() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("src/generated/registry.rs");

        atomic_write(&path, b"pub const X: u8 = 1;\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "pub const X: u8 = 1;\n");
    }

    #[test]
    fn test_replaces_existing_file_and_leaves_no_temp() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("registry.json");
        std::fs::write(&path, "old").unwrap();

        atomic_write(&path, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_rename_keeps_previous_artifact() {
        let temp = tempfile::TempDir::new().unwrap();
        // target is a non-empty directory, so rename must fail
        let path = temp.path().join("registry.rs");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(atomic_write(&path, b"content").is_err());
        assert!(path.join("occupied").is_dir());
    }
}
