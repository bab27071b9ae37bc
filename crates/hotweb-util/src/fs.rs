use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TEMP: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` through a sibling temp file and a rename.
///
/// Missing parent directories are created first. Readers see either the old
/// contents or the new contents, never a partial write, even with several
/// threads writing the same path.
///
/// # Errors
/// Returns an error if the directories cannot be created or the write or rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let temp = parent.join(temp_name(path));
    let result = write_synced(&temp, bytes).and_then(|()| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn temp_name(path: &Path) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    format!(
        ".{name}.{}-{}.tmp",
        std::process::id(),
        NEXT_TEMP.fetch_add(1, Ordering::Relaxed)
    )
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.js");

        atomic_write(&path, b"export const a = 1;").unwrap();
        atomic_write(&path, b"export const a = 2;").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "export const a = 2;");
    }

    #[test]
    fn test_atomic_write_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lib").join("nested").join("page.js");

        atomic_write(&path, b"export const a = 1;").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "export const a = 1;");
    }

    #[test]
    fn test_concurrent_writers_leave_one_file() {
        let dir = Arc::new(tempdir().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dir = Arc::clone(&dir);
                std::thread::spawn(move || {
                    let body = format!("writer {i}");
                    atomic_write(&dir.path().join("out.js"), body.as_bytes()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = fs::read_to_string(dir.path().join("out.js")).unwrap();
        assert!(contents.starts_with("writer "));
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.js")]);
    }
}
