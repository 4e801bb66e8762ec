//! Millisecond timestamps for file modification times and wall-clock time.
//!
//! Every timestamp that crosses the shared store is an integer count of
//! milliseconds since the Unix epoch, so records compare with plain `<=`.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch for a `SystemTime`.
///
/// Times before the epoch collapse to 0.
pub fn system_time_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> u64 {
    system_time_ms(SystemTime::now())
}

/// Get the modification time of a file in milliseconds
///
/// Returns `None` if the file doesn't exist or mtime cannot be read
pub fn mtime_ms(path: &Path) -> Option<u64> {
    path.metadata()
        .and_then(|m| m.modified())
        .ok()
        .map(system_time_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_system_time_ms() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(system_time_ms(t), 1_700_000_000_123);
        assert_eq!(system_time_ms(UNIX_EPOCH), 0);
    }

    #[test]
    fn test_mtime_ms_reads_set_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.ts");
        fs::write(&path, "1").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_millis(5_000))
            .unwrap();

        assert_eq!(mtime_ms(&path), Some(5_000));
    }

    #[test]
    fn test_mtime_ms_missing_file() {
        assert_eq!(mtime_ms(Path::new("/nonexistent/file.ts")), None);
    }
}
