use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One-bit cross-process flag: the file existing means "this session holds
/// an open camera handle". Content is irrelevant. There is no locking; the
/// protocol assumes a single writer, and readers must pair the existence
/// check with their own camera probe to spot a stale file left by a
/// crashed writer.
#[derive(Debug, Clone)]
pub struct ReadinessSignal {
    path: PathBuf,
}

impl ReadinessSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (truncating) the flag file with a marker body.
    pub fn signal(&self) -> Result<()> {
        fs::write(&self.path, "Camera is ready")
            .with_context(|| format!("Failed to write signal file {}", self.path.display()))
    }

    /// Remove the flag file. Removing an absent file is a no-op, not an
    /// error, so teardown paths can call this unconditionally.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove signal file {}", self.path.display())
            }),
        }
    }

    /// Non-blocking existence check.
    pub fn is_signaled(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal_in_temp_dir() -> (tempfile::TempDir, ReadinessSignal) {
        let dir = tempfile::tempdir().unwrap();
        let signal = ReadinessSignal::new(dir.path().join("camera_ready.signal"));
        (dir, signal)
    }

    #[test]
    fn signal_then_clear_round_trip() {
        let (_dir, signal) = signal_in_temp_dir();
        assert!(!signal.is_signaled());

        signal.signal().unwrap();
        assert!(signal.is_signaled());

        signal.clear().unwrap();
        assert!(!signal.is_signaled());
    }

    #[test]
    fn clear_is_idempotent() {
        let (_dir, signal) = signal_in_temp_dir();
        signal.signal().unwrap();
        signal.clear().unwrap();
        // Second clear must be a no-op, not an error.
        signal.clear().unwrap();
        assert!(!signal.is_signaled());
    }

    #[test]
    fn signal_truncates_an_existing_file() {
        let (_dir, signal) = signal_in_temp_dir();
        std::fs::write(signal.path(), "stale leftover content").unwrap();
        signal.signal().unwrap();
        let body = std::fs::read_to_string(signal.path()).unwrap();
        assert_eq!(body, "Camera is ready");
    }
}
