//! Named pipe lifecycle. Every fifo this process creates is removed again
//! regardless of which side (database or helper) opened it last, per §4.D
//! and the cleanup ledger contract in §5.

use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::error::Result;

/// Creates a named pipe at `path` with mode `0600`. Returns the path
/// unchanged so callers can chain it directly into a registration with a
/// cleanup ledger.
pub fn create(path: &Path) -> Result<PathBuf> {
    mkfifo(path, Mode::from_bits_truncate(0o600))?;
    Ok(path.to_path_buf())
}

/// Removes a named pipe, ignoring `ENOENT` -- a pipe may already have been
/// unlinked by a concurrent cleanup path (e.g. the orchestrator's abort
/// handler racing a worker's normal completion).
pub fn remove(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_create_and_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpbackup_20260727120000_pipe");

        create(&path).unwrap();
        assert!(path.exists());

        remove(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_pipe");
        remove(&path).unwrap();
        remove(&path).unwrap();
    }
}
