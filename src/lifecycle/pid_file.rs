use std::io;
use std::path::Path;

use super::LifecycleError;

/// Read the recorded PID. A missing file means no server is managed.
pub fn read_pid(path: &Path) -> Result<Option<u32>, LifecycleError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match raw.trim().parse::<u32>() {
        Ok(pid) if pid > 0 => Ok(Some(pid)),
        _ => Err(LifecycleError::InvalidPidFile(raw.trim().chars().take(32).collect())),
    }
}

/// Record `pid` as plain decimal text, creating the parent directory.
pub fn write_pid(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{pid}\n"))
}

/// Delete the PID file. Already gone is fine.
pub fn remove_pid(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
