use std::path::{Path, PathBuf};

const BINARY_NAME: &str = if cfg!(windows) { "ollama.exe" } else { "ollama" };

/// Install locations checked before falling back to `PATH`.
pub fn well_known_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if cfg!(target_os = "macos") {
        paths.push(PathBuf::from("/Applications/Ollama.app/Contents/Resources/ollama"));
        paths.push(PathBuf::from("/opt/homebrew/bin/ollama"));
    }
    if cfg!(unix) {
        paths.push(PathBuf::from("/usr/local/bin/ollama"));
        paths.push(PathBuf::from("/usr/bin/ollama"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".local").join("bin").join(BINARY_NAME));
        }
    }
    if cfg!(windows) {
        if let Some(local) = dirs::data_local_dir() {
            paths.push(local.join("Programs").join("Ollama").join(BINARY_NAME));
        }
    }
    paths
}

/// First existing file among `candidates`.
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Resolve the model server binary: explicit override, then well-known
/// install paths, then a `PATH` lookup.
pub fn locate_binary(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "Configured model server binary does not exist");
    }
    first_existing(&well_known_paths()).or_else(|| which::which(BINARY_NAME).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_existing_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("ollama");
        std::fs::write(&real, b"").unwrap();
        let candidates = vec![dir.path().join("missing"), dir.path().to_path_buf(), real.clone()];
        assert_eq!(first_existing(&candidates), Some(real));
    }

    #[test]
    fn override_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("my-ollama");
        std::fs::write(&custom, b"").unwrap();
        assert_eq!(locate_binary(Some(&custom)), Some(custom));
    }

    #[test]
    fn well_known_paths_are_absolute() {
        assert!(well_known_paths().iter().all(|p| p.is_absolute()));
    }
}
