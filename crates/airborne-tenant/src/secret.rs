use std::path::{Path, PathBuf};

use thiserror::Error;

/// Directories a `FILE=` secret may live under. Anything outside these, or
/// any path containing a `..` component after normalization, is rejected —
/// tenant config is operator-controlled but still treated as untrusted input
/// for path traversal purposes.
const ALLOWED_SECRET_DIRS: &[&str] = &["/etc/aibox/secrets", "/run/secrets", "/var/run/secrets"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret path is outside the allowlisted directories: {0}")]
    PathNotAllowed(String),
    #[error("secret path contains a parent-directory component: {0}")]
    PathTraversal(String),
    #[error("failed to read secret file {0}: {1}")]
    ReadFailed(String, String),
}

/// Resolves a single config value:
/// - `ENV=NAME` → the named environment variable (empty string if unset).
/// - `FILE=/path` → the file contents, minus exactly one trailing newline.
/// - anything else → returned unchanged.
pub fn resolve_secret(value: &str) -> Result<String, SecretError> {
    if let Some(name) = value.strip_prefix("ENV=") {
        return Ok(std::env::var(name).unwrap_or_default());
    }
    if let Some(path) = value.strip_prefix("FILE=") {
        let resolved = validate_secret_path(path)?;
        let contents = std::fs::read_to_string(&resolved)
            .map_err(|e| SecretError::ReadFailed(path.to_string(), e.to_string()))?;
        return Ok(trim_one_trailing_newline(&contents));
    }
    Ok(value.to_string())
}

fn validate_secret_path(path: &str) -> Result<PathBuf, SecretError> {
    if path.split('/').any(|segment| segment == "..") {
        return Err(SecretError::PathTraversal(path.to_string()));
    }
    let candidate = Path::new(path);
    let allowed = ALLOWED_SECRET_DIRS
        .iter()
        .any(|dir| candidate.starts_with(dir));
    if !allowed {
        return Err(SecretError::PathNotAllowed(path.to_string()));
    }
    Ok(candidate.to_path_buf())
}

fn trim_one_trailing_newline(s: &str) -> String {
    if let Some(stripped) = s.strip_suffix('\n') {
        stripped.to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_value_passes_through() {
        assert_eq!(resolve_secret("sk-plain").unwrap(), "sk-plain");
    }

    #[test]
    fn env_prefix_resolves_from_environment() {
        std::env::set_var("AIRBORNE_TEST_SECRET", "sk-env-value");
        assert_eq!(
            resolve_secret("ENV=AIRBORNE_TEST_SECRET").unwrap(),
            "sk-env-value"
        );
        std::env::remove_var("AIRBORNE_TEST_SECRET");
    }

    #[test]
    fn env_prefix_with_missing_var_resolves_empty() {
        std::env::remove_var("AIRBORNE_TEST_SECRET_MISSING");
        assert_eq!(
            resolve_secret("ENV=AIRBORNE_TEST_SECRET_MISSING").unwrap(),
            ""
        );
    }

    #[test]
    fn file_path_traversal_is_rejected() {
        let err = resolve_secret("FILE=/etc/aibox/secrets/../../etc/passwd").unwrap_err();
        assert_eq!(
            err,
            SecretError::PathTraversal("/etc/aibox/secrets/../../etc/passwd".to_string())
        );
    }

    #[test]
    fn file_path_outside_allowlist_is_rejected() {
        let err = resolve_secret("FILE=/tmp/whatever.key").unwrap_err();
        assert_eq!(
            err,
            SecretError::PathNotAllowed("/tmp/whatever.key".to_string())
        );
    }

    #[test]
    fn file_path_within_allowlist_is_read_and_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        // Exercise the trimming/reading logic directly against a path rooted
        // outside the allowlist by calling the trim helper and read path
        // separately, since the allowlist itself is a fixed set of system
        // directories not writable in a test sandbox.
        let path = dir.path().join("key.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "sk-from-file").unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(trim_one_trailing_newline(&raw), "sk-from-file");
    }
}
