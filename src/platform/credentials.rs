use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};

/// The static API key kept in `credentials.json`.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        let creds: Credentials = serde_json::from_str(&content).map_err(|e| {
            AppError::Credentials(format!("invalid {}: {}", path.display(), e))
        })?;
        if creds.api_key.trim().is_empty() {
            return Err(AppError::Credentials(format!(
                "empty api_key in {}",
                path.display()
            )));
        }
        Ok(creds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"api_key": "moltbook_sk_123", "agent": "x"}"#).unwrap();

        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.api_key, "moltbook_sk_123");
        assert!(!format!("{creds:?}").contains("sk_123"));
    }

    #[test]
    fn missing_file_is_a_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Credentials::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, AppError::Credentials(_)));
    }

    #[test]
    fn missing_key_is_a_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"token": "abc"}"#).unwrap();
        assert!(matches!(
            Credentials::load(&path),
            Err(AppError::Credentials(_))
        ));
    }
}
