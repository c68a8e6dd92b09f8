//! Bearer token lookup for the remote directory.
//!
//! `ROSTER_ACCESS_TOKEN` wins; otherwise `access_token` is read from
//! `.credentials.json` in the working directory. There is no interactive
//! OAuth flow: an expired stored token is an error that names the file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const TOKEN_ENV: &str = "ROSTER_ACCESS_TOKEN";
pub const CREDENTIALS_FILE: &str = ".credentials.json";

#[derive(Debug, Deserialize)]
struct StoredCredentials {
    access_token: Option<String>,
    /// Milliseconds since the Unix epoch.
    expiry_date: Option<i64>,
}

/// Token from the environment, else from `<dir>/.credentials.json`.
pub fn load_token(dir: &Path) -> Result<String> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            tracing::debug!("using access token from {TOKEN_ENV}");
            return Ok(token.trim().to_string());
        }
    }
    token_from_file(&dir.join(CREDENTIALS_FILE), Utc::now())
}

fn token_from_file(path: &Path, now: DateTime<Utc>) -> Result<String> {
    let contents = std::fs::read_to_string(path).with_context(|| {
        format!(
            "no credentials: set {TOKEN_ENV} or provide '{}'",
            path.display()
        )
    })?;
    let stored: StoredCredentials = serde_json::from_str(&contents)
        .with_context(|| format!("malformed credentials file '{}'", path.display()))?;

    let Some(token) = stored.access_token.filter(|t| !t.trim().is_empty()) else {
        bail!("'{}' has no access_token", path.display());
    };
    let expiry = stored
        .expiry_date
        .and_then(DateTime::<Utc>::from_timestamp_millis);
    if let Some(expires_at) = expiry {
        if expires_at <= now {
            bail!(
                "access token in '{}' expired at {}; refresh it and retry",
                path.display(),
                expires_at.to_rfc3339()
            );
        }
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_credentials(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(CREDENTIALS_FILE);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reads_unexpired_token() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let expiry = (now + chrono::Duration::hours(1)).timestamp_millis();
        let path = write_credentials(
            &dir,
            &format!(r#"{{"access_token": "ya29.token", "expiry_date": {expiry}}}"#),
        );
        assert_eq!(token_from_file(&path, now).unwrap(), "ya29.token");
    }

    #[test]
    fn token_without_expiry_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = write_credentials(&dir, r#"{"access_token": "ya29.token"}"#);
        assert_eq!(token_from_file(&path, Utc::now()).unwrap(), "ya29.token");
    }

    #[test]
    fn expired_token_names_the_file() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let expiry = (now - chrono::Duration::minutes(5)).timestamp_millis();
        let path = write_credentials(
            &dir,
            &format!(r#"{{"access_token": "ya29.old", "expiry_date": {expiry}}}"#),
        );
        let err = token_from_file(&path, now).unwrap_err().to_string();
        assert!(err.contains("expired"));
        assert!(err.contains(CREDENTIALS_FILE));
    }

    #[test]
    fn missing_file_mentions_env_var() {
        let dir = TempDir::new().unwrap();
        let err = token_from_file(&dir.path().join(CREDENTIALS_FILE), Utc::now())
            .unwrap_err()
            .to_string();
        assert!(err.contains(TOKEN_ENV));
    }

    #[test]
    fn empty_token_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_credentials(&dir, r#"{"access_token": ""}"#);
        assert!(token_from_file(&path, Utc::now()).is_err());
    }
}
