//! Placement of the OAuth client file the worker authenticates with.
//!
//! The worker looks for `credentials.json` in its data directory. Users
//! download that file from the Google Cloud console; this module validates
//! it and copies it into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// File name the worker expects inside its data directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("Credentials file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{} is not an OAuth client file: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("Failed to install credentials: {0}")]
    Io(#[from] io::Error),
}

/// Path of the credentials file inside `data_dir`.
pub fn credentials_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CREDENTIALS_FILE)
}

/// Check that `source` looks like an OAuth client secret file.
///
/// Desktop clients keep their keys under `installed`, web clients under
/// `web`; either must carry a `client_id`.
pub fn validate(source: &Path) -> Result<(), CredentialsError> {
    if !source.is_file() {
        return Err(CredentialsError::NotFound(source.to_path_buf()));
    }

    let invalid = |reason: String| CredentialsError::Invalid {
        path: source.to_path_buf(),
        reason,
    };

    let text = fs::read_to_string(source)?;
    let json: Value = serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;

    let client = json
        .get("installed")
        .or_else(|| json.get("web"))
        .ok_or_else(|| invalid("missing `installed` or `web` section".to_string()))?;

    if client.get("client_id").and_then(Value::as_str).is_none() {
        return Err(invalid("missing `client_id`".to_string()));
    }
    Ok(())
}

/// Validate `source` and copy it to `<data_dir>/credentials.json`,
/// creating the directory if needed. Returns the installed path.
pub fn install_credentials(source: &Path, data_dir: &Path) -> Result<PathBuf, CredentialsError> {
    validate(source)?;

    fs::create_dir_all(data_dir)?;
    let target = credentials_path(data_dir);
    fs::copy(source, &target)?;

    info!("Installed credentials to {}", target.display());
    Ok(target)
}
