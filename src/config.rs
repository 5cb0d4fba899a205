// Configuration: where the token comes from and how it is stored.
// The token is read once at startup; nothing else is persisted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

const TOKEN_KEY: &str = "token";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "No API token found. Set HTB_TOKEN, pass --token, or run `htb login` to store one in {}.",
        env_file.display()
    )]
    MissingToken { env_file: PathBuf },
    #[error("Failed to read token file {path}: {source}")]
    ReadEnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("Failed to write token file {path}: {source}")]
    WriteEnvFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not determine a configuration directory; pass --env-file explicitly.")]
    NoConfigDir,
    #[error("The API token contains characters that cannot be sent in a header.")]
    MalformedToken,
    #[error("Invalid proxy URL {url}: {source}")]
    Proxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Default location of the dotenv-style token file.
pub fn default_env_file() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("htb-cli").join(".env"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Pick the token: an explicit value wins, otherwise the env file is
/// consulted. The file location is only resolved when it is needed. A
/// missing file is the same as a file without a token.
pub fn resolve_token<F>(explicit: Option<&str>, env_file: F) -> Result<String, ConfigError>
where
    F: FnOnce() -> Result<PathBuf, ConfigError>,
{
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    let env_file = env_file()?;
    read_token(&env_file)?.ok_or(ConfigError::MissingToken { env_file })
}

/// First non-empty `token` entry of a dotenv file, parsed by `dotenvy`
/// (quotes, escapes, `export` and comments included).
fn read_token(env_file: &Path) -> Result<Option<String>, ConfigError> {
    let read_err = |source: dotenvy::Error| ConfigError::ReadEnvFile {
        path: env_file.to_path_buf(),
        source,
    };
    let entries = match dotenvy::from_path_iter(env_file) {
        Ok(entries) => entries,
        Err(err) if err.not_found() => return Ok(None),
        Err(err) => return Err(read_err(err)),
    };
    for entry in entries {
        let (key, value) = entry.map_err(read_err)?;
        let value = value.trim();
        if key == TOKEN_KEY && !value.is_empty() {
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

/// Write `token=<value>` to the env file, creating its directory.
pub fn store_token(env_file: &Path, token: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::WriteEnvFile {
        path: env_file.to_path_buf(),
        source,
    };
    if let Some(parent) = env_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(env_file, format!("{TOKEN_KEY}={}\n", token.trim())).map_err(write_err)
}

/// How long to wait for a freshly spawned release machine to report
/// itself as spawned. Polling is bounded; the last observation is shown
/// whether or not it settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl SettlePolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 10;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy {
            attempts: Self::DEFAULT_ATTEMPTS,
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}
