use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub blob_dir: PathBuf,
    pub blob_secret: String,
    pub public_url: String,
    pub playback_ttl: Duration,
    pub call_timeout: Duration,
    /// `(handle, password)` pairs created as moderators at startup.
    pub moderators: Vec<(String, String)>,
    /// Zero disables the orphan sweep.
    pub sweep_interval: Duration,
    pub sweep_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process env.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("MURMUR_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MURMUR_JWT_SECRET is unset or still a placeholder");
        }

        let port = var("MURMUR_PORT").unwrap_or_else(|| "3000".into());
        let port: u16 = port
            .parse()
            .with_context(|| format!("MURMUR_PORT is not a port number: {}", port))?;

        let moderators = match var("MURMUR_MODERATORS") {
            Some(raw) => parse_moderators(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            host: var("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()).into(),
            blob_secret: var("MURMUR_BLOB_SECRET").unwrap_or_else(|| jwt_secret.clone()),
            jwt_secret,
            blob_dir: var("MURMUR_BLOB_DIR").unwrap_or_else(|| "./blobs".into()).into(),
            public_url: var("MURMUR_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{}", port)),
            playback_ttl: secs(&var, "MURMUR_PLAYBACK_TTL_SECS", 3600)?,
            call_timeout: secs(&var, "MURMUR_CALL_TIMEOUT_SECS", 10)?,
            moderators,
            sweep_interval: secs(&var, "MURMUR_SWEEP_INTERVAL_SECS", 3600)?,
            sweep_grace: secs(&var, "MURMUR_SWEEP_GRACE_SECS", 600)?,
        })
    }
}

fn secs(var: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> Result<Duration> {
    let Some(raw) = var(name) else {
        return Ok(Duration::from_secs(default));
    };
    let value: u64 = raw
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got {}", name, raw))?;
    Ok(Duration::from_secs(value))
}

/// Parse `handle:password[,handle:password...]`.
fn parse_moderators(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (handle, password) = entry
                .split_once(':')
                .with_context(|| format!("MURMUR_MODERATORS entry '{}' is not handle:password", entry))?;
            if handle.is_empty() || password.is_empty() {
                bail!("MURMUR_MODERATORS entry '{}' has an empty handle or password", entry);
            }
            Ok((handle.to_string(), password.to_string()))
        })
        .collect()
}
