use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

const PRODUCTION_DATA_DIR: &str = "/tmp/kisan-data";
const LOCAL_DATA_DIR: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub profile_backend: ProfileBackend,
    pub database_url: Option<String>,
    pub upload_max_bytes: usize,
    pub upload_base_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let profile_backend = match try_load::<String>("PROFILE_STORE", "postgres")?
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => ProfileBackend::Postgres,
            "memory" => ProfileBackend::Memory,
            other => return Err(anyhow!("Invalid PROFILE_STORE value: {other}")),
        };

        let database_url = match profile_backend {
            ProfileBackend::Postgres => Some(read_secret("DATABASE_URL")?),
            ProfileBackend::Memory => None,
        };

        Ok(Self {
            bind_addr: try_load("BIND_ADDR", "0.0.0.0")?,
            port: try_load("PORT", "5000")?,
            data_dir: data_dir(),
            profile_backend,
            database_url,
            upload_max_bytes: try_load("UPLOAD_MAX_BYTES", "5242880")?,
            upload_base_url: try_load("UPLOAD_BASE_URL", "https://storage.kisan.local/uploads")?,
        })
    }

    /// Local configuration rooted at `data_dir`, with the in-memory profile store.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            data_dir: data_dir.into(),
            profile_backend: ProfileBackend::Memory,
            database_url: None,
            upload_max_bytes: 5 * 1024 * 1024,
            upload_base_url: "https://storage.kisan.local/uploads".to_string(),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
}

fn data_dir() -> PathBuf {
    if let Some(dir) = var("DATA_DIR") {
        return PathBuf::from(dir);
    }

    let production = var("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));
    let dir = if production {
        PRODUCTION_DATA_DIR
    } else {
        LOCAL_DATA_DIR
    };
    info!("DATA_DIR not set, using {dir}");

    PathBuf::from(dir)
}

/// Reads `secret_name` from the environment, then from `/run/secrets`.
fn read_secret(secret_name: &str) -> Result<String> {
    if let Some(value) = var(secret_name) {
        return Ok(value);
    }

    let path = format!("/run/secrets/{secret_name}");
    warn!("{secret_name} not in environment, reading {path}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .with_context(|| format!("Failed to read {secret_name} from {path}"))
}
