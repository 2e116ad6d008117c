//! Configuration module
//!
//! Environment-driven configuration for the attachment engine and its HTTP
//! surface: database, storage root, display aliases, token lifetimes and the
//! capability allow lists.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_FILE_SIZE_MB: u64 = 100;
const TOKEN_TTL_SECS: u64 = 3600;
const TOKEN_SWEEP_INTERVAL_SECS: u64 = 300;

/// A network-root prefix and the short alias shown to humans in its place.
///
/// Example: `\\fileserver\rma` displayed as `R:`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayAlias {
    pub prefix: String,
    pub alias: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub server_port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Root of the attachment directory tree (`root/RECORD_{id}/...`).
    pub storage_root: PathBuf,
    /// Where generated artifacts such as archives are written.
    pub temp_dir: PathBuf,
    pub display_aliases: Vec<DisplayAlias>,
    pub max_file_size_bytes: u64,
    pub token_ttl_secs: u64,
    /// Interval between temp-token sweeps. 0 = disabled.
    pub token_sweep_interval_secs: u64,
    /// Identities allowed to upload and delete. `*` allows everyone.
    pub uploaders: Vec<String>,
    /// Identities allowed to relocate metadata. `*` allows everyone.
    pub editors: Vec<String>,
    /// `json` or `pretty`
    pub log_format: String,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let storage_root = env::var("ATTACH_STORAGE_ROOT")
            .map(PathBuf::from)
            .map_err(|_| anyhow::anyhow!("ATTACH_STORAGE_ROOT must be set"))?;

        let temp_dir = env::var("ATTACH_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("rma-attach"));

        let display_aliases = env::var("ATTACH_DISPLAY_ALIASES")
            .map(|raw| parse_display_aliases(&raw))
            .unwrap_or_else(|_| Ok(Vec::new()))?;

        let config = Config {
            environment,
            server_port: env::var("SERVER_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a valid number"))?,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            storage_root,
            temp_dir,
            display_aliases,
            max_file_size_bytes: env::var("ATTACH_MAX_FILE_SIZE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_FILE_SIZE_MB * 1024 * 1024),
            token_ttl_secs: env::var("ATTACH_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| TOKEN_TTL_SECS.to_string())
                .parse()
                .unwrap_or(TOKEN_TTL_SECS),
            token_sweep_interval_secs: env::var("ATTACH_TOKEN_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| TOKEN_SWEEP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(TOKEN_SWEEP_INTERVAL_SECS),
            uploaders: parse_list(&env::var("ATTACH_UPLOADERS").unwrap_or_default()),
            editors: parse_list(&env::var("ATTACH_EDITORS").unwrap_or_default()),
            log_format: env::var("ATTACH_LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgresql://")
            || self.database_url.starts_with("postgres://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.storage_root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("ATTACH_STORAGE_ROOT must not be empty"));
        }

        if self.token_ttl_secs == 0 {
            return Err(anyhow::anyhow!("ATTACH_TOKEN_TTL_SECS must be greater than 0"));
        }

        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!(
                "ATTACH_MAX_FILE_SIZE_BYTES must be greater than 0"
            ));
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(anyhow::anyhow!(
                "ATTACH_LOG_FORMAT must be either 'json' or 'pretty'"
            ));
        }

        if self.is_production() && self.uploaders.iter().any(|u| u == "*") {
            tracing::warn!("ATTACH_UPLOADERS allows every identity in production");
        }

        Ok(())
    }
}

/// Parse `prefix=alias;prefix=alias` into display aliases.
pub fn parse_display_aliases(raw: &str) -> Result<Vec<DisplayAlias>, anyhow::Error> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (prefix, alias) = pair
                .rsplit_once('=')
                .ok_or_else(|| anyhow::anyhow!("Invalid display alias (expected prefix=alias): {}", pair))?;
            let prefix = prefix.trim();
            let alias = alias.trim();
            if prefix.is_empty() || alias.is_empty() {
                return Err(anyhow::anyhow!("Invalid display alias: {}", pair));
            }
            Ok(DisplayAlias {
                prefix: prefix.to_string(),
                alias: alias.to_string(),
            })
        })
        .collect()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
