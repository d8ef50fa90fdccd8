//! Connection profile for the odx toolkit.
//!
//! The original maintenance scripts carried their connection settings as
//! constants at the top of each file. Here they live in one JSON profile,
//! looked up as `--config PATH`, then `$ODX_CONFIG`, then
//! `<user config dir>/odx/config.json`. Credentials can be overridden with
//! `ODOO_PASSWORD` / `PGPASSWORD` so the profile can be committed without
//! secrets.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Wire protocol used to reach the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// `/xmlrpc/2/common` and `/xmlrpc/2/object`
    #[default]
    XmlRpc,
    /// Single `/jsonrpc` endpoint
    JsonRpc,
}

/// Direct-database access settings (used by the SQL purge and image export).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgConfig {
    #[serde(default = "default_pg_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default = "default_pg_user")]
    pub user: String,
    pub dbname: String,
    /// Omitted means trust/peer auth, like running psql as the odoo user.
    #[serde(default)]
    pub password: Option<String>,
    /// When set, psql runs inside this docker container via `docker exec`.
    #[serde(default)]
    pub container: Option<String>,
}

fn default_pg_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_user() -> String {
    "odoo".to_string()
}

/// Connection profile for one Odoo instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdxConfig {
    /// Base URL, e.g. `http://localhost:8069`
    pub url: String,
    /// Database name
    pub db: String,
    /// Login (email or username)
    pub username: String,
    /// Password or API key
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional direct-database settings
    #[serde(default)]
    pub pg: Option<PgConfig>,
}

fn default_timeout_secs() -> u64 {
    120
}

impl OdxConfig {
    /// Load the profile, applying the lookup order and env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit)?;
        debug!(path = %path.display(), "Loading config profile");
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config profile {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config profile {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Ok(path) = std::env::var("ODX_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let base = BaseDirs::new().context("Cannot determine user config directory")?;
        Ok(base.config_dir().join("odx").join("config.json"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("ODOO_PASSWORD") {
            self.password = password;
        }
        if let Some(pg) = self.pg.as_mut() {
            if let Ok(password) = std::env::var("PGPASSWORD") {
                pg.password = Some(password);
            }
        }
    }

    /// Direct-database settings, or an error telling the operator what to add.
    pub fn pg(&self) -> Result<&PgConfig> {
        self.pg
            .as_ref()
            .context("This command needs a \"pg\" section in the config profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_profile(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_profile_with_defaults() {
        let file = write_profile(
            r#"{"url": "http://localhost:8069", "db": "test", "username": "admin", "password": "admin"}"#,
        );
        let config = OdxConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.url, "http://localhost:8069");
        assert_eq!(config.transport, Transport::XmlRpc);
        assert_eq!(config.timeout_secs, 120);
        assert!(config.pg.is_none());
    }

    #[test]
    fn parses_pg_section_and_transport() {
        let file = write_profile(
            r#"{
                "url": "http://localhost:8073",
                "db": "full24",
                "username": "admin",
                "password": "admin",
                "transport": "jsonrpc",
                "pg": {"dbname": "full24", "container": "postgre12_cont"}
            }"#,
        );
        let config = OdxConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.transport, Transport::JsonRpc);
        let pg = config.pg().unwrap();
        assert_eq!(pg.host, "localhost");
        assert_eq!(pg.port, 5432);
        assert_eq!(pg.user, "odoo");
        assert_eq!(pg.container.as_deref(), Some("postgre12_cont"));
        assert!(pg.password.is_none());
    }

    #[test]
    fn rejects_malformed_profile() {
        let file = write_profile("{not json");
        assert!(OdxConfig::load(Some(file.path())).is_err());
    }
}
