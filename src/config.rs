//! Environment-driven configuration. All knobs live under `TABULARIUM_*`
//! with defaults matching the reference behavior (one-hour TTLs). The drive
//! bearer token is read from the environment only and never logged.

use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::sources::NameFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Files under a local directory tree (`TABULARIUM_LOCAL_ROOT`).
    Local,
    /// Remote drive API (`TABULARIUM_DRIVE_BASE_URL` + `TABULARIUM_DRIVE_TOKEN`).
    Drive,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub source: SourceKind,
    pub local_root: String,
    pub drive_base_url: String,
    pub drive_token: Option<String>,
    pub filter: NameFilter,
    pub listing_ttl: Duration,
    pub content_ttl: Duration,
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 7878,
            source: SourceKind::Local,
            local_root: "files".to_string(),
            drive_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            drive_token: None,
            // The bundled parser covers csv/parquet; remote spreadsheet
            // deployments set TABULARIUM_FILTER_SUFFIX=.xlsx and bring an
            // xlsx-capable parser
            filter: NameFilter::suffix(".csv"),
            listing_ttl: Duration::from_secs(3600),
            content_ttl: Duration::from_secs(3600),
            session_ttl: Duration::from_secs(3600),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(v) => {
            let secs: u64 = v.parse().with_context(|| format!("{} must be seconds, got '{}'", name, v))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();
        if let Ok(v) = std::env::var("TABULARIUM_HTTP_PORT") {
            cfg.http_port = v.parse().with_context(|| format!("bad TABULARIUM_HTTP_PORT '{}'", v))?;
        }
        if let Ok(v) = std::env::var("TABULARIUM_SOURCE") {
            cfg.source = match v.to_ascii_lowercase().as_str() {
                "local" => SourceKind::Local,
                "drive" => SourceKind::Drive,
                other => bail!("TABULARIUM_SOURCE must be 'local' or 'drive', got '{}'", other),
            };
        }
        if let Ok(v) = std::env::var("TABULARIUM_LOCAL_ROOT") {
            cfg.local_root = v;
        }
        if let Ok(v) = std::env::var("TABULARIUM_DRIVE_BASE_URL") {
            cfg.drive_base_url = v;
        }
        if let Ok(v) = std::env::var("TABULARIUM_DRIVE_TOKEN") {
            if !v.is_empty() {
                cfg.drive_token = Some(v);
            }
        }
        // Glob wins over suffix when both are set
        if let Ok(v) = std::env::var("TABULARIUM_FILTER_GLOB") {
            cfg.filter = NameFilter::glob(&v).with_context(|| format!("bad TABULARIUM_FILTER_GLOB '{}'", v))?;
        } else if let Ok(v) = std::env::var("TABULARIUM_FILTER_SUFFIX") {
            cfg.filter = NameFilter::suffix(v);
        }
        cfg.listing_ttl = env_secs("TABULARIUM_LISTING_TTL_SECS", cfg.listing_ttl)?;
        cfg.content_ttl = env_secs("TABULARIUM_CONTENT_TTL_SECS", cfg.content_ttl)?;
        cfg.session_ttl = env_secs("TABULARIUM_SESSION_TTL_SECS", cfg.session_ttl)?;
        Ok(cfg)
    }
}
