use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::service::{DEFAULT_SWEEP_INTERVAL, InviteSettings};

/// One year.
const MAX_INVITE_TTL_HOURS: i64 = 24 * 365;
/// One day.
const MAX_RATE_LIMIT_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Seconds between invite expiry sweeps.
    pub sweep_interval_secs: u64,
    pub invite_ttl_hours: i64,
    pub invite_rate_limit_max: i64,
    pub invite_rate_limit_window_secs: i64,
    /// Scheme of the app deep link, e.g. `swatchbook://invite/<token>`.
    pub deep_link_scheme: String,
    /// Where invitees without the app are sent.
    pub app_fallback_url: String,
}

impl ServerConfig {
    /// Reads a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be positive".to_string()));
        }
        if !(1..=MAX_INVITE_TTL_HOURS).contains(&self.invite_ttl_hours) {
            return Err(Error::Config(format!(
                "invite_ttl_hours must be between 1 and {MAX_INVITE_TTL_HOURS}"
            )));
        }
        if self.invite_rate_limit_max <= 0 {
            return Err(Error::Config("invite_rate_limit_max must be positive".to_string()));
        }
        if !(1..=MAX_RATE_LIMIT_WINDOW_SECS).contains(&self.invite_rate_limit_window_secs) {
            return Err(Error::Config(format!(
                "invite_rate_limit_window_secs must be between 1 and {MAX_RATE_LIMIT_WINDOW_SECS}"
            )));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("swatchbook.db")
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    #[must_use]
    pub fn invite_settings(&self) -> InviteSettings {
        InviteSettings {
            ttl: chrono::Duration::hours(self.invite_ttl_hours),
            rate_limit_max: self.invite_rate_limit_max,
            rate_limit_window: chrono::Duration::seconds(self.invite_rate_limit_window_secs),
            deep_link_scheme: self.deep_link_scheme.clone(),
            fallback_url: self.app_fallback_url.clone(),
            ..InviteSettings::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let invites = InviteSettings::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            invite_ttl_hours: invites.ttl.num_hours(),
            invite_rate_limit_max: invites.rate_limit_max,
            invite_rate_limit_window_secs: invites.rate_limit_window.num_seconds(),
            deep_link_scheme: invites.deep_link_scheme,
            app_fallback_url: invites.fallback_url,
        }
    }
}
