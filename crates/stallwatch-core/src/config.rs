use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::queue_owner::OwnerKind;

/// Monitor tuning: cycle timing, slow-speed heuristics, and protection windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds to idle between monitor cycles.
    pub check_interval_secs: u64,
    /// Seconds a transfer must stay below the threshold before it is retried.
    pub retry_delay_secs: u64,
    /// Completion fraction (0..=1) at which a transfer is left alone.
    pub safe_progress: f64,
    /// Seconds after a transfer is first mapped before it may be retried.
    pub grace_period_secs: u64,
    /// Minimum seconds between two retries of the same transfer.
    pub retry_cooldown_secs: u64,
    /// Absolute floor for the threshold when the link is saturated, in KiB/s.
    pub min_speed_kib: f64,
    /// Total download bandwidth budget in KiB/s.
    pub bandwidth_kib: f64,
    /// Seconds monitoring stays suspended once safe progress is reached.
    pub safe_hold_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            retry_delay_secs: 30,
            safe_progress: 0.90,
            grace_period_secs: 30,
            retry_cooldown_secs: 30,
            min_speed_kib: 1000.0,
            bandwidth_kib: 19000.0,
            safe_hold_secs: 240,
        }
    }
}

/// Upper bound for every duration setting. Keeps `Instant` arithmetic in range.
pub const MAX_DURATION_SECS: u64 = 86_400;

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Login retry for the download client (it may still be starting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRetryConfig {
    /// Login attempts before giving up (including the first).
    pub max_attempts: u32,
    /// Fixed delay in seconds between attempts.
    pub delay_secs: u64,
}

impl Default for AuthRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            delay_secs: 5,
        }
    }
}

/// Connection settings for the qBittorrent-compatible download client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the Web API, e.g. `http://gluetun:8080`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Referer header sent on login (qBittorrent CSRF check).
    pub referer: String,
    /// Optional login retry policy; if missing, built-in defaults are used.
    pub auth_retry: Option<AuthRetryConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://gluetun:8080".to_string(),
            username: String::new(),
            password: String::new(),
            referer: "http://rdtclient/".to_string(),
            auth_retry: None,
        }
    }
}

/// One Radarr or Sonarr server whose queue may own transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerConfig {
    pub kind: OwnerKind,
    /// Display name, e.g. `1080p-en`.
    pub name: String,
    pub url: String,
    pub api_key: String,
}

/// Global configuration loaded from `~/.config/stallwatch/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StallwatchConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default, rename = "owner", skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<OwnerConfig>,
}

impl StallwatchConfig {
    /// Apply environment overrides (`CHECK_INTERVAL`, `RDTCLIENT_HOST`, ...).
    /// `lookup` is `std::env::var(..).ok()` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let m = &mut self.monitor;
        override_num(&lookup, "CHECK_INTERVAL", &mut m.check_interval_secs);
        override_num(&lookup, "RETRY_DELAY", &mut m.retry_delay_secs);
        override_num(&lookup, "SAFE_PROGRESS", &mut m.safe_progress);
        override_num(&lookup, "GRACE_PERIOD", &mut m.grace_period_secs);
        override_num(&lookup, "RETRY_COOLDOWN", &mut m.retry_cooldown_secs);
        override_num(&lookup, "MIN_SPEED_THRESHOLD", &mut m.min_speed_kib);
        override_num(&lookup, "DOWNLOAD_BANDWIDTH_KB", &mut m.bandwidth_kib);

        if let Some(host) = lookup("RDTCLIENT_HOST") {
            self.client.url = if host.contains("://") {
                host
            } else {
                format!("http://{}", host)
            };
        }
        if let Some(user) = lookup("RDTCLIENT_USERNAME") {
            self.client.username = user;
        }
        if let Some(pass) = lookup("RDTCLIENT_PASSWORD") {
            self.client.password = pass;
        }
    }

    /// Add or update owners from `RADARR_<NAME>_URL` / `RADARR_<NAME>_KEY`
    /// (and the `SONARR_` equivalents). `<NAME>` becomes the owner name,
    /// lowercased with `_` turned into `-`, so `RADARR_1080P_EN_URL` names
    /// the `1080p-en` instance. Owners already in the file are matched by
    /// kind and name and get their url and key replaced.
    pub fn apply_owner_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let mut found = BTreeMap::new();
        for (key, url) in &vars {
            let Some(stem) = key.strip_suffix("_URL") else {
                continue;
            };
            let (kind, raw_name) = if let Some(rest) = stem.strip_prefix("RADARR_") {
                (OwnerKind::Radarr, rest)
            } else if let Some(rest) = stem.strip_prefix("SONARR_") {
                (OwnerKind::Sonarr, rest)
            } else {
                continue;
            };
            if raw_name.is_empty() {
                continue;
            }
            let Some(api_key) = vars.get(&format!("{}_KEY", stem)) else {
                tracing::warn!("ignoring {}: no {}_KEY set", key, stem);
                continue;
            };
            let name = raw_name.to_ascii_lowercase().replace('_', "-");
            found.insert((kind.to_string(), name), (kind, url.clone(), api_key.clone()));
        }

        for ((_, name), (kind, url, api_key)) in found {
            match self
                .owners
                .iter_mut()
                .find(|o| o.kind == kind && o.name == name)
            {
                Some(existing) => {
                    existing.url = url;
                    existing.api_key = api_key;
                }
                None => self.owners.push(OwnerConfig {
                    kind,
                    name,
                    url,
                    api_key,
                }),
            }
        }
    }

    /// Reject settings the monitor cannot work with.
    pub fn validate(&self) -> Result<()> {
        let m = &self.monitor;
        for (key, secs) in [
            ("check_interval_secs", m.check_interval_secs),
            ("retry_delay_secs", m.retry_delay_secs),
            ("grace_period_secs", m.grace_period_secs),
            ("retry_cooldown_secs", m.retry_cooldown_secs),
            ("safe_hold_secs", m.safe_hold_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                bail!("monitor.{} must be at most {}, got {}", key, MAX_DURATION_SECS, secs);
            }
        }
        if !(m.safe_progress > 0.0 && m.safe_progress <= 1.0) {
            bail!("monitor.safe_progress must be in (0, 1], got {}", m.safe_progress);
        }
        if m.check_interval_secs == 0 {
            bail!("monitor.check_interval_secs must be at least 1");
        }
        if !(m.bandwidth_kib > 0.0) {
            bail!("monitor.bandwidth_kib must be positive, got {}", m.bandwidth_kib);
        }
        if m.min_speed_kib < 0.0 {
            bail!("monitor.min_speed_kib must not be negative");
        }
        url::Url::parse(&self.client.url)
            .map_err(|e| anyhow::anyhow!("client.url {:?}: {}", self.client.url, e))?;

        let mut seen = HashSet::new();
        for owner in &self.owners {
            if !seen.insert((owner.kind, owner.name.as_str())) {
                bail!("duplicate {} owner name {:?}", owner.kind, owner.name);
            }
            url::Url::parse(&owner.url)
                .map_err(|e| anyhow::anyhow!("{} {} url {:?}: {}", owner.kind, owner.name, owner.url, e))?;
        }
        Ok(())
    }
}

fn override_num<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!("ignoring {}={:?}: not a number", key, raw),
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("stallwatch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<StallwatchConfig> {
    load_or_init_at(&config_path()?)
}

/// Like [`load_or_init`] but at an explicit path.
pub fn load_or_init_at(path: &std::path::Path) -> Result<StallwatchConfig> {
    if !path.exists() {
        let default_cfg = StallwatchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: StallwatchConfig = toml::from_str(&data)?;
    Ok(cfg)
}
