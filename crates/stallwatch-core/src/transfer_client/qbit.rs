//! qBittorrent-compatible Web API client (RDTClient speaks the same API).

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::{TransferClient, TransferHash, TransferSnapshot};
use crate::config::ClientConfig;
use crate::http::{HttpRequest, HttpResponse};
use crate::retry::{run_with_retry, RequestError, RetryPolicy};

const SESSION_COOKIE: &str = "SID";

/// Torrent record from `/api/v2/torrents/info`. Only the fields the monitor needs.
#[derive(Debug, Deserialize)]
struct TorrentInfo {
    hash: String,
    /// Bytes per second.
    #[serde(default)]
    dlspeed: f64,
    #[serde(default)]
    progress: f64,
}

impl TorrentInfo {
    fn into_snapshot(self) -> TransferSnapshot {
        TransferSnapshot {
            hash: TransferHash::new(&self.hash),
            speed_kib: self.dlspeed / 1024.0,
            progress: self.progress,
        }
    }
}

/// Session-holding client for the download client's Web API.
#[derive(Debug)]
pub struct QbitClient {
    base_url: Url,
    username: String,
    password: String,
    referer: String,
    auth_retry: RetryPolicy,
    sid: Option<String>,
}

impl QbitClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self, RequestError> {
        let mut base = cfg.url.trim_end_matches('/').to_string();
        base.push('/');
        let retry = cfg.auth_retry.clone().unwrap_or_default();
        Ok(Self {
            base_url: Url::parse(&base)?,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            referer: cfg.referer.clone(),
            auth_retry: RetryPolicy::fixed(retry.max_attempts, Duration::from_secs(retry.delay_secs)),
            sid: None,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.sid.is_some()
    }

    /// Single login attempt. The API answers 200 with body `Fails.` on bad
    /// credentials, so the body is checked as well as the status.
    pub fn login(&mut self) -> Result<(), RequestError> {
        let url = self.base_url.join("api/v2/auth/login")?;
        let resp = HttpRequest::post_form(
            url.as_str(),
            &[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ],
        )
        .header("Referer", &self.referer)
        .send()?
        .error_for_status()?;
        if resp.text().trim() == "Fails." {
            return Err(RequestError::AuthRejected);
        }
        self.sid = resp.cookie(SESSION_COOKIE);
        Ok(())
    }

    /// Log in, retrying while the service is not yet reachable.
    /// Exhausting the policy returns the last error; callers treat that as fatal.
    pub fn connect(&mut self) -> Result<(), RequestError> {
        let policy = self.auth_retry;
        run_with_retry(&policy, "download client login", || self.login())?;
        tracing::info!(url = %self.base_url, "authenticated with download client");
        Ok(())
    }

    fn torrents_url(&self, filter: Option<&str>) -> Result<Url, RequestError> {
        let mut url = self.base_url.join("api/v2/torrents/info")?;
        if let Some(f) = filter {
            url.query_pairs_mut().append_pair("filter", f);
        }
        Ok(url)
    }

    fn get(&self, url: &Url) -> Result<HttpResponse, RequestError> {
        let mut req = HttpRequest::get(url.as_str());
        if let Some(sid) = &self.sid {
            req = req.header("Cookie", &format!("{}={}", SESSION_COOKIE, sid));
        }
        req.send()
    }

    /// GET that re-authenticates once if the session has expired (HTTP 403).
    fn get_with_session(&mut self, url: &Url) -> Result<HttpResponse, RequestError> {
        let resp = self.get(url)?;
        if resp.status != 403 {
            return resp.error_for_status();
        }
        tracing::debug!("download client session rejected, logging in again");
        self.login()?;
        self.get(url)?.error_for_status()
    }

    fn torrents(&mut self, filter: Option<&str>) -> Result<Vec<TorrentInfo>, RequestError> {
        let url = self.torrents_url(filter)?;
        self.get_with_session(&url)?.json()
    }
}

impl TransferClient for QbitClient {
    fn list_active(&mut self) -> Result<Vec<TransferSnapshot>, RequestError> {
        Ok(self
            .torrents(Some("downloading"))?
            .into_iter()
            .map(TorrentInfo::into_snapshot)
            .collect())
    }

    fn list_all_known(&mut self) -> Result<Vec<TransferHash>, RequestError> {
        Ok(self
            .torrents(None)?
            .into_iter()
            .map(|t| TransferHash::new(&t.hash))
            .collect())
    }
}
