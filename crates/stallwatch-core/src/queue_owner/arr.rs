//! HTTP client for a single Radarr or Sonarr server (API v3).

use serde::Serialize;
use url::Url;

use super::{parse_queue_body, OwnerKind, QueueEntry, QueueOwner};
use crate::config::OwnerConfig;
use crate::http::HttpRequest;
use crate::retry::RequestError;

/// The servers page their queue (default page size 10); ask for enough to see
/// everything in one call.
const QUEUE_PAGE_SIZE: &str = "1000";

#[derive(Debug, Serialize)]
struct RemovalPayload<'a> {
    ids: &'a [i64],
}

/// A Radarr or Sonarr instance. Both expose the same queue endpoints.
#[derive(Debug, Clone)]
pub struct ArrInstance {
    kind: OwnerKind,
    name: String,
    base_url: Url,
    api_key: String,
}

impl ArrInstance {
    pub fn new(kind: OwnerKind, name: &str, url: &str, api_key: &str) -> Result<Self, RequestError> {
        // Keep a trailing slash so `join` appends to a path prefix (reverse proxies).
        let mut base = url.trim_end_matches('/').to_string();
        base.push('/');
        Ok(Self {
            kind,
            name: name.to_string(),
            base_url: Url::parse(&base)?,
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(cfg: &OwnerConfig) -> Result<Self, RequestError> {
        Self::new(cfg.kind, &cfg.name, &cfg.url, &cfg.api_key)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn queue_url(&self) -> Result<Url, RequestError> {
        let mut url = self.base_url.join("api/v3/queue")?;
        url.query_pairs_mut().append_pair("pageSize", QUEUE_PAGE_SIZE);
        Ok(url)
    }

    pub(crate) fn bulk_removal_url(&self) -> Result<Url, RequestError> {
        let mut url = self.base_url.join("api/v3/queue/bulk")?;
        url.query_pairs_mut()
            .append_pair("removeFromClient", "true")
            .append_pair("blocklist", "true")
            .append_pair("skipRedownload", "false")
            .append_pair("changeCategory", "false");
        Ok(url)
    }
}

impl QueueOwner for ArrInstance {
    fn kind(&self) -> OwnerKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_queue(&self) -> Result<Vec<QueueEntry>, RequestError> {
        let resp = HttpRequest::get(self.queue_url()?.as_str())
            .header("X-Api-Key", &self.api_key)
            .header("Accept", "application/json")
            .send()?
            .error_for_status()?;
        parse_queue_body(&resp.body)
    }

    fn remove_and_redownload(&self, queue_ids: &[i64]) -> Result<(), RequestError> {
        let payload = RemovalPayload { ids: queue_ids };
        HttpRequest::delete_json(self.bulk_removal_url()?.as_str(), &payload)?
            .header("X-Api-Key", &self.api_key)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}
