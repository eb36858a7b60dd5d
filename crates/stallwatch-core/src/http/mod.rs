//! Blocking HTTP exchange over libcurl.
//!
//! Uses the curl crate (libcurl) for every call the watchdog makes: queue
//! listings and bulk removals against the Arr servers, and the qBittorrent-style
//! Web API of the download client. Runs in the current thread; the monitor
//! worker is the only caller, so a hung upstream stalls that worker only.

mod parse;

use std::str;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::retry::RequestError;

pub(crate) use parse::set_cookie_value;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP verb for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// One outgoing request. Build with [`HttpRequest::get`] etc., then [`send`](HttpRequest::send).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// POST with an `application/x-www-form-urlencoded` body.
    pub fn post_form(url: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter().copied())
            .finish();
        Self::new(Method::Post, url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(encoded.into_bytes())
    }

    /// DELETE carrying a JSON body (the Arr bulk queue endpoint expects one).
    pub fn delete_json<T: Serialize>(url: impl Into<String>, payload: &T) -> Result<Self, RequestError> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self::new(Method::Delete, url)
            .header("Content-Type", "application/json")
            .with_body(body))
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.trim().to_string(), value.trim().to_string()));
        self
    }

    fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs the request. Any status code is returned as a response; only
    /// transport failures are errors here (see [`HttpResponse::error_for_status`]).
    pub fn send(&self) -> Result<HttpResponse, RequestError> {
        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(&self.url)?;
        easy.connect_timeout(CONNECT_TIMEOUT)?;
        easy.timeout(TOTAL_TIMEOUT)?;

        if let Some(payload) = &self.body {
            easy.post_fields_copy(payload)?;
        }
        match self.method {
            Method::Get => easy.get(true)?,
            Method::Post => easy.post(true)?,
            Method::Delete => easy.custom_request(self.method.as_str())?,
        }

        if !self.headers.is_empty() {
            let mut list = curl::easy::List::new();
            for (k, v) in &self.headers {
                list.append(&format!("{}: {}", k, v))?;
            }
            easy.http_headers(list)?;
        }

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let status = easy.response_code()?;
        tracing::trace!(method = self.method.as_str(), url = %self.url, status, "http exchange");
        Ok(HttpResponse {
            status,
            headers: header_lines,
            body,
        })
    }
}

/// Status, raw header lines, and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u32,
    pub headers: Vec<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text (lossy), for log lines and plain-text endpoints.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-2xx response into [`RequestError::Http`], keeping the body for logs.
    pub fn error_for_status(self) -> Result<Self, RequestError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RequestError::Http {
                status: self.status,
                body: self.text(),
            })
        }
    }

    /// Value of the cookie `name` from any `Set-Cookie` header in the response.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find_map(|line| set_cookie_value(line, name))
    }
}
