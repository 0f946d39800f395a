//! Remote drive client speaking the Drive v3 wire shape: file listing with a
//! server-side name filter and per-file media download. Credentials are an
//! opaque bearer token; obtaining and refreshing it is the platform's
//! concern. The base URL is configurable so tests and self-hosted stores can
//! point elsewhere.

use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::Deserialize;

use crate::sources::{CancelToken, ContentFetcher, FileDescriptor, FileLister, NameFilter};

const LIST_FIELDS: &str = "files(id, name, mimeType, webViewLink, createdTime, modifiedTime, size)";
const PAGE_SIZE: u32 = 100;

pub struct DriveClient {
    base: Url,
    client: OnceLock<Client>,
    token: Option<String>,
    cancel: CancelToken,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    files: Vec<FileDescriptor>,
}

impl DriveClient {
    pub fn new(base: &str, token: Option<String>) -> Result<Self> {
        // A trailing slash keeps Url::join from eating the last path segment
        let base = if base.ends_with('/') { base.to_string() } else { format!("{}/", base) };
        let base = Url::parse(&base).context("invalid drive base URL")?;
        Ok(Self { base, client: OnceLock::new(), token, cancel: CancelToken::new() })
    }

    // Built lazily on the calling thread: the blocking reqwest client must
    // not be constructed on an async worker, and all leaf calls run on the
    // blocking pool anyway.
    fn http(&self) -> &Client {
        self.client.get_or_init(Client::new)
    }

    /// Attach a shared cancellation handle, checked before each call.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        }
    }

    fn ensure_not_cancelled(&self, what: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(anyhow!("{} cancelled", what));
        }
        Ok(())
    }
}

impl FileLister for DriveClient {
    fn list_files(&self, filter: &NameFilter) -> Result<Vec<FileDescriptor>> {
        self.ensure_not_cancelled("listing")?;
        let mut query = format!(
            "files?fields={}&pageSize={}",
            urlencoding::encode(LIST_FIELDS),
            PAGE_SIZE
        );
        if let Some(needle) = filter.contains_hint() {
            let clause = format!("name contains '{}'", needle);
            query.push_str(&format!("&q={}", urlencoding::encode(&clause)));
        }
        let url = self.base.join(&query)?;
        let resp = self.authed(self.http().get(url)).send().context("listing request failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("listing failed: HTTP {}", resp.status()));
        }
        let body: ListResponse = resp.json().context("decoding listing response")?;
        Ok(body.files)
    }
}

impl ContentFetcher for DriveClient {
    fn fetch_bytes(&self, id: &str) -> Result<Vec<u8>> {
        self.ensure_not_cancelled("fetch")?;
        let url = self.base.join(&format!("files/{}?alt=media", urlencoding::encode(id)))?;
        let resp = self.authed(self.http().get(url)).send()
            .with_context(|| format!("download request for '{}' failed", id))?;
        if !resp.status().is_success() {
            return Err(anyhow!("download of '{}' failed: HTTP {}", id, resp.status()));
        }
        let bytes = resp.bytes().with_context(|| format!("reading body of '{}'", id))?;
        Ok(bytes.to_vec())
    }
}
