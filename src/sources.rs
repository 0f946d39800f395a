//!
//! Leaf capability boundaries
//! --------------------------
//! The orchestrator depends only on the three traits here: listing, content
//! download and tabular parsing. Concrete backends (`drive`, `local`, the
//! polars parser in `tables`) implement them, and tests substitute in-memory
//! fakes. Leaf failures are plain `anyhow` errors; the orchestrator converts
//! them into the typed `ExploreError` variants at the boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::tables::ParsedTables;

/// Descriptor for one file in the store. Identity is `id`; everything else is
/// display metadata passed through from upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "webViewLink", default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    #[serde(rename = "createdTime", default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(rename = "modifiedTime", default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(rename = "size", default, deserialize_with = "de_size")]
    pub size_bytes: Option<u64>,
}

// Drive reports size as a decimal string; local sources give a number.
fn de_size<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        _ => None,
    })
}

/// Predicate over file names, used both to filter listings and as the stable
/// cache-key fragment for listing entries.
#[derive(Debug, Clone)]
pub enum NameFilter {
    /// Case-insensitive suffix match, e.g. ".xlsx".
    Suffix(String),
    /// Glob pattern (`*` within a path segment, `**` across) compiled to an
    /// anchored regex.
    Glob { pattern: String, regex: Regex },
}

impl NameFilter {
    pub fn suffix(s: impl Into<String>) -> Self {
        NameFilter::Suffix(s.into())
    }

    pub fn glob(pattern: &str) -> Result<Self> {
        let regex = glob_to_regex(pattern)?;
        Ok(NameFilter::Glob { pattern: pattern.to_string(), regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameFilter::Suffix(suf) => name.to_ascii_lowercase().ends_with(&suf.to_ascii_lowercase()),
            NameFilter::Glob { regex, .. } => regex.is_match(name),
        }
    }

    /// Stable textual form for cache keying and logs.
    pub fn cache_key(&self) -> String {
        match self {
            NameFilter::Suffix(suf) => format!("suffix:{}", suf.to_ascii_lowercase()),
            NameFilter::Glob { pattern, .. } => format!("glob:{}", pattern),
        }
    }

    /// Substring hint for stores with server-side `name contains` filtering.
    /// Glob patterns have no single reliable substring, so they filter
    /// client-side only.
    pub fn contains_hint(&self) -> Option<&str> {
        match self {
            NameFilter::Suffix(suf) => Some(suf.as_str()),
            NameFilter::Glob { .. } => None,
        }
    }
}

// Convert simple glob (with * and **) to a Rust regex anchored at both ends.
// Escape regex meta, then restore wildcards: ** -> .*, * -> [^/]*
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut s = regex::escape(pattern);
    s = s.replace("\\*\\*", ".*");
    s = s.replace("\\*", "[^/]*");
    Ok(Regex::new(&format!("^{}$", s))?)
}

/// Cooperative cancellation handle. Concrete fetchers check it before issuing
/// network calls; the orchestrator checks it again before committing a loaded
/// selection. Cloned handles share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Read and clear the flag in one step; used at the commit point so a
    /// cancellation only affects the selection it was issued against.
    pub fn take_cancelled(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Lists file descriptors matching a name filter. Implementations may apply
/// the filter server-side, client-side or not at all; the orchestrator
/// re-applies it either way.
pub trait FileLister: Send + Sync {
    fn list_files(&self, filter: &NameFilter) -> Result<Vec<FileDescriptor>>;
}

/// Downloads the raw byte content of one file.
pub trait ContentFetcher: Send + Sync {
    fn fetch_bytes(&self, id: &str) -> Result<Vec<u8>>;
}

/// Interprets raw bytes as one table or a set of named sheets. The declared
/// name is used for format dispatch and error messages.
pub trait TabularParser: Send + Sync {
    fn parse(&self, bytes: &[u8], declared_name: &str) -> Result<ParsedTables>;
}
