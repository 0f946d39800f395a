//!
//! tabularium exploration orchestrator
//! -----------------------------------
//! Owns one session's selection state and sequences the leaf operations
//! (list, fetch, parse) through the process-wide caches. The session moves
//! between three phases: Idle (nothing selected), ContentLoading (a selection
//! is being fetched and parsed; instantaneous in the blocking model but still
//! modeled), and ContentReady (parsed tables available for the current
//! selection). Every leaf failure is converted to an `ExploreError`, recorded
//! for display, and the session returns to a usable state; nothing escapes to
//! the presentation layer as a panic or raw error.
//!
//! Key responsibilities:
//! - Read-through listing with the configured name filter and TTL.
//! - Selection: validate against the last listing, fetch and parse through
//!   the shared caches, commit only if not cancelled.
//! - `current_view` as a pure projection of the selection state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{Clock, TtlCache};
use crate::error::{ExploreError, ExploreResult};
use crate::sources::{CancelToken, ContentFetcher, FileDescriptor, FileLister, NameFilter, TabularParser};
use crate::tables::{ParsedTables, TableProfile};

/// Process-wide caches shared by every session's explorer. Keys are derived
/// from the operation name plus its arguments; values never contain
/// session-specific state.
#[derive(Clone)]
pub struct ExplorerCaches {
    pub listing: TtlCache<String, Vec<FileDescriptor>>,
    pub content: TtlCache<String, Arc<Vec<u8>>>,
    pub tables: TtlCache<String, ParsedTables>,
}

impl ExplorerCaches {
    pub fn new() -> Self {
        Self { listing: TtlCache::new(), content: TtlCache::new(), tables: TtlCache::new() }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            listing: TtlCache::with_clock(clock.clone()),
            content: TtlCache::with_clock(clock.clone()),
            tables: TtlCache::with_clock(clock),
        }
    }
}

impl Default for ExplorerCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    ContentLoading,
    ContentReady,
}

/// Selection state owned by one session. Reset whenever a different file is
/// selected; `parsed` is only ever set behind a successful fetch.
#[derive(Default)]
struct SelectionState {
    selected: Option<FileDescriptor>,
    fetched: Option<Arc<Vec<u8>>>,
    parsed: Option<ParsedTables>,
}

/// Renderable projection of the selection state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurrentView {
    NoSelection,
    SingleTable { name: String, rows: usize, cols: usize, profile: TableProfile },
    MultiSheet { name: String, sheets: Vec<SheetView> },
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetView {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
}

/// One session's exploration orchestrator.
pub struct Explorer {
    lister: Arc<dyn FileLister>,
    fetcher: Arc<dyn ContentFetcher>,
    parser: Arc<dyn TabularParser>,
    caches: ExplorerCaches,
    filter: NameFilter,
    listing_ttl: Duration,
    content_ttl: Duration,
    phase: Phase,
    selection: SelectionState,
    last_listing: Vec<FileDescriptor>,
    last_error: Option<ExploreError>,
    cancel: CancelToken,
}

impl Explorer {
    pub fn new(
        lister: Arc<dyn FileLister>,
        fetcher: Arc<dyn ContentFetcher>,
        parser: Arc<dyn TabularParser>,
        caches: ExplorerCaches,
        filter: NameFilter,
        listing_ttl: Duration,
        content_ttl: Duration,
    ) -> Self {
        Self {
            lister,
            fetcher,
            parser,
            caches,
            filter,
            listing_ttl,
            content_ttl,
            phase: Phase::Idle,
            selection: SelectionState::default(),
            last_listing: Vec::new(),
            last_error: None,
            cancel: CancelToken::new(),
        }
    }

    /// Cancellation handle for this session's in-flight selection.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&ExploreError> {
        self.last_error.as_ref()
    }

    /// The most recent successful listing, as shown to the user. Survives
    /// later listing failures so a transient outage does not blank the view.
    pub fn last_listing(&self) -> &[FileDescriptor] {
        &self.last_listing
    }

    /// Cached listing filtered by the configured name filter. Upstream order
    /// is preserved; no extra sort is applied. On failure the previous
    /// listing stays in place and the error is recorded.
    pub fn list_files(&mut self) -> ExploreResult<Vec<FileDescriptor>> {
        let key = format!("list:{}", self.filter.cache_key());
        let lister = self.lister.clone();
        let filter = self.filter.clone();
        let fetched = self.caches.listing.get(key, self.listing_ttl, || {
            lister.list_files(&filter).map_err(|e| ExploreError::list(e))
        });
        match fetched {
            Ok(all) => {
                let files: Vec<FileDescriptor> =
                    all.into_iter().filter(|f| self.filter.matches(&f.name)).collect();
                debug!(target: "tabularium::explorer", "listing ok: {} file(s) match {}", files.len(), self.filter.cache_key());
                self.last_listing = files.clone();
                Ok(files)
            }
            Err(e) => {
                warn!(target: "tabularium::explorer", "listing failed, keeping previous {} entries: {}", self.last_listing.len(), e);
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Re-invoke the listing through the cache. A live cache entry
    /// short-circuits, matching the reference behavior; selection state is
    /// untouched either way.
    pub fn refresh_listing(&mut self) -> ExploreResult<Vec<FileDescriptor>> {
        self.list_files()
    }

    /// Select a file from the last listing, fetch and parse its content.
    /// Unknown ids are rejected without touching the current selection.
    /// Fetch/parse failures clear the selection back to Idle with the error
    /// recorded, so the user must re-select deliberately.
    pub fn select_file(&mut self, id: &str) -> ExploreResult<()> {
        let Some(desc) = self.last_listing.iter().find(|f| f.id == id).cloned() else {
            let err = ExploreError::unknown_file(id);
            self.last_error = Some(err.clone());
            return Err(err);
        };
        self.begin_selection(desc.clone());
        match self.load_selection(&desc) {
            Ok(parsed) => {
                if self.cancel.take_cancelled() {
                    debug!(target: "tabularium::explorer", "selection of '{}' cancelled before commit", desc.id);
                    self.reset_selection();
                    return Ok(());
                }
                self.selection.parsed = Some(parsed);
                self.phase = Phase::ContentReady;
                self.last_error = None;
                debug!(target: "tabularium::explorer", "selection ready: id='{}' name='{}'", desc.id, desc.name);
                Ok(())
            }
            Err(e) => {
                self.reset_selection();
                self.last_error = Some(e.clone());
                warn!(target: "tabularium::explorer", "selection of '{}' failed: {}", desc.id, e);
                Err(e)
            }
        }
    }

    /// Drop any selection; any state -> Idle.
    pub fn deselect(&mut self) {
        self.reset_selection();
    }

    /// Pure projection of the selection state; safe to call on every refresh
    /// cycle.
    pub fn current_view(&self) -> CurrentView {
        match (self.phase, &self.selection.parsed, &self.selection.selected) {
            (Phase::ContentReady, Some(parsed), Some(desc)) => match parsed {
                ParsedTables::Single(t) => CurrentView::SingleTable {
                    name: desc.name.clone(),
                    rows: t.rows(),
                    cols: t.cols(),
                    profile: t.profile(),
                },
                ParsedTables::Sheets(sheets) => CurrentView::MultiSheet {
                    name: desc.name.clone(),
                    sheets: sheets
                        .iter()
                        .map(|(n, t)| SheetView { name: n.clone(), rows: t.rows(), cols: t.cols() })
                        .collect(),
                },
            },
            _ => CurrentView::NoSelection,
        }
    }

    /// Handle to the parsed tables of the current selection, for presentation
    /// layers that render actual cell data.
    pub fn current_tables(&self) -> Option<&ParsedTables> {
        match self.phase {
            Phase::ContentReady => self.selection.parsed.as_ref(),
            _ => None,
        }
    }

    fn begin_selection(&mut self, desc: FileDescriptor) {
        // Clear stale content first so a half-finished selection can never
        // show the previous file's tables
        self.selection = SelectionState { selected: Some(desc), fetched: None, parsed: None };
        self.phase = Phase::ContentLoading;
        // A leftover cancel from an earlier selection must not kill this one
        self.cancel.take_cancelled();
    }

    fn reset_selection(&mut self) {
        self.selection = SelectionState::default();
        self.phase = Phase::Idle;
    }

    fn load_selection(&mut self, desc: &FileDescriptor) -> ExploreResult<ParsedTables> {
        let fetcher = self.fetcher.clone();
        let id = desc.id.clone();
        let bytes = self.caches.content.get(format!("content:{}", desc.id), self.content_ttl, || {
            fetcher.fetch_bytes(&id).map(Arc::new).map_err(|e| ExploreError::fetch(id.as_str(), e))
        })?;
        self.selection.fetched = Some(bytes.clone());
        let parser = self.parser.clone();
        let name = desc.name.clone();
        self.caches.tables.get(format!("tables:{}", desc.id), self.content_ttl, || {
            parser.parse(&bytes, &name).map_err(|e| ExploreError::parse(name.as_str(), e))
        })
    }
}

/// Builds per-session explorers over one shared set of leaf clients and
/// caches. The server issues one explorer per session token.
#[derive(Clone)]
pub struct ExplorerFactory {
    lister: Arc<dyn FileLister>,
    fetcher: Arc<dyn ContentFetcher>,
    parser: Arc<dyn TabularParser>,
    caches: ExplorerCaches,
    filter: NameFilter,
    listing_ttl: Duration,
    content_ttl: Duration,
}

impl ExplorerFactory {
    pub fn new(
        lister: Arc<dyn FileLister>,
        fetcher: Arc<dyn ContentFetcher>,
        parser: Arc<dyn TabularParser>,
        caches: ExplorerCaches,
        filter: NameFilter,
        listing_ttl: Duration,
        content_ttl: Duration,
    ) -> Self {
        Self { lister, fetcher, parser, caches, filter, listing_ttl, content_ttl }
    }

    pub fn build(&self) -> Explorer {
        Explorer::new(
            self.lister.clone(),
            self.fetcher.clone(),
            self.parser.clone(),
            self.caches.clone(),
            self.filter.clone(),
            self.listing_ttl,
            self.content_ttl,
        )
    }
}

#[cfg(test)]
#[path = "explorer_tests.rs"]
mod explorer_tests;
