use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use polars::prelude::*;

use super::*;
use crate::cache::ManualClock;
use crate::tables::Table;
use crate::tprintln;

fn desc(id: &str, name: &str) -> FileDescriptor {
    FileDescriptor {
        id: id.into(),
        name: name.into(),
        mime_type: "application/octet-stream".into(),
        web_view_link: None,
        created_time: None,
        modified_time: None,
        size_bytes: Some(3),
    }
}

fn tiny_table(rows: i64) -> Table {
    let vals: Vec<i64> = (0..rows).collect();
    let s = Series::new("v".into(), vals);
    Table::new(DataFrame::new(vec![s.into()]).unwrap())
}

struct FakeLister {
    files: parking_lot::Mutex<Vec<FileDescriptor>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeLister {
    fn new(files: Vec<FileDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            files: parking_lot::Mutex::new(files),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }
}

impl FileLister for FakeLister {
    fn list_files(&self, _filter: &NameFilter) -> anyhow::Result<Vec<FileDescriptor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("listing backend down"));
        }
        Ok(self.files.lock().clone())
    }
}

struct FakeFetcher {
    contents: HashMap<String, Vec<u8>>,
    fail_ids: parking_lot::Mutex<HashSet<String>>,
    cancel_on_fetch: parking_lot::Mutex<Option<CancelToken>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    fn new(contents: &[(&str, &[u8])]) -> Arc<Self> {
        Arc::new(Self {
            contents: contents.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect(),
            fail_ids: parking_lot::Mutex::new(HashSet::new()),
            cancel_on_fetch: parking_lot::Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    fn fail_on(&self, id: &str) {
        self.fail_ids.lock().insert(id.to_string());
    }

    fn clear_failures(&self) {
        self.fail_ids.lock().clear();
    }
}

impl ContentFetcher for FakeFetcher {
    fn fetch_bytes(&self, id: &str) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(tok) = self.cancel_on_fetch.lock().as_ref() {
            tok.cancel();
        }
        if self.fail_ids.lock().contains(id) {
            return Err(anyhow!("connection reset"));
        }
        self.contents.get(id).cloned().ok_or_else(|| anyhow!("no content for '{}'", id))
    }
}

struct FakeParser {
    /// None parses to a single table; Some(names) to sheets in that order.
    sheets: Option<Vec<String>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeParser {
    fn single() -> Arc<Self> {
        Arc::new(Self { sheets: None, fail: AtomicBool::new(false), calls: AtomicUsize::new(0) })
    }

    fn with_sheets(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            sheets: Some(names.iter().map(|s| s.to_string()).collect()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }
}

impl TabularParser for FakeParser {
    fn parse(&self, _bytes: &[u8], _declared_name: &str) -> anyhow::Result<ParsedTables> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("not a table"));
        }
        match &self.sheets {
            None => Ok(ParsedTables::Single(tiny_table(3))),
            Some(names) => Ok(ParsedTables::Sheets(
                names.iter().map(|n| (n.clone(), tiny_table(2))).collect(),
            )),
        }
    }
}

struct Rig {
    lister: Arc<FakeLister>,
    fetcher: Arc<FakeFetcher>,
    parser: Arc<FakeParser>,
    clock: Arc<ManualClock>,
    explorer: Explorer,
}

const HOUR: Duration = Duration::from_secs(3600);

fn rig(files: Vec<FileDescriptor>, contents: &[(&str, &[u8])], parser: Arc<FakeParser>) -> Rig {
    let lister = FakeLister::new(files);
    let fetcher = FakeFetcher::new(contents);
    let clock = Arc::new(ManualClock::new());
    let caches = ExplorerCaches::with_clock(clock.clone());
    let explorer = Explorer::new(
        lister.clone(),
        fetcher.clone(),
        parser.clone(),
        caches,
        NameFilter::suffix(".xlsx"),
        HOUR,
        HOUR,
    );
    Rig { lister, fetcher, parser, clock, explorer }
}

fn xlsx_rig() -> Rig {
    rig(
        vec![desc("fa", "a.xlsx"), desc("fb", "b.xlsx")],
        &[("fa", b"bytes-a"), ("fb", b"bytes-b")],
        FakeParser::single(),
    )
}

#[test]
fn listing_filter_keeps_upstream_relative_order() {
    let mut r = rig(
        vec![desc("1", "a.xlsx"), desc("2", "b.csv"), desc("3", "c.xlsx")],
        &[],
        FakeParser::single(),
    );
    let names: Vec<String> =
        r.explorer.list_files().unwrap().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["a.xlsx".to_string(), "c.xlsx".to_string()]);
}

#[test]
fn listing_is_cached_within_ttl_and_refetched_after() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    r.explorer.refresh_listing().unwrap();
    assert_eq!(r.lister.calls.load(Ordering::SeqCst), 1);
    r.clock.advance(HOUR + Duration::from_secs(1));
    r.explorer.list_files().unwrap();
    assert_eq!(r.lister.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn listing_failure_keeps_previous_listing_and_records_error() {
    let mut r = xlsx_rig();
    let first = r.explorer.list_files().unwrap();
    assert_eq!(first.len(), 2);
    r.clock.advance(HOUR + Duration::from_secs(1));
    r.lister.fail.store(true, Ordering::SeqCst);
    let err = r.explorer.list_files().unwrap_err();
    assert!(matches!(err, ExploreError::List { .. }));
    assert_eq!(r.explorer.last_listing().len(), 2);
    assert!(matches!(r.explorer.last_error(), Some(ExploreError::List { .. })));
    // The failure was not memoized: recovery is immediate
    r.lister.fail.store(false, Ordering::SeqCst);
    assert_eq!(r.explorer.list_files().unwrap().len(), 2);
}

#[test]
fn select_unknown_id_is_rejected_and_state_unchanged() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    r.explorer.select_file("fa").unwrap();
    assert_eq!(r.explorer.phase(), Phase::ContentReady);

    let err = r.explorer.select_file("not-listed").unwrap_err();
    assert!(matches!(err, ExploreError::UnknownFile { .. }));
    // Still showing file A, untouched
    assert_eq!(r.explorer.phase(), Phase::ContentReady);
    match r.explorer.current_view() {
        CurrentView::SingleTable { name, .. } => assert_eq!(name, "a.xlsx"),
        other => panic!("expected single table view, got {:?}", other),
    }
}

#[test]
fn fetch_error_returns_to_idle_and_retry_succeeds() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    r.fetcher.fail_on("fa");

    let err = r.explorer.select_file("fa").unwrap_err();
    assert!(matches!(err, ExploreError::Fetch { ref file_id, .. } if file_id.as_str() == "fa"));
    assert_eq!(r.explorer.phase(), Phase::Idle);
    assert!(matches!(r.explorer.current_view(), CurrentView::NoSelection));
    assert!(matches!(r.explorer.last_error(), Some(ExploreError::Fetch { .. })));

    // Failed fetch was not memoized; a deliberate re-select works
    r.fetcher.clear_failures();
    r.explorer.select_file("fa").unwrap();
    assert_eq!(r.explorer.phase(), Phase::ContentReady);
    assert!(r.explorer.last_error().is_none());
}

#[test]
fn parse_error_returns_to_idle_with_recorded_error() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    r.parser.fail.store(true, Ordering::SeqCst);
    let err = r.explorer.select_file("fa").unwrap_err();
    assert!(matches!(err, ExploreError::Parse { ref name, .. } if name.as_str() == "a.xlsx"));
    assert_eq!(r.explorer.phase(), Phase::Idle);
    assert!(matches!(r.explorer.current_view(), CurrentView::NoSelection));
}

#[test]
fn selecting_b_never_shows_a_tables() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    r.explorer.select_file("fa").unwrap();
    match r.explorer.current_view() {
        CurrentView::SingleTable { name, .. } => assert_eq!(name, "a.xlsx"),
        other => panic!("expected a.xlsx view, got {:?}", other),
    }
    // B's fetch fails mid-selection: the view must already be cleared
    r.fetcher.fail_on("fb");
    let _ = r.explorer.select_file("fb");
    assert!(matches!(r.explorer.current_view(), CurrentView::NoSelection));
    assert!(r.explorer.current_tables().is_none());
}

#[test]
fn content_loading_phase_is_observable_and_projects_no_selection() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    // Drive the first half of the transition directly: selection begun, not
    // yet loaded
    r.explorer.begin_selection(desc("fa", "a.xlsx"));
    assert_eq!(r.explorer.phase(), Phase::ContentLoading);
    assert!(matches!(r.explorer.current_view(), CurrentView::NoSelection));
}

#[test]
fn multi_sheet_view_preserves_parser_order() {
    let r_parser = FakeParser::with_sheets(&["Sheet1", "Sheet2"]);
    let mut r = rig(vec![desc("fm", "multi.xlsx")], &[("fm", b"wb")], r_parser);
    r.explorer.list_files().unwrap();
    r.explorer.select_file("fm").unwrap();
    match r.explorer.current_view() {
        CurrentView::MultiSheet { name, sheets } => {
            assert_eq!(name, "multi.xlsx");
            let order: Vec<String> = sheets.into_iter().map(|s| s.name).collect();
            assert_eq!(order, vec!["Sheet1".to_string(), "Sheet2".to_string()]);
        }
        other => panic!("expected multi-sheet view, got {:?}", other),
    }
    match r.explorer.current_tables() {
        Some(ParsedTables::Sheets(sheets)) => assert_eq!(sheets.len(), 2),
        other => panic!("expected sheet handles, got {:?}", other.is_some()),
    }
}

#[test]
fn reselecting_same_file_hits_content_and_table_caches() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    r.explorer.select_file("fa").unwrap();
    r.explorer.deselect();
    assert_eq!(r.explorer.phase(), Phase::Idle);
    r.explorer.select_file("fa").unwrap();
    tprintln!(
        "fetch calls={} parse calls={}",
        r.fetcher.calls.load(Ordering::SeqCst),
        r.parser.calls.load(Ordering::SeqCst)
    );
    assert_eq!(r.fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(r.parser.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn content_cache_expires_with_simulated_time() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    r.explorer.select_file("fa").unwrap();
    r.clock.advance(HOUR + Duration::from_secs(1));
    // Listing also expired; refresh it so the selection is still valid
    r.explorer.list_files().unwrap();
    r.explorer.select_file("fa").unwrap();
    assert_eq!(r.fetcher.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn cancelled_selection_commits_nothing_and_records_no_error() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    // The fetcher cancels the token mid-flight, as a network boundary would
    *r.fetcher.cancel_on_fetch.lock() = Some(r.explorer.cancel_token());
    r.explorer.select_file("fa").unwrap();
    assert_eq!(r.explorer.phase(), Phase::Idle);
    assert!(matches!(r.explorer.current_view(), CurrentView::NoSelection));
    assert!(r.explorer.last_error().is_none());

    // The token was consumed by the cancelled attempt; the next one lands
    *r.fetcher.cancel_on_fetch.lock() = None;
    r.explorer.select_file("fa").unwrap();
    assert_eq!(r.explorer.phase(), Phase::ContentReady);
}

#[test]
fn deselect_from_ready_returns_to_idle() {
    let mut r = xlsx_rig();
    r.explorer.list_files().unwrap();
    r.explorer.select_file("fb").unwrap();
    assert_eq!(r.explorer.phase(), Phase::ContentReady);
    r.explorer.deselect();
    assert_eq!(r.explorer.phase(), Phase::Idle);
    assert!(matches!(r.explorer.current_view(), CurrentView::NoSelection));
}
