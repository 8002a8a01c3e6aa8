//! Integration tests for PagedTable against a scripted row source

use pretty_assertions::assert_eq;
use serde_json::json;
use sheetview::components::{PagedTable, ViewerEvent};
use sheetview::core::{FetchError, FetchResult, PageRequest, PageResult, Row, ViewerMode};
use sheetview::services::row_source::{page_locally, RowSource};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory sheets with per-page latency and failure injection
#[derive(Default)]
struct ScriptedRows {
    sheets: HashMap<(String, String), (Vec<String>, Vec<Row>)>,
    latency: Mutex<HashMap<(String, usize), Duration>>,
    failing: Mutex<HashSet<(String, usize)>>,
    calls: Mutex<Vec<PageRequest>>,
}

impl ScriptedRows {
    fn with_sheet(mut self, dataset: &str, sheet: &str, rows: Vec<Row>) -> Self {
        let columns = vec!["id".to_string(), "name".to_string(), "status".to_string()];
        self.sheets
            .insert((dataset.to_string(), sheet.to_string()), (columns, rows));
        self
    }

    fn delay(&self, dataset: &str, page: usize, millis: u64) {
        self.latency
            .lock()
            .unwrap()
            .insert((dataset.to_string(), page), Duration::from_millis(millis));
    }

    fn fail(&self, dataset: &str, page: usize) {
        self.failing
            .lock()
            .unwrap()
            .insert((dataset.to_string(), page));
    }

    fn calls_for(&self, page: usize) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.page == page)
            .count()
    }
}

impl RowSource for ScriptedRows {
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<PageResult> {
        self.calls.lock().unwrap().push(request.clone());
        let delay = self
            .latency
            .lock()
            .unwrap()
            .get(&(request.dataset.clone(), request.page))
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing
            .lock()
            .unwrap()
            .contains(&(request.dataset.clone(), request.page))
        {
            return Err(FetchError::Transport("connection reset".into()));
        }
        let (columns, rows) = self
            .sheets
            .get(&(request.dataset.clone(), request.sheet.clone()))
            .ok_or_else(|| FetchError::Logical("File not found".into()))?;
        Ok(page_locally(columns, rows, request))
    }
}

fn customers(prefix: &str, n: usize) -> Vec<Row> {
    (1..=n)
        .map(|i| {
            let status = if i % 3 == 0 { "churned" } else { "active" };
            json!({
                "id": format!("{prefix}-{i}"),
                "name": format!("Customer {i}"),
                "status": status
            })
            .as_object()
            .cloned()
            .unwrap()
        })
        .collect()
}

fn ids(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

async fn scroll_to_end<S: RowSource>(table: &mut PagedTable<S>) -> Vec<ViewerEvent> {
    let mut events = table.settle_all().await;
    while table.near_bottom() {
        events.extend(table.settle_all().await);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_pages_append_in_order_regardless_of_latency() {
    let source = Arc::new(ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 7)));
    source.delay("f1.xlsx", 1, 30);
    source.delay("f1.xlsx", 2, 5);
    source.delay("f1.xlsx", 3, 50);

    let mut table = PagedTable::with_shared(Arc::clone(&source), 2);
    table.select_target("f1.xlsx", "S1");
    let events = scroll_to_end(&mut table).await;

    assert_eq!(
        events,
        vec![
            ViewerEvent::PageLoaded { page: 1, rows: 2 },
            ViewerEvent::PageLoaded { page: 2, rows: 2 },
            ViewerEvent::PageLoaded { page: 3, rows: 2 },
            ViewerEvent::PageLoaded { page: 4, rows: 1 },
        ]
    );
    assert_eq!(ids(table.rows()), ids(&customers("f1", 7)));
    assert_eq!(table.state().current_page, 4);
    assert_eq!(table.state().total_pages, 4);
    assert!(!table.has_more());
}

#[tokio::test(start_paused = true)]
async fn test_rapid_next_page_triggers_issue_one_fetch() {
    let source = Arc::new(ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 10)));
    source.delay("f1.xlsx", 2, 200);

    let mut table = PagedTable::with_shared(Arc::clone(&source), 3);
    table.select_target("f1.xlsx", "S1");
    table.settle_all().await;

    assert!(table.request_next_page());
    assert!(!table.request_next_page());
    assert!(!table.near_bottom());
    assert_eq!(table.pending_fetches(), 1);

    let events = table.settle_all().await;
    assert_eq!(events, vec![ViewerEvent::PageLoaded { page: 2, rows: 3 }]);
    assert_eq!(source.calls_for(2), 1);
    assert_eq!(table.rows().len(), 6);
}

#[tokio::test]
async fn test_blank_search_leaves_state_unchanged() {
    let source = ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 4));
    let mut table = PagedTable::new(source, 2);
    table.select_target("f1.xlsx", "S1");
    table.settle_all().await;

    let before = table.state().clone();
    assert!(!table.submit_search(""));
    assert!(!table.submit_search("   \t"));
    assert_eq!(table.state(), &before);
    assert_eq!(table.pending_fetches(), 0);
}

#[tokio::test]
async fn test_clear_search_restores_browse_first_page() {
    let source = ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 9));
    let mut table = PagedTable::new(source, 2);
    table.select_target("f1.xlsx", "S1");
    table.settle_all().await;
    let browse_page_one = ids(table.rows());

    assert!(table.submit_search("churn"));
    assert!(table.rows().is_empty());
    table.settle_all().await;
    assert_eq!(table.mode(), ViewerMode::Search);
    assert_eq!(ids(table.rows()), vec!["f1-3", "f1-6"]);

    assert!(table.clear_search());
    assert!(table.rows().is_empty());
    table.settle_all().await;
    assert_eq!(table.mode(), ViewerMode::Browse);
    assert_eq!(table.state().search_term, "");
    assert_eq!(ids(table.rows()), browse_page_one);
}

#[tokio::test(start_paused = true)]
async fn test_stale_page_after_selection_change_is_discarded() {
    let source = Arc::new(
        ScriptedRows::default()
            .with_sheet("f1.xlsx", "S1", customers("f1", 6))
            .with_sheet("f2.xlsx", "S2", customers("f2", 6)),
    );
    source.delay("f1.xlsx", 2, 100);

    let mut table = PagedTable::with_shared(Arc::clone(&source), 2);
    table.select_target("f1.xlsx", "S1");
    table.settle_all().await;
    assert!(table.near_bottom());

    table.select_target("f2.xlsx", "S2");
    let events = table.settle_all().await;

    assert_eq!(
        events,
        vec![
            ViewerEvent::PageLoaded { page: 1, rows: 2 },
            ViewerEvent::Discarded { page: 2 },
        ]
    );
    assert_eq!(ids(table.rows()), vec!["f2-1", "f2-2"]);
    assert_eq!(table.state().current_page, 1);
    assert!(!table.is_loading_more());
}

#[tokio::test(start_paused = true)]
async fn test_stale_first_page_after_reselect_is_discarded() {
    let source = Arc::new(
        ScriptedRows::default()
            .with_sheet("f1.xlsx", "S1", customers("f1", 2))
            .with_sheet("f2.xlsx", "S2", customers("f2", 2)),
    );
    source.delay("f1.xlsx", 1, 100);

    let mut table = PagedTable::with_shared(Arc::clone(&source), 5);
    table.select_target("f1.xlsx", "S1");
    table.select_target("f2.xlsx", "S2");
    table.settle_all().await;

    assert_eq!(ids(table.rows()), vec!["f2-1", "f2-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_clearing_search_discards_in_flight_search_page() {
    let source = Arc::new(ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 30)));
    source.delay("f1.xlsx", 2, 100);

    let mut table = PagedTable::with_shared(Arc::clone(&source), 2);
    table.select_target("f1.xlsx", "S1");
    table.settle_all().await;

    table.set_search_input("active");
    table.submit_search("active");
    table.settle_all().await;
    assert!(table.near_bottom());

    assert!(table.set_search_input(""));
    let events = table.settle_all().await;
    assert!(events.contains(&ViewerEvent::Discarded { page: 2 }));
    assert_eq!(table.mode(), ViewerMode::Browse);
    assert_eq!(ids(table.rows()), vec!["f1-1", "f1-2"]);
}

#[tokio::test]
async fn test_load_more_failure_keeps_shown_rows() {
    let source = Arc::new(ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 6)));
    source.fail("f1.xlsx", 2);

    let mut table = PagedTable::with_shared(Arc::clone(&source), 2);
    table.select_target("f1.xlsx", "S1");
    table.settle_all().await;
    assert!(table.near_bottom());

    let events = table.settle_all().await;
    assert_eq!(
        events,
        vec![ViewerEvent::LoadFailed {
            page: 2,
            error: FetchError::Transport("connection reset".into())
        }]
    );
    assert_eq!(ids(table.rows()), vec!["f1-1", "f1-2"]);
    assert_eq!(table.state().current_page, 1);
    assert!(!table.is_loading_more());
    assert_eq!(source.calls_for(2), 1);
}

#[tokio::test]
async fn test_first_page_logical_error_shows_empty_table() {
    let source = ScriptedRows::default();
    let mut table = PagedTable::new(source, 2);
    table.select_target("gone.xlsx", "S1");
    let events = table.settle_all().await;

    assert_eq!(
        events,
        vec![ViewerEvent::LoadFailed {
            page: 1,
            error: FetchError::Logical("File not found".into())
        }]
    );
    assert!(table.rows().is_empty());
    assert!(table.columns().is_empty());
    assert!(!table.near_bottom());
}

#[tokio::test]
async fn test_single_page_sheet_never_fetches_again() {
    let source = Arc::new(ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 3)));
    let mut table = PagedTable::with_shared(Arc::clone(&source), 20);
    table.select_target("f1.xlsx", "S1");
    scroll_to_end(&mut table).await;

    assert_eq!(table.state().total_pages, 1);
    assert!(!table.near_bottom());
    assert_eq!(source.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_search_result_stops_paging() {
    let source = ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 3));
    let mut table = PagedTable::new(source, 2);
    table.select_target("f1.xlsx", "S1");
    table.submit_search("nobody");
    table.settle_all().await;

    assert!(table.rows().is_empty());
    assert_eq!(table.state().total_pages, 1);
    assert!(!table.has_more());
}

#[tokio::test]
async fn test_drain_applies_ready_outcomes() {
    let source = ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 3));
    let mut table = PagedTable::new(source, 2);
    table.select_target("f1.xlsx", "S1");

    let mut events = Vec::new();
    while table.pending_fetches() > 0 {
        tokio::task::yield_now().await;
        events.extend(table.drain());
    }
    assert_eq!(events, vec![ViewerEvent::PageLoaded { page: 1, rows: 2 }]);
    assert!(table.drain().is_empty());
}

#[tokio::test]
async fn test_reselecting_same_target_resets_search() {
    let source = ScriptedRows::default().with_sheet("f1.xlsx", "S1", customers("f1", 6));
    let mut table = PagedTable::new(source, 2);
    table.select_target("f1.xlsx", "S1");
    table.submit_search("churned");
    table.settle_all().await;

    assert!(table.select_target("f1.xlsx", "S1"));
    assert_eq!(table.mode(), ViewerMode::Browse);
    assert_eq!(table.search_input(), "");
    table.settle_all().await;
    assert_eq!(ids(table.rows()), vec!["f1-1", "f1-2"]);
}
