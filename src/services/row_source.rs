//! Sources of paged sheet rows
//!
//! A [`RowSource`] answers one [`PageRequest`] at a time. The sheet source
//! pages on the backend; the prediction source fetches every scored row once
//! and pages it locally.

use crate::core::{cell_text, FetchResult, PageRequest, PageResult, Row, Selection};
use crate::services::dashboard_client::{DashboardClient, PredictionSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Anything that can serve one page of rows for a viewer
pub trait RowSource: Send + Sync + 'static {
    fn fetch_page(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = FetchResult<PageResult>> + Send;
}

/// Sheet rows paged and searched by the backend
#[derive(Debug, Clone)]
pub struct SheetRows {
    client: DashboardClient,
}

impl SheetRows {
    pub fn new(client: DashboardClient) -> Self {
        Self { client }
    }
}

impl RowSource for SheetRows {
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<PageResult> {
        self.client.sheet_page(request).await
    }
}

/// Churn predictions, fetched whole and paged locally
///
/// Page 1 always refetches so a new session sees fresh scores; later pages
/// reuse the set fetched for the same selection.
#[derive(Debug)]
pub struct PredictionRows {
    client: DashboardClient,
    cached: Mutex<Option<(Selection, Arc<PredictionSet>)>>,
}

impl PredictionRows {
    pub fn new(client: DashboardClient) -> Self {
        Self {
            client,
            cached: Mutex::new(None),
        }
    }

    /// Model accuracy reported with the most recently fetched predictions
    pub fn last_accuracy(&self) -> Option<f64> {
        let guard = self.cached.lock().ok()?;
        let accuracy = guard.as_ref().and_then(|(_, set)| set.accuracy);
        accuracy
    }

    fn cached_for(&self, selection: &Selection) -> Option<Arc<PredictionSet>> {
        let guard = self.cached.lock().ok()?;
        match guard.as_ref() {
            Some((sel, set)) if sel == selection => Some(Arc::clone(set)),
            _ => None,
        }
    }

    fn store(&self, selection: Selection, set: Arc<PredictionSet>) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some((selection, set));
        }
    }
}

impl RowSource for PredictionRows {
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<PageResult> {
        let selection = Selection {
            dataset: request.dataset.clone(),
            sheet: request.sheet.clone(),
        };
        let cached = if request.page > 1 {
            self.cached_for(&selection)
        } else {
            None
        };
        let set = match cached {
            Some(set) => set,
            None => {
                debug!("PredictionRows fetching predictions for {}", selection);
                let set = Arc::new(
                    self.client
                        .predictions(&request.dataset, &request.sheet)
                        .await?,
                );
                self.store(selection, Arc::clone(&set));
                set
            }
        };
        Ok(page_locally(&set.columns, &set.rows, request))
    }
}

/// True when any cell of `row` contains `needle` (already lowercased)
pub fn row_matches(row: &Row, needle: &str) -> bool {
    row.values()
        .any(|v| cell_text(v).to_lowercase().contains(needle))
}

/// Serve `request` from rows already in memory
///
/// Search requests keep rows where any cell contains the term,
/// case-insensitively. A zero page size puts everything on one page.
pub fn page_locally(columns: &[String], rows: &[Row], request: &PageRequest) -> PageResult {
    let matching: Vec<&Row> = if request.is_search() {
        let needle = request.search_term.to_lowercase();
        rows.iter().filter(|r| row_matches(r, &needle)).collect()
    } else {
        rows.iter().collect()
    };

    let page_size = if request.page_size == 0 {
        matching.len().max(1)
    } else {
        request.page_size
    };
    let total_pages = matching.len().div_ceil(page_size);
    let start = request.page.saturating_sub(1).saturating_mul(page_size);
    let rows = matching
        .into_iter()
        .skip(start)
        .take(page_size)
        .cloned()
        .collect();

    PageResult {
        columns: columns.to_vec(),
        rows,
        total_pages,
    }
    .normalized()
}
