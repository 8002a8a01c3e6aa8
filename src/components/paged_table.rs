use crate::core::{FetchError, FetchResult, PageRequest, PageResult, Row, Selection, ViewerMode};
use crate::services::row_source::RowSource;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, trace, warn};

/// Observable state of one viewer
///
/// Only [`PagedTable`] mutates this; the display layer reads it through
/// [`PagedTable::state`].
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub selection: Option<Selection>,
    pub mode: ViewerMode,
    /// Committed search term, empty in Browse mode
    pub search_term: String,
    pub current_page: usize,
    pub total_pages: usize,
    /// Append-only within a session
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    pub initial_load_in_flight: bool,
    pub more_load_in_flight: bool,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            selection: None,
            mode: ViewerMode::Browse,
            search_term: String::new(),
            current_page: 1,
            total_pages: 1,
            rows: Vec::new(),
            columns: Vec::new(),
            initial_load_in_flight: false,
            more_load_in_flight: false,
        }
    }
}

/// What a fetch was issued for
///
/// A session starts on every selection, mode or search term change, so a
/// ticket from an older session can never match the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub session: u64,
    pub selection: Selection,
    pub mode: ViewerMode,
    pub search_term: String,
    pub page: usize,
}

impl FetchTicket {
    fn request(&self, page_size: usize) -> PageRequest {
        PageRequest::new(&self.selection, self.page, page_size, &self.search_term)
    }
}

/// A completed fetch on its way back to the controller
#[derive(Debug)]
pub struct FetchOutcome {
    pub ticket: FetchTicket,
    pub result: FetchResult<PageResult>,
}

/// What applying a fetch outcome did to the viewer
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// Page rows replaced (page 1) or were appended to the table
    PageLoaded { page: usize, rows: usize },
    /// The fetch failed; page 1 leaves an empty table, later pages keep what is shown
    LoadFailed { page: usize, error: FetchError },
    /// The outcome belonged to an older selection, mode or term and was dropped
    Discarded { page: usize },
}

/// Paged table controller
///
/// Owns the page and search state of one viewer, issues fetches against a
/// [`RowSource`] and folds their outcomes back in. Fetches run as tokio tasks,
/// so operations that issue one must be called inside a runtime. Outcomes are
/// applied by [`settle`](Self::settle) or [`drain`](Self::drain).
pub struct PagedTable<S: RowSource> {
    source: Arc<S>,
    page_size: usize,
    state: ViewerState,
    session: u64,
    search_input: String,
    pending: usize,
    tx: UnboundedSender<FetchOutcome>,
    rx: UnboundedReceiver<FetchOutcome>,
}

impl<S: RowSource> PagedTable<S> {
    pub fn new(source: S, page_size: usize) -> Self {
        Self::with_shared(Arc::new(source), page_size)
    }

    /// Build a viewer over a source shared with other viewers
    pub fn with_shared(source: Arc<S>, page_size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source,
            page_size,
            state: ViewerState::default(),
            session: 0,
            search_input: String::new(),
            pending: 0,
            tx,
            rx,
        }
    }

    /// The row source this viewer fetches from
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn columns(&self) -> &[String] {
        &self.state.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.state.rows
    }

    pub fn mode(&self) -> ViewerMode {
        self.state.mode
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    pub fn is_idle(&self) -> bool {
        self.state.selection.is_none()
    }

    pub fn is_initial_loading(&self) -> bool {
        self.state.initial_load_in_flight
    }

    pub fn is_loading_more(&self) -> bool {
        self.state.more_load_in_flight
    }

    /// More pages exist past the ones shown
    pub fn has_more(&self) -> bool {
        self.state.selection.is_some() && self.state.current_page < self.state.total_pages
    }

    /// Fetches issued whose outcome has not been applied yet
    pub fn pending_fetches(&self) -> usize {
        self.pending
    }

    /// Bind the viewer to a (dataset, sheet) pair and load its first page
    ///
    /// Resets to Browse mode with no search. Returns false, changing nothing,
    /// when either side is blank.
    pub fn select_target(&mut self, dataset: &str, sheet: &str) -> bool {
        let Some(selection) = Selection::new(dataset, sheet) else {
            debug!("PagedTable ignoring empty selection {:?}/{:?}", dataset, sheet);
            return false;
        };
        info!("PagedTable selecting {}", selection);
        self.search_input.clear();
        self.state.selection = Some(selection);
        self.state.mode = ViewerMode::Browse;
        self.state.search_term.clear();
        self.start_session();
        true
    }

    /// Unbind the viewer; nothing is shown or fetched until the next selection
    pub fn clear_target(&mut self) {
        self.session += 1;
        self.search_input.clear();
        self.state = ViewerState::default();
    }

    /// Switch to Search mode for `term` and load its first page
    ///
    /// A blank term, or a viewer with no selection, leaves the state untouched.
    pub fn submit_search(&mut self, term: &str) -> bool {
        let trimmed = term.trim();
        if trimmed.is_empty() || self.state.selection.is_none() {
            trace!("PagedTable ignoring search {:?}", term);
            return false;
        }
        if self.search_input.is_empty() {
            self.search_input = term.to_string();
        }
        info!("PagedTable searching {:?}", trimmed);
        self.state.mode = ViewerMode::Search;
        self.state.search_term = trimmed.to_string();
        self.start_session();
        true
    }

    /// Leave Search mode and reload the first unfiltered page
    pub fn clear_search(&mut self) -> bool {
        if self.state.selection.is_none() || self.state.mode != ViewerMode::Search {
            return false;
        }
        info!("PagedTable clearing search {:?}", self.state.search_term);
        self.state.mode = ViewerMode::Browse;
        self.state.search_term.clear();
        self.start_session();
        true
    }

    /// Record the search box contents
    ///
    /// Emptying a non-empty box while searching clears the search. Returns
    /// true when that happened.
    pub fn set_search_input(&mut self, text: &str) -> bool {
        let previous = std::mem::replace(&mut self.search_input, text.to_string());
        if !previous.is_empty() && text.is_empty() && self.state.mode == ViewerMode::Search {
            return self.clear_search();
        }
        false
    }

    /// Load the page after the last one shown
    ///
    /// Does nothing while any fetch for this viewer is in flight or once the
    /// last page is shown, so bursts of triggers issue at most one fetch.
    pub fn request_next_page(&mut self) -> bool {
        if self.state.selection.is_none() {
            return false;
        }
        if self.state.initial_load_in_flight || self.state.more_load_in_flight {
            trace!("PagedTable next page suppressed, fetch in flight");
            return false;
        }
        if self.state.current_page >= self.state.total_pages {
            trace!(
                "PagedTable exhausted at page {}/{}",
                self.state.current_page,
                self.state.total_pages
            );
            return false;
        }
        self.state.more_load_in_flight = true;
        self.spawn_fetch(self.state.current_page + 1);
        true
    }

    /// Event sink for the display layer's scroll-proximity signal
    pub fn near_bottom(&mut self) -> bool {
        self.request_next_page()
    }

    /// Wait for the next fetch outcome and apply it
    ///
    /// Returns None straight away when nothing is pending.
    pub async fn settle(&mut self) -> Option<ViewerEvent> {
        if self.pending == 0 {
            return None;
        }
        let outcome = self.rx.recv().await?;
        self.pending -= 1;
        Some(self.apply(outcome))
    }

    /// Apply every outcome that has already arrived, without waiting
    pub fn drain(&mut self) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            self.pending = self.pending.saturating_sub(1);
            events.push(self.apply(outcome));
        }
        events
    }

    /// Wait until no fetch is pending, returning every event applied
    pub async fn settle_all(&mut self) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.settle().await {
            events.push(event);
        }
        events
    }

    fn start_session(&mut self) {
        self.session += 1;
        self.state.rows.clear();
        self.state.columns.clear();
        self.state.current_page = 1;
        self.state.total_pages = 1;
        self.state.initial_load_in_flight = true;
        self.state.more_load_in_flight = false;
        self.spawn_fetch(1);
    }

    fn spawn_fetch(&mut self, page: usize) {
        let Some(selection) = self.state.selection.clone() else {
            return;
        };
        let ticket = FetchTicket {
            session: self.session,
            selection,
            mode: self.state.mode,
            search_term: self.state.search_term.clone(),
            page,
        };
        let request = ticket.request(self.page_size);
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        self.pending += 1;
        debug!("PagedTable fetch issued: {:?}", ticket);

        tokio::spawn(async move {
            // a panicking source still has to release its pending slot
            let result = AssertUnwindSafe(source.fetch_page(&request))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(FetchError::Transport(format!(
                        "row source panicked fetching page {}",
                        request.page
                    )))
                });
            // a dropped viewer no longer cares about the outcome
            let _ = tx.send(FetchOutcome { ticket, result });
        });
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        if ticket.session != self.session
            || self.state.selection.as_ref() != Some(&ticket.selection)
            || self.state.mode != ticket.mode
            || self.state.search_term != ticket.search_term
        {
            return false;
        }
        if ticket.page == 1 {
            self.state.initial_load_in_flight
        } else {
            self.state.more_load_in_flight && ticket.page == self.state.current_page + 1
        }
    }

    fn apply(&mut self, outcome: FetchOutcome) -> ViewerEvent {
        let FetchOutcome { ticket, result } = outcome;
        let page = ticket.page;

        if !self.is_current(&ticket) {
            debug!("PagedTable discarding stale outcome: {:?}", ticket);
            return ViewerEvent::Discarded { page };
        }

        if page == 1 {
            self.state.initial_load_in_flight = false;
        } else {
            self.state.more_load_in_flight = false;
        }

        match result {
            Ok(result) => {
                let count = result.rows.len();
                self.state.columns = result.columns;
                if page == 1 {
                    self.state.rows = result.rows;
                } else {
                    self.state.rows.extend(result.rows);
                }
                self.state.total_pages = result.total_pages.max(1);
                self.state.current_page = page.min(self.state.total_pages);
                info!(
                    "PagedTable loaded page {}/{} ({} rows, {} shown)",
                    page,
                    self.state.total_pages,
                    count,
                    self.state.rows.len()
                );
                ViewerEvent::PageLoaded { page, rows: count }
            }
            Err(error) => {
                if page == 1 {
                    self.state.rows.clear();
                    self.state.columns.clear();
                    self.state.current_page = 1;
                    self.state.total_pages = 1;
                }
                warn!("PagedTable page {} failed: {}", page, error);
                ViewerEvent::LoadFailed { page, error }
            }
        }
    }
}
