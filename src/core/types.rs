use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use strum::{Display, EnumString};

/// One row of a sheet, keyed by column name in response order
pub type Row = Map<String, Value>;

/// A (dataset, sheet) pair a viewer is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    pub dataset: String,
    pub sheet: String,
}

impl Selection {
    /// Build a selection, returning None when either side is blank
    pub fn new<D: Into<String>, S: Into<String>>(dataset: D, sheet: S) -> Option<Self> {
        let dataset = dataset.into();
        let sheet = sheet.into();
        if dataset.trim().is_empty() || sheet.trim().is_empty() {
            return None;
        }
        Some(Self { dataset, sheet })
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset, self.sheet)
    }
}

/// Whether a viewer pages through the whole sheet or through search hits
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum ViewerMode {
    #[default]
    Browse,
    Search,
}

/// Identifies exactly one page fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub dataset: String,
    pub sheet: String,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
    /// Empty means an unfiltered browse
    pub search_term: String,
}

impl PageRequest {
    pub fn new(selection: &Selection, page: usize, page_size: usize, search_term: &str) -> Self {
        Self {
            dataset: selection.dataset.clone(),
            sheet: selection.sheet.clone(),
            page,
            page_size,
            search_term: search_term.to_string(),
        }
    }

    pub fn is_search(&self) -> bool {
        !self.search_term.is_empty()
    }
}

/// One page of rows as returned by a row source
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageResult {
    pub columns: Vec<String>,
    #[serde(rename = "preview")]
    pub rows: Vec<Row>,
    pub total_pages: usize,
}

impl PageResult {
    /// The backend reports zero pages for an empty result; viewers always see at least one
    pub fn normalized(mut self) -> Self {
        self.total_pages = self.total_pages.max(1);
        self
    }
}

/// Column names that mark a sheet as carrying a churn label
pub const CHURN_COLUMNS: [&str; 3] = ["Chrn Flag", "Churn", "Churn Flag"];

/// True when any of `columns` is a known churn label column
pub fn has_churn_column<S: AsRef<str>>(columns: &[S]) -> bool {
    columns
        .iter()
        .any(|c| CHURN_COLUMNS.contains(&c.as_ref()))
}

/// Render a cell the way the preview table shows it
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
