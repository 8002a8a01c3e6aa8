pub mod components;
pub mod config;
pub mod core;
pub mod logging;
pub mod services;

// Re-export commonly used types
pub use crate::components::{PagedTable, ViewerEvent, ViewerState};
pub use crate::core::{FetchError, PageRequest, PageResult, Row, Selection, ViewerMode};
pub use crate::services::{ColumnSummary, DashboardClient, FrequencyService, RowSource};
