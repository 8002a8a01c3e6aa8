pub mod dashboard_client;
pub mod frequency_service;
pub mod row_source;

pub use dashboard_client::{DashboardClient, PredictionSet};
pub use frequency_service::{
    ChartEntry, ColumnSummary, Extremes, FrequencyMap, FrequencyService, SummaryOptions,
};
pub use row_source::{PredictionRows, RowSource, SheetRows};
