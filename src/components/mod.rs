pub mod paged_table;

pub use paged_table::{FetchOutcome, FetchTicket, PagedTable, ViewerEvent, ViewerState};
