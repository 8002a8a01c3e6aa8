pub mod error;
pub mod types;

pub use error::{parse_reply, FetchError, FetchResult};
pub use types::*;
