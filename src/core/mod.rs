pub mod batch;
pub mod column_index;
pub mod model_client;
pub mod parser;
pub mod prompt;
pub mod row_processor;

pub use crate::domain::model::{BatchSummary, Field, Record, RowOutcome};
pub use crate::domain::ports::{GenerativeApi, LogSink, Storage, TabularStore};
pub use crate::utils::error::Result;
