pub mod json_array;
pub mod paginator;

pub use json_array::{JsonArraySink, STREAM_ERROR_MARKER};
pub use paginator::{PageSink, PaginatedTransfer, TransferSummary};
