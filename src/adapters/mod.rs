// Adapters layer: concrete implementations for external systems (storage, sheet, http, log).

pub mod document;
pub mod gemini;
pub mod log_book;
pub mod sheet;
pub mod storage;
