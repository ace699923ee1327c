pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::{gemini::GeminiApi, log_book::LogBook, sheet::Sheet, storage::LocalStorage};
pub use app::{EnrichApp, RunReport};
pub use config::EnrichConfig;
pub use core::batch::BatchRunner;
pub use utils::error::{EnrichError, Result};
