pub mod enrich;

pub use enrich::{EnrichApp, RunReport};
