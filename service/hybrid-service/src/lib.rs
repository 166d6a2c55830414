//! Hybrid knowledge-base search service: wires the chunking-store,
//! indexing-pipeline and embedding-provider crates into the HTTP surface
//! and CLI described in spec §5/§6.

pub mod cache;
pub mod config;
pub mod error;
pub mod expansion;
pub mod fusion;
pub mod integrity;
pub mod routes;
pub mod search;
pub mod state;
pub mod watcher;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use state::AppState;
