//! Re-exports the block representation shared with `chunk-model` so readers
//! in this crate don't need to depend on `chunk_model` directly for the one
//! type they actually build.

pub use chunk_model::{BlockKind, UnifiedBlock};
