//! Indexing Queue (C5), Pipeline Coordinator (C6) and Startup/Self-Heal
//! (C8). Self-heal's resume and orphan-repair steps re-enqueue into the
//! same `IndexingQueue` the coordinator drains, so the three live in one
//! crate.

pub mod coordinator;
mod hash;
pub mod queue;
pub mod self_heal;

pub use coordinator::{PipelineConfig, PipelineCoordinator, PipelineError};
pub use hash::hash_file;
pub use queue::IndexingQueue;
pub use self_heal::{run_startup_self_heal, validate_config, SelfHealConfig, SelfHealOptions, SelfHealReport};
