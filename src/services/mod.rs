pub mod inflight;
pub mod normalize;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod validation;
pub mod vector_index;

pub use inflight::InFlight;
pub use orchestrator::{Orchestrator, PipelineSettings};
pub use vector_index::{SyncReport, VectorIndex};
