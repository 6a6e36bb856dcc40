//! The filesystem-queued audio pipeline.
//!
//! Producer and consumer share nothing but three directories:
//!
//! ```text
//! capture ──> unprocessed/ ──> stage/sounds.wav ──> engine ──> transcript
//!                  │                  │
//!                  └──────> archive/ <┘
//! ```
//!
//! Every cross-component handoff is create-then-rename-never-edit: a file
//! is either fully at its old path or fully at its new one. That single
//! discipline is the pipeline's only synchronization primitive.

pub mod aggregator;
pub mod driver;
pub mod lifecycle;
pub mod segment;

// Re-export key types
pub use aggregator::{Aggregator, MergeError, MergedBatch};
pub use driver::Driver;
pub use lifecycle::{ArchiveError, Archiver, SweepReport};
pub use segment::Segment;
