//! Progress tracking
//!
//! Per-video watch records roll up into per-course aggregates. The
//! aggregator is the only writer of aggregate completion state.

pub mod aggregator;
pub mod store;

pub use aggregator::{ProgressAggregator, VideoUpdateOutcome};
pub use store::{MongoProgressStore, MongoVideoProgressStore, ProgressStore, VideoProgressStore};
