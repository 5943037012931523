//! Core domain types for the retrieval pipeline.
//!
//! These types flow through every stage: queries and their metadata, query
//! vectors, per-chunk payloads and search hits. All of them are query-scoped
//! and dropped at the end of the request; nothing in this module holds
//! shared mutable state.

mod hit;
mod payload;
mod query;
mod vector;

pub use hit::Hit;
pub use payload::{ChunkPayload, ChunkSpan};
pub use query::{Query, UserMetadata};
pub use vector::{DenseVector, SparseVector};
