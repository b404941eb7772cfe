//! # spacefold Storage
//!
//! The storage boundary: entity blobs, per-node results and side data, and
//! k-nearest-neighbour search over stored index vectors. [`InMemoryStore`]
//! is the in-process reference backend.

pub mod memory;
pub mod store;

pub use memory::InMemoryStore;
pub use store::{EntityStore, KnnSearch, SearchResult};
