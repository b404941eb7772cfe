//! # spacefold Core
//!
//! Core types shared by every spacefold crate:
//!
//! - [`Vector`] - Dense vector with negative-filter dimensions and an exact
//!   normalization inverse
//! - [`Weighted`] - An item with the weight it contributes with
//! - [`EntityId`] / [`NodeId`] - Record and graph node identifiers
//! - [`FieldValue`] - Typed record field values
//! - [`ComparisonOperation`] - Field predicates used by effects and searches
//!
//! ## Example
//!
//! ```rust
//! use spacefold_core::Vector;
//!
//! let v = Vector::new(vec![3.0, 4.0]);
//! let normalized = v.normalize(v.norm());
//! assert_eq!(normalized.denormalizer(), 5.0);
//!
//! let restored = normalized.denormalize();
//! assert!((restored.as_slice()[0] - 3.0).abs() < 1e-6);
//!
//! // parts that are all zero do not shrink the combined vector
//! let combined = Vector::concatenate_with_compensation(
//!     &[normalized, Vector::zeros(3)],
//!     &[2, 3],
//!     &[1.0, 1.0],
//! ).unwrap();
//! assert_eq!(combined.dim(), 5);
//! ```

pub mod error;
pub mod field;
pub mod filter;
pub mod id;
pub mod value;
pub mod vector;
pub mod weighted;

pub use error::{Error, Result};
pub use field::{FieldType, FieldValue};
pub use filter::{ComparisonOp, ComparisonOperation, Filter};
pub use id::{EntityId, NodeId};
pub use value::NodeValue;
pub use vector::Vector;
pub use weighted::{Weighted, DEFAULT_WEIGHT};
