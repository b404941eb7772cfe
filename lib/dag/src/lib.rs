//! # spacefold DAG
//!
//! An index compiles its spaces and effects into a DAG of [`Node`]s:
//!
//! ```text
//! schema_field ─> [chunking] ─> embedding ─┬────────────────> concatenation ─> index
//!                                          └─> aggregation ─┘
//!                  event_aggregation ─────────────┘
//! ```
//!
//! Node ids are structural, so the same space applied to the same schema
//! is one shared node. [`EvaluationPlan`] groups the nodes needed for one
//! schema into levels that can be evaluated leaf to root.

pub mod effect;
pub mod graph;
pub mod index;
pub mod node;

pub use effect::{Effect, IndexConfig, SchemaReference};
pub use graph::{collect_ancestors, Dag, DagBuilder, EvaluationPlan, PlannedNode, MAX_DAG_DEPTH};
pub use index::{Index, IndexBuilder};
pub use node::{EventAggregationParams, Node, NodeKind, NODE_ID_VERSION};
