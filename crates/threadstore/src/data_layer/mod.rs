//! The single-table data-access layer.
//!
//! Heterogeneous entities live in one table, distinguished by key prefixing
//! rather than a type column. The facade in [`layer`] composes the pure
//! pieces: key codec, marshaller, mutation planner, cursor codec and
//! aggregator.

pub mod aggregate;
pub mod conversions;
pub mod cursor;
pub mod expressions;
pub mod keys;
mod layer;

pub use layer::DataLayer;
