//! Format E — the compact, line-oriented diff language used to describe
//! mutations to a systems-engineering graph.
//!
//! A Format E block lives inside `<operations>…</operations>` and contains,
//! in order, an optional `<base_snapshot>` line, an optional
//! `<view_context>` line, and `## Nodes` / `## Edges` sections whose lines
//! apply top to bottom. See [`parser::parse_diff`] for the grammar and
//! [`serializer`] for the write side.

pub mod diff;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod serializer;
pub mod types;

pub use diff::{EdgeOp, FormatEDiff, NodeOp, SnapshotEdge, SnapshotNode};
pub use error::{FormatEError, Result};
pub use parser::parse_diff;
pub use serializer::{serialize_diff, serialize_graph};
pub use types::{EdgeType, NodeType};
