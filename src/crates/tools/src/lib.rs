//! Tool Registry and the `graph_query` tool.

pub mod error;
pub mod graph_query;
pub mod registry;

pub use error::{Result, ToolError};
pub use graph_query::{GraphQueryFilters, GraphQueryParams, GraphQueryTool, QueryType};
pub use registry::{GraphTool, ToolDefinition, ToolRegistry};
