//! Tool System - descriptors, sources, MCP client, and per-call catalog

mod catalog;
mod definition;
mod mcp;
mod source;

pub use catalog::{CatalogLoader, ToolCatalog};
pub use definition::ToolDescriptor;
pub use mcp::{McpClient, McpConnector, McpRequest, McpResponse, normalize_tool_result};
pub use source::{StaticConnector, StaticToolSource, ToolSource, ToolSourceConfig, ToolSourceConnector};
