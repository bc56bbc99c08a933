//! Tool and resource protocol server.
//!
//! Services register [`McpTool`]s and [`McpResource`]s on an [`McpServer`]
//! and mount [`McpServer::router`]:
//!
//! - `GET /health`
//! - `GET /mcp/info`: server identity and catalogue
//! - `POST /mcp/tool/{name}`: invoke a tool with a JSON body
//! - `GET /mcp/resource/{name}[/{uri}]`: read a resource

/// HTTP routes and the server registry.
pub mod server;
/// Tool and resource traits.
pub mod tool;

pub use server::{McpServer, ServerInfo};
pub use tool::{parse_input, McpResource, McpTool, ResourceDescriptor, ToolDescriptor};
