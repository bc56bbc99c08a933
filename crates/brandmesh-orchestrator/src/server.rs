use crate::context::OrchestrationContext;
use crate::resources::all_resources;
use crate::tools::all_tools;
use brandmesh_mcp::{McpServer, ServerInfo};

/// Name reported by `/mcp/info` and `/health`.
pub const SERVER_NAME: &str = "agent-orchestration";
/// Protocol server version.
pub const SERVER_VERSION: &str = "0.1.0";
/// One-line description.
pub const SERVER_DESCRIPTION: &str = "AI Agent Orchestration Layer for multi-brand system";

/// Identity of the orchestration server.
pub fn server_info() -> ServerInfo {
    ServerInfo::new(SERVER_NAME, SERVER_VERSION, SERVER_DESCRIPTION)
}

/// Protocol server with every dispatch tool and resource registered.
pub fn build_server(ctx: &OrchestrationContext) -> McpServer {
    let mut server = McpServer::new(server_info());
    for tool in all_tools(ctx) {
        server.register_tool(tool);
    }
    for resource in all_resources(ctx) {
        server.register_resource(resource);
    }
    server
}
