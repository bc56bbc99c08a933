//! HTTP transport and tool/resource registry.

use crate::tool::{McpResource, McpTool, ResourceDescriptor, ToolDescriptor};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use brandmesh_core::{BrandmeshError, BrandmeshResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Identity reported by `/mcp/info` and `/health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Service name, also reported by `/health`.
    pub name: String,
    /// Semantic version string.
    pub version: String,
    /// One-line summary.
    pub description: String,
}

impl ServerInfo {
    /// Build an identity from any string-like parts.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Tool and resource registry served over HTTP.
pub struct McpServer {
    info: ServerInfo,
    tools: BTreeMap<String, Arc<dyn McpTool>>,
    resources: BTreeMap<String, Arc<dyn McpResource>>,
}

impl McpServer {
    /// Empty server with the given identity.
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            tools: BTreeMap::new(),
            resources: BTreeMap::new(),
        }
    }

    /// Server identity.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Add a tool; a later tool with the same name replaces the earlier one.
    pub fn register_tool(&mut self, tool: Arc<dyn McpTool>) {
        let name = tool.descriptor().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Add a resource; a later resource with the same name replaces the earlier one.
    pub fn register_resource(&mut self, resource: Arc<dyn McpResource>) {
        let name = resource.descriptor().name.clone();
        info!(resource = %name, "Registered resource");
        self.resources.insert(name, resource);
    }

    /// Tool descriptors sorted by name.
    pub fn tool_descriptors(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// Resource descriptors sorted by name.
    pub fn resource_descriptors(&self) -> Vec<&ResourceDescriptor> {
        self.resources.values().map(|r| r.descriptor()).collect()
    }

    /// Server identity plus every tool and resource.
    pub fn catalogue(&self) -> Value {
        json!({
            "name": self.info.name,
            "version": self.info.version,
            "description": self.info.description,
            "tools": self.tool_descriptors(),
            "resources": self.resource_descriptors(),
        })
    }

    /// Invoke a tool by name.
    pub async fn call_tool(&self, name: &str, input: Value) -> BrandmeshResult<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| BrandmeshError::NotFound(format!("Tool '{name}' not found")))?;
        tool.call(input).await
    }

    /// Read a resource by name.
    pub async fn read_resource(&self, name: &str, uri: Option<&str>) -> BrandmeshResult<Value> {
        let resource = self
            .resources
            .get(name)
            .ok_or_else(|| BrandmeshError::NotFound(format!("Resource '{name}' not found")))?;
        resource.read(uri).await
    }

    /// HTTP routes for this server.
    pub fn router(self) -> Router {
        let state = Arc::new(self);
        Router::new()
            .route("/health", get(health_handler))
            .route("/mcp/info", get(info_handler))
            .route("/mcp/tool/{tool_name}", post(tool_handler))
            .route("/mcp/resource/{name}", get(resource_handler))
            .route("/mcp/resource/{name}/{*uri}", get(resource_uri_handler))
            .with_state(state)
    }
}

/// Error body `{error}` with a status derived from the error kind.
struct ApiError(BrandmeshError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            BrandmeshError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            BrandmeshError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            e => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<BrandmeshError> for ApiError {
    fn from(e: BrandmeshError) -> Self {
        Self(e)
    }
}

async fn health_handler(State(server): State<Arc<McpServer>>) -> Json<Value> {
    Json(json!({"status": "ok", "service": server.info.name}))
}

async fn info_handler(State(server): State<Arc<McpServer>>) -> Json<Value> {
    Json(server.catalogue())
}

async fn tool_handler(
    State(server): State<Arc<McpServer>>,
    Path(tool_name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| BrandmeshError::Validation(format!("Invalid JSON body: {e}")))?
    };

    match server.call_tool(&tool_name, input).await {
        Ok(output) => Ok(Json(output)),
        Err(e) => {
            warn!(tool = %tool_name, error = %e, "Tool call failed");
            Err(e.into())
        }
    }
}

async fn resource_handler(
    State(server): State<Arc<McpServer>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(server.read_resource(&name, None).await?))
}

async fn resource_uri_handler(
    State(server): State<Arc<McpServer>>,
    Path((name, uri)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(server.read_resource(&name, Some(&uri)).await?))
}
