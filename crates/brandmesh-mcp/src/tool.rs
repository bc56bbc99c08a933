//! Tool and resource traits.

use async_trait::async_trait;
use brandmesh_core::{BrandmeshError, BrandmeshResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Public description of a tool, as listed by `/mcp/info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Route name under `/mcp/tool/`.
    pub name: String,
    /// Human-readable summary.
    pub description: String,
    /// JSON Schema of the tool input.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Public description of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Route name under `/mcp/resource/`.
    pub name: String,
    /// Human-readable summary.
    pub description: String,
}

/// A named operation callable over the protocol.
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Name, description and input schema.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Run the tool. `BrandmeshError::Validation` is reported to the caller
    /// as a bad request and `NotFound` as 404. Anything else is a server error.
    async fn call(&self, input: Value) -> BrandmeshResult<Value>;
}

/// A named read-only view, optionally addressed by a sub-path.
#[async_trait]
pub trait McpResource: Send + Sync {
    /// Name and description.
    fn descriptor(&self) -> &ResourceDescriptor;

    /// Current contents. `uri` is the path after the resource name, if any.
    async fn read(&self, uri: Option<&str>) -> BrandmeshResult<Value>;
}

/// Deserialize tool input, mapping failures to `Validation`.
pub fn parse_input<T: DeserializeOwned>(input: Value) -> BrandmeshResult<T> {
    serde_json::from_value(input).map_err(|e| BrandmeshError::Validation(e.to_string()))
}
