use serde::{Deserialize, Serialize};

/// Credentials and endpoints for the model providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI key; without it OpenAI agents fail every execution.
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// OpenAI API root.
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    /// Anthropic key; without it Anthropic agents fail every execution.
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    /// Anthropic API root.
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    /// Ollama server root.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
    /// Simulated latency of the custom provider.
    #[serde(default = "default_custom_latency_ms")]
    pub custom_latency_ms: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_custom_latency_ms() -> u64 {
    500
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            anthropic_api_key: None,
            anthropic_base_url: default_anthropic_base_url(),
            ollama_base_url: default_ollama_base_url(),
            custom_latency_ms: default_custom_latency_ms(),
        }
    }
}
