use brandmesh_agents::ProviderConfig;
use brandmesh_core::{BrandmeshError, BrandmeshResult};
use brandmesh_queue::{QueueDefaults, RetentionPolicy};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Contents of `brandmesh.toml`. Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrandmeshConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,
    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,
    /// Register the workflow processor for `workflow_execution` jobs.
    #[serde(default = "default_true")]
    pub workflow_processor: bool,
    #[serde(default = "default_workflow_concurrency")]
    pub workflow_concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            redis_url: default_redis_url(),
            name: default_queue_name(),
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            workflow_processor: true,
            workflow_concurrency: default_workflow_concurrency(),
        }
    }
}

impl QueueConfig {
    pub fn defaults(&self) -> QueueDefaults {
        QueueDefaults {
            attempts: self.attempts,
            backoff_ms: self.backoff_ms,
            timeout_ms: self.timeout_ms,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            keep_completed: self.keep_completed,
            keep_failed: self.keep_failed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentsConfig {
    /// Seed the stock agent roster at startup.
    #[serde(default = "default_true")]
    pub register_defaults: bool,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            register_defaults: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3020
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_queue_name() -> String {
    "agent-orchestration".to_string()
}
fn default_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_timeout_ms() -> u64 {
    60_000
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_keep_completed() -> usize {
    100
}
fn default_keep_failed() -> usize {
    200
}
fn default_true() -> bool {
    true
}
fn default_workflow_concurrency() -> usize {
    1
}

impl BrandmeshConfig {
    /// Parse `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> BrandmeshResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            BrandmeshError::Config(format!("Failed to parse '{}': {e}", path.display()))
        })
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> BrandmeshResult<()> {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| BrandmeshError::Config(format!("Invalid PORT: {port}")))?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.queue.redis_url = url;
        }
        if let Some(backend) = lookup("QUEUE_BACKEND") {
            self.queue.backend = match backend.to_ascii_lowercase().as_str() {
                "redis" => LedgerBackend::Redis,
                "memory" => LedgerBackend::Memory,
                other => {
                    return Err(BrandmeshError::Config(format!(
                        "Invalid QUEUE_BACKEND: {other} (expected redis or memory)"
                    )))
                }
            };
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.providers.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.providers.anthropic_api_key = Some(key);
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.providers.ollama_base_url = url;
        }
        if let Some(flag) = lookup("REGISTER_DEFAULT_AGENTS") {
            self.agents.register_defaults = match flag.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => {
                    return Err(BrandmeshError::Config(format!(
                        "Invalid REGISTER_DEFAULT_AGENTS: {other}"
                    )))
                }
            };
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrandmeshConfig::load(&dir.path().join("brandmesh.toml")).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3020);
        assert_eq!(config.queue.backend, LedgerBackend::Redis);
        assert_eq!(config.queue.name, "agent-orchestration");
        assert_eq!(config.queue.retention().keep_failed, 200);
        assert_eq!(config.queue.defaults().backoff_ms, 1000);
        assert!(config.agents.register_defaults);
        assert_eq!(config.providers.custom_latency_ms, 500);
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 4000

[queue]
backend = "memory"
attempts = 5

[providers]
ollama_base_url = "http://ollama:11434"
"#
        )
        .unwrap();

        let config = BrandmeshConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.queue.backend, LedgerBackend::Memory);
        assert_eq!(config.queue.attempts, 5);
        assert_eq!(config.queue.timeout_ms, 60_000);
        assert_eq!(config.providers.ollama_base_url, "http://ollama:11434");
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"eighty\"").unwrap();
        let err = BrandmeshConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, BrandmeshError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "8080"),
            ("QUEUE_BACKEND", "memory"),
            ("OPENAI_API_KEY", "sk-env"),
            ("REGISTER_DEFAULT_AGENTS", "false"),
        ]);
        let mut config = BrandmeshConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.queue.backend, LedgerBackend::Memory);
        assert_eq!(config.providers.openai_api_key.as_deref(), Some("sk-env"));
        assert!(!config.agents.register_defaults);

        let mut config = BrandmeshConfig::default();
        let err = config
            .apply_env(|k| (k == "PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "Config error: Invalid PORT: not-a-port");
    }
}
