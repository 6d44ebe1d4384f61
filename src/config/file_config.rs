use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub metrics_port: Option<u16>,

    pub llm: Option<LlmConfig>,
    pub automation: Option<AutomationConfig>,
    /// Initial settings per pipeline id, applied when no stored row exists.
    pub pipelines: HashMap<String, PipelineSeedConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub api_key_command: Option<String>,
    /// Send no Authorization header, for local endpoints such as Ollama.
    pub unauthenticated: Option<bool>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AutomationConfig {
    pub disabled_recheck_secs: Option<u64>,
    pub item_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PipelineSeedConfig {
    pub enabled: Option<bool>,
    pub cadence: Option<String>,
    /// Batch parameters, same fields as the stored JSON payload.
    pub batch: Option<serde_json::Value>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
