mod file_config;

pub use file_config::{AutomationConfig, FileConfig, LlmConfig, PipelineSeedConfig};

use crate::automation::GenerationSettings;
use crate::automation_store::{BatchParams, Cadence, PipelineId, PipelineSettings};
use crate::llm::ApiKeySource;
use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub metrics_port: u16,
    pub llm: LlmSettings,
    pub automation: AutomationSettings,
    /// Initial settings written for pipelines that have no stored row.
    pub pipeline_seeds: Vec<PipelineSettings>,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: ApiKeySource,
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone)]
pub struct AutomationSettings {
    /// Re-check interval for a disabled pipeline.
    pub disabled_recheck: Duration,
    /// Bound on a single generation call.
    pub item_timeout: Duration,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            disabled_recheck: Duration::from_secs(3600),
            item_timeout: Duration::from_secs(120),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow!("db_dir must be specified via --db-dir or in config file"))?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let llm = resolve_llm(file.llm.unwrap_or_default());

        let automation_file = file.automation.unwrap_or_default();
        let defaults = AutomationSettings::default();
        let automation = AutomationSettings {
            disabled_recheck: automation_file
                .disabled_recheck_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.disabled_recheck),
            item_timeout: automation_file
                .item_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.item_timeout),
        };

        let mut pipeline_seeds = Vec::with_capacity(file.pipelines.len());
        for (key, seed) in file.pipelines {
            let pipeline_id = PipelineId::parse(&key)
                .ok_or_else(|| anyhow!("Unknown pipeline in config: {}", key))?;
            pipeline_seeds.push(resolve_seed(pipeline_id, seed)?);
        }
        pipeline_seeds.sort_by_key(|s| s.pipeline_id);

        Ok(Self {
            db_dir,
            metrics_port,
            llm,
            automation,
            pipeline_seeds,
        })
    }

    pub fn automation_db_path(&self) -> PathBuf {
        self.db_dir.join("automation.db")
    }

    pub fn content_db_path(&self) -> PathBuf {
        self.db_dir.join("content.db")
    }
}

fn resolve_llm(file: LlmConfig) -> LlmSettings {
    // An explicit key wins over a key command, which wins over an env var.
    let api_key = if file.unauthenticated.unwrap_or(false) {
        ApiKeySource::None
    } else {
        match (file.api_key, file.api_key_command, file.api_key_env) {
            (Some(key), _, _) => ApiKeySource::Static(key),
            (None, Some(command), _) => ApiKeySource::Command(command),
            (None, None, Some(var)) => ApiKeySource::Env(var),
            (None, None, None) => ApiKeySource::Env(DEFAULT_API_KEY_ENV.to_string()),
        }
    };

    let defaults = GenerationSettings::default();
    LlmSettings {
        base_url: file
            .base_url
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
        api_key,
        generation: GenerationSettings {
            model: file.model.unwrap_or(defaults.model),
            temperature: file.temperature.unwrap_or(defaults.temperature),
            max_tokens: file.max_tokens.or(defaults.max_tokens),
            request_timeout: file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        },
    }
}

fn resolve_seed(pipeline_id: PipelineId, seed: PipelineSeedConfig) -> Result<PipelineSettings> {
    let mut settings = PipelineSettings::defaults(pipeline_id);
    if let Some(enabled) = seed.enabled {
        settings.enabled = enabled;
    }
    if let Some(cadence) = seed.cadence {
        settings.cadence = Cadence::parse(&cadence)
            .ok_or_else(|| anyhow!("Invalid cadence for {}: {}", pipeline_id, cadence))?;
    }
    if let Some(batch) = seed.batch {
        settings.batch_params = BatchParams::from_json(pipeline_id, Some(&batch.to_string()));
    }
    Ok(settings)
}
