use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use content_autopilot::automation::{
    all_pipelines, create_scheduler, Orchestrator, PipelineContext, PipelineRunner, RunGuards,
    SystemClock,
};
use content_autopilot::automation_store::{
    AutomationStore, BatchParams, Cadence, PipelineId, SettingsPatch, SqliteAutomationStore,
    MAX_HISTORY_PAGE_SIZE,
};
use content_autopilot::config::{self, AppConfig, FileConfig};
use content_autopilot::content_store::{ContentStore, SqliteContentStore};
use content_autopilot::llm::OpenAiGenerator;
use content_autopilot::{metrics, server};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_pipeline(s: &str) -> Result<PipelineId, String> {
    PipelineId::parse(s).ok_or_else(|| {
        let known: Vec<&str> = PipelineId::ALL.iter().map(|id| id.as_str()).collect();
        format!("unknown pipeline '{}', expected one of: {}", s, known.join(", "))
    })
}

fn parse_cadence(s: &str) -> Result<Cadence, String> {
    Cadence::parse(s)
        .ok_or_else(|| format!("unknown cadence '{}', expected daily, weekly or monthly", s))
}

#[derive(Parser, Debug)]
#[clap(version, about = "Scheduled content pipelines backed by a generative model")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (automation.db, content.db).
    /// Can also be specified in config file.
    #[clap(long, global = true, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, global = true, default_value_t = 9091)]
    pub metrics_port: u16,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler loops until interrupted.
    Serve,
    /// Run every enabled pipeline once, in order, and print the report.
    RunAll,
    /// Show the run ledger, newest first.
    History {
        #[clap(long, value_parser = parse_pipeline)]
        pipeline: Option<PipelineId>,
        #[clap(long, default_value_t = 1)]
        page: usize,
        #[clap(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Read or change pipeline settings.
    Settings {
        #[clap(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    Set {
        #[clap(value_parser = parse_pipeline)]
        pipeline: PipelineId,
        #[clap(long)]
        enabled: Option<bool>,
        #[clap(long, value_parser = parse_cadence)]
        cadence: Option<Cadence>,
        /// Batch parameters as JSON, e.g. '{"entries_per_run": 20}'.
        #[clap(long)]
        batch_json: Option<String>,
    },
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            metrics_port: args.metrics_port,
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let app_config = AppConfig::resolve(&(&cli_args).into(), file_config)?;

    info!(
        "Opening automation database at {:?}...",
        app_config.automation_db_path()
    );
    let automation_store: Arc<dyn AutomationStore> = Arc::new(
        SqliteAutomationStore::new(app_config.automation_db_path())
            .context("Failed to open automation store")?,
    );
    for seed in &app_config.pipeline_seeds {
        if automation_store.seed_settings(seed)? {
            info!(pipeline = %seed.pipeline_id, "Seeded pipeline settings from config");
        }
    }

    match cli_args.command {
        Command::History {
            pipeline,
            page,
            page_size,
        } => {
            let page_size = page_size.clamp(1, MAX_HISTORY_PAGE_SIZE);
            print_json(&automation_store.list_runs(pipeline, page.max(1), page_size)?)
        }
        Command::Settings { action } => match action {
            SettingsCommand::Show => print_json(&automation_store.get_all_settings()?),
            SettingsCommand::Set {
                pipeline,
                enabled,
                cadence,
                batch_json,
            } => {
                let batch_params = match batch_json {
                    Some(json) => {
                        serde_json::from_str::<serde_json::Value>(&json)
                            .context("--batch-json is not valid JSON")?;
                        Some(BatchParams::from_json(pipeline, Some(&json)))
                    }
                    None => None,
                };
                let patch = SettingsPatch {
                    enabled,
                    cadence,
                    batch_params,
                };
                print_json(&automation_store.update_settings(pipeline, &patch)?)
            }
        },
        Command::RunAll => {
            let runner = build_runner(&app_config, Arc::clone(&automation_store))?;
            let orchestrator = Orchestrator::new(all_pipelines(), automation_store, runner);
            let report = orchestrator.run_all().await;
            print_json(&report)?;
            if !report.success {
                bail!("One or more pipelines failed");
            }
            Ok(())
        }
        Command::Serve => serve(app_config, automation_store).await,
    }
}

fn build_runner(
    app_config: &AppConfig,
    automation_store: Arc<dyn AutomationStore>,
) -> Result<Arc<PipelineRunner>> {
    info!(
        "Opening content database at {:?}...",
        app_config.content_db_path()
    );
    let content_store: Arc<dyn ContentStore> = Arc::new(
        SqliteContentStore::new(app_config.content_db_path())
            .context("Failed to open content store")?,
    );
    let counts = content_store.counts()?;
    info!(
        tools = counts.tools,
        reviews = counts.reviews,
        templates = counts.templates,
        content = counts.generated_content,
        "Content store ready"
    );

    info!(
        base_url = %app_config.llm.base_url,
        model = %app_config.llm.generation.model,
        "Using OpenAI-compatible generator"
    );
    let generator = Arc::new(OpenAiGenerator::new(
        app_config.llm.base_url.clone(),
        app_config.llm.api_key.clone(),
    ));

    let ctx = Arc::new(PipelineContext::new(
        content_store,
        generator,
        Arc::new(SystemClock),
        app_config.llm.generation.clone(),
        app_config.automation.item_timeout,
    ));
    Ok(Arc::new(PipelineRunner::new(
        automation_store,
        ctx,
        RunGuards::new(),
    )))
}

async fn serve(app_config: AppConfig, automation_store: Arc<dyn AutomationStore>) -> Result<()> {
    info!("Initializing metrics...");
    metrics::init_metrics();

    let runner = build_runner(&app_config, Arc::clone(&automation_store))?;
    let shutdown_token = CancellationToken::new();
    let (scheduler, scheduler_handle) = create_scheduler(
        all_pipelines(),
        automation_store,
        runner,
        app_config.automation.disabled_recheck,
        shutdown_token.clone(),
    );

    for status in scheduler_handle.statuses().await? {
        info!(
            pipeline = %status.pipeline_id,
            enabled = status.settings.enabled,
            cadence = status.settings.cadence.as_str(),
            next_run_at = ?status.settings.next_run_at,
            "Pipeline registered"
        );
    }

    let scheduler_task = tokio::spawn(scheduler.run());

    tokio::select! {
        result = server::run_server(scheduler_handle, app_config.metrics_port) => {
            info!("Metrics server stopped: {:?}", result);
            shutdown_token.cancel();
            let _ = scheduler_task.await;
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            let _ = scheduler_task.await;
            Ok(())
        }
    }
}
