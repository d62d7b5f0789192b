use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use agentium::adapter::{AdapterRegistry, ClaudeAdapter, RoleRouting};
use agentium::auth::{CommandRefresher, NoopRefresher, TokenRefresher};
use agentium::agentium_config::AgentiumConfig;
use agentium::config::Config;
use agentium::controller::Controller;
use agentium::gateway::{filter_discussion, GhGateway, RepoGateway};
use agentium::task::{TaskContext, TaskType};
use agentium::ui::SessionUi;

#[derive(Parser)]
#[command(name = "agentium")]
#[command(version, about = "Autonomous agent orchestrator for repository issues")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to agentium.toml. Defaults to <project-dir>/agentium.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve one issue end-to-end through the phase loop
    Run {
        /// Repository in owner/name form
        #[arg(long)]
        repository: Option<String>,

        /// Issue number to resolve
        #[arg(long)]
        issue: Option<u64>,

        /// Offline task description (JSON) instead of fetching the issue
        #[arg(long)]
        task_file: Option<PathBuf>,

        /// Base branch PRs are opened against (defaults to main)
        #[arg(long)]
        base_branch: Option<String>,

        /// Reuse an existing session id (resumes its state directory)
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Show persisted state of a session
    Status {
        /// Session id; defaults to the most recently modified session
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Validate the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    Validate,
}

/// Offline task description for `run --task-file`.
#[derive(Debug, Deserialize)]
struct TaskFile {
    id: String,
    repository: String,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    discussion: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = cli
        .project_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Run {
            repository,
            issue,
            task_file,
            base_branch,
            session_id,
        } => {
            let config = Config::new(project_dir, cli.config, session_id, cli.verbose)?;
            run(config, repository, issue, task_file, base_branch).await
        }
        Commands::Status { session_id } => status(&project_dir, session_id),
        Commands::Config {
            command: ConfigCommands::Validate,
        } => {
            let path = cli
                .config
                .unwrap_or_else(|| project_dir.join("agentium.toml"));
            AgentiumConfig::load(&path)?;
            println!("{} is valid", path.display());
            Ok(())
        }
    }
}

async fn run(
    config: Config,
    repository: Option<String>,
    issue: Option<u64>,
    task_file: Option<PathBuf>,
    base_branch: Option<String>,
) -> Result<()> {
    config.ensure_directories()?;
    let _lock = config.lock_session()?;
    let _log_guard = init_tracing(&config)?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, cancelling session");
            ctrl_c_cancel.cancel();
        }
    });

    let settings = &config.settings;
    let gateway: Arc<dyn RepoGateway> = Arc::new(GhGateway::new(
        &settings.github.gh_cmd,
        &settings.github.signature_footer,
    ));
    let refresher: Arc<dyn TokenRefresher> = match &settings.auth.refresh_command {
        Some(command) => Arc::new(CommandRefresher::new(command)),
        None => Arc::new(NoopRefresher),
    };

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(ClaudeAdapter::new(
        &settings.adapters.claude_cmd,
        settings.container.image.clone(),
        settings.adapters.skip_permissions,
    )))?;
    let routing = RoleRouting {
        worker: settings.adapters.worker.clone(),
        reviewer: settings.adapters.reviewer.clone(),
        judge: settings.adapters.judge.clone(),
    };

    // Resolve the task context: offline file or live issue fetch.
    let (task_id, task_repository, context) = match task_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file: TaskFile =
                serde_json::from_str(&content).context("Failed to parse task file")?;
            let context = TaskContext {
                title: file.title,
                body: file.body,
                repository: file.repository.clone(),
                issue_number: file.id.parse().unwrap_or(0),
                issue_url: file.url,
                discussion: file.discussion,
            };
            (file.id, file.repository, context)
        }
        None => {
            let repository =
                repository.context("--repository is required without --task-file")?;
            let issue = issue.context("--issue is required without --task-file")?;
            let details = gateway.fetch_issue(&repository, issue).await?;
            let discussion =
                filter_discussion(&details.comments, &settings.github.signature_footer);
            let context = TaskContext {
                title: details.title,
                body: details.body,
                repository: repository.clone(),
                issue_number: details.number,
                issue_url: details.url,
                discussion,
            };
            (issue.to_string(), repository, context)
        }
    };

    let total_phases = settings.phase_order().len() as u64;
    let ui = Arc::new(SessionUi::new(total_phases, config.verbose));
    ui.log_step(&format!("session directory: {}", config.session_dir.display()));

    let mut controller = Controller::new(
        config,
        registry,
        routing,
        gateway,
        refresher,
        cancel,
    )?;
    controller.set_ui(ui.clone());

    let mut task = controller.create_task(&task_id, TaskType::Issue, &task_repository);
    if let Some(base) = base_branch {
        task.parent_branch = base;
    }
    controller
        .handoff_mut()
        .set_issue_context(&task.id, context);

    let result = controller.run_task(&mut task).await;
    match &result {
        Ok(()) => ui.finish(&format!("task {} finished in {}", task.id, task.phase)),
        Err(e) => ui.error(&format!("phase loop stopped: {}", e)),
    }

    println!(
        "task {}: phase={} workflow={} pr={:?} merged={} human_review={}",
        task.id,
        task.phase,
        task.workflow_path,
        task.pr_number,
        task.pr_merged,
        task.requires_human_review()
    );

    result.map_err(Into::into)
}

fn init_tracing(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let file = std::fs::File::create(config.log_path())
        .with_context(|| format!("Failed to create {}", config.log_path().display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let default = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();
    Ok(guard)
}

fn status(project_dir: &std::path::Path, session_id: Option<String>) -> Result<()> {
    let sessions_dir = project_dir.join(".agentium").join("sessions");
    let session_dir = match session_id {
        Some(id) => sessions_dir.join(id),
        None => latest_session(&sessions_dir)
            .context("No sessions found; run `agentium run` first")?,
    };

    let task_path = session_dir.join("task.json");
    if task_path.exists() {
        let task = agentium::task::TaskState::load(&task_path)?;
        println!("session:  {}", session_dir.file_name().unwrap().to_string_lossy());
        println!("task:     {} ({})", task.id, task.repository);
        println!("phase:    {} (iteration {})", task.phase, task.phase_iteration);
        println!("workflow: {}", task.workflow_path);
        println!("pr:       {:?} (merged: {})", task.pr_number, task.pr_merged);
        if task.requires_human_review() {
            println!("NOMERGE:  human review required");
        }
    } else {
        println!("session {} has no task snapshot yet", session_dir.display());
    }

    let journal = agentium::journal::Journal::new(session_dir.join("events.jsonl"));
    let records = journal.read_all();
    if !records.is_empty() {
        println!("events:   {}", records.len());
        for record in records.iter().rev().take(5).rev() {
            println!("  {:?}", record.event);
        }
    }
    Ok(())
}

fn latest_session(sessions_dir: &std::path::Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(sessions_dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .max_by_key(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
        })
        .map(|entry| entry.path())
}
