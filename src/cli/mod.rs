//! Command-line interface.
//!
//! Terminal UI rendering is explicitly out of scope for this crate (see
//! `lib.rs`): this module offers a `run` command that drives one user
//! input through the Agent Loop to completion and prints the result, plus
//! small housekeeping commands (`init`, `db`) for the local SQLite store.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentEvent, AgentLoop, AgentLoopConfig};
use crate::config::Config;
use crate::context::{Message, Role};
use crate::manager::{ContextManager, Thresholds};
use crate::provider;
use crate::services::{MessageService, ServiceContext, SessionService};
use crate::tools::{ApprovalPolicy, ToolRegistry};
use crate::tools::edit::EditTool;

#[derive(Parser, Debug)]
#[command(name = "agentcore")]
#[command(version, about = "Core agentic runtime for a local LLM chat client", long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to ~/.agentcore/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single prompt to completion and print the result.
    Run {
        /// The user input to drive through the agent loop.
        prompt: String,

        /// Auto-approve tool executions that would otherwise need confirmation.
        #[arg(long)]
        auto_approve: bool,

        /// Maximum turns before the loop gives up (overrides config).
        #[arg(long)]
        max_turns: Option<u32>,
    },

    /// Initialize `~/.agentcore/` (config file and database).
    Init {
        #[arg(short, long)]
        force: bool,
    },

    /// Print the resolved configuration.
    Config,

    /// List sessions recorded in the local database.
    Sessions,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _logging_guard = crate::logging::init(&config.logging).context("failed to initialize logging")?;

    match cli.command.unwrap_or(Commands::Run {
        prompt: String::new(),
        auto_approve: false,
        max_turns: None,
    }) {
        Commands::Init { force } => cmd_init(&config, force).await,
        Commands::Config => cmd_config(&config),
        Commands::Sessions => cmd_sessions(&config).await,
        Commands::Run { prompt, auto_approve, max_turns } => {
            if prompt.is_empty() {
                anyhow::bail!("USAGE: agentcore run \"<prompt>\"");
            }
            cmd_run(&config, prompt, auto_approve, max_turns).await
        }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(p) => {
            let contents = std::fs::read_to_string(p).with_context(|| format!("reading config file {p}"))?;
            toml::from_str(&contents).with_context(|| format!("parsing config file {p}"))
        }
        None => Config::load(),
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn cmd_init(config: &Config, force: bool) -> Result<()> {
    let path = config.database.path.clone();
    if path.exists() && !force {
        println!("database already exists at {}; pass --force to reinitialize", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = crate::db::Database::connect(&path).await?;
    db.run_migrations().await?;
    println!("initialized database at {}", path.display());
    Ok(())
}

async fn cmd_sessions(config: &Config) -> Result<()> {
    let db = crate::db::Database::connect(&config.database.path).await?;
    let sessions = SessionService::new(ServiceContext::new(db)).list_sessions().await?;
    if sessions.is_empty() {
        println!("no sessions recorded");
    }
    for session in sessions {
        println!(
            "{}  {:<20}  {} tokens  ${:.4}",
            session.id,
            session.title.unwrap_or_else(|| "(untitled)".to_string()),
            session.total_tokens,
            session.total_cost
        );
    }
    Ok(())
}

async fn cmd_run(config: &Config, prompt: String, auto_approve: bool, max_turns: Option<u32>) -> Result<()> {
    let db = crate::db::Database::connect(&config.database.path).await?;
    db.run_migrations().await?;
    let service_ctx = ServiceContext::new(db);
    let sessions = SessionService::new(service_ctx.clone());
    let messages = MessageService::new(service_ctx);

    let provider = provider::factory::create_provider(config)?;

    let system_prompt = Message::new(Role::System, "You are a helpful coding assistant.", 10);
    let agent_config = AgentConfigBuilt::from(config, max_turns);
    let manager = Arc::new(ContextManager::new(
        system_prompt,
        agent_config.context_window,
        agent_config.effective_limit(),
        provider.clone(),
        provider.name(),
        Thresholds {
            warn_low: config.agent.warn_low,
            compression_threshold: config.agent.compression_threshold,
        },
    ));

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(EditTool));
    tools.register(Arc::new(crate::tools::session_search::SessionSearchTool::new(
        sessions.clone(),
        messages,
    )));

    let approval_policy = if auto_approve { ApprovalPolicy::Allow } else { ApprovalPolicy::Ask };

    let agent_loop = AgentLoop::new(
        manager,
        provider.clone(),
        provider.name(),
        tools,
        agent_config.loop_config,
        approval_policy,
    );

    let cancellation = CancellationToken::new();
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let stdout_events = move |event: AgentEvent| match event {
        AgentEvent::Text(t) => {
            print!("{t}");
            let _ = std::io::stdout().flush();
        }
        AgentEvent::Thinking(_) => {}
        AgentEvent::ToolStarted { name, .. } => eprintln!("\n[tool] {name} ..."),
        AgentEvent::ToolCompleted { name, success, .. } => {
            eprintln!("[tool] {name} {}", if success { "ok" } else { "failed" });
        }
        AgentEvent::Notice(n) => eprintln!("\n[notice] {n}"),
        AgentEvent::WaitingForResume => eprintln!("\n[waiting for \"continue\" or \"stop\"]"),
    };

    let outcome = agent_loop.run_turn(prompt, cancellation, &stdout_events, None).await?;
    println!();
    eprintln!(
        "-- {:?} after {} turn(s), {} in / {} out tokens",
        outcome.stop_reason, outcome.turns_used, outcome.input_tokens, outcome.output_tokens
    );
    Ok(())
}

struct AgentConfigBuilt {
    context_window: usize,
    safety_margin: usize,
    loop_config: AgentLoopConfig,
}

impl AgentConfigBuilt {
    fn from(config: &Config, max_turns_override: Option<u32>) -> Self {
        let loop_config = AgentLoopConfig {
            max_turns: max_turns_override.unwrap_or(config.agent.max_turns),
            context_window: config.agent.context_limit as usize,
            safety_margin: config.agent.safety_margin as usize,
            stream_idle_timeout: std::time::Duration::from_secs(config.agent.stream_idle_timeout_secs),
            ..AgentLoopConfig::default()
        };
        Self {
            context_window: config.agent.context_limit as usize,
            safety_margin: config.agent.safety_margin as usize,
            loop_config,
        }
    }

    fn effective_limit(&self) -> usize {
        self.context_window.saturating_sub(self.safety_margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
