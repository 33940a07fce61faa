mod config;
mod generator;
mod git;
mod gitea;
mod retriever;
mod scanner;
#[cfg(test)]
mod test_util;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use config::{CliOverrides, ConfigFile, EngineSection, ForgeSection, GeneratorSection, YaverConfig};
use generator::HttpGenerator;
use git::ShellGit;
use gitea::GiteaClient;
use retriever::NoopContextRetriever;
use scanner::{CommandTemplate, ShellCodeScanner};
use yaver_core::engine::{self, Collaborators, EngineConfig, EngineState};
use yaver_core::interfaces::{ForgeClient, VersionControl};
use yaver_core::pr_monitor::ReactivePrMonitor;

#[derive(Parser)]
#[command(name = "yaver", about = "Autonomous task-orchestration engine for LLM coding agents over Git forges")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a yaver config file
    Init {
        /// Gitea base URL
        #[arg(long)]
        forge_url: String,
        /// Gitea access token
        #[arg(long)]
        forge_token: String,
        /// Repository owner
        #[arg(long)]
        owner: String,
        /// Repository name
        #[arg(long)]
        repo: String,
        /// Generator (LM) base URL
        #[arg(long)]
        generator_url: String,
        /// Generator API key
        #[arg(long)]
        generator_api_key: String,
        /// Generator model name
        #[arg(long)]
        generator_model: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Run a session against a local repository checkout
    Run {
        /// Natural-language description of the work to perform
        request: String,
        /// Path to the local git checkout
        #[arg(long, default_value = ".")]
        repo_path: PathBuf,
        /// Forge base URL (overrides config/env)
        #[arg(long)]
        forge_url: Option<String>,
        /// Forge token (overrides config/env)
        #[arg(long)]
        forge_token: Option<String>,
        /// Maximum driver iterations
        #[arg(long)]
        max_iterations: Option<u64>,
    },
    /// Show the working copy's current branch and any active PR for it
    Status {
        /// Path to the local git checkout
        #[arg(long, default_value = ".")]
        repo_path: PathBuf,
        /// Forge base URL (overrides config/env)
        #[arg(long)]
        forge_url: Option<String>,
        /// Forge token (overrides config/env)
        #[arg(long)]
        forge_token: Option<String>,
    },
}

fn cmd_init(
    forge_url: &str,
    forge_token: &str,
    owner: &str,
    repo: &str,
    generator_url: &str,
    generator_api_key: &str,
    generator_model: &str,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        anyhow::bail!("config file already exists at {}\nUse --force to overwrite.", path.display());
    }

    let cfg = ConfigFile {
        forge: ForgeSection {
            base_url: forge_url.to_string(),
            token: forge_token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        },
        generator: GeneratorSection {
            base_url: generator_url.to_string(),
            api_key: generator_api_key.to_string(),
            model: generator_model.to_string(),
        },
        engine: EngineSection::default(),
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  forge.base_url = {forge_url}");
    println!("  forge.owner/repo = {owner}/{repo}");
    println!("  generator.base_url = {generator_url}");
    Ok(())
}

async fn cmd_run(request: &str, repo_path: PathBuf, overrides: CliOverrides) -> anyhow::Result<()> {
    let resolved = YaverConfig::resolve(&overrides)?;

    let forge = GiteaClient::new(
        resolved.forge.base_url.clone(),
        resolved.forge.token.clone(),
        resolved.forge.owner.clone(),
        resolved.forge.repo.clone(),
    );
    let generator = HttpGenerator::new(resolved.generator.base_url.clone(), resolved.generator.api_key.clone(), resolved.generator.model.clone());
    let retriever = NoopContextRetriever;
    let vcs = ShellGit::new(&repo_path);
    let scanner = ShellCodeScanner::new(default_syntax_checkers(), Duration::from_secs(60));

    let monitor = match ReactivePrMonitor::new(&forge).await {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::error!(error = %e, "agent identity could not be resolved; reactive PR monitoring disabled for this session");
            None
        }
    };

    let mut state = EngineState::new(request, repo_path);
    let engine_config = EngineConfig {
        max_iterations: resolved.engine.max_iterations,
        max_task_depth: resolved.engine.max_task_depth,
        default_base_branch: resolved.engine.default_base_branch,
    };

    engine::ensure_planned(&mut state, &engine_config, &generator).await.context("planning failed")?;

    let collaborators = Collaborators {
        generator: &generator,
        retriever: &retriever,
        scanner: &scanner,
        vcs: &vcs,
        forge: Some(&forge as &dyn ForgeClient),
    };

    let outcome = engine::run_session(&mut state, &engine_config, &collaborators, monitor.as_ref()).await;

    println!("session finished after {} iteration(s): {:?}", state.iteration_count, outcome);
    for line in &state.log {
        println!("  {line}");
    }
    for task in state.tasks.iter() {
        println!("  [{}] {} -> {}", task.short_id(), task.title, task.status);
    }

    Ok(())
}

/// `yaver status`: no session state is persisted between invocations (this
/// engine keeps `EngineState` in memory for the lifetime of one `run`), so
/// status reports what can actually be observed right now: the working
/// copy's branch/dirty state and, if a PR exists for that branch, its
/// state and outstanding comment count.
async fn cmd_status(repo_path: PathBuf, overrides: CliOverrides) -> anyhow::Result<()> {
    let resolved = YaverConfig::resolve(&overrides)?;
    let forge = GiteaClient::new(
        resolved.forge.base_url.clone(),
        resolved.forge.token.clone(),
        resolved.forge.owner.clone(),
        resolved.forge.repo.clone(),
    );
    let vcs = ShellGit::new(&repo_path);

    let branch = vcs.active_branch().await.context("failed to resolve active branch")?;
    let dirty = vcs.is_dirty().await.context("failed to check working copy state")?;
    println!("Repository: {}", repo_path.display());
    println!("Branch: {branch}{}", if dirty { " (dirty)" } else { "" });

    match forge.get_user().await {
        Ok(user) => println!("Forge identity: {}", user.login),
        Err(e) => println!("Forge identity: unresolved ({e})"),
    }

    if branch != resolved.engine.default_base_branch {
        match forge.find_pr_by_branch(&branch, &resolved.engine.default_base_branch).await {
            Ok(Some(pr)) => {
                let comments = forge.list_comments(pr.id).await.unwrap_or_default();
                println!(
                    "Active PR: #{} ({}), mergeable={:?}, {} comment(s)",
                    pr.number,
                    pr.state,
                    pr.mergeable,
                    comments.len()
                );
            }
            Ok(None) => println!("Active PR: none for this branch"),
            Err(e) => println!("Active PR: could not query forge ({e})"),
        }
    } else {
        println!("Active PR: n/a (on default branch)");
    }

    Ok(())
}

fn default_syntax_checkers() -> HashMap<String, CommandTemplate> {
    let mut checkers = HashMap::new();
    checkers.insert(
        "py".to_string(),
        CommandTemplate { program: "python3".to_string(), args: vec!["-m".to_string(), "py_compile".to_string(), "{path}".to_string()] },
    );
    checkers
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { forge_url, forge_token, owner, repo, generator_url, generator_api_key, generator_model, force } => {
            cmd_init(&forge_url, &forge_token, &owner, &repo, &generator_url, &generator_api_key, &generator_model, force)
        }
        Commands::Run { request, repo_path, forge_url, forge_token, max_iterations } => {
            let overrides = CliOverrides { forge_base_url: forge_url, forge_token, max_iterations };
            cmd_run(&request, repo_path, overrides).await
        }
        Commands::Status { repo_path, forge_url, forge_token } => {
            let overrides = CliOverrides { forge_base_url: forge_url, forge_token, max_iterations: None };
            cmd_status(repo_path, overrides).await
        }
    }
}
