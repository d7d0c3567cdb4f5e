//! Thin CLI binary: a chunk-stream consumer around the `milo` engine. Not a
//! polished terminal UI — it prints text as it streams, renders tool and
//! permission events as lines, and drives the permission rendezvous from
//! stdin.
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use milo::client::Client;
use milo::config::{ConfigFile, ResolvedConfig};
use milo::engine::{Chunk, Engine};
use milo::error::StartupError;
use milo::permissions::{ConfirmResponse, Effect, PermissionMatcher, Rule};
use milo::session::{self, Session};
use milo::todo::TodoStore;
use milo::tokens::ContextLimits;
use milo::tools::{self, ToolContext};

#[derive(Parser, Debug)]
#[command(name = "milo", about = "An interactive terminal coding assistant", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Resume a saved session by id, or "last" for the most recently updated
    #[arg(long, value_name = "ID|last")]
    resume: Option<String>,

    /// Start a fresh session even if a most-recent one exists
    #[arg(long)]
    new: bool,

    /// Override the model id for this run
    #[arg(short, long, env = "MILO_MODEL")]
    model: Option<String>,

    /// Profile to use from the config file
    #[arg(long, env = "MILO_PROFILE")]
    profile: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List saved sessions
    Sessions,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let workdir = std::env::current_dir().context("resolving current directory")?;

    if matches!(args.command, Some(Command::Sessions)) {
        return print_sessions(&workdir);
    }

    let file = ConfigFile::load()?;
    let resolved = ResolvedConfig::resolve(&file, args.profile.as_deref(), args.model.as_deref());
    let api_key = resolve_api_key(&resolved);
    if api_key.is_none() && !is_local_endpoint(&resolved.endpoint) {
        bail!(StartupError::Config(
            "MILO_API_KEY is not set and the configured endpoint is not a local one".to_string()
        ));
    }

    let session = match args.resume.as_deref() {
        Some("last") => session::most_recent(&workdir)?
            .ok_or_else(|| StartupError::NoSuchSession("last".to_string()))?,
        Some(id) => session::load(&workdir, id).map_err(|_| StartupError::NoSuchSession(id.to_string()))?,
        None if !args.new => session::most_recent(&workdir)?.unwrap_or_else(|| new_session(&workdir, &resolved)),
        None => new_session(&workdir, &resolved),
    };

    let client = Client::new(resolved.endpoint.clone(), resolved.model.clone(), api_key);
    let permissions = PermissionMatcher::load(&workdir)?;
    let tool_ctx = ToolContext::new(Arc::new(TodoStore::new()));
    let limits = ContextLimits { max_context: resolved.context_tokens as usize, ..ContextLimits::default() };
    let system_prompt = build_system_prompt(&workdir);
    let engine = Arc::new(Engine::new(client, system_prompt, limits, permissions, tool_ctx));

    run_repl(engine, session, &workdir).await
}

fn resolve_api_key(resolved: &ResolvedConfig) -> Option<String> {
    std::env::var("MILO_API_KEY").ok().or_else(|| resolved.api_key.clone())
}

fn is_local_endpoint(endpoint: &str) -> bool {
    endpoint.contains("localhost") || endpoint.contains("127.0.0.1")
}

fn new_session(workdir: &Path, resolved: &ResolvedConfig) -> Session {
    Session::new(session::generate_id(), workdir.display().to_string(), resolved.model.clone(), now())
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn print_sessions(workdir: &Path) -> Result<()> {
    let sessions = session::list(workdir)?;
    println!("{:<10} {:<20} {:<10} TITLE", "ID", "UPDATED", "MESSAGES");
    for s in sessions {
        let title = if s.title.is_empty() { "(untitled)" } else { &s.title };
        let updated = chrono::DateTime::from_timestamp(s.updated_at, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| s.updated_at.to_string());
        println!("{:<10} {:<20} {:<10} {}", s.id, updated, s.messages.len(), title);
    }
    Ok(())
}

/// Inject a depth-2 project overview into the system prompt, the same way
/// the teacher's agent primes the model with the repo layout up front.
fn build_system_prompt(workdir: &Path) -> String {
    let map = tools::list_dir::execute(&serde_json::json!({ "path": workdir.to_string_lossy(), "depth": 2 }))
        .unwrap_or_else(|_| "(unavailable)".to_string());
    format!(
        "You are Milo, an interactive terminal coding assistant. You have tools to read, write, \
edit, and move files, run shell commands, search the repository, and manage a todo list. \
Read a file before editing it. Use `write` only to create new files or fully replace existing \
ones; use `edit` for targeted changes. Prefer `grep`/`glob` over `bash find`/`grep` where \
possible. Do not ask for permission in your reply text — the permission system will prompt the \
user directly when a tool call requires it.\n\n\
Project layout (depth 2):\n{map}"
    )
}

async fn run_repl(engine: Arc<Engine>, mut session: Session, workdir: &Path) -> Result<()> {
    println!("milo — session {} ({})", session.id, session.model);
    println!("Type /help for commands, or 'exit'/'quit' to leave.\n");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        if let Some(rest) = line.strip_prefix('/') {
            if handle_slash_command(&engine, rest)? {
                continue;
            }
        }

        let mut messages = std::mem::take(&mut session.messages);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let turn_engine = Arc::clone(&engine);
        let user_text = line.to_string();
        let handle = tokio::spawn(async move {
            let result = turn_engine.run_turn(&mut messages, user_text, tx).await;
            (messages, result)
        });

        while let Some(chunk) = rx.recv().await {
            render_chunk(chunk);
        }

        let (messages, result) = handle.await.context("turn task panicked")?;
        session.messages = messages;
        if let Err(e) = result {
            eprintln!("\n[error] {e}");
        }

        session.updated_at = now();
        if session.title.is_empty() {
            session.title = line.chars().take(60).collect();
        }
        session::save(workdir, &session).context("saving session")?;
    }

    session.updated_at = now();
    session::save(workdir, &session).context("saving session")?;
    Ok(())
}

fn render_chunk(chunk: Chunk) {
    match chunk {
        Chunk::Text(t) => {
            print!("{t}");
            std::io::stdout().flush().ok();
        }
        Chunk::ToolUse { name, input, .. } => {
            println!("\n[tool] {name} {input}");
        }
        Chunk::ToolResult { name, output, is_error, .. } => {
            let label = if is_error { "error" } else { "result" };
            let preview: String = output.chars().take(400).collect();
            println!("[{label}: {name}] {preview}");
        }
        Chunk::PermissionRequest(req) => {
            print!("\nAllow '{}' with argument '{}'? [y/N/a(lways)] ", req.tool, req.canonical_arg);
            std::io::stdout().flush().ok();
            let mut answer = String::new();
            std::io::stdin().read_line(&mut answer).ok();
            let response = match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => ConfirmResponse::Granted,
                "a" | "always" => ConfirmResponse::GrantedAlways,
                _ => ConfirmResponse::Denied,
            };
            let _ = req.respond.send(response);
        }
        Chunk::ParallelProgress { completed, total } => {
            if completed == total {
                println!("[done: {completed}/{total} tool calls]");
            }
        }
        Chunk::ContextCompacted { strategy } => {
            println!("[context compacted via {strategy}]");
        }
        Chunk::TodoUpdate(items) => {
            println!("[todo] {} item(s)", items.len());
            for item in items {
                println!("  - [{:?}] {}", item.status, item.content);
            }
        }
        Chunk::Done => {
            println!();
        }
        Chunk::Error(msg) => {
            eprintln!("\n[error] {msg}");
        }
    }
}

/// Returns `true` if the line was a recognized slash command (handled here,
/// no turn should be run for it).
fn handle_slash_command(engine: &Arc<Engine>, rest: &str) -> Result<bool> {
    let mut parts = rest.split_whitespace();
    match parts.next() {
        Some("help") => {
            println!("Commands: /model [list|<name>], /permissions [list|add <rule>|rm <n>], /help, exit, quit");
            Ok(true)
        }
        Some("model") => {
            match parts.next() {
                None | Some("list") => println!("current model: {}", engine.client().model()),
                Some(name) => {
                    engine.client().set_model(name);
                    println!("model set to {name}");
                }
            }
            Ok(true)
        }
        Some("permissions") => {
            match parts.next() {
                None | Some("list") => {
                    for (i, rule) in engine.permission_rules().iter().enumerate() {
                        let pattern = rule.pattern.as_deref().unwrap_or("*");
                        let effect = if rule.effect == Effect::Allow { "allow" } else { "deny" };
                        println!("{i}: {}({pattern}):{effect}", rule.tool);
                    }
                }
                Some("add") => {
                    let spec: String = parts.collect::<Vec<_>>().join(" ");
                    match Rule::parse(&spec) {
                        Ok(rule) => engine.add_permission_rule(rule).context("persisting rule")?,
                        Err(e) => {
                            eprintln!("invalid rule: {e}");
                            return Ok(true);
                        }
                    }
                }
                Some(other) => bail!("unknown /permissions subcommand: {other}"),
            }
            Ok(true)
        }
        Some(other) => {
            eprintln!("unknown command: /{other}");
            Ok(true)
        }
        None => Ok(true),
    }
}
