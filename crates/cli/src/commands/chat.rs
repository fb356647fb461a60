//! `stepvault chat`: run sessions in-process.
//!
//! Engine events are printed as they arrive. When the agent asks for human
//! assistance the next stdin line is sent back as the answer, and the same
//! session continues.

use anyhow::Context;
use std::io::Write;
use stepvault_agent::{Engine, SessionRun};
use stepvault_config::AppConfig;
use stepvault_core::event::{EngineEvent, EventKind};
use stepvault_core::message::SessionId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

pub async fn run(message: Option<String>, session: Option<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GOOGLE_API_KEY     (Gemini, the default provider)");
        eprintln!("    OPENAI_API_KEY     (for OpenAI)");
        eprintln!("    STEPVAULT_API_KEY  (generic)");
        eprintln!();
        eprintln!("  Or add it to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        anyhow::bail!("no API key found");
    }

    let engine = Engine::from_config(&config)
        .await
        .context("Failed to start the engine")?;
    let session_id = session_or_new(session.as_deref());
    info!(
        session_id = %session_id,
        provider = engine.provider_name(),
        model = engine.model(),
        "Chat session ready"
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if let Some(msg) = message {
        return converse(&engine, &session_id, &msg, &mut lines).await;
    }

    println!();
    println!("  StepVault — Interactive Mode");
    println!();
    println!("  Provider:  {}", engine.provider_name());
    println!("  Model:     {}", engine.model());
    println!(
        "  Tools:     {}",
        engine
            .catalog()
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    loop {
        prompt("You > ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        if let Err(e) = converse(&engine, &session_id, line, &mut lines).await {
            eprintln!("  [Error] {e:#}");
        }
        println!();
    }

    println!();
    println!("  Session saved as {session_id}. Goodbye!");
    Ok(())
}

/// The session named by `--session`, or a new one when it is absent or blank.
fn session_or_new(requested: Option<&str>) -> SessionId {
    requested
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(SessionId::from)
        .unwrap_or_default()
}

/// Run one task to completion, answering human-assistance prompts from `lines`.
async fn converse<R>(
    engine: &Engine,
    session_id: &SessionId,
    message: &str,
    lines: &mut Lines<R>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut run = engine.submit(Some(session_id.clone()), message).await?;

    loop {
        let Some(query) = print_run(run).await else {
            return Ok(());
        };

        println!();
        println!("  Agent asks > {query}");
        prompt("Your answer > ")?;
        let Some(answer) = lines.next_line().await? else {
            println!();
            println!("  Left waiting; resume later with: stepvault chat --session {session_id}");
            return Ok(());
        };
        debug!(session_id = %session_id, answer_len = answer.len(), "Resuming with human answer");
        run = engine.resume(session_id, answer.trim()).await?;
    }
}

/// Print a run's events. Returns the question if the run suspended.
async fn print_run(mut run: SessionRun) -> Option<String> {
    let mut question = None;
    while let Some(event) = run.events.recv().await {
        if let Some(q) = render(&event) {
            question = Some(q);
        }
    }
    question
}

fn render(event: &EngineEvent) -> Option<String> {
    match event.kind {
        EventKind::Thinking => eprintln!("  ... {}", event.content),
        EventKind::ToolCall => eprintln!("  [tool] {}", event.content),
        EventKind::Response => {
            println!();
            for line in event.content.lines() {
                println!("  Assistant > {line}");
            }
        }
        EventKind::Completed => {}
        EventKind::Error => eprintln!(
            "  [Error] {} ({})",
            event.content,
            event.code.as_deref().unwrap_or("unknown")
        ),
        EventKind::HumanInputNeeded => return Some(event.content.clone()),
    }
    None
}

fn prompt(text: &str) -> anyhow::Result<()> {
    print!("  {text}");
    std::io::stdout().flush()?;
    Ok(())
}
