//! `stepvault session`: inspect checkpointed sessions.

use anyhow::Context;
use stepvault_config::AppConfig;
use stepvault_core::checkpoint::Checkpoint;
use stepvault_core::message::SessionId;

pub async fn run(id: Option<String>, json: bool) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let store = stepvault_checkpoint::open(&config.checkpoint)
        .await
        .context("Failed to open the checkpoint store")?;

    let Some(id) = id else {
        let sessions = store.list().await?;
        if sessions.is_empty() {
            println!("No sessions in the {} store.", store.name());
        }
        for session in sessions {
            println!("{session}");
        }
        return Ok(());
    };

    let checkpoint = store
        .get(&SessionId::from(id.as_str()))
        .await?
        .with_context(|| format!("no checkpoint for session {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    } else {
        print!("{}", summary(&checkpoint));
    }
    Ok(())
}

fn summary(checkpoint: &Checkpoint) -> String {
    let s = &checkpoint.state;
    let mut out = format!(
        "Session:     {}\n\
         Status:      {:?}\n\
         Step:        {} (saved {})\n\
         Iterations:  {}/{}\n\
         Tool rounds: {}\n\
         Messages:    {}\n",
        checkpoint.session_id,
        s.status(),
        checkpoint.step,
        checkpoint.created_at.to_rfc3339(),
        s.iterations_used,
        s.max_iterations,
        s.current_step,
        s.messages.len(),
    );
    if let Some(plan) = &s.task_plan {
        out.push_str(&format!("Plan:        {plan}\n"));
    }
    if let Some(pending) = &s.pending_interrupt {
        out.push_str(&format!("Waiting on:  {} ({})\n", pending.query, pending.id));
    }
    if let Some(answer) = s.last_assistant_text() {
        out.push_str(&format!("Last answer: {answer}\n"));
    }
    out
}
