// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agentcore_bootstrap::AgentBuilder;
use agentcore_core::AgentEvent;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = agentcore_config::load(cli.config.as_deref())?;
    if let Some(db_path) = &cli.db_path {
        config.database.path = db_path.display().to_string();
    }
    if let Some(base_url) = &cli.provider_base_url {
        config.provider.base_url = Some(base_url.clone());
    }

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::Sessions { limit } => print_sessions(&config, limit).await,
        Commands::Run { prompt, session, model } => run(&config, prompt, session, model).await,
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(
    config: &agentcore_config::Config,
    prompt: String,
    session: Option<String>,
    model_override: Option<String>,
) -> anyhow::Result<()> {
    let mut provider_cfg = config.provider.clone();
    if let Some(m) = &model_override {
        provider_cfg = agentcore_model::resolve_model_from_config(config, m);
    }
    let model: Arc<dyn agentcore_model::ModelProvider> = agentcore_model::from_config(&provider_cfg)
        .context("constructing model provider")?
        .into();
    let title_model: Arc<dyn agentcore_model::ModelProvider> = agentcore_model::from_config(&provider_cfg)
        .context("constructing title-task model provider")?
        .into();

    let (agent, store, gate, bus) = AgentBuilder::new(config.clone())
        .build_with_store_path(&config.database.path, model)
        .context("wiring agent")?;
    let agent = agent.with_title_task(title_model);

    let session_id = match session {
        Some(id) => id,
        None => store.create_session(None).await?.id,
    };

    // A background task prompts on stderr/stdin for each permission request
    // raised on the bus and feeds the decision back through the gate.
    let permission_task = {
        let gate = gate.clone();
        let session_id = session_id.clone();
        let mut requests = bus.subscribe_permission_requests();
        tokio::spawn(async move {
            while let Ok(event) = requests.recv().await {
                if event.session_id != session_id {
                    continue;
                }
                let Some(pending) = gate
                    .pending_for_session(&session_id)
                    .await
                    .into_iter()
                    .find(|p| p.id == event.request_id)
                else {
                    continue;
                };
                let summary = pending.summary.clone();
                let decision = tokio::task::spawn_blocking(move || prompt_for_decision(&summary))
                    .await
                    .unwrap_or(agentcore_permission::Decision::Deny);
                gate.resolve(&session_id, &pending.id, decision).await;
            }
        })
    };

    let mut stream = agent.run(&session_id, &prompt).await?;
    while let Some(event) = stream.next().await {
        match event {
            AgentEvent::TextDelta(delta) => {
                use std::io::Write;
                print!("{delta}");
                std::io::stdout().flush()?;
            }
            AgentEvent::ToolCallStarted(call) => {
                eprintln!("→ {}", call.name);
            }
            AgentEvent::Error { message, .. } => {
                eprintln!("\nerror: {message}");
            }
            AgentEvent::TurnComplete(_) => {
                println!();
            }
            _ => {}
        }
    }
    permission_task.abort();
    Ok(())
}

fn prompt_for_decision(summary: &str) -> agentcore_permission::Decision {
    use std::io::Write;
    eprint!("permission requested: {summary} [y/N/a(lways)]: ");
    let _ = std::io::stderr().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return agentcore_permission::Decision::Deny;
    }
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => agentcore_permission::Decision::AllowOnce,
        "a" | "always" => agentcore_permission::Decision::AllowSession,
        _ => agentcore_permission::Decision::Deny,
    }
}

async fn print_sessions(config: &agentcore_config::Config, limit: usize) -> anyhow::Result<()> {
    let bus = Arc::new(agentcore_bus::EventBus::new());
    let store = agentcore_store::Store::open(&config.database.path, bus)?;
    let sessions = store.list_sessions(limit).await?;
    if sessions.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {:<40}  {} msgs",
            s.id,
            s.title.unwrap_or_else(|| "(untitled)".to_string()),
            s.message_count
        );
    }
    Ok(())
}
