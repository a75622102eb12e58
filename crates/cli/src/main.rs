mod cli;
mod demo;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, info};

use steploop_core::config::load_dotenv;
use steploop_runtime::{
    AgentGraph, ChatModel, ConversationState, EngineConfig, Message, RunError, RunEvent,
    ToolRegistry,
};

use crate::cli::CliArgs;
use crate::demo::DemoModel;
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let args = CliArgs::parse();
    let terminal = Terminal::new(args.json);

    let mut config = match &args.profile {
        Some(profile) => EngineConfig::from_env_profile(profile),
        None => EngineConfig::from_env(),
    }
    .context("failed to load engine configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid engine configuration")?;
    config.log_summary();

    let mut registry = ToolRegistry::new();
    registry
        .register(demo::get_items_tool())
        .context("failed to register demo tools")?;

    let model: Arc<dyn ChatModel> = Arc::new(DemoModel);
    terminal.print_banner(model.provider_name(), config.profile_label())?;

    let graph = AgentGraph::builder(model, Arc::new(registry))
        .from_config(&config)
        .build()
        .context("failed to build agent graph")?;
    let graph = Arc::new(graph);

    terminal.print_question(&args.question)?;
    let initial = ConversationState::from(vec![Message::user(args.question.clone())]);
    let mut run = graph.stream(initial);

    info!(question = %args.question, "Starting run");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            item = run.next() => match item {
                Some(Ok(event)) => {
                    let finished = matches!(event, RunEvent::Finished { .. });
                    terminal.display_event(&event)?;
                    if finished {
                        break;
                    }
                }
                Some(Err(RunError::Cancelled)) if interrupted => {
                    terminal.print_info("[cancelled]")?;
                    break;
                }
                Some(Err(e)) => {
                    error!(error = %e, "Run failed");
                    terminal.print_error(&e.to_string())?;
                    anyhow::bail!("run failed");
                }
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                run.cancel();
                terminal.print_info("[cancelling]")?;
            }
        }
    }

    Ok(())
}
