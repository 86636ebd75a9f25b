//! Session Orchestrator CLI entry point: loads configuration, restores a
//! workspace/system from the long-term store, serves the broadcast
//! WebSocket endpoint, and runs an interactive chat/slash-command loop
//! over stdin.

use clap::{Parser, Subcommand};
use llm::{ClaudeProvider, Engine, OpenAiProvider, RemoteLlmConfig};
use session::{
    GraphStoreBackend, InMemoryBackend, ProviderKind, Result, SessionConfig, SessionOrchestrator, TurnOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tools::{GraphQueryTool, ToolRegistry};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "session")]
#[command(about = "Session Orchestrator for the structured-graph editor", long_about = None)]
struct Args {
    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a TOML config file, layered over environment and defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration and exit
    ShowConfig,
    /// Restore a workspace/system and run the interactive loop (default)
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = SessionConfig::load(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Run) {
        Command::ShowConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: SessionConfig) -> anyhow::Result<()> {
    info!(workspace_id = %config.workspace_id, system_id = %config.system_id, "starting session orchestrator");

    let provider: Arc<dyn llm::LlmProvider> = match config.provider {
        ProviderKind::Claude => {
            let remote = RemoteLlmConfig::from_env(&config.api_key_env, config.base_url.clone(), config.model.clone())?;
            Arc::new(ClaudeProvider::new(remote.with_max_output_tokens(config.max_output_tokens))?)
        }
        ProviderKind::OpenAi => {
            let remote = RemoteLlmConfig::from_env(&config.api_key_env, config.base_url.clone(), config.model.clone())?;
            Arc::new(OpenAiProvider::new(remote.with_max_output_tokens(config.max_output_tokens))?)
        }
    };

    let backend: Arc<dyn GraphStoreBackend> = Arc::new(InMemoryBackend::new());
    let broadcast = broadcast::BroadcastServer::new();

    let data = data_service::unified_data_service(&config.workspace_id, &config.system_id);
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(GraphQueryTool));

    let methodology = "Decompose top-down: SYS -> UC -> FCHAIN -> FUNC, derive REQ/TEST downstream, \
        and connect with compose/io/satisfy/verify/allocate/relation edges as appropriate.";
    let engine = Engine::new(data, provider, context::PromptAssembler::new(methodology), Arc::new(tools))
        .with_max_output_tokens(config.max_output_tokens);

    let bind_addr = config.broadcast_bind.clone();
    let orchestrator = Arc::new(SessionOrchestrator::start(config, backend, broadcast.clone(), engine, "local-user").await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "broadcast endpoint listening");
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, broadcast.router()).await {
            warn!(error = %e, "broadcast server exited");
        }
    });

    chat_loop(orchestrator.clone()).await?;
    orchestrator.shutdown().await?;
    server_handle.abort();

    Ok(())
}

async fn chat_loop(orchestrator: Arc<SessionOrchestrator>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", session::commands::HELP_TEXT);

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match orchestrator.handle_line(line).await {
            Ok(TurnOutcome::Command(text)) => {
                println!("{text}");
                if line.trim() == "exit" {
                    break;
                }
            }
            Ok(TurnOutcome::Streaming(mut rx)) => {
                while let Some(chunk) = rx.recv().await {
                    match chunk {
                        llm::Chunk::Text { text } => print!("{text}"),
                        llm::Chunk::Content { text } => print!("{text}"),
                        llm::Chunk::Complete { .. } => println!(),
                    }
                }
            }
            Err(e) => warn!(error = %e, "turn failed"),
        }
    }

    Ok(())
}
