//! parley - run tool-augmented conversations from the terminal

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parley_cli::{logging, render, AppContext, ConfigLoader, ParleyConfig};
use parley_core::{HumanResponse, SessionError, TurnStatus};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Tool-augmented conversations with durable history", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to parley.toml (defaults to ./parley.toml when present)
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new conversation with the configured agent
    Start {
        /// Conversation id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Send a user message and print the answer
    Send {
        conversation_id: String,
        /// Message text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Answer a pending human-assistance request
    Resume {
        conversation_id: String,
        /// Expert answer
        #[arg(required = true, num_args = 1..)]
        data: Vec<String>,
    },

    /// Show the visible history of a conversation
    History { conversation_id: String },

    /// List the checkpoints of a conversation, newest first
    Checkpoints {
        conversation_id: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete a conversation and its history
    Delete { conversation_id: String },

    /// List the tools discovered on the configured servers
    Tools,

    /// Interactive conversation
    Chat {
        /// Continue an existing conversation instead of starting one
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().await.context("loading configuration")?;
    logging::init_tracing(&config.logging, cli.verbose);

    let result = run(&cli, &config).await;
    if let Err(e) = &result {
        tracing::debug!(error = ?e, "command failed");
    }
    result
}

async fn run(cli: &Cli, config: &ParleyConfig) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Start { id } => {
            let app = offline(config).await?;
            let handle = match id {
                Some(id) => app.sessions.start_conversation_with_id(id, &app.agent).await,
                None => app.sessions.start_conversation(&app.agent).await,
            }
            .context("starting conversation")?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&handle)?);
            } else {
                println!("{}", handle.conversation_id);
                if let Some(welcome) = &handle.welcome {
                    println!("{}", render::message_line(welcome));
                }
            }
            app.shutdown().await;
        }
        Commands::Send {
            conversation_id,
            text,
        } => {
            let app = online(config).await?;
            let result = app
                .sessions
                .send_turn(conversation_id, &text.join(" "))
                .await
                .with_context(|| format!("sending to {}", conversation_id))?;
            print_turn(cli.json, &result)?;
            app.shutdown().await;
        }
        Commands::Resume {
            conversation_id,
            data,
        } => {
            let app = online(config).await?;
            let result = app
                .sessions
                .resume_with_human_input(conversation_id, HumanResponse::new(data.join(" ")))
                .await
                .with_context(|| format!("resuming {}", conversation_id))?;
            print_turn(cli.json, &result)?;
            app.shutdown().await;
        }
        Commands::History { conversation_id } => {
            let app = offline(config).await?;
            let history = app.sessions.get_history(conversation_id).await?;
            let pending = app.sessions.pending_interrupt(conversation_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                println!("{}", render::history(&history));
                if let Some(request) = &pending {
                    println!("{}", render::interrupt(request));
                }
            }
            app.shutdown().await;
        }
        Commands::Checkpoints {
            conversation_id,
            limit,
        } => {
            let app = offline(config).await?;
            let summaries = app.sessions.checkpoints(conversation_id, *limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                println!("{}", render::checkpoints(&summaries));
            }
            app.shutdown().await;
        }
        Commands::Delete { conversation_id } => {
            let app = offline(config).await?;
            app.sessions.delete_conversation(conversation_id).await?;
            println!("deleted {}", conversation_id);
            app.shutdown().await;
        }
        Commands::Tools => {
            let registry = parley_cli::context::discover_tools(&config.tools).await?;
            if cli.json {
                let names: Vec<_> = registry.specs().iter().map(|s| &s.name).collect();
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                println!("{}", render::tools(registry.specs()));
            }
        }
        Commands::Chat { id } => {
            let app = online(config).await?;
            chat(&app, id.as_deref()).await?;
            app.shutdown().await;
        }
    }
    Ok(())
}

async fn online(config: &ParleyConfig) -> anyhow::Result<AppContext> {
    AppContext::from_config(config)
        .await
        .context("initializing model, tools and store")
}

async fn offline(config: &ParleyConfig) -> anyhow::Result<AppContext> {
    AppContext::offline(config)
        .await
        .with_context(|| format!("opening {}", config.database.path.display()))
}

fn print_turn(json: bool, result: &parley_core::TurnResult) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", render::turn(result));
    }
    Ok(())
}

async fn chat(app: &AppContext, id: Option<&str>) -> anyhow::Result<()> {
    let conversation_id = match id {
        Some(id) => id.to_string(),
        None => {
            let handle = app.sessions.start_conversation(&app.agent).await?;
            if let Some(welcome) = &handle.welcome {
                println!("{}", welcome.content);
            }
            handle.conversation_id
        }
    };
    eprintln!("conversation {} (/history, /quit)", conversation_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let awaiting = app.sessions.pending_interrupt(&conversation_id).await?;
        let prompt = if awaiting.is_some() { "expert> " } else { "you> " };
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                let history = app.sessions.get_history(&conversation_id).await?;
                println!("{}", render::history(&history));
                continue;
            }
            _ => {}
        }

        let result = if awaiting.is_some() {
            app.sessions
                .resume_with_human_input(&conversation_id, HumanResponse::new(line))
                .await
        } else {
            app.sessions.send_turn(&conversation_id, line).await
        };

        match result {
            Ok(result) => {
                println!("{}", render::turn(&result));
                if result.status.is_error() {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        detail = result.error_detail.as_deref().unwrap_or(""),
                        "turn failed"
                    );
                }
                if result.status == TurnStatus::AwaitingHuman {
                    eprintln!("answer as the expert to continue");
                }
            }
            Err(SessionError::ConcurrentWriteConflict(_)) => {
                eprintln!("conversation is busy, try again");
            }
            Err(e) => bail!(e),
        }
    }

    eprintln!(
        "{} tokens used in this session",
        app.ledger.total_tokens(&conversation_id)
    );
    Ok(())
}
