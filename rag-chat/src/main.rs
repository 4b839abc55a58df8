#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rag_chat::{
    present, ChatClient, ChatError, ExchangeStatus, RenderMode, ServiceClient, TerminalPresenter,
};
use rag_common::logging::init_logging_with_exclusions;
use rag_common::config::config_path;
use rag_common::{Config, Validate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// `rag-chat` - ask the RAG chat service from a terminal.
#[derive(Parser, Debug)]
#[command(name = "rag-chat")]
#[command(version)]
#[command(about = "Streaming client for the RAG chat service.", long_about = None)]
struct Cli {
    /// Service base URL (overrides config and RAG_CHAT_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// API token (overrides config and RAG_CHAT_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Config file (default: ~/.rag-chat/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive conversation; history carries over between questions
    Chat {
        /// Skip the Markdown-styled repaint of finished answers
        #[arg(long)]
        plain: bool,

        /// Do not list retrieved documents
        #[arg(long)]
        no_sources: bool,
    },

    /// Ask a single question
    Ask {
        /// The question
        query: String,

        /// Use the non-streaming endpoint
        #[arg(long)]
        no_stream: bool,

        /// Continue from a history token printed by an earlier ask
        #[arg(long)]
        history: Option<String>,

        /// Skip the Markdown-styled repaint of the finished answer
        #[arg(long)]
        plain: bool,
    },

    /// Check a token against the service
    Login {
        /// Store the token in the config file once accepted
        #[arg(long)]
        save: bool,
    },

    /// Clear the service login cookie
    Logout,

    /// Show the service configuration
    Config {
        /// Poll until the service reports ready
        #[arg(long)]
        wait: bool,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Maximum number of polls
        #[arg(long, default_value = "30")]
        attempts: u32,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_with_env(cli.config.as_deref()).context("loading config")?;

    if let Some(ref endpoint) = cli.endpoint {
        config.server.endpoint.clone_from(endpoint);
    }
    if let Some(ref token) = cli.token {
        config.server.token = Some(token.clone());
    }
    if let Some(ref level) = cli.log_level {
        config.observability.log_level.clone_from(level);
    }
    if let Some(ref format) = cli.log_format {
        config.observability.log_format.clone_from(format);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn render_mode(plain: bool) -> RenderMode {
    if plain {
        RenderMode::Plain
    } else {
        RenderMode::Rich
    }
}

async fn run_chat(config: &Config, plain: bool, no_sources: bool) -> Result<()> {
    let client = ChatClient::new(config)?;
    let mut presenter =
        TerminalPresenter::new(std::io::stdout(), render_mode(plain)).with_documents(!no_sources);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Connected to {}. Type /quit to exit, /session to inspect the session.",
        config.endpoint()
    );

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "/quit" | "/exit" => break,
            "/session" => {
                let session = client.session();
                println!(
                    "session_id: {}\nhistory: {}",
                    session.session_id().unwrap_or("-"),
                    session.history().map_or(0, |h| h.chars().count())
                );
                continue;
            }
            _ => {}
        }

        let handle = match client.start_exchange(&line) {
            Ok(handle) => handle,
            Err(ChatError::EmptyQuery) => continue,
            Err(e) => return Err(e.into()),
        };

        let exchange = present(handle, &mut presenter).await?;
        if exchange.status() == ExchangeStatus::Errored {
            eprintln!("error: {}", exchange.error().unwrap_or("exchange failed"));
        }
    }

    Ok(())
}

async fn run_ask(
    config: &Config,
    query: &str,
    no_stream: bool,
    history: Option<String>,
    plain: bool,
) -> Result<()> {
    if no_stream {
        let response = ServiceClient::new(config)?.ask(query, history.as_deref()).await?;
        println!("{}", response.answer);
        if let Some(history) = response.history {
            eprintln!("history: {history}");
        }
        return Ok(());
    }

    let mut client = ChatClient::new(config)?;
    if let Some(history) = history {
        let mut session = client.session();
        session.set_history(history);
        client = client.with_session(session);
    }

    let handle = client.start_exchange(query)?;
    let mut presenter = TerminalPresenter::new(std::io::stdout(), render_mode(plain));
    let exchange = present(handle, &mut presenter).await?;

    if let Some(history) = client.session().history() {
        eprintln!("history: {history}");
    }
    if exchange.status() == ExchangeStatus::Errored {
        bail!("{}", exchange.error().unwrap_or("exchange failed"));
    }
    Ok(())
}

async fn run_login(config: &Config, config_file: Option<&Path>, save: bool) -> Result<()> {
    let Some(token) = config.server.token.clone() else {
        bail!("no token: pass --token or set RAG_CHAT_TOKEN");
    };
    ServiceClient::new(config)?.login(&token).await?;
    println!("Logged in.");

    if save {
        let path = config_file.map_or_else(config_path, Path::to_path_buf);
        // Only the token is written back; other flags stay per-invocation.
        let mut stored = if path.exists() {
            Config::load_from(&path)?
        } else {
            Config::default()
        };
        stored.server.token = Some(token);
        stored.save_to(&path)?;
        println!("Token saved to {}.", path.display());
    }
    Ok(())
}

async fn run_config(config: &Config, wait: bool, interval_ms: u64, attempts: u32) -> Result<()> {
    let service = ServiceClient::new(config)?;
    let remote = if wait {
        match service
            .wait_until_ready(Duration::from_millis(interval_ms), attempts)
            .await
        {
            Ok(remote) => remote,
            Err(e) if e.is_timeout() => {
                bail!("service at {} not ready after {attempts} polls", config.endpoint())
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        service.fetch_config().await?
    };

    println!("ready: {}", remote.is_ready());
    for (key, value) in &remote.values {
        println!("{key}: {value}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );
    info!(endpoint = %config.endpoint(), command = ?cli.command, "Starting rag-chat");

    match cli.command {
        Commands::Chat { plain, no_sources } => run_chat(&config, plain, no_sources).await,
        Commands::Ask {
            ref query,
            no_stream,
            ref history,
            plain,
        } => run_ask(&config, query, no_stream, history.clone(), plain).await,
        Commands::Login { save } => run_login(&config, cli.config.as_deref(), save).await,
        Commands::Logout => {
            ServiceClient::new(&config)?.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        Commands::Config {
            wait,
            interval_ms,
            attempts,
        } => run_config(&config, wait, interval_ms, attempts).await,
    }
}
