//! chatline - streaming chat client
//!
//! Commands:
//! - `replay`: feed a captured NDJSON reply through the assembly pipeline
//! - `send`: send a message to a chat server and stream the reply
//! - `config`: show configuration and log locations
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/chatline/chatline.log (~/.local/state/chatline/chatline.log)
//! - Config: $XDG_CONFIG_HOME/chatline/config.toml (~/.config/chatline/config.toml)

mod printer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chatline_core::callback::{CallbackRegistry, Subscriber};
use chatline_core::stream::{chunked, event_stream};
use chatline_core::transcript::{NullSink, RenderSink, TranscriptAssembler};
use chatline_core::{ChatSession, Config, Document, HttpTransport};
use clap::{Parser, Subcommand};
use printer::TerminalSink;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "chatline")]
#[command(about = "Streaming chat client for NDJSON chat servers")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a captured NDJSON reply
    Replay {
        /// Capture file, one record per line
        file: PathBuf,

        /// Bytes per simulated network chunk
        #[arg(long, default_value = "64")]
        chunk_size: usize,

        /// Print the assembled exchange as JSON instead of streaming text
        #[arg(long)]
        json: bool,
    },

    /// Send a message and stream the reply
    Send {
        /// Message text
        message: String,

        /// Attach a file (repeatable)
        #[arg(short, long = "attach")]
        attach: Vec<PathBuf>,

        /// Chat server base URL (default: from config)
        #[arg(long)]
        server: Option<String>,

        /// Print the transcript as JSON when done
        #[arg(long)]
        json: bool,
    },

    /// Show configuration and log paths
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        chatline_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Replay {
            file,
            chunk_size,
            json,
        } => cmd_replay(&config, &file, chunk_size, json).await,
        Command::Send {
            message,
            attach,
            server,
            json,
        } => cmd_send(config, message, &attach, server, json).await,
        Command::Config => cmd_config(&config),
    }
}

/// Cancel the token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

fn print_document(doc: &Document) {
    println!(
        "{} {} ({} bytes)",
        doc.icon,
        doc.title,
        doc.content.len()
    );
}

async fn cmd_replay(config: &Config, file: &Path, chunk_size: usize, json: bool) -> Result<()> {
    if chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }
    let data =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    tracing::info!(file = %file.display(), bytes = data.len(), chunk_size, "Replaying capture");

    let mut documents = CallbackRegistry::new();
    if !json {
        documents.register(Subscriber::from_fn(print_document));
    }

    let mut terminal = TerminalSink::new(std::io::stdout());
    let mut null = NullSink;
    let sink: &mut dyn RenderSink = if json { &mut null } else { &mut terminal };

    let mut assembler = TranscriptAssembler::new(0, &config.transcript, sink, &documents);
    let result = assembler
        .consume(event_stream(chunked(data, chunk_size)), &cancel_on_interrupt())
        .await;
    let exchange = assembler.into_exchange();

    if json {
        println!("{}", serde_json::to_string_pretty(&exchange)?);
    }

    result.with_context(|| format!("reply in {} could not be assembled", file.display()))
}

async fn cmd_send(
    mut config: Config,
    message: String,
    attach: &[PathBuf],
    server: Option<String>,
    json: bool,
) -> Result<()> {
    if let Some(url) = server {
        config.server.base_url = url;
    }
    let transport =
        HttpTransport::new(config.server.clone()).context("invalid server configuration")?;

    let sink: Box<dyn RenderSink> = if json {
        Box::new(NullSink)
    } else {
        Box::new(TerminalSink::new(std::io::stdout()))
    };
    let mut session = ChatSession::new(Arc::new(transport))
        .with_config(config.transcript.clone())
        .with_sink(sink);
    session.on_error(Subscriber::from_fn(|msg: &String| eprintln!("error: {}", msg)));
    if !json {
        session.on_document(Subscriber::from_fn(print_document));
    }

    for path in attach {
        let data =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        session
            .attach_file(&name, data)
            .await
            .with_context(|| format!("failed to attach {}", path.display()))?;
    }

    session.set_input(message);
    if !session.can_send() {
        bail!("message is empty");
    }

    let result = session.send(&cancel_on_interrupt()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(session.transcript())?);
    }

    result.context("chat request failed")?;
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    let config_path = Config::config_path();
    println!("chatline Configuration");
    println!("======================");
    println!();
    println!(
        "Config file:     {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!("Log file:        {}", Config::log_path().display());
    println!();
    println!("Server:          {}", config.server.base_url);
    println!("  session:       {}", config.server.url(&config.server.session_path));
    println!("  stream:        {}", config.server.url(&config.server.stream_path));
    println!("  file:          {}", config.server.url(&config.server.file_path));
    println!("  timeout:       {}s", config.server.timeout_secs);
    println!();
    println!("Scroll throttle: {}ms", config.transcript.scroll_throttle_ms);
    println!("Log level:       {}", config.logging.level);
    Ok(())
}
