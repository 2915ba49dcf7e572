//! conrelay-bot: relay a game server console to chat.
//!
//! Keeps one authenticated console session open, prints player chat and game
//! messages to stdout, and runs operator commands typed on stdin (see
//! `/help`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use conrelay_sdk::client::{self, ClientHandle};
use conrelay_sdk::event::Event;
use tokio::io::{AsyncBufReadExt, BufReader};

use conrelay_bot::chat::{ChatLine, RelaySink, WriterSink};
use conrelay_bot::commands::{self, OperatorCommand};
use conrelay_bot::config::{Overrides, RelayConfig};

#[derive(Parser)]
#[command(name = "conrelay-bot", about = "Relay a game server console to chat")]
struct Args {
    /// Config file (default: ~/.config/conrelay/relay.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Console host
    #[arg(long)]
    host: Option<String>,

    /// Console port
    #[arg(long)]
    port: Option<u16>,

    /// Console password (or set CONRELAY_PASSWORD env var)
    #[arg(long, env = "CONRELAY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Do not reconnect when the console drops
    #[arg(long)]
    no_reconnect: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "conrelay_bot=info,conrelay_sdk=info".into());
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        fmt.json().init();
    } else {
        fmt.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let file = RelayConfig::load(args.config.as_deref())?;
    let session_config = file.resolve(&Overrides {
        host: args.host.clone(),
        port: args.port,
        password: args.password.clone(),
        no_reconnect: args.no_reconnect,
    })?;

    tracing::info!(
        addr = %session_config.addr(),
        auto_reconnect = session_config.auto_reconnect,
        "Starting conrelay-bot"
    );

    let (handle, mut events) = client::connect(session_config)
        .await
        .context("starting console client")?;

    let mut sink = WriterSink::stdout();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    tracing::info!("Relay running. Ctrl+C to stop.");

    let result = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Event::AuthFailed) => {
                    break Err(anyhow::anyhow!("console rejected the password"));
                }
                Some(event) => {
                    if let Err(e) = handle_event(&mut sink, event) {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(input)) => {
                    if !handle_input(&handle, &input) {
                        break Ok(());
                    }
                }
                Ok(None) => {
                    tracing::debug!("stdin closed; relaying only");
                    stdin_open = false;
                }
                Err(e) => break Err(anyhow::Error::new(e).context("reading stdin")),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break Ok(());
            }
        }
    };

    if let Err(e) = handle.disconnect().await {
        tracing::debug!(error = %e, "Disconnect after shutdown");
    }
    result
}

fn handle_event(sink: &mut impl RelaySink, event: Event) -> Result<()> {
    match event {
        Event::Connected => tracing::debug!("Console connected; logging in"),
        Event::Ready => tracing::info!("Console session ready"),
        Event::Line(line) => match ChatLine::parse(&line) {
            Some(chat) => sink.relay(&chat).context("relaying chat line")?,
            None => tracing::debug!(%line, "Console"),
        },
        Event::ServerShutdown => tracing::warn!("Game server is shutting down"),
        Event::Error { message } => tracing::warn!(%message, "Console connection error"),
        Event::Closed { reason } => tracing::info!(%reason, "Console connection closed"),
        Event::ReconnectScheduled { delay } => {
            tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled")
        }
        // Handled by the caller.
        Event::AuthFailed => {}
    }
    Ok(())
}

/// Returns `false` when the operator asked to quit.
fn handle_input(handle: &ClientHandle, input: &str) -> bool {
    let cmd = match OperatorCommand::parse(input) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return true,
        Err(message) => {
            eprintln!("{message}");
            return true;
        }
    };
    if cmd == OperatorCommand::Quit {
        return false;
    }

    let handle = handle.clone();
    tokio::spawn(async move {
        let out = commands::run(&handle, &cmd).await;
        println!("{out}");
    });
    true
}
