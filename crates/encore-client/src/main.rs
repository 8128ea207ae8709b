use clap::{Parser, Subcommand};
use encore_client::{ClientConfig, ConsumerClient, ConsumerEvent, ConsumerHandle, Snapshot};
use encore_wire::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "encore", about = "Encore now-playing client")]
struct Cli {
    /// Relay URL (default: $ENCORE_RELAY_URL or ws://localhost:17777).
    #[arg(short, long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attach to a session and print its state. Reads commands from stdin:
    /// next, prev, rewind, select <track-id>, join <session-id>, quit.
    Watch {
        /// Session to join.
        #[arg(short, long)]
        session: Option<String>,

        /// Join the only active session when none is given.
        #[arg(short, long)]
        auto_join: bool,
    },
    /// List sessions that currently have a producer.
    Sessions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::new();
    if let Some(url) = cli.url {
        config = config.url(url);
    }

    match cli.command {
        Command::Sessions => {
            let sessions = encore_client::discover(config.relay_url()).await?;
            if sessions.is_empty() {
                eprintln!("No active sessions");
            }
            for session in sessions {
                println!("{session}");
            }
            Ok(())
        }
        Command::Watch { session, auto_join } => {
            if let Some(session) = session {
                config = config.session_id(SessionId::from(session));
            }
            watch(config.auto_join(auto_join)).await
        }
    }
}

async fn watch(config: ClientConfig) -> anyhow::Result<()> {
    let channels = ConsumerClient::spawn(config)?;
    let handle = channels.handle;
    let mut events = channels.events;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut position_ms = 0;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ConsumerEvent::State(snapshot)) => {
                    position_ms = snapshot.player.position_ms;
                    print_snapshot(&snapshot);
                }
                Some(ConsumerEvent::Welcome { session_id, .. }) => {
                    eprintln!("Joined session {session_id}");
                }
                Some(ConsumerEvent::Sessions(sessions)) => {
                    eprintln!("Several sessions are active; pick one with `join <id>`:");
                    for session in sessions {
                        eprintln!("  {session}");
                    }
                }
                Some(ConsumerEvent::Error(error)) => {
                    eprintln!("Relay error {}: {}", error.code, error.message);
                }
                Some(ConsumerEvent::Lyrics(lyrics)) => {
                    let lines = lyrics
                        .synced
                        .map(|lines| lines.len())
                        .or(lyrics.unsynced.map(|lines| lines.len()))
                        .unwrap_or(0);
                    eprintln!("Lyrics for {} ({lines} lines)", lyrics.track_id);
                }
                Some(ConsumerEvent::Disconnected { reason, retry_in }) => {
                    eprintln!("Disconnected ({reason}), retrying in {retry_in:?}");
                }
                None => return Ok(()),
            },

            line = stdin.next_line() => {
                let Some(line) = line? else {
                    handle.shutdown().await;
                    return Ok(());
                };
                if !run_command(&handle, line.trim(), position_ms).await? {
                    handle.shutdown().await;
                    return Ok(());
                }
            }
        }
    }
}

/// Returns false when the user asked to quit.
async fn run_command(handle: &ConsumerHandle, line: &str, position_ms: u64) -> anyhow::Result<bool> {
    let (command, arg) = match line.split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };
    match command {
        "" => {}
        "next" | "n" => handle.next().await?,
        "prev" | "p" => handle.prev(true, position_ms).await?,
        "rewind" | "r" => handle.rewind().await?,
        "select" | "s" if !arg.is_empty() => handle.select(arg).await?,
        "join" | "j" if !arg.is_empty() => handle.join(SessionId::from(arg.to_string())).await?,
        "quit" | "q" => return Ok(false),
        other => eprintln!("Unknown command: {other}"),
    }
    Ok(true)
}

fn print_snapshot(snapshot: &Snapshot) {
    let name = |track: Option<&encore_wire::Track>| {
        track
            .map(|t| format!("{} - {}", t.artists.join(", "), t.name))
            .unwrap_or_else(|| "-".into())
    };
    let status = if snapshot.player.is_playing { "playing" } else { "paused" };
    println!(
        "[v{}] {} ({status}, {}s)",
        snapshot.queue.version,
        name(snapshot.queue.current.as_ref()),
        snapshot.player.position_ms / 1000,
    );
    if let Some(pending) = &snapshot.pending_track_id {
        let direction = snapshot
            .pending_direction
            .map(|d| d.to_string())
            .unwrap_or_else(|| "select".into());
        println!("  pending {direction}: {pending}");
    }
    for (i, track) in snapshot.queue.next.iter().take(5).enumerate() {
        println!("  {}. {} [{}]", i + 1, name(Some(track)), track.id);
    }
}
