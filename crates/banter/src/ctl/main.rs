//! banterctl - Chat client CLI for the Banter relay
//!
//! Drives the relay end to end: streams a generated answer to the terminal
//! while it is produced and commits the finished turn into the session
//! store.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use banter::client::RelayClient;
use banter::persona::Personality;
use banter::session::SessionDetail;

const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let client = RelayClient::new(&cli.server);

    match cli.command {
        Command::Status => handle_status(&client).await,
        Command::Session { command } => handle_session(&client, command, cli.json).await,
        Command::Ask(cmd) => handle_ask(&client, cmd).await,
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "banterctl",
    author,
    version,
    about = "Chat client for the Banter relay - manage sessions and stream answers."
)]
struct Cli {
    /// Relay server URL
    #[arg(long, short = 's', default_value = DEFAULT_SERVER_URL, env = "BANTER_SERVER_URL")]
    server: String,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check server status
    Status,

    /// Manage sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Send a message and stream the answer
    Ask(AskCommand),
}

#[derive(Debug, Subcommand)]
enum SessionCommand {
    /// List all sessions
    List,
    /// Show a session with its conversation
    Show {
        /// Session ID
        id: String,
    },
    /// Create a new session
    Create {
        /// Session name
        #[arg(long)]
        name: Option<String>,
        /// Personality tag (default, analyst, teacher, creative, programmer)
        #[arg(long)]
        personality: Option<Personality>,
    },
    /// Rename a session
    Rename {
        /// Session ID
        id: String,
        /// New name
        name: String,
    },
    /// Delete a session
    Delete {
        /// Session ID
        id: String,
    },
}

#[derive(Debug, Clone, Args)]
struct AskCommand {
    /// The message to send
    message: String,
    /// Session to continue (a new one is created when omitted)
    #[arg(long)]
    session: Option<String>,
    /// Personality for a newly created session
    #[arg(long)]
    personality: Option<Personality>,
}

async fn handle_status(client: &RelayClient) -> Result<()> {
    if client.health().await? {
        println!("server is up");
        Ok(())
    } else {
        bail!("server responded but is not healthy");
    }
}

async fn handle_session(client: &RelayClient, command: SessionCommand, json: bool) -> Result<()> {
    match command {
        SessionCommand::List => {
            let sessions = client.list_sessions().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                return Ok(());
            }
            if sessions.is_empty() {
                println!("no sessions");
                return Ok(());
            }
            for session in sessions {
                let pin = if session.is_pinned { "*" } else { " " };
                println!(
                    "{} {}  [{}]  {}",
                    pin, session.id, session.personality, session.name
                );
            }
            Ok(())
        }
        SessionCommand::Show { id } => {
            let detail = client.get_session(&id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
                return Ok(());
            }
            print_session(&detail);
            Ok(())
        }
        SessionCommand::Create { name, personality } => {
            let session = client.create_session(name.as_deref(), personality).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                println!("created session {}", session.id);
            }
            Ok(())
        }
        SessionCommand::Rename { id, name } => {
            client.rename_session(&id, &name).await?;
            println!("renamed session {}", id);
            Ok(())
        }
        SessionCommand::Delete { id } => {
            client.delete_session(&id).await?;
            println!("deleted session {}", id);
            Ok(())
        }
    }
}

async fn handle_ask(client: &RelayClient, cmd: AskCommand) -> Result<()> {
    let detail = match cmd.session {
        Some(ref id) => client
            .get_session(id)
            .await
            .with_context(|| format!("fetching session {}", id))?,
        None => {
            let session = client.create_session(None, cmd.personality).await?;
            client.get_session(&session.id).await?
        }
    };

    // Whether this is the session's first turn, derived from the sequence
    // length at submission time.
    let first_turn = detail.messages.is_empty();
    let session_id = detail.session.id.clone();

    // Print only what each partial adds beyond the previous one.
    let mut printed = 0usize;
    let mut on_partial = |partial: &str| {
        let fresh = &partial[printed..];
        print!("{fresh}");
        let _ = io::stdout().flush();
        printed = partial.len();
    };

    let commit = client
        .send_turn(&detail, &cmd.message, &mut on_partial)
        .await?;
    println!();

    if let Some(err) = commit.persist_error {
        eprintln!("warning: answer was not persisted: {err}");
    }

    if first_turn {
        match client.generate_name(&cmd.message).await {
            Ok(name) => {
                if let Err(err) = client.rename_session(&session_id, &name).await {
                    eprintln!("warning: failed to rename session: {err}");
                }
            }
            Err(err) => eprintln!("warning: failed to generate session name: {err}"),
        }
    }

    Ok(())
}

fn print_session(detail: &SessionDetail) {
    println!(
        "{}  [{}]  {}",
        detail.session.id, detail.session.personality, detail.session.name
    );
    if let Some(doc) = detail.session.document() {
        println!("document: {}", doc.filename);
    }
    for turn in &detail.messages {
        println!("{}: {}", turn.role, turn.content);
    }
}
