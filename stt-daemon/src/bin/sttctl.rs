//! `sttctl` — control-socket client for `sttd`.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stt_core::ipc::wire::{Command, Response};

#[derive(Parser, Debug)]
#[command(name = "sttctl", about = "Control client for the sttd daemon", version)]
struct Args {
    #[command(subcommand)]
    action: Action,

    /// Path to the daemon's control socket.
    #[arg(long, default_value = "/tmp/sttd.sock")]
    socket: PathBuf,

    /// Request verbose status data.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Start a transcription session.
    Start {
        /// Stay in Listening after each utterance instead of stopping.
        #[arg(long)]
        continuous: bool,
    },
    /// Stop the current session.
    Stop,
    /// Report the current session state.
    Status,
    /// Fetch recent log entries.
    Logs,
}

fn main() {
    let args = Args::parse();

    let mut options = std::collections::HashMap::new();
    if args.verbose {
        options.insert("verbose".to_string(), "true".to_string());
    }

    let command = match &args.action {
        Action::Start { continuous } => {
            if *continuous {
                options.insert("continuous".to_string(), "true".to_string());
            }
            Command {
                action: "start".to_string(),
                options,
            }
        }
        Action::Stop => Command {
            action: "stop".to_string(),
            options,
        },
        Action::Status => Command {
            action: "status".to_string(),
            options,
        },
        Action::Logs => Command {
            action: "logs".to_string(),
            options,
        },
    };

    match send(&args.socket, &command) {
        Ok(response) => print_response(&response),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn send(socket: &PathBuf, command: &Command) -> anyhow::Result<Response> {
    let mut stream = UnixStream::connect(socket)?;
    let body = serde_json::to_vec(command)?;
    stream.write_all(&body)?;
    stream.flush()?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    let response: Response = serde_json::from_slice(&buf)?;
    Ok(response)
}

fn print_response(response: &Response) {
    match response.status.as_str() {
        "success" => {
            if let Some(message) = &response.message {
                println!("{message}");
            }
            if let Some(data) = &response.data {
                let mut keys: Vec<_> = data.keys().collect();
                keys.sort();
                for key in keys {
                    println!("{key}: {}", data[key]);
                }
            }
        }
        _ => {
            eprintln!("error: {}", response.error.as_deref().unwrap_or("unknown"));
            std::process::exit(1);
        }
    }
}
