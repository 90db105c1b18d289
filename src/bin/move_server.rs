//! JSON-lines front end: one request object per stdin line, one response per stdout line.
//!
//! A new request cancels the one still in flight, which then answers with its best
//! completed depth. The bare line `cancel` cancels without starting a new search.

use clap::Parser;
use opponent_move_engine::{
    EngineConfig, EngineSession, MoveRequest, MoveResponse, MoveWorker, Orchestrator,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "move_server", version)]
struct Args {
    /// Engine configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(flatten)]
    request: MoveRequest,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Outcome {
    Move(MoveResponse),
    Error { code: String, message: String },
}

#[derive(Serialize)]
struct Reply {
    id: Option<u64>,
    #[serde(flatten)]
    outcome: Outcome,
}

fn emit(reply: &Reply) {
    match serde_json::to_string(reply) {
        Ok(line) => println!("{}", line),
        Err(e) => error!(error = %e, "failed to encode reply"),
    }
}

/// Drop requests that have already answered. Returns how many were collected.
fn reap(pending: &mut JoinSet<()>) -> Result<usize, JoinError> {
    let mut collected = 0;
    while let Some(done) = pending.try_join_next() {
        done?;
        collected += 1;
    }
    Ok(collected)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let session = Arc::new(EngineSession::new(MoveWorker::new(Orchestrator::new(config))));
    info!("move server ready");

    let mut pending = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "cancel" {
            let cancelled = session.cancel().await;
            debug!(cancelled, "cancel requested");
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                emit(&Reply {
                    id: None,
                    outcome: Outcome::Error {
                        code: "INVALID_REQUEST".to_string(),
                        message: e.to_string(),
                    },
                });
                continue;
            }
        };

        reap(&mut pending)?;
        let session = Arc::clone(&session);
        pending.spawn(async move {
            let id = envelope.id;
            let outcome = match session.request(envelope.request).await {
                Ok(response) => Outcome::Move(response),
                Err(e) => Outcome::Error {
                    code: serde_json::to_value(e.code())
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default(),
                    message: e.to_string(),
                },
            };
            emit(&Reply { id, outcome });
        });
        // let the spawned request register its cancel token before reading on
        tokio::task::yield_now().await;
    }

    // answer whatever is still running once input closes
    while let Some(done) = pending.join_next().await {
        done?;
    }
    Ok(())
}
