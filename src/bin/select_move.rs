use clap::Parser;
use opponent_move_engine::{
    CancelToken, Difficulty, EngineConfig, EngineError, MoveRequest, OpeningBook, Orchestrator,
    Profile, SignatureSnapshot, ThreadScheduler,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Pick one opponent move for a position and print the response as JSON.
#[derive(Parser, Debug)]
#[command(name = "select_move", version)]
struct Args {
    /// Position in Forsyth-Edwards Notation
    #[arg(long)]
    fen: String,

    /// beginner, easy, medium, hard or expert
    #[arg(long, default_value = "medium")]
    difficulty: Difficulty,

    /// strong, varied or teaching
    #[arg(long, default_value = "strong")]
    profile: Profile,

    /// Requested time allotment; clamped to the difficulty's hard cap
    #[arg(long)]
    budget_ms: Option<u64>,

    /// Seed for the varied profile
    #[arg(long)]
    seed: Option<u64>,

    /// Engine configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Opening book JSON replacing the built-in book
    #[arg(long)]
    book: Option<PathBuf>,

    /// Teaching signature snapshot JSON
    #[arg(long)]
    signatures: Option<PathBuf>,
}

fn build_request(args: &Args) -> Result<MoveRequest, EngineError> {
    let mut request = MoveRequest::new(args.fen.clone())
        .with_difficulty(args.difficulty)
        .with_profile(args.profile);
    if let Some(budget_ms) = args.budget_ms {
        request = request.with_budget_ms(budget_ms);
    }
    if let Some(seed) = args.seed {
        request = request.with_seed(seed);
    }
    if let Some(path) = &args.signatures {
        let json = std::fs::read_to_string(path)?;
        let snapshot: SignatureSnapshot = serde_json::from_str(&json)?;
        request = request.with_signatures(snapshot);
    }
    Ok(request)
}

fn build_orchestrator(args: &Args) -> Result<Orchestrator, EngineError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    Ok(match &args.book {
        Some(path) => Orchestrator::with_book(config, OpeningBook::from_json_file(path)?),
        None => Orchestrator::new(config),
    })
}

fn run(args: &Args) -> Result<String, EngineError> {
    let orchestrator = build_orchestrator(args)?;
    let request = build_request(args)?;
    let response = orchestrator.select_move(&request, &CancelToken::new(), &ThreadScheduler)?;
    Ok(serde_json::to_string_pretty(&response)?)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let error = serde_json::json!({ "code": e.code(), "message": e.to_string() });
            println!("{}", error);
            ExitCode::FAILURE
        }
    }
}
