//! # Opponent Move Engine
//!
//! Move selection for a computer chess opponent. Given a FEN position and a
//! difficulty it answers with one legal move in SAN, chosen within a bounded
//! amount of compute and with a short diagnostics record.
//!
//! ## Features
//!
//! - **Opening Book**: weighted, transposition-aware book replies for common openings
//! - **Tactical Fast Path**: mate in one is played without searching
//! - **Interruptible Search**: iterative-deepening alpha-beta with quiescence, cooperative
//!   cancellation and a hard time cap
//! - **Safety Filter**: penalises candidates that hang material or allow an immediate mate
//! - **Profiles**: strong (deterministic), varied (near-best randomisation) and teaching
//!   (bias toward the learner's known weaknesses)
//! - **Worker Boundary**: searches run off the caller's thread under a hard backstop
//!
//! ## Quick Start
//!
//! ```rust
//! use opponent_move_engine::{CancelToken, MoveRequest, NoopScheduler, Orchestrator};
//!
//! let engine = Orchestrator::default();
//! let request = MoveRequest::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
//! let response = engine
//!     .select_move(&request, &CancelToken::new(), &NoopScheduler)
//!     .unwrap();
//! println!("{} via {:?}", response.san, response.diagnostics.provenance);
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod position;

pub mod evaluation;
pub mod notation;
pub mod opening_book;
pub mod orchestrator;
pub mod search;
pub mod tactical_check;
pub mod teaching;
pub mod worker;

// Re-export commonly used types
pub use config::{BudgetEntry, BudgetTable, Difficulty, EngineConfig, Profile, SearchBudget};
pub use errors::{EngineError, ErrorCode, Result};
pub use notation::to_san;
pub use opening_book::{BookMove, OpeningBook, OpeningBookStats, OpeningEntry, OpeningLine};
pub use orchestrator::{
    Diagnostics, EvaluatedMove, MoveRequest, MoveResponse, Orchestrator, Provenance,
    RejectedCandidate,
};
pub use position::{GameStatus, Move, Position, SpecialMove};
pub use search::{
    rescore_root, search, CancelToken, NoopScheduler, RootCandidate, Scheduler, SearchOutcome,
    SearchState, TerminationReason, ThreadScheduler,
};
pub use tactical_check::{inspect_move, CandidateSafety, HangingPiece, TacticalFinding};
pub use teaching::{SignatureSnapshot, TeachingSignature, WeaknessPattern};
pub use worker::{EngineSession, MoveWorker};
