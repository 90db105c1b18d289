use serde::Serialize;
use thiserror::Error;

use crate::position::GameStatus;

/// Error taxonomy for move selection.
///
/// Every variant carries a stable [`ErrorCode`] so callers on the far side of the
/// worker boundary can branch without parsing messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed or impossible input position
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// The side to move has no legal moves; the game is over
    #[error("No legal moves: game is over ({status:?})")]
    NoLegalMoves { status: GameStatus },

    /// A move could not be rendered in human-readable notation
    #[error("Move translation failed for {mv}: {reason}")]
    TranslationFailure { mv: String, reason: String },

    /// Depth 1 never completed, so the search has nothing to commit
    #[error("Search budget exhausted before any depth completed")]
    BudgetExhaustedNoResult,

    /// The worker backstop fired before the unit of work produced a result
    #[error("Hard timeout after {budget_ms}ms with no result")]
    HardTimeout { budget_ms: u64 },

    /// Move is not in the legal set of the position it was applied to
    #[error("Illegal move {mv} in position {fen}")]
    IllegalMove { mv: String, fen: String },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The unit of work died without producing a result
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

/// Stable, distinct codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidPosition,
    NoLegalMoves,
    TranslationFailure,
    BudgetExhausted,
    HardTimeout,
    IllegalMove,
    Configuration,
    WorkerFailed,
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidPosition(_) => ErrorCode::InvalidPosition,
            EngineError::NoLegalMoves { .. } => ErrorCode::NoLegalMoves,
            EngineError::TranslationFailure { .. } => ErrorCode::TranslationFailure,
            EngineError::BudgetExhaustedNoResult => ErrorCode::BudgetExhausted,
            EngineError::HardTimeout { .. } => ErrorCode::HardTimeout,
            EngineError::IllegalMove { .. } => ErrorCode::IllegalMove,
            EngineError::Configuration(_) => ErrorCode::Configuration,
            EngineError::WorkerFailed(_) => ErrorCode::WorkerFailed,
        }
    }

    /// Terminal game states are a signal, not an engine failure.
    pub fn is_game_over(&self) -> bool {
        matches!(self, EngineError::NoLegalMoves { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::Configuration(format!("I/O error: {}", error))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Configuration(format!("JSON error: {}", error))
    }
}

#[macro_export]
macro_rules! invalid_position {
    ($msg:expr) => {
        $crate::errors::EngineError::InvalidPosition($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::EngineError::InvalidPosition(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::errors::EngineError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::EngineError::Configuration(format!($fmt, $($arg)*))
    };
}
