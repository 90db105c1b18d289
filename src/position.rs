//! Immutable position model on top of the `chess` crate.
//!
//! `chess::Board` already guarantees fully-legal move generation; this layer adds
//! the FEN move counters the board does not track, classifies special moves, and
//! turns every move application into a value-producing operation.

use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{EngineError, Result};
use crate::invalid_position;

pub const PAWN_VALUE: i32 = 100;
pub const KNIGHT_VALUE: i32 = 320;
pub const BISHOP_VALUE: i32 = 330;
pub const ROOK_VALUE: i32 = 500;
pub const QUEEN_VALUE: i32 = 900;

/// Material value in centipawns. The king has no exchange value.
pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => PAWN_VALUE,
        Piece::Knight => KNIGHT_VALUE,
        Piece::Bishop => BISHOP_VALUE,
        Piece::Rook => ROOK_VALUE,
        Piece::Queen => QUEEN_VALUE,
        Piece::King => 0,
    }
}

pub fn piece_name(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "pawn",
        Piece::Knight => "knight",
        Piece::Bishop => "bishop",
        Piece::Rook => "rook",
        Piece::Queen => "queen",
        Piece::King => "king",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Ongoing,
    Checkmate,
    Stalemate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialMove {
    CastleKingside,
    CastleQueenside,
    EnPassant,
}

/// A legal move in the context of the position that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    inner: ChessMove,
    piece: Piece,
    captured: Option<Piece>,
    special: Option<SpecialMove>,
}

impl Move {
    pub fn origin(&self) -> Square {
        self.inner.get_source()
    }

    pub fn destination(&self) -> Square {
        self.inner.get_dest()
    }

    pub fn promotion(&self) -> Option<Piece> {
        self.inner.get_promotion()
    }

    pub fn special(&self) -> Option<SpecialMove> {
        self.special
    }

    /// The piece that moves (a pawn for promotions).
    pub fn piece(&self) -> Piece {
        self.piece
    }

    pub fn captured(&self) -> Option<Piece> {
        self.captured
    }

    pub fn is_capture(&self) -> bool {
        self.captured.is_some()
    }

    pub(crate) fn chess_move(&self) -> ChessMove {
        self.inner
    }

    /// Machine-compact origin/destination form. Never leaves the crate.
    pub(crate) fn compact(&self) -> String {
        self.inner.to_string()
    }
}

/// Board state plus the FEN counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

impl Position {
    pub fn startpos() -> Self {
        Self {
            board: Board::default(),
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// Parse a FEN string with 4 to 6 fields. Missing counters default to `0 1`.
    pub fn from_fen(fen: &str) -> Result<Self> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 || fields.len() > 6 {
            return Err(invalid_position!(
                "expected 4 to 6 FEN fields, got {}",
                fields.len()
            ));
        }

        let halfmove_clock = match fields.get(4) {
            Some(field) => field
                .parse::<u32>()
                .map_err(|_| invalid_position!("bad half-move clock '{}'", field))?,
            None => 0,
        };
        let fullmove_number = match fields.get(5) {
            Some(field) => field
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| invalid_position!("bad full-move number '{}'", field))?,
            None => 1,
        };

        let normalized = format!(
            "{} {} {} {} {} {}",
            fields[0], fields[1], fields[2], fields[3], halfmove_clock, fullmove_number
        );
        let board = Board::from_str(&normalized)
            .map_err(|e| invalid_position!("'{}' rejected: {}", fen, e))?;

        Ok(Self {
            board,
            halfmove_clock,
            fullmove_number,
        })
    }

    pub(crate) fn from_board(board: Board) -> Self {
        Self {
            board,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub fn to_fen(&self) -> String {
        format!(
            "{} {} {}",
            self.canonical_key(),
            self.halfmove_clock,
            self.fullmove_number
        )
    }

    /// Placement, side, castling and en passant: the identity of the position
    /// independent of move counters.
    pub fn canonical_key(&self) -> String {
        let full = self.board.to_string();
        full.split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        MoveGen::new_legal(&self.board)
            .filter_map(|mv| self.classify(mv))
            .collect()
    }

    pub fn is_legal(&self, mv: &Move) -> bool {
        self.board.legal(mv.inner)
    }

    /// Produce the successor position. Anything outside the legal set is rejected,
    /// including moves that would leave the mover's king in check.
    pub fn apply(&self, mv: &Move) -> Result<Position> {
        let classified = self
            .classify(mv.inner)
            .filter(|_| self.board.legal(mv.inner))
            .ok_or_else(|| EngineError::IllegalMove {
                mv: mv.compact(),
                fen: self.to_fen(),
            })?;

        let halfmove_clock = if classified.piece == Piece::Pawn || classified.is_capture() {
            0
        } else {
            self.halfmove_clock + 1
        };
        let fullmove_number = if self.side_to_move() == Color::Black {
            self.fullmove_number + 1
        } else {
            self.fullmove_number
        };

        Ok(Position {
            board: self.board.make_move_new(classified.inner),
            halfmove_clock,
            fullmove_number,
        })
    }

    pub fn is_in_check(&self) -> bool {
        self.board.checkers().popcnt() > 0
    }

    pub fn is_checkmate(&self) -> bool {
        self.board.status() == BoardStatus::Checkmate
    }

    pub fn is_stalemate(&self) -> bool {
        self.board.status() == BoardStatus::Stalemate
    }

    pub fn status(&self) -> GameStatus {
        match self.board.status() {
            BoardStatus::Ongoing => GameStatus::Ongoing,
            BoardStatus::Checkmate => GameStatus::Checkmate,
            BoardStatus::Stalemate => GameStatus::Stalemate,
        }
    }

    /// Resolve a long-algebraic move (`e2e4`, `e7e8q`) against the legal set.
    pub fn move_from_uci(&self, text: &str) -> Result<Move> {
        let parsed = ChessMove::from_str(text.trim())
            .map_err(|_| invalid_position!("unparseable move '{}'", text))?;
        self.legal_moves()
            .into_iter()
            .find(|mv| mv.inner == parsed)
            .ok_or_else(|| EngineError::IllegalMove {
                mv: text.to_string(),
                fen: self.to_fen(),
            })
    }

    /// Wrap a raw `chess` move with the metadata of this position.
    pub(crate) fn classify(&self, mv: ChessMove) -> Option<Move> {
        let source = mv.get_source();
        let dest = mv.get_dest();
        let piece = self.board.piece_on(source)?;

        let mut captured = self.board.piece_on(dest);
        let mut special = None;

        if piece == Piece::King {
            let from_file = source.get_file().to_index() as i32;
            let to_file = dest.get_file().to_index() as i32;
            if to_file - from_file == 2 {
                special = Some(SpecialMove::CastleKingside);
            } else if from_file - to_file == 2 {
                special = Some(SpecialMove::CastleQueenside);
            }
        } else if piece == Piece::Pawn
            && source.get_file() != dest.get_file()
            && captured.is_none()
        {
            special = Some(SpecialMove::EnPassant);
            captured = Some(Piece::Pawn);
        }

        Some(Move {
            inner: mv,
            piece,
            captured,
            special,
        })
    }
}

impl FromStr for Position {
    type Err = EngineError;

    fn from_str(fen: &str) -> Result<Self> {
        Self::from_fen(fen)
    }
}
