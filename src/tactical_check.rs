//! One-ply tactical safety checks.
//!
//! Cheap enough to run over every root candidate: mate-in-one detection in both
//! directions, and attacker/defender counting to spot pieces left hanging.

use chess::{
    get_bishop_moves, get_king_moves, get_knight_moves, get_pawn_attacks, get_rook_moves,
    BitBoard, Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square, EMPTY,
};

use crate::errors::{EngineError, Result};
use crate::position::{piece_name, piece_value, Move, Position, KNIGHT_VALUE};

/// Multiplier applied to the net material a candidate leaves en prise.
pub const HANGING_PENALTY_MULTIPLIER: i32 = 12;

/// Ordering bonus for checking moves. Never large enough to beat a real material loss.
pub const CHECK_ORDER_BONUS: i32 = 300;

/// Penalty for handing the opponent a mate in one.
pub const ALLOWS_MATE_PENALTY: i32 = 20_000;

/// Hanging at least this much material vetoes a candidate from any bonus.
pub const VETO_THRESHOLD: i32 = KNIGHT_VALUE;

/// Kings take part in exchanges last.
const KING_EXCHANGE_VALUE: i32 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TacticalFinding {
    ImmediateMateForMover { mating_move: Move },
    ImmediateMateAgainstMover { threat: Move },
    PieceLeftHanging { piece: Piece, square: Square, value: i32 },
}

impl TacticalFinding {
    /// Short label safe to hand to callers.
    pub fn describe(&self) -> String {
        match self {
            TacticalFinding::ImmediateMateForMover { .. } => "mate in one available".to_string(),
            TacticalFinding::ImmediateMateAgainstMover { .. } => "allows mate in one".to_string(),
            TacticalFinding::PieceLeftHanging {
                piece,
                square,
                value,
            } => format!("leaves {} on {} hanging ({}cp)", piece_name(*piece), square, value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HangingPiece {
    pub piece: Piece,
    pub square: Square,
    pub value: i32,
}

/// Safety report for one candidate move, simulated one ply forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidateSafety {
    pub gives_mate: bool,
    pub gives_check: bool,
    pub allows_mate: Option<Move>,
    pub hanging: Option<HangingPiece>,
}

impl CandidateSafety {
    pub fn penalty(&self) -> i32 {
        if self.gives_mate {
            return 0;
        }
        let hanging = self
            .hanging
            .map(|h| h.value * HANGING_PENALTY_MULTIPLIER)
            .unwrap_or(0);
        let mate = if self.allows_mate.is_some() {
            ALLOWS_MATE_PENALTY
        } else {
            0
        };
        hanging + mate
    }

    /// Candidates that lose a minor piece or more, or allow mate, are never promoted.
    pub fn is_veto(&self) -> bool {
        !self.gives_mate
            && (self.allows_mate.is_some()
                || self.hanging.map(|h| h.value >= VETO_THRESHOLD).unwrap_or(false))
    }

    /// The most serious finding, mate threats first.
    pub fn finding(&self) -> Option<TacticalFinding> {
        if self.gives_mate {
            return None;
        }
        if let Some(threat) = self.allows_mate {
            return Some(TacticalFinding::ImmediateMateAgainstMover { threat });
        }
        self.hanging.map(|h| TacticalFinding::PieceLeftHanging {
            piece: h.piece,
            square: h.square,
            value: h.value,
        })
    }
}

/// Every piece of `by` that attacks `square` on the current occupancy.
pub fn attackers_of(board: &Board, square: Square, by: Color) -> BitBoard {
    let occupied = *board.combined();
    let theirs = *board.color_combined(by);
    let diagonal = *board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen);
    let straight = *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);

    // a pawn of `by` hits `square` exactly when a pawn of the other color on `square` would hit it
    let pawns = get_pawn_attacks(square, !by, *board.pieces(Piece::Pawn) & theirs);
    let knights = get_knight_moves(square) & *board.pieces(Piece::Knight);
    let sliders_diagonal = get_bishop_moves(square, occupied) & diagonal;
    let sliders_straight = get_rook_moves(square, occupied) & straight;
    let kings = get_king_moves(square) & *board.pieces(Piece::King);

    pawns | ((knights | sliders_diagonal | sliders_straight | kings) & theirs)
}

fn exchange_value(piece: Piece) -> i32 {
    if piece == Piece::King {
        KING_EXCHANGE_VALUE
    } else {
        piece_value(piece)
    }
}

fn cheapest(board: &Board, pieces: BitBoard) -> Option<i32> {
    pieces
        .filter_map(|sq| board.piece_on(sq))
        .map(exchange_value)
        .min()
}

/// Material the owner of the piece on `square` stands to lose, if any.
///
/// A piece hangs when it has more attackers than defenders, or when the cheapest
/// attacker is worth less than the piece itself.
pub fn hanging_value(board: &Board, square: Square) -> Option<i32> {
    let piece = board.piece_on(square)?;
    if piece == Piece::King {
        return None;
    }
    let owner = board.color_on(square)?;
    let value = piece_value(piece);

    let defenders = attackers_of(board, square, owner);
    let mut attackers = attackers_of(board, square, !owner);
    if defenders != EMPTY {
        // a king cannot capture onto a defended square
        attackers &= !*board.pieces(Piece::King);
    }
    if attackers == EMPTY {
        return None;
    }

    if attackers.popcnt() > defenders.popcnt() {
        return Some(value);
    }
    let cheapest_attacker = cheapest(board, attackers)?;
    if cheapest_attacker < value {
        Some(value - cheapest_attacker)
    } else {
        None
    }
}

fn hanging_pieces(board: &Board, color: Color) -> Vec<HangingPiece> {
    (*board.color_combined(color))
        .filter_map(|square| {
            let value = hanging_value(board, square)?;
            let piece = board.piece_on(square)?;
            Some(HangingPiece {
                piece,
                square,
                value,
            })
        })
        .collect()
}

pub(crate) fn mate_in_one(board: &Board) -> Option<ChessMove> {
    MoveGen::new_legal(board).find(|mv| board.make_move_new(*mv).status() == BoardStatus::Checkmate)
}

/// A move that checkmates immediately, if the side to move has one.
pub fn find_mate_in_one(position: &Position) -> Option<Move> {
    let mv = mate_in_one(position.board())?;
    position.classify(mv)
}

/// Mate the opponent could deliver if it were their turn. Not defined while in check.
pub fn mate_threat(position: &Position) -> Option<Move> {
    let passed = position.board().null_move()?;
    let mv = mate_in_one(&passed)?;
    Position::from_board(passed).classify(mv)
}

/// Inspect the position for the side to move, most urgent finding first.
pub fn scan(position: &Position) -> Option<TacticalFinding> {
    if let Some(mating_move) = find_mate_in_one(position) {
        return Some(TacticalFinding::ImmediateMateForMover { mating_move });
    }
    if !position.is_in_check() {
        if let Some(threat) = mate_threat(position) {
            return Some(TacticalFinding::ImmediateMateAgainstMover { threat });
        }
    }
    hanging_pieces(position.board(), position.side_to_move())
        .into_iter()
        .max_by_key(|h| h.value)
        .map(|h| TacticalFinding::PieceLeftHanging {
            piece: h.piece,
            square: h.square,
            value: h.value,
        })
}

/// Net exposure of the piece that just moved to `dest`, after paying for what it captured.
pub(crate) fn moved_piece_exposure(after: &Board, dest: Square, captured: Option<Piece>) -> i32 {
    let at_risk = hanging_value(after, dest).unwrap_or(0);
    let gained = captured.map(piece_value).unwrap_or(0);
    (at_risk - gained).max(0)
}

/// Simulate `mv` one ply forward and report what it gives up.
pub fn inspect_move(position: &Position, mv: &Move) -> Result<CandidateSafety> {
    if !position.is_legal(mv) {
        return Err(EngineError::IllegalMove {
            mv: mv.compact(),
            fen: position.to_fen(),
        });
    }
    let before = position.board();
    let after = before.make_move_new(mv.chess_move());
    let mover = before.side_to_move();

    if after.status() == BoardStatus::Checkmate {
        return Ok(CandidateSafety {
            gives_mate: true,
            gives_check: true,
            ..CandidateSafety::default()
        });
    }
    let gives_check = after.checkers().popcnt() > 0;

    let dest = mv.destination();
    let mut worst: Option<HangingPiece> = None;
    let mut consider = |candidate: HangingPiece| {
        if candidate.value > 0 && worst.map(|w| candidate.value > w.value).unwrap_or(true) {
            worst = Some(candidate);
        }
    };

    if let Some(piece) = after.piece_on(dest) {
        consider(HangingPiece {
            piece,
            square: dest,
            value: moved_piece_exposure(&after, dest, mv.captured()),
        });
    }

    let already: Vec<Square> = hanging_pieces(before, mover)
        .into_iter()
        .map(|h| h.square)
        .collect();
    for exposed in hanging_pieces(&after, mover) {
        if exposed.square != dest && !already.contains(&exposed.square) {
            consider(exposed);
        }
    }

    let allows_mate = mate_in_one(&after).and_then(|threat| Position::from_board(after).classify(threat));

    Ok(CandidateSafety {
        gives_mate: false,
        gives_check,
        allows_mate,
        hanging: worst,
    })
}
