//! Bounded teaching bias applied after search.
//!
//! The caller passes a snapshot of the player's known weaknesses. Candidates that
//! would steer the game into a position exercising one of them get a small bonus,
//! never more than a fixed fraction of their own evaluation and never when the
//! safety pass vetoed them.

use chess::{
    get_king_moves, get_knight_moves, get_pawn_attacks, BitBoard, Board, Color, MoveGen, Piece,
    Rank, EMPTY,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evaluation::file_mask;
use crate::orchestrator::EvaluatedMove;
use crate::position::{piece_value, Move, Position, KNIGHT_VALUE};
use crate::search::is_mate_score;
use crate::tactical_check::{attackers_of, hanging_value};

/// Signatures below this confidence are ignored.
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Largest adjustment relative to the candidate's absolute score.
pub const MAX_BIAS_FRACTION: f32 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeachingSignature {
    /// Weakness id, e.g. `hanging-piece`.
    pub weakness: String,
    /// In [0, 1].
    pub confidence: f32,
    /// In [0, 100]; fully mastered weaknesses get no bias.
    pub mastery: f32,
}

impl TeachingSignature {
    fn strength(&self) -> f32 {
        let confidence = self.confidence.clamp(0.0, 1.0);
        let mastery = self.mastery.clamp(0.0, 100.0);
        confidence * (1.0 - mastery / 100.0)
    }
}

/// Versioned set of signatures supplied per call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureSnapshot {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub signatures: Vec<TeachingSignature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeaknessPattern {
    /// The player tends to leave pieces under-defended.
    HangingPiece,
    /// The player neglects the safety of their king.
    KingSafety,
    /// The player misses fork opportunities.
    MissedFork,
    /// The player's king gets trapped on the back rank.
    BackRank,
}

impl WeaknessPattern {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "hanging-piece" => Some(WeaknessPattern::HangingPiece),
            "king-safety" => Some(WeaknessPattern::KingSafety),
            "missed-fork" => Some(WeaknessPattern::MissedFork),
            "back-rank" => Some(WeaknessPattern::BackRank),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            WeaknessPattern::HangingPiece => "hanging-piece",
            WeaknessPattern::KingSafety => "king-safety",
            WeaknessPattern::MissedFork => "missed-fork",
            WeaknessPattern::BackRank => "back-rank",
        }
    }

    /// Whether playing `mv` in `before` produces a position exercising this weakness.
    pub fn matches(&self, before: &Board, mv: &Move) -> bool {
        let after = before.make_move_new(mv.chess_move());
        let mover = before.side_to_move();
        match self {
            WeaknessPattern::HangingPiece => creates_hanging_target(before, &after, mover),
            WeaknessPattern::KingSafety => {
                king_zone_pressure(&after, mover) > king_zone_pressure(before, mover)
            }
            WeaknessPattern::MissedFork => fork_available(&after),
            WeaknessPattern::BackRank => back_rank_setup(&after, mv, mover),
        }
    }
}

fn creates_hanging_target(before: &Board, after: &Board, mover: Color) -> bool {
    (*after.color_combined(!mover)).any(|square| {
        hanging_value(after, square).is_some() && hanging_value(before, square).is_none()
    })
}

fn king_zone(board: &Board, color: Color) -> BitBoard {
    let king = board.king_square(color);
    get_king_moves(king) | BitBoard::from_square(king)
}

/// Squares around the king of `!attacker` that `attacker` hits.
fn king_zone_pressure(board: &Board, attacker: Color) -> u32 {
    king_zone(board, !attacker)
        .filter(|&square| attackers_of(board, square, attacker) != EMPTY)
        .count() as u32
}

/// The side to move has a knight or pawn move hitting two valuable enemy pieces.
fn fork_available(board: &Board) -> bool {
    let forker = board.side_to_move();
    let victims = *board.color_combined(!forker);
    let valuable = |square| {
        board
            .piece_on(square)
            .map(|piece| piece == Piece::King || piece_value(piece) >= KNIGHT_VALUE)
            .unwrap_or(false)
    };

    MoveGen::new_legal(board).any(|mv| {
        let dest = mv.get_dest();
        let targets = match board.piece_on(mv.get_source()) {
            Some(Piece::Knight) => get_knight_moves(dest) & victims,
            Some(Piece::Pawn) if mv.get_promotion().is_none() => {
                get_pawn_attacks(dest, forker, victims)
            }
            _ => return false,
        };
        targets.filter(|&square| valuable(square)).count() >= 2
    })
}

/// Enemy king stuck on its back rank behind its own pieces, and a heavy piece
/// of ours arriving on a file without our pawns.
fn back_rank_setup(after: &Board, mv: &Move, mover: Color) -> bool {
    if !matches!(mv.piece(), Piece::Rook | Piece::Queen) {
        return false;
    }
    let defender = !mover;
    let king = after.king_square(defender);
    let back_rank = if defender == Color::White {
        Rank::First
    } else {
        Rank::Eighth
    };
    if king.get_rank() != back_rank {
        return false;
    }
    let boxed = get_king_moves(king)
        .filter(|sq| sq.get_rank() != back_rank)
        .all(|sq| after.color_on(sq) == Some(defender));

    let own_pawns = *after.pieces(Piece::Pawn) & *after.color_combined(mover);
    let open_for_us = (file_mask(mv.destination().get_file()) & own_pawns) == EMPTY;
    boxed && open_for_us
}

fn active_patterns(snapshot: &SignatureSnapshot) -> Vec<(WeaknessPattern, f32)> {
    snapshot
        .signatures
        .iter()
        .filter_map(|signature| {
            if signature.confidence < CONFIDENCE_THRESHOLD {
                return None;
            }
            match WeaknessPattern::from_id(&signature.weakness) {
                Some(pattern) => Some((pattern, signature.strength())),
                None => {
                    debug!(weakness = %signature.weakness, "unknown weakness id ignored");
                    None
                }
            }
        })
        .collect()
}

/// Add the teaching bias to each eligible candidate's score. Returns how many changed.
pub fn apply(
    candidates: &mut [EvaluatedMove],
    position: &Position,
    snapshot: &SignatureSnapshot,
) -> usize {
    let patterns = active_patterns(snapshot);
    if patterns.is_empty() {
        return 0;
    }

    let mut adjusted = 0;
    for candidate in candidates.iter_mut() {
        if candidate.is_vetoed() || is_mate_score(candidate.search_score) {
            continue;
        }
        let base = candidate.search_score.abs() as f32;
        let cap = base * MAX_BIAS_FRACTION;
        let total: f32 = patterns
            .iter()
            .filter(|(pattern, _)| pattern.matches(position.board(), &candidate.mv))
            .map(|(_, strength)| base * MAX_BIAS_FRACTION * strength)
            .sum();

        let bias = total.min(cap).round() as i32;
        if bias > 0 {
            candidate.bias = bias;
            candidate.score += bias;
            adjusted += 1;
        }
    }
    debug!(version = snapshot.version, adjusted, "teaching bias applied");
    adjusted
}
