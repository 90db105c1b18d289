//! Translation from internal moves to Standard Algebraic Notation.
//!
//! The `chess` crate has no SAN writer, so the position is converted to a
//! `shakmaty` position via FEN and the matching legal move is rendered there.

use chess::Piece;
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::{CastlingMode, Chess, Position as _, Role};

use crate::errors::{EngineError, Result};
use crate::position::{Move, Position, SpecialMove};

fn translation_error(mv: &Move, reason: impl Into<String>) -> EngineError {
    EngineError::TranslationFailure {
        mv: mv.compact(),
        reason: reason.into(),
    }
}

fn to_shakmaty(position: &Position) -> std::result::Result<Chess, String> {
    let fen = position
        .to_fen()
        .parse::<Fen>()
        .map_err(|e| format!("FEN not accepted: {}", e))?;
    fen.into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| format!("position not accepted: {}", e))
}

fn role_of(piece: Piece) -> Role {
    match piece {
        Piece::Pawn => Role::Pawn,
        Piece::Knight => Role::Knight,
        Piece::Bishop => Role::Bishop,
        Piece::Rook => Role::Rook,
        Piece::Queen => Role::Queen,
        Piece::King => Role::King,
    }
}

fn matches(candidate: &shakmaty::Move, mv: &Move) -> bool {
    let origin = mv.origin().to_string();
    let destination = mv.destination().to_string();

    match candidate {
        shakmaty::Move::Castle { king, rook } => {
            let kingside = rook.to_string() > king.to_string();
            king.to_string() == origin
                && match mv.special() {
                    Some(SpecialMove::CastleKingside) => kingside,
                    Some(SpecialMove::CastleQueenside) => !kingside,
                    _ => false,
                }
        }
        _ => {
            candidate.from().map(|sq| sq.to_string()) == Some(origin)
                && candidate.to().to_string() == destination
                && candidate.promotion() == mv.promotion().map(role_of)
        }
    }
}

/// Render `mv` in SAN with check/mate suffix, disambiguated against `position`.
pub fn to_san(position: &Position, mv: &Move) -> Result<String> {
    if !position.is_legal(mv) {
        return Err(translation_error(mv, "move is not legal in this position"));
    }

    let pos = to_shakmaty(position).map_err(|reason| translation_error(mv, reason))?;
    let legal = pos.legal_moves();
    let mut found = legal.iter().filter(|candidate| matches(candidate, mv));

    let shak_move = found
        .next()
        .ok_or_else(|| translation_error(mv, "no matching move in SAN generator"))?;
    if found.next().is_some() {
        return Err(translation_error(mv, "ambiguous match in SAN generator"));
    }

    Ok(SanPlus::from_move(pos.clone(), shak_move).to_string())
}
