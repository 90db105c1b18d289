//! Static evaluation in centipawns.
//!
//! Material, tapered piece-square tables, king safety, center control and
//! development. Tables are written from White's point of view with a8 first.

use chess::{BitBoard, Board, Color, File, Piece, Rank, Square};

use crate::position::piece_value;

/// Non-pawn material at the start of the game in phase units.
pub const MAX_PHASE: i32 = 24;

const BISHOP_PAIR_BONUS: i32 = 30;
const CENTER_PAWN_BONUS: i32 = 20;
const EXTENDED_CENTER_BONUS: i32 = 5;
const UNDEVELOPED_MINOR_PENALTY: i32 = 15;
const SHIELD_ADJACENT_BONUS: i32 = 12;
const SHIELD_ADVANCED_BONUS: i32 = 6;
const SHIELD_MISSING_PENALTY: i32 = 15;
const OPEN_FILE_NEAR_KING_PENALTY: i32 = 15;

#[rustfmt::skip]
const PAWN_MG: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
     50,  50,  50,  50,  50,  50,  50,  50,
     10,  10,  20,  30,  30,  20,  10,  10,
      5,   5,  10,  27,  27,  10,   5,   5,
      0,   0,   0,  25,  25,   0,   0,   0,
      5,  -5, -10,   0,   0, -10,  -5,   5,
      5,  10,  10, -25, -25,  10,  10,   5,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const PAWN_EG: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
     80,  80,  80,  80,  80,  80,  80,  80,
     50,  50,  50,  50,  50,  50,  50,  50,
     30,  30,  30,  30,  30,  30,  30,  30,
     20,  20,  20,  20,  20,  20,  20,  20,
     10,  10,  10,  10,  10,  10,  10,  10,
     10,  10,  10,  10,  10,  10,  10,  10,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const KNIGHT_MG: [i32; 64] = [
    -50, -40, -30, -30, -30, -30, -40, -50,
    -40, -20,   0,   0,   0,   0, -20, -40,
    -30,   0,  10,  15,  15,  10,   0, -30,
    -30,   5,  15,  20,  20,  15,   5, -30,
    -30,   0,  15,  20,  20,  15,   0, -30,
    -30,   5,  10,  15,  15,  10,   5, -30,
    -40, -20,   0,   5,   5,   0, -20, -40,
    -50, -40, -30, -30, -30, -30, -40, -50,
];

#[rustfmt::skip]
const KNIGHT_EG: [i32; 64] = [
    -50, -40, -30, -30, -30, -30, -40, -50,
    -40, -20,   0,   5,   5,   0, -20, -40,
    -30,   0,  10,  15,  15,  10,   0, -30,
    -30,   5,  15,  20,  20,  15,   5, -30,
    -30,   0,  15,  20,  20,  15,   0, -30,
    -30,   5,  10,  15,  15,  10,   5, -30,
    -40, -20,   0,   5,   5,   0, -20, -40,
    -50, -40, -30, -30, -30, -30, -40, -50,
];

#[rustfmt::skip]
const BISHOP_MG: [i32; 64] = [
    -20, -10, -10, -10, -10, -10, -10, -20,
    -10,   0,   0,   0,   0,   0,   0, -10,
    -10,   0,   5,  10,  10,   5,   0, -10,
    -10,   5,   5,  10,  10,   5,   5, -10,
    -10,   0,  10,  10,  10,  10,   0, -10,
    -10,  10,  10,  10,  10,  10,  10, -10,
    -10,   5,   0,   0,   0,   0,   5, -10,
    -20, -10, -10, -10, -10, -10, -10, -20,
];

#[rustfmt::skip]
const BISHOP_EG: [i32; 64] = [
    -20, -10, -10, -10, -10, -10, -10, -20,
    -10,   5,   0,   0,   0,   0,   5, -10,
    -10,   0,  10,  15,  15,  10,   0, -10,
    -10,   0,  15,  20,  20,  15,   0, -10,
    -10,   0,  15,  20,  20,  15,   0, -10,
    -10,   0,  10,  15,  15,  10,   0, -10,
    -10,   5,   0,   0,   0,   0,   5, -10,
    -20, -10, -10, -10, -10, -10, -10, -20,
];

#[rustfmt::skip]
const ROOK_MG: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
      5,  10,  10,  10,  10,  10,  10,   5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
      0,   0,   0,   5,   5,   0,   0,   0,
];

#[rustfmt::skip]
const ROOK_EG: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
     20,  20,  20,  20,  20,  20,  20,  20,
      0,   0,   0,   0,   0,   0,   0,   0,
      0,   0,   0,   0,   0,   0,   0,   0,
      0,   0,   0,   0,   0,   0,   0,   0,
      0,   0,   0,   0,   0,   0,   0,   0,
      0,   0,   0,   0,   0,   0,   0,   0,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const QUEEN_MG: [i32; 64] = [
    -20, -10, -10,  -5,  -5, -10, -10, -20,
    -10,   0,   0,   0,   0,   0,   0, -10,
    -10,   0,   5,   5,   5,   5,   0, -10,
     -5,   0,   5,   5,   5,   5,   0,  -5,
      0,   0,   5,   5,   5,   5,   0,  -5,
    -10,   5,   5,   5,   5,   5,   0, -10,
    -10,   0,   5,   0,   0,   0,   0, -10,
    -20, -10, -10,  -5,  -5, -10, -10, -20,
];

#[rustfmt::skip]
const QUEEN_EG: [i32; 64] = [
    -20, -10, -10,  -5,  -5, -10, -10, -20,
    -10,   0,   5,   5,   5,   5,   0, -10,
    -10,   5,  10,  10,  10,  10,   5, -10,
     -5,   0,  10,  10,  10,  10,   0,  -5,
     -5,   0,  10,  10,  10,  10,   0,  -5,
    -10,   5,  10,  10,  10,  10,   5, -10,
    -10,   0,   5,   5,   5,   5,   0, -10,
    -20, -10, -10,  -5,  -5, -10, -10, -20,
];

#[rustfmt::skip]
const KING_MG: [i32; 64] = [
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -20, -30, -30, -40, -40, -30, -30, -20,
    -10, -20, -20, -20, -20, -20, -20, -10,
     20,  20,   0,   0,   0,   0,  20,  20,
     20,  30,  10,   0,   0,  10,  30,  20,
];

#[rustfmt::skip]
const KING_EG: [i32; 64] = [
    -50, -40, -30, -20, -20, -30, -40, -50,
    -30, -20, -10,   0,   0, -10, -20, -30,
    -30, -10,  20,  30,  30,  20, -10, -30,
    -30, -10,  30,  40,  40,  30, -10, -30,
    -30, -10,  30,  40,  40,  30, -10, -30,
    -30, -10,  20,  30,  30,  20, -10, -30,
    -30, -30,   0,   0,   0,   0, -30, -30,
    -50, -30, -30, -30, -30, -30, -30, -50,
];

const ALL_PIECES: [Piece; 6] = [
    Piece::Pawn,
    Piece::Knight,
    Piece::Bishop,
    Piece::Rook,
    Piece::Queen,
    Piece::King,
];

fn tables(piece: Piece) -> (&'static [i32; 64], &'static [i32; 64]) {
    match piece {
        Piece::Pawn => (&PAWN_MG, &PAWN_EG),
        Piece::Knight => (&KNIGHT_MG, &KNIGHT_EG),
        Piece::Bishop => (&BISHOP_MG, &BISHOP_EG),
        Piece::Rook => (&ROOK_MG, &ROOK_EG),
        Piece::Queen => (&QUEEN_MG, &QUEEN_EG),
        Piece::King => (&KING_MG, &KING_EG),
    }
}

/// Tables list a8 first, so White's squares are flipped vertically.
fn table_index(color: Color, square: Square) -> usize {
    match color {
        Color::White => square.to_index() ^ 56,
        Color::Black => square.to_index(),
    }
}

fn sign(color: Color) -> i32 {
    if color == Color::White {
        1
    } else {
        -1
    }
}

fn pieces_of(board: &Board, piece: Piece, color: Color) -> BitBoard {
    *board.pieces(piece) & *board.color_combined(color)
}

/// 24 with all minor and major pieces on the board, 0 in a bare endgame.
pub fn game_phase(board: &Board) -> i32 {
    let phase = board.pieces(Piece::Knight).popcnt()
        + board.pieces(Piece::Bishop).popcnt()
        + board.pieces(Piece::Rook).popcnt() * 2
        + board.pieces(Piece::Queen).popcnt() * 4;
    (phase as i32).min(MAX_PHASE)
}

/// Tapered piece-square value for a single piece, from its owner's point of view.
pub fn square_value(piece: Piece, color: Color, square: Square, phase: i32) -> i32 {
    let (mg, eg) = tables(piece);
    let idx = table_index(color, square);
    (mg[idx] * phase + eg[idx] * (MAX_PHASE - phase)) / MAX_PHASE
}

/// Material difference, White minus Black.
pub fn material_balance(board: &Board) -> i32 {
    ALL_PIECES
        .iter()
        .map(|&piece| {
            let white = pieces_of(board, piece, Color::White).popcnt() as i32;
            let black = pieces_of(board, piece, Color::Black).popcnt() as i32;
            (white - black) * piece_value(piece)
        })
        .sum()
}

fn piece_square_balance(board: &Board, phase: i32) -> i32 {
    let mut score = 0;
    for color in [Color::White, Color::Black] {
        for piece in ALL_PIECES {
            for square in pieces_of(board, piece, color) {
                score += sign(color) * square_value(piece, color, square, phase);
            }
        }
    }
    score
}

fn bishop_pair(board: &Board) -> i32 {
    [Color::White, Color::Black]
        .iter()
        .filter(|&&color| pieces_of(board, Piece::Bishop, color).popcnt() >= 2)
        .map(|&color| sign(color) * BISHOP_PAIR_BONUS)
        .sum()
}

fn center_control(board: &Board) -> i32 {
    let center = [Square::D4, Square::E4, Square::D5, Square::E5];
    let extended = [
        Square::C3,
        Square::D3,
        Square::E3,
        Square::F3,
        Square::C4,
        Square::F4,
        Square::C5,
        Square::F5,
        Square::C6,
        Square::D6,
        Square::E6,
        Square::F6,
    ];

    let mut score = 0;
    for square in center {
        if board.piece_on(square) == Some(Piece::Pawn) {
            if let Some(color) = board.color_on(square) {
                score += sign(color) * CENTER_PAWN_BONUS;
            }
        }
    }
    for square in extended {
        if let Some(color) = board.color_on(square) {
            score += sign(color) * EXTENDED_CENTER_BONUS;
        }
    }
    score
}

/// Knights and bishops still sitting on their original squares.
pub fn undeveloped_minors(board: &Board, color: Color) -> i32 {
    let (knights, bishops) = match color {
        Color::White => ([Square::B1, Square::G1], [Square::C1, Square::F1]),
        Color::Black => ([Square::B8, Square::G8], [Square::C8, Square::F8]),
    };
    let knight_count = knights
        .iter()
        .filter(|&&sq| board.piece_on(sq) == Some(Piece::Knight) && board.color_on(sq) == Some(color))
        .count();
    let bishop_count = bishops
        .iter()
        .filter(|&&sq| board.piece_on(sq) == Some(Piece::Bishop) && board.color_on(sq) == Some(color))
        .count();
    (knight_count + bishop_count) as i32
}

fn development(board: &Board) -> i32 {
    [Color::White, Color::Black]
        .iter()
        .map(|&color| -sign(color) * undeveloped_minors(board, color) * UNDEVELOPED_MINOR_PENALTY)
        .sum()
}

/// Pawn shield and open files around the king, from `color`'s point of view.
pub fn king_shelter(board: &Board, color: Color) -> i32 {
    let king = board.king_square(color);
    let king_file = king.get_file().to_index() as i32;
    let king_rank = king.get_rank().to_index() as i32;
    let forward = if color == Color::White { 1 } else { -1 };
    let own_pawns = pieces_of(board, Piece::Pawn, color);
    let all_pawns = *board.pieces(Piece::Pawn);

    let mut score = 0;
    for file in (king_file - 1)..=(king_file + 1) {
        if !(0..8).contains(&file) {
            continue;
        }
        let file_mask = file_mask(File::from_index(file as usize));

        let mut shielded = false;
        for pawn in own_pawns & file_mask {
            let distance = (pawn.get_rank().to_index() as i32 - king_rank) * forward;
            if distance == 1 {
                score += SHIELD_ADJACENT_BONUS;
                shielded = true;
                break;
            } else if distance == 2 {
                score += SHIELD_ADVANCED_BONUS;
                shielded = true;
                break;
            }
        }
        if !shielded {
            score -= SHIELD_MISSING_PENALTY;
        }
        if (all_pawns & file_mask).popcnt() == 0 {
            score -= OPEN_FILE_NEAR_KING_PENALTY;
        }
    }
    score
}

pub fn file_mask(file: File) -> BitBoard {
    let mut mask = BitBoard::new(0);
    for rank in 0..8 {
        mask |= BitBoard::from_square(Square::make_square(Rank::from_index(rank), file));
    }
    mask
}

fn king_safety(board: &Board, phase: i32) -> i32 {
    let raw = king_shelter(board, Color::White) - king_shelter(board, Color::Black);
    raw * phase / MAX_PHASE
}

/// Full evaluation from White's point of view.
pub fn evaluate_white(board: &Board) -> i32 {
    let phase = game_phase(board);

    material_balance(board)
        + piece_square_balance(board, phase)
        + bishop_pair(board)
        + center_control(board)
        + development(board) * phase / MAX_PHASE
        + king_safety(board, phase)
}

/// Evaluation from the point of view of the side to move.
pub fn evaluate(board: &Board) -> i32 {
    sign(board.side_to_move()) * evaluate_white(board)
}

/// Rough positional gain of moving `piece` between two squares, used to order quiet moves.
pub fn quiet_move_gain(board: &Board, piece: Piece, from: Square, to: Square) -> i32 {
    let color = board.side_to_move();
    let phase = game_phase(board);
    square_value(piece, color, to, phase) - square_value(piece, color, from, phase)
}
