use opponent_move_engine::{GameStatus, Position};

fn perft(position: &Position, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let moves = position.legal_moves();
    if depth == 1 {
        return moves.len() as u64;
    }
    moves
        .iter()
        .map(|mv| {
            let next = position.apply(mv).expect("legal move applies");
            perft(&next, depth - 1)
        })
        .sum()
}

fn assert_perft(fen: &str, expected: &[u64]) {
    let position = Position::from_fen(fen).unwrap();
    for (i, &nodes) in expected.iter().enumerate() {
        let depth = i as u32 + 1;
        assert_eq!(perft(&position, depth), nodes, "{} at depth {}", fen, depth);
    }
}

#[test]
fn test_perft_start_position() {
    assert_perft(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        &[20, 400, 8902],
    );
}

#[test]
fn test_perft_kiwipete() {
    // castling both ways, en passant and promotions within two plies
    assert_perft(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        &[48, 2039],
    );
}

#[test]
fn test_perft_rook_endgame() {
    assert_perft("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", &[14, 191]);
}

#[test]
fn test_perft_promotion_heavy() {
    assert_perft(
        "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        &[6, 264],
    );
}

#[test]
fn test_perft_position_five() {
    assert_perft(
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        &[44, 1486],
    );
}

#[test]
fn test_fen_survives_every_move_from_start() {
    let start = Position::startpos();
    for mv in start.legal_moves() {
        let next = start.apply(&mv).unwrap();
        let reparsed = Position::from_fen(&next.to_fen()).unwrap();
        assert_eq!(reparsed.canonical_key(), next.canonical_key());
        assert_eq!(reparsed.status(), GameStatus::Ongoing);
    }
}
