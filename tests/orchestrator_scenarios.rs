use opponent_move_engine::{
    search, to_san, BudgetEntry, BudgetTable, CancelToken, Difficulty, EngineConfig, EngineError,
    MoveRequest, MoveResponse, NoopScheduler, Orchestrator, Position, Profile, Provenance,
    SignatureSnapshot, TeachingSignature,
};
use std::collections::HashSet;
use std::time::Instant;

const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const MIDDLEGAME: &str = "r1bq1rk1/pp2bppp/2n1pn2/3p4/2PP4/2N1PN2/PP2BPPP/R1BQK2R w KQ - 0 8";

fn select(orchestrator: &Orchestrator, request: &MoveRequest) -> Result<MoveResponse, EngineError> {
    orchestrator.select_move(request, &CancelToken::new(), &NoopScheduler)
}

fn legal_sans(fen: &str) -> Vec<String> {
    let position = Position::from_fen(fen).unwrap();
    position
        .legal_moves()
        .iter()
        .map(|mv| to_san(&position, mv).unwrap())
        .collect()
}

/// Beginner fixed at exactly depth two so results do not depend on machine speed.
fn fixed_depth_config() -> EngineConfig {
    let fixed = BudgetEntry {
        base_ms: 5_000,
        hard_cap_ms: 5_000,
        min_depth: 2,
        max_depth: 2,
    };
    EngineConfig {
        budgets: BudgetTable {
            beginner: fixed,
            ..BudgetTable::default()
        },
        ..EngineConfig::default()
    }
}

#[test]
fn test_book_reply_is_fast() {
    let orchestrator = Orchestrator::default();
    let started = Instant::now();
    let response = select(&orchestrator, &MoveRequest::new(START)).unwrap();
    assert!(started.elapsed().as_millis() < 50);
    assert_eq!(response.diagnostics.provenance, Provenance::Book);
    assert_eq!(response.diagnostics.depth, 0);
    assert!(legal_sans(START).contains(&response.san));
}

#[test]
fn test_defended_pawn_is_not_taken_with_the_queen() {
    let fen = "3rk3/8/8/3p4/8/8/8/3QK3 w - - 0 1";
    let request = MoveRequest::new(fen)
        .with_difficulty(Difficulty::Easy)
        .with_budget_ms(300);
    let response = select(&Orchestrator::default(), &request).unwrap();
    assert_ne!(response.san, "Qxd5");
    assert!(legal_sans(fen).contains(&response.san));
}

#[test]
fn test_mate_in_one_is_played_immediately() {
    let response = select(
        &Orchestrator::default(),
        &MoveRequest::new("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1"),
    )
    .unwrap();
    assert_eq!(response.san, "Ra8#");
    assert_eq!(response.diagnostics.provenance, Provenance::Tactical);
}

#[test]
fn test_black_to_move_finds_mate() {
    let response = select(
        &Orchestrator::default(),
        &MoveRequest::new("r5k1/8/8/8/8/8/5PPP/6K1 b - - 0 1"),
    )
    .unwrap();
    assert_eq!(response.san, "Ra1#");
}

#[test]
fn test_one_millisecond_budget_still_moves() {
    let request = MoveRequest::new(MIDDLEGAME)
        .with_difficulty(Difficulty::Beginner)
        .with_budget_ms(1);
    let response = select(&Orchestrator::default(), &request).unwrap();
    assert!(legal_sans(MIDDLEGAME).contains(&response.san));
    assert_eq!(response.diagnostics.budget_ms, 1);
    assert!(response.diagnostics.depth >= 1);
}

#[test]
fn test_one_millisecond_budget_overruns_by_at_most_one_ply() {
    for difficulty in [Difficulty::Medium, Difficulty::Expert] {
        let request = MoveRequest::new(MIDDLEGAME)
            .with_difficulty(difficulty)
            .with_budget_ms(1);
        let started = Instant::now();
        let response = select(&Orchestrator::default(), &request).unwrap();
        assert!(legal_sans(MIDDLEGAME).contains(&response.san));
        assert_eq!(response.diagnostics.provenance, Provenance::Search);
        assert_eq!(response.diagnostics.depth, 1, "{:?}", difficulty);
        assert!(started.elapsed().as_millis() < 1_000);
    }
}

#[test]
fn test_zero_budget_is_clamped_up() {
    let request = MoveRequest::new(MIDDLEGAME)
        .with_difficulty(Difficulty::Beginner)
        .with_budget_ms(0);
    let response = select(&Orchestrator::default(), &request).unwrap();
    assert_eq!(response.diagnostics.budget_ms, 1);
}

#[test]
fn test_strong_profile_is_deterministic() {
    let orchestrator = Orchestrator::new(fixed_depth_config());
    let request = MoveRequest::new(MIDDLEGAME).with_difficulty(Difficulty::Beginner);
    let first = select(&orchestrator, &request).unwrap();
    for _ in 0..3 {
        let again = select(&orchestrator, &request).unwrap();
        assert_eq!(again.san, first.san);
        assert_eq!(again.diagnostics.score_cp, first.diagnostics.score_cp);
    }
    assert_eq!(first.diagnostics.depth, 2);
    assert_eq!(first.diagnostics.provenance, Provenance::Search);
}

#[test]
fn test_varied_profile_varies() {
    let orchestrator = Orchestrator::default();
    let moves: HashSet<String> = (0..20u64)
        .map(|seed| {
            let request = MoveRequest::new(START)
                .with_profile(Profile::Varied)
                .with_seed(seed);
            select(&orchestrator, &request).unwrap().san
        })
        .collect();
    assert!(moves.len() >= 2, "only saw {:?}", moves);
}

#[test]
fn test_varied_search_pick_varies() {
    let config = EngineConfig {
        use_opening_book: false,
        ..fixed_depth_config()
    };
    let orchestrator = Orchestrator::new(config);
    let legal = legal_sans(START);
    let moves: HashSet<String> = (0..12u64)
        .map(|seed| {
            let request = MoveRequest::new(START)
                .with_difficulty(Difficulty::Beginner)
                .with_profile(Profile::Varied)
                .with_seed(seed);
            let response = select(&orchestrator, &request).unwrap();
            assert_eq!(response.diagnostics.provenance, Provenance::Search);
            assert!(legal.contains(&response.san));
            response.san
        })
        .collect();
    assert!(moves.len() >= 2, "only saw {:?}", moves);
}

#[test]
fn test_reported_score_is_the_search_evaluation() {
    let fen = "3rk3/8/8/3p4/8/8/8/3QK3 w - - 0 1";
    let orchestrator = Orchestrator::new(fixed_depth_config());
    let request = MoveRequest::new(fen).with_difficulty(Difficulty::Beginner);
    let response = select(&orchestrator, &request).unwrap();
    let score = response.diagnostics.score_cp.unwrap();
    let ranking = response.diagnostics.ranking_cp.unwrap();
    assert!(ranking <= score);

    let position = Position::from_fen(fen).unwrap();
    let outcome = search(
        &position,
        &orchestrator.budget_for(&request),
        &CancelToken::new(),
        &NoopScheduler,
    );
    let chosen = outcome
        .candidates
        .iter()
        .find(|c| to_san(&position, &c.mv).unwrap() == response.san)
        .unwrap();
    if chosen.exact {
        assert_eq!(score, chosen.score);
    } else {
        assert!(score <= chosen.score);
    }
}

#[test]
fn test_varied_profile_is_reproducible_with_seed() {
    let orchestrator = Orchestrator::new(fixed_depth_config());
    let request = MoveRequest::new(MIDDLEGAME)
        .with_difficulty(Difficulty::Beginner)
        .with_profile(Profile::Varied)
        .with_seed(7);
    let first = select(&orchestrator, &request).unwrap();
    let second = select(&orchestrator, &request).unwrap();
    assert_eq!(first.san, second.san);
}

#[test]
fn test_requested_budget_above_cap_is_exactly_the_cap() {
    let request = MoveRequest::new(START)
        .with_difficulty(Difficulty::Easy)
        .with_budget_ms(60_000);
    let response = select(&Orchestrator::default(), &request).unwrap();
    assert_eq!(response.diagnostics.budget_ms, 1_000);

    let request = request.with_budget_ms(1_000);
    let response = select(&Orchestrator::default(), &request).unwrap();
    assert_eq!(response.diagnostics.budget_ms, 1_000);
}

#[test]
fn test_host_ceiling_tightens_the_cap() {
    let config = EngineConfig {
        host_ceiling_ms: 200,
        ..EngineConfig::default()
    };
    let request = MoveRequest::new(START)
        .with_difficulty(Difficulty::Expert)
        .with_budget_ms(60_000);
    let response = select(&Orchestrator::new(config), &request).unwrap();
    assert_eq!(response.diagnostics.budget_ms, 200);
}

#[test]
fn test_teaching_profile_returns_a_legal_move() {
    let signatures = SignatureSnapshot {
        version: 3,
        signatures: vec![
            TeachingSignature {
                weakness: "hanging-piece".to_string(),
                confidence: 0.9,
                mastery: 10.0,
            },
            TeachingSignature {
                weakness: "no-such-pattern".to_string(),
                confidence: 1.0,
                mastery: 0.0,
            },
        ],
    };
    let request = MoveRequest::new(MIDDLEGAME)
        .with_difficulty(Difficulty::Beginner)
        .with_profile(Profile::Teaching)
        .with_signatures(signatures);
    let response = select(&Orchestrator::new(fixed_depth_config()), &request).unwrap();
    assert!(legal_sans(MIDDLEGAME).contains(&response.san));
}

#[test]
fn test_terminal_and_invalid_inputs_are_errors() {
    let orchestrator = Orchestrator::default();
    let mated = select(&orchestrator, &MoveRequest::new("7k/6Q1/6K1/8/8/8/8/8 b - - 0 1"));
    assert!(mated.unwrap_err().is_game_over());

    let stalemate = select(&orchestrator, &MoveRequest::new("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1"));
    assert!(stalemate.unwrap_err().is_game_over());

    let garbage = select(&orchestrator, &MoveRequest::new("rnbqkbnr/pppppppp w"));
    assert!(matches!(garbage, Err(EngineError::InvalidPosition(_))));
}

#[test]
fn test_diagnostics_serialize_to_json() {
    let response = select(&Orchestrator::default(), &MoveRequest::new(START)).unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["diagnostics"]["provenance"], "book");
    assert!(json["san"].is_string());
}
