use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opponent_move_engine::{
    inspect_move, search, CancelToken, MoveRequest, NoopScheduler, Orchestrator, Position,
    SearchBudget,
};

const POSITIONS: [&str; 4] = [
    "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2", // King's pawn opening
    "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/3P1N2/PPP2PPP/RNBQK2R b KQkq - 0 4", // Middle game
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1", // Kiwipete
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", // Endgame position
];

fn positions() -> Vec<Position> {
    POSITIONS
        .iter()
        .map(|fen| Position::from_fen(fen).expect("Valid FEN"))
        .collect()
}

fn benchmark_move_generation(c: &mut Criterion) {
    let positions = positions();
    c.bench_function("legal_moves", |b| {
        b.iter(|| {
            for position in &positions {
                black_box(position.legal_moves());
            }
        })
    });

    c.bench_function("safety_inspection", |b| {
        b.iter(|| {
            for position in &positions {
                for mv in position.legal_moves() {
                    black_box(inspect_move(position, &mv).ok());
                }
            }
        })
    });
}

fn benchmark_search(c: &mut Criterion) {
    let positions = positions();
    let mut group = c.benchmark_group("fixed_depth_search");
    group.sample_size(10);

    for depth in [2u32, 3] {
        let budget = SearchBudget {
            time_ms: 60_000,
            hard_cap_ms: 60_000,
            min_depth: depth,
            max_depth: depth,
        };
        group.bench_function(format!("depth_{}", depth), |b| {
            b.iter(|| {
                for position in &positions {
                    black_box(search(position, &budget, &CancelToken::new(), &NoopScheduler));
                }
            })
        });
    }
    group.finish();
}

fn benchmark_book_reply(c: &mut Criterion) {
    let orchestrator = Orchestrator::default();
    let request = MoveRequest::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
    c.bench_function("book_reply", |b| {
        b.iter(|| {
            black_box(
                orchestrator
                    .select_move(&request, &CancelToken::new(), &NoopScheduler)
                    .ok(),
            )
        })
    });
}

criterion_group!(
    benches,
    benchmark_move_generation,
    benchmark_search,
    benchmark_book_reply
);
criterion_main!(benches);
