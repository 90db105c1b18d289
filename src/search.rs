//! Interruptible iterative-deepening alpha-beta search.
//!
//! Each depth is a full negamax pass over the root moves. A depth that is cut
//! short by the clock or a cancel is thrown away; only completed depths are
//! committed to the outcome.

use chess::{Board, BoardStatus, ChessMove, MoveGen, Piece};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::SearchBudget;
use crate::evaluation::{evaluate, quiet_move_gain};
use crate::position::{piece_value, Move, Position};
use crate::tactical_check::{attackers_of, moved_piece_exposure, CHECK_ORDER_BONUS};

pub const MATE_SCORE: i32 = 30_000;
const INFINITY: i32 = 32_000;

/// Root moves scoring within this distance of the best get an exact score.
pub const ROOT_WINDOW: i32 = 300;

/// Nodes between clock checks.
pub const NODE_CHECK_INTERVAL: u64 = 256;

/// Wall time between scheduler yields.
pub const YIELD_INTERVAL: Duration = Duration::from_millis(16);

const MAX_PLY: usize = 64;
const MAX_QUIESCENCE_DEPTH: u32 = 6;

const CAPTURE_BASE: i32 = 1_000_000;
const PROMOTION_BASE: i32 = 900_000;
const KILLER_BONUS: i32 = 200;
const LOSING_CAPTURE_BASE: i32 = -2_000;

pub fn is_mate_score(score: i32) -> bool {
    score.abs() >= MATE_SCORE - MAX_PLY as i32
}

/// Hook called at every yield point of the search loop.
pub trait Scheduler: Send + Sync {
    fn yield_now(&self);
}

/// Gives the OS scheduler a chance to run other threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn yield_now(&self) {}
}

/// Shared cooperative cancel flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Whether both handles share one flag.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    TimeExpired,
    MaxDepthReached,
    Cancelled,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Searching { depth: u32 },
    DepthComplete { depth: u32 },
    Terminated(TerminationReason),
}

/// A root move with its score from the mover's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootCandidate {
    pub mv: Move,
    pub score: i32,
    /// False when the score is only an upper bound (failed low outside the root window).
    pub exact: bool,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Ranked best first. Empty when no depth completed.
    pub candidates: Vec<RootCandidate>,
    pub depth: u32,
    pub nodes: u64,
    pub elapsed: Duration,
    pub reason: TerminationReason,
    pub state_trace: Vec<SearchState>,
}

impl SearchOutcome {
    pub fn best(&self) -> Option<&RootCandidate> {
        self.candidates.first()
    }
}

/// Move ordering score for `mv` on `board`. Higher is searched first.
pub fn order_score(board: &Board, mv: ChessMove) -> i32 {
    let source = mv.get_source();
    let dest = mv.get_dest();
    let attacker = match board.piece_on(source) {
        Some(piece) => piece,
        None => return i32::MIN,
    };
    let victim = board.piece_on(dest).or_else(|| {
        (attacker == Piece::Pawn && source.get_file() != dest.get_file()).then_some(Piece::Pawn)
    });

    if let Some(victim) = victim {
        let victim_value = piece_value(victim);
        let attacker_value = piece_value(attacker);
        let defended = attackers_of(board, dest, !board.side_to_move()).popcnt() > 0;
        if attacker_value > victim_value && defended {
            return LOSING_CAPTURE_BASE + victim_value - attacker_value;
        }
        return CAPTURE_BASE + victim_value * 10 - attacker_value / 10;
    }

    if let Some(promotion) = mv.get_promotion() {
        return PROMOTION_BASE + piece_value(promotion);
    }

    let quiet = quiet_move_gain(board, attacker, source, dest);
    let after = board.make_move_new(mv);
    if after.checkers().popcnt() > 0 {
        let exposure = moved_piece_exposure(&after, dest, None);
        if exposure > 0 {
            return -exposure;
        }
        return CHECK_ORDER_BONUS + quiet;
    }
    quiet
}

struct Searcher<'a> {
    budget: SearchBudget,
    cancel: &'a CancelToken,
    scheduler: &'a dyn Scheduler,
    start: Instant,
    last_yield: Instant,
    nodes: u64,
    enforce_budget: bool,
    stop: Option<TerminationReason>,
    killers: [[Option<ChessMove>; 2]; MAX_PLY],
    trace: Vec<SearchState>,
}

impl<'a> Searcher<'a> {
    fn new(budget: SearchBudget, cancel: &'a CancelToken, scheduler: &'a dyn Scheduler) -> Self {
        let now = Instant::now();
        Self {
            budget,
            cancel,
            scheduler,
            start: now,
            last_yield: now,
            nodes: 0,
            enforce_budget: false,
            stop: None,
            killers: [[None; 2]; MAX_PLY],
            trace: vec![SearchState::Idle],
        }
    }

    fn transition(&mut self, state: SearchState) {
        self.trace.push(state);
    }

    fn soft_limit_reached(&self) -> bool {
        self.start.elapsed() >= self.budget.soft_limit()
    }

    /// Past 90% of the soft limit a further depth has no chance of finishing.
    fn next_depth_unlikely(&self) -> bool {
        self.start.elapsed() >= self.budget.soft_limit().mul_f32(0.9)
    }

    fn should_stop(&mut self) -> bool {
        if self.stop.is_some() {
            return true;
        }
        if self.nodes % NODE_CHECK_INTERVAL != 0 {
            return false;
        }

        let now = Instant::now();
        if now.duration_since(self.last_yield) >= YIELD_INTERVAL {
            self.scheduler.yield_now();
            self.last_yield = now;
            if self.cancel.is_cancelled() {
                self.stop = Some(TerminationReason::Cancelled);
                return true;
            }
        }
        if self.enforce_budget && self.soft_limit_reached() {
            self.stop = Some(TerminationReason::TimeExpired);
            return true;
        }
        false
    }

    fn store_killer(&mut self, mv: ChessMove, ply: usize) {
        if ply >= MAX_PLY {
            return;
        }
        let slot = &mut self.killers[ply];
        if slot[0] != Some(mv) {
            slot[1] = slot[0];
            slot[0] = Some(mv);
        }
    }

    fn ordered_moves(&self, board: &Board, ply: usize) -> Vec<ChessMove> {
        let killers = if ply < MAX_PLY {
            self.killers[ply]
        } else {
            [None; 2]
        };
        let mut scored: Vec<(ChessMove, i32)> = MoveGen::new_legal(board)
            .map(|mv| {
                let mut score = order_score(board, mv);
                if killers.contains(&Some(mv)) && board.piece_on(mv.get_dest()).is_none() {
                    score += KILLER_BONUS;
                }
                (mv, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.into_iter().map(|(mv, _)| mv).collect()
    }

    fn negamax(
        &mut self,
        board: &Board,
        depth: u32,
        mut alpha: i32,
        beta: i32,
        ply: usize,
    ) -> Option<i32> {
        self.nodes += 1;
        if self.should_stop() {
            return None;
        }

        match board.status() {
            BoardStatus::Checkmate => return Some(-(MATE_SCORE - ply as i32)),
            BoardStatus::Stalemate => return Some(0),
            BoardStatus::Ongoing => {}
        }
        if depth == 0 || ply >= MAX_PLY {
            return self.quiescence(board, alpha, beta, ply, 0);
        }

        for mv in self.ordered_moves(board, ply) {
            let child = board.make_move_new(mv);
            let score = -self.negamax(&child, depth - 1, -beta, -alpha, ply + 1)?;
            if score >= beta {
                if board.piece_on(mv.get_dest()).is_none() {
                    self.store_killer(mv, ply);
                }
                return Some(beta);
            }
            if score > alpha {
                alpha = score;
            }
        }
        Some(alpha)
    }

    fn quiescence(
        &mut self,
        board: &Board,
        mut alpha: i32,
        beta: i32,
        ply: usize,
        qdepth: u32,
    ) -> Option<i32> {
        self.nodes += 1;
        if self.should_stop() {
            return None;
        }

        let in_check = board.checkers().popcnt() > 0;
        let moves = MoveGen::new_legal(board);
        if moves.len() == 0 {
            return Some(if in_check {
                -(MATE_SCORE - ply as i32)
            } else {
                0
            });
        }

        let stand_pat = evaluate(board);
        if qdepth >= MAX_QUIESCENCE_DEPTH {
            return Some(stand_pat);
        }
        if !in_check {
            if stand_pat >= beta {
                return Some(beta);
            }
            if stand_pat > alpha {
                alpha = stand_pat;
            }
        }

        // out of check every evasion is searched, otherwise only material-changing moves
        let mut noisy: Vec<(ChessMove, i32)> = moves
            .filter(|mv| {
                in_check
                    || mv.get_promotion().is_some()
                    || board.piece_on(mv.get_dest()).is_some()
                    || (board.piece_on(mv.get_source()) == Some(Piece::Pawn)
                        && mv.get_source().get_file() != mv.get_dest().get_file())
            })
            .map(|mv| (mv, order_score(board, mv)))
            .collect();
        noisy.sort_by(|a, b| b.1.cmp(&a.1));

        for (mv, _) in noisy {
            let child = board.make_move_new(mv);
            let score = -self.quiescence(&child, -beta, -alpha, ply + 1, qdepth + 1)?;
            if score >= beta {
                return Some(beta);
            }
            if score > alpha {
                alpha = score;
            }
        }
        Some(alpha)
    }

    fn search_root(&mut self, board: &Board, moves: &[Move], depth: u32) -> Option<Vec<RootCandidate>> {
        let mut best = -INFINITY;
        let mut candidates = Vec::with_capacity(moves.len());

        for mv in moves {
            let child = board.make_move_new(mv.chess_move());
            let alpha = if best == -INFINITY {
                -INFINITY
            } else {
                best - ROOT_WINDOW
            };
            let score = -self.negamax(&child, depth - 1, -INFINITY, -alpha, 1)?;
            let exact = alpha == -INFINITY || score > alpha;
            best = best.max(score);
            candidates.push(RootCandidate {
                mv: *mv,
                score,
                exact,
            });
        }

        // stable sort keeps the ordering of equal scores
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        Some(candidates)
    }
}

/// Full-window score of the single root move `mv` at `depth`, from the mover's
/// point of view. `None` when cancelled or `time_left` runs out first.
pub fn rescore_root(
    position: &Position,
    mv: &Move,
    depth: u32,
    time_left: Duration,
    cancel: &CancelToken,
    scheduler: &dyn Scheduler,
) -> Option<i32> {
    let time_ms = time_left.as_millis() as u64;
    if depth == 0 || time_ms == 0 || cancel.is_cancelled() {
        return None;
    }
    let budget = SearchBudget {
        time_ms,
        hard_cap_ms: time_ms,
        min_depth: depth,
        max_depth: depth,
    };
    let mut searcher = Searcher::new(budget, cancel, scheduler);
    searcher.enforce_budget = true;
    let child = position.board().make_move_new(mv.chess_move());
    searcher
        .negamax(&child, depth - 1, -INFINITY, INFINITY, 1)
        .map(|score| -score)
}

/// Run iterative deepening on `position` within `budget`.
///
/// Depth 1 always completes unless cancelled. Deeper iterations stop at the soft
/// time limit and are discarded if unfinished. Below the minimum depth the search
/// keeps deepening right up to the soft limit; from it on, an iteration is only
/// started while enough of the allotment is left to plausibly finish it.
pub fn search(
    position: &Position,
    budget: &SearchBudget,
    cancel: &CancelToken,
    scheduler: &dyn Scheduler,
) -> SearchOutcome {
    let mut searcher = Searcher::new(*budget, cancel, scheduler);
    let board = *position.board();

    let mut root_moves: Vec<Move> = {
        let ordered = searcher.ordered_moves(&board, 0);
        ordered
            .into_iter()
            .filter_map(|mv| position.classify(mv))
            .collect()
    };

    let mut committed: Vec<RootCandidate> = Vec::new();
    let mut completed_depth = 0;

    let reason = if root_moves.is_empty() {
        TerminationReason::GameOver
    } else if cancel.is_cancelled() {
        TerminationReason::Cancelled
    } else {
        loop {
            let depth = completed_depth + 1;
            if depth > budget.max_depth.max(1) {
                break TerminationReason::MaxDepthReached;
            }
            // only depth 1 may run past the soft limit
            searcher.enforce_budget = depth > 1;
            searcher.transition(SearchState::Searching { depth });

            match searcher.search_root(&board, &root_moves, depth) {
                Some(candidates) => {
                    root_moves = candidates.iter().map(|c| c.mv).collect();
                    committed = candidates;
                    completed_depth = depth;
                    searcher.transition(SearchState::DepthComplete { depth });
                    debug!(
                        depth,
                        nodes = searcher.nodes,
                        best = committed.first().map(|c| c.score).unwrap_or(0),
                        elapsed_ms = searcher.start.elapsed().as_millis() as u64,
                        "depth complete"
                    );

                    if cancel.is_cancelled() {
                        break TerminationReason::Cancelled;
                    }
                    if searcher.soft_limit_reached()
                        || (depth >= budget.min_depth && searcher.next_depth_unlikely())
                    {
                        break TerminationReason::TimeExpired;
                    }
                }
                None => {
                    debug!(depth, nodes = searcher.nodes, "depth abandoned");
                    break searcher.stop.unwrap_or(TerminationReason::TimeExpired);
                }
            }
        }
    };
    searcher.transition(SearchState::Terminated(reason));

    SearchOutcome {
        candidates: committed,
        depth: completed_depth,
        nodes: searcher.nodes,
        elapsed: searcher.start.elapsed(),
        reason,
        state_trace: searcher.trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(time_ms: u64, min_depth: u32, max_depth: u32) -> SearchBudget {
        SearchBudget {
            time_ms,
            hard_cap_ms: time_ms * 4,
            min_depth,
            max_depth,
        }
    }

    fn run(fen: &str, budget: SearchBudget) -> SearchOutcome {
        let position = Position::from_fen(fen).unwrap();
        search(&position, &budget, &CancelToken::new(), &NoopScheduler)
    }

    #[test]
    fn test_mate_scores() {
        assert!(is_mate_score(MATE_SCORE - 3));
        assert!(is_mate_score(-(MATE_SCORE - 5)));
        assert!(!is_mate_score(900));
    }

    #[test]
    fn test_finds_back_rank_mate() {
        let outcome = run("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1", budget(5_000, 1, 2));
        let best = outcome.best().unwrap();
        assert_eq!(best.mv.destination(), chess::Square::A8);
        assert_eq!(best.score, MATE_SCORE - 1);
        assert_eq!(outcome.reason, TerminationReason::MaxDepthReached);
    }

    #[test]
    fn test_prefers_free_queen() {
        let outcome = run("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1", budget(5_000, 1, 2));
        let best = outcome.best().unwrap();
        assert_eq!(best.mv.destination(), chess::Square::D5);
    }

    #[test]
    fn test_every_root_move_scored() {
        let position = Position::startpos();
        let outcome = search(&position, &budget(5_000, 2, 2), &CancelToken::new(), &NoopScheduler);
        assert_eq!(outcome.candidates.len(), 20);
        assert_eq!(outcome.depth, 2);
        assert!(outcome.candidates.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(outcome.best().unwrap().exact);
    }

    #[test]
    fn test_state_trace_follows_depths() {
        let outcome = run("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1", budget(5_000, 1, 2));
        assert_eq!(
            outcome.state_trace,
            vec![
                SearchState::Idle,
                SearchState::Searching { depth: 1 },
                SearchState::DepthComplete { depth: 1 },
                SearchState::Searching { depth: 2 },
                SearchState::DepthComplete { depth: 2 },
                SearchState::Terminated(TerminationReason::MaxDepthReached),
            ]
        );
    }

    #[test]
    fn test_game_over_has_no_candidates() {
        let outcome = run("7k/6Q1/6K1/8/8/8/8/8 b - - 0 1", budget(100, 1, 3));
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.reason, TerminationReason::GameOver);
    }

    #[test]
    fn test_cancel_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = search(&Position::startpos(), &budget(1_000, 1, 4), &cancel, &NoopScheduler);
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.reason, TerminationReason::Cancelled);
    }

    #[test]
    fn test_tiny_budget_still_completes_minimum_depth() {
        let outcome = run(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            budget(1, 1, 6),
        );
        assert!(outcome.depth >= 1);
        assert!(!outcome.candidates.is_empty());
        assert_eq!(outcome.reason, TerminationReason::TimeExpired);
    }

    #[test]
    fn test_minimum_depth_yields_to_tiny_budget() {
        let outcome = run(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            budget(1, 3, 8),
        );
        assert_eq!(outcome.depth, 1);
        assert!(!outcome.candidates.is_empty());
        assert_eq!(outcome.reason, TerminationReason::TimeExpired);
    }

    #[test]
    fn test_rescore_gives_exact_score_of_bounded_move() {
        let position = Position::from_fen("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1").unwrap();
        let outcome = search(&position, &budget(5_000, 2, 2), &CancelToken::new(), &NoopScheduler);
        let bounded = outcome
            .candidates
            .iter()
            .find(|c| !c.exact)
            .expect("a move outside the root window");
        let exact = rescore_root(
            &position,
            &bounded.mv,
            2,
            Duration::from_secs(5),
            &CancelToken::new(),
            &NoopScheduler,
        )
        .unwrap();
        assert!(exact <= bounded.score);
    }

    #[test]
    fn test_rescore_honours_cancel() {
        let position = Position::startpos();
        let mv = position.legal_moves()[0];
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            rescore_root(&position, &mv, 3, Duration::from_secs(5), &cancel, &NoopScheduler),
            None
        );
        assert_eq!(
            rescore_root(&position, &mv, 3, Duration::ZERO, &CancelToken::new(), &NoopScheduler),
            None
        );
    }

    #[test]
    fn test_ordering_demotes_hanging_check() {
        // Qb5+ walks into the rook on b8
        let board = *Position::from_fen("1r2k3/8/8/8/8/8/8/1Q2K3 w - - 0 1").unwrap().board();
        let hanging_check = ChessMove::new(chess::Square::B1, chess::Square::B5, None);
        let quiet = ChessMove::new(chess::Square::E1, chess::Square::D2, None);
        assert!(order_score(&board, hanging_check) < order_score(&board, quiet));
    }

    #[test]
    fn test_ordering_captures_first() {
        let board = *Position::from_fen("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1").unwrap().board();
        let capture = ChessMove::new(chess::Square::D2, chess::Square::D5, None);
        let check = ChessMove::new(chess::Square::D2, chess::Square::E2, None);
        assert!(order_score(&board, capture) > order_score(&board, check));
    }
}
