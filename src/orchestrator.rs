//! Move selection pipeline: opening book, tactical fast path, then search with
//! the safety filter and teaching bias. Only SAN leaves this module.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Difficulty, EngineConfig, Profile, SearchBudget};
use crate::errors::{EngineError, Result};
use crate::notation::to_san;
use crate::opening_book::OpeningBook;
use crate::position::{GameStatus, Move, Position};
use crate::search::{
    self, is_mate_score, order_score, CancelToken, RootCandidate, Scheduler, SearchOutcome,
    TerminationReason, MATE_SCORE,
};
use crate::tactical_check::{self, inspect_move, CandidateSafety, TacticalFinding};
use crate::teaching::{self, SignatureSnapshot};

/// Which stage produced the final move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Book,
    Tactical,
    Search,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub fen: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    #[serde(default)]
    pub signatures: Option<SignatureSnapshot>,
    /// Fixes the RNG used by the varied profile.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl MoveRequest {
    pub fn new(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            difficulty: Difficulty::default(),
            profile: Profile::default(),
            time_budget_ms: None,
            signatures: None,
            seed: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_budget_ms(mut self, time_budget_ms: u64) -> Self {
        self.time_budget_ms = Some(time_budget_ms);
        self
    }

    pub fn with_signatures(mut self, signatures: SignatureSnapshot) -> Self {
        self.signatures = Some(signatures);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A candidate the safety pass penalised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub san: String,
    pub reason: String,
    pub penalty: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub depth: u32,
    pub elapsed_ms: u64,
    pub provenance: Provenance,
    /// Search evaluation of the chosen move, mover's point of view.
    pub score_cp: Option<i32>,
    /// Score the move was ranked by, after safety penalty and teaching bias.
    pub ranking_cp: Option<i32>,
    pub nodes: u64,
    pub budget_ms: u64,
    pub termination: Option<TerminationReason>,
    pub rejected: Vec<RejectedCandidate>,
    pub translation_failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveResponse {
    pub san: String,
    pub diagnostics: Diagnostics,
}

/// A root move carried through the post-search passes.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedMove {
    pub mv: Move,
    /// Ranking score after safety penalty and teaching bias.
    pub score: i32,
    /// Raw score from the search, mover's point of view.
    pub search_score: i32,
    /// False while `search_score` is only a fail-low bound.
    pub exact: bool,
    pub depth: u32,
    pub provenance: Provenance,
    pub safety: Option<CandidateSafety>,
    pub bias: i32,
}

impl EvaluatedMove {
    pub fn new(mv: Move, score: i32, depth: u32, provenance: Provenance) -> Self {
        Self {
            mv,
            score,
            search_score: score,
            exact: true,
            depth,
            provenance,
            safety: None,
            bias: 0,
        }
    }

    pub fn is_vetoed(&self) -> bool {
        self.safety.map(|s| s.is_veto()).unwrap_or(false)
    }

    pub fn finding(&self) -> Option<TacticalFinding> {
        self.safety.and_then(|s| s.finding())
    }

    pub fn penalty(&self) -> i32 {
        self.search_score + self.bias - self.score
    }
}

/// Where the book comes from. The built-in one is shared process-wide.
#[derive(Debug, Clone)]
enum BookSource {
    Standard,
    Custom(Arc<OpeningBook>),
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: EngineConfig,
    book: BookSource,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Run the safety pass over every committed root move and rank the survivors.
fn safety_filter(position: &Position, candidates: &[RootCandidate], depth: u32) -> Vec<EvaluatedMove> {
    let mut evaluated: Vec<EvaluatedMove> = candidates
        .par_iter()
        .map(|candidate| {
            let mut evaluated =
                EvaluatedMove::new(candidate.mv, candidate.score, depth, Provenance::Search);
            evaluated.exact = candidate.exact;
            evaluated.safety = inspect_move(position, &candidate.mv).ok();
            let forced_mate = is_mate_score(candidate.score) && candidate.score > 0;
            if !forced_mate {
                evaluated.score -= evaluated.safety.map(|s| s.penalty()).unwrap_or(0);
            }
            evaluated
        })
        .collect();
    evaluated.sort_by(|a, b| b.score.cmp(&a.score));
    evaluated
}

/// Bounds re-searched before giving up on putting an exact score on top.
const RESCORE_LIMIT: usize = 3;

fn committed(outcome: &SearchOutcome) -> Result<&[RootCandidate]> {
    if outcome.candidates.is_empty() {
        Err(EngineError::BudgetExhaustedNoResult)
    } else {
        Ok(&outcome.candidates)
    }
}

/// Re-search fail-low bounds that the penalties pushed to the top of the ranking,
/// so the pick rests on a real score. Stops at the hard cap or on cancel.
fn settle_bounds(
    position: &Position,
    candidates: &mut [EvaluatedMove],
    budget: &SearchBudget,
    start: Instant,
    cancel: &CancelToken,
    scheduler: &dyn Scheduler,
) {
    for _ in 0..RESCORE_LIMIT {
        let top = match candidates.first_mut() {
            Some(top) if !top.exact => top,
            _ => return,
        };
        let time_left = budget.hard_limit().saturating_sub(start.elapsed());
        let score = match search::rescore_root(position, &top.mv, top.depth, time_left, cancel, scheduler) {
            Some(score) => score,
            None => return,
        };
        let penalty = if is_mate_score(score) && score > 0 {
            0
        } else {
            top.penalty()
        };
        debug!(bound = top.search_score, score, "re-searched root bound");
        top.search_score = score;
        top.score = score + top.bias - penalty;
        top.exact = true;
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
    }
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            book: BookSource::Standard,
        }
    }

    pub fn with_book(config: EngineConfig, book: OpeningBook) -> Self {
        Self {
            config,
            book: BookSource::Custom(Arc::new(book)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn book(&self) -> &OpeningBook {
        match &self.book {
            BookSource::Standard => OpeningBook::standard(),
            BookSource::Custom(book) => book.as_ref(),
        }
    }

    /// Budget a request will run under.
    pub fn budget_for(&self, request: &MoveRequest) -> SearchBudget {
        self.config
            .budget_for(request.difficulty, request.time_budget_ms)
    }

    /// Choose a move for the side to move in `request.fen`.
    ///
    /// Terminal positions are reported as [`EngineError::NoLegalMoves`], never as a move.
    pub fn select_move(
        &self,
        request: &MoveRequest,
        cancel: &CancelToken,
        scheduler: &dyn Scheduler,
    ) -> Result<MoveResponse> {
        let start = Instant::now();
        let position = Position::from_fen(&request.fen)?;
        let status = position.status();
        if status != GameStatus::Ongoing {
            return Err(EngineError::NoLegalMoves { status });
        }

        let budget = self.budget_for(request);
        let mut rng = match request.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut report = Report::new(start, budget.time_ms);

        if self.config.use_opening_book {
            if let Some(choice) = self.book().select(&position, request.profile, &mut rng) {
                match to_san(&position, &choice.mv) {
                    Ok(san) => return Ok(report.finish(san, Provenance::Book)),
                    Err(e) => report.translation_failed(e),
                }
            }
        }

        match tactical_check::scan(&position) {
            Some(TacticalFinding::ImmediateMateForMover { mating_move }) => {
                match to_san(&position, &mating_move) {
                    Ok(san) => {
                        report.depth = 1;
                        report.score_cp = Some(MATE_SCORE - 1);
                        report.ranking_cp = report.score_cp;
                        return Ok(report.finish(san, Provenance::Tactical));
                    }
                    Err(e) => report.translation_failed(e),
                }
            }
            Some(finding) => debug!(finding = %finding.describe(), "tactical pre-pass"),
            None => {}
        }

        let outcome = search::search(&position, &budget, cancel, scheduler);
        report.depth = outcome.depth;
        report.nodes = outcome.nodes;
        report.termination = Some(outcome.reason);

        let roots = match committed(&outcome) {
            Ok(roots) => roots,
            Err(e) => {
                warn!(error = %e, reason = ?outcome.reason, "no completed depth, using fallback");
                return self.fallback(&position, report);
            }
        };

        let mut candidates = safety_filter(&position, roots, outcome.depth);
        settle_bounds(&position, &mut candidates, &budget, start, cancel, scheduler);
        if request.profile == Profile::Teaching {
            if let Some(snapshot) = &request.signatures {
                if teaching::apply(&mut candidates, &position, snapshot) > 0 {
                    candidates.sort_by(|a, b| b.score.cmp(&a.score));
                }
            }
        }
        report.record_rejections(&position, &candidates);

        if request.profile == Profile::Varied {
            self.shuffle_near_best(&mut candidates, &mut rng);
        }

        for candidate in &candidates {
            match to_san(&position, &candidate.mv) {
                Ok(san) => {
                    report.score_cp = Some(candidate.search_score);
                    report.ranking_cp = Some(candidate.score);
                    return Ok(report.finish(san, Provenance::Search));
                }
                Err(e) => report.translation_failed(e),
            }
        }
        Err(report.exhausted())
    }

    /// Move one random candidate within the varied margin of the best to the front.
    fn shuffle_near_best(&self, candidates: &mut [EvaluatedMove], rng: &mut StdRng) {
        let best = match candidates.first() {
            Some(best) => best.score,
            None => return,
        };
        let margin = self.config.varied_margin_cp;
        let pool: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_vetoed() && c.score >= best - margin)
            .map(|(i, _)| i)
            .collect();
        if pool.len() > 1 {
            let pick = pool[rng.gen_range(0..pool.len())];
            candidates[..=pick].rotate_right(1);
        }
    }

    /// Best legal move by ordering score less safety penalty. Always tagged.
    fn fallback(&self, position: &Position, mut report: Report) -> Result<MoveResponse> {
        let board = position.board();
        let mut ranked: Vec<(Move, i32)> = position
            .legal_moves()
            .into_iter()
            .map(|mv| {
                let penalty = inspect_move(position, &mv)
                    .map(|s| s.penalty())
                    .unwrap_or(0);
                let ordering = order_score(board, mv.chess_move()).clamp(-100_000, 100_000);
                (mv, ordering - penalty)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        for (mv, _) in ranked {
            match to_san(position, &mv) {
                Ok(san) => return Ok(report.finish(san, Provenance::Fallback)),
                Err(e) => report.translation_failed(e),
            }
        }
        Err(report.exhausted())
    }
}

/// Diagnostics under construction.
struct Report {
    start: Instant,
    budget_ms: u64,
    depth: u32,
    nodes: u64,
    score_cp: Option<i32>,
    ranking_cp: Option<i32>,
    termination: Option<TerminationReason>,
    rejected: Vec<RejectedCandidate>,
    failures: Vec<EngineError>,
}

impl Report {
    fn new(start: Instant, budget_ms: u64) -> Self {
        Self {
            start,
            budget_ms,
            depth: 0,
            nodes: 0,
            score_cp: None,
            ranking_cp: None,
            termination: None,
            rejected: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn translation_failed(&mut self, error: EngineError) {
        warn!(error = %error, "dropping candidate");
        self.failures.push(error);
    }

    fn record_rejections(&mut self, position: &Position, candidates: &[EvaluatedMove]) {
        for candidate in candidates {
            let penalty = candidate.penalty();
            if penalty <= 0 {
                continue;
            }
            let reason = candidate
                .finding()
                .map(|f| f.describe())
                .unwrap_or_else(|| "unsafe".to_string());
            if let Ok(san) = to_san(position, &candidate.mv) {
                self.rejected.push(RejectedCandidate {
                    san,
                    reason,
                    penalty,
                });
            }
        }
    }

    fn exhausted(mut self) -> EngineError {
        self.failures
            .pop()
            .unwrap_or(EngineError::BudgetExhaustedNoResult)
    }

    fn finish(self, san: String, provenance: Provenance) -> MoveResponse {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        info!(
            %san,
            ?provenance,
            depth = self.depth,
            nodes = self.nodes,
            elapsed_ms,
            "move selected"
        );
        MoveResponse {
            san,
            diagnostics: Diagnostics {
                depth: self.depth,
                elapsed_ms,
                provenance,
                score_cp: self.score_cp,
                ranking_cp: self.ranking_cp,
                nodes: self.nodes,
                budget_ms: self.budget_ms,
                termination: self.termination,
                rejected: self.rejected,
                translation_failures: self.failures.iter().map(|e| e.to_string()).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::search::NoopScheduler;

    const MIDDLEGAME: &str = "r1bq1rk1/pp2bppp/2n1pn2/3p4/2PP4/2N1PN2/PP2BPPP/R1BQK2R w KQ - 0 8";

    fn run(request: &MoveRequest) -> Result<MoveResponse> {
        Orchestrator::default().select_move(request, &CancelToken::new(), &NoopScheduler)
    }

    #[test]
    fn test_invalid_position() {
        let err = run(&MoveRequest::new("not a position")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPosition);
    }

    #[test]
    fn test_terminal_positions_are_signalled() {
        let err = run(&MoveRequest::new("7k/6Q1/6K1/8/8/8/8/8 b - - 0 1")).unwrap_err();
        assert_eq!(
            err,
            EngineError::NoLegalMoves {
                status: GameStatus::Checkmate
            }
        );
        let err = run(&MoveRequest::new("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1")).unwrap_err();
        assert!(err.is_game_over());
    }

    #[test]
    fn test_cancelled_search_falls_back_with_tag() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let response = Orchestrator::default()
            .select_move(&MoveRequest::new(MIDDLEGAME), &cancel, &NoopScheduler)
            .unwrap();
        assert_eq!(response.diagnostics.provenance, Provenance::Fallback);
        assert_eq!(
            response.diagnostics.termination,
            Some(TerminationReason::Cancelled)
        );
        let position = Position::from_fen(MIDDLEGAME).unwrap();
        let legal: Vec<String> = position
            .legal_moves()
            .iter()
            .map(|mv| to_san(&position, mv).unwrap())
            .collect();
        assert!(legal.contains(&response.san));
    }

    #[test]
    fn test_book_can_be_disabled() {
        let config = EngineConfig {
            use_opening_book: false,
            ..EngineConfig::default()
        };
        let request = MoveRequest::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
            .with_difficulty(Difficulty::Beginner)
            .with_budget_ms(50);
        let response = Orchestrator::new(config)
            .select_move(&request, &CancelToken::new(), &NoopScheduler)
            .unwrap();
        assert_eq!(response.diagnostics.provenance, Provenance::Search);
        assert_eq!(response.diagnostics.budget_ms, 50);
    }

    #[test]
    fn test_custom_book() {
        let book = OpeningBook::from_json_str(r#"[{ "line": [], "moves": [["b1c3", 1]] }]"#).unwrap();
        let orchestrator = Orchestrator::with_book(EngineConfig::default(), book);
        let response = orchestrator
            .select_move(
                &MoveRequest::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
                &CancelToken::new(),
                &NoopScheduler,
            )
            .unwrap();
        assert_eq!(response.san, "Nc3");
    }

    #[test]
    fn test_safety_filter_penalises_hanging_capture() {
        let position = Position::from_fen("3rk3/8/8/3p4/8/8/8/3QK3 w - - 0 1").unwrap();
        let greedy = position.move_from_uci("d1d5").unwrap();
        let quiet = position.move_from_uci("e1f2").unwrap();
        let roots = vec![
            RootCandidate {
                mv: greedy,
                score: 100,
                exact: true,
            },
            RootCandidate {
                mv: quiet,
                score: 0,
                exact: true,
            },
        ];
        let ranked = safety_filter(&position, &roots, 2);
        assert_eq!(ranked[0].mv, quiet);
        assert!(ranked[1].is_vetoed());
        assert_eq!(ranked[1].penalty(), 800 * tactical_check::HANGING_PENALTY_MULTIPLIER);
    }

    #[test]
    fn test_bounded_candidate_is_re_searched_before_it_is_picked() {
        let position = Position::from_fen("3rk3/8/8/3p4/8/8/8/3QK3 w - - 0 1").unwrap();
        let bound = |uci: &str| RootCandidate {
            mv: position.move_from_uci(uci).unwrap(),
            score: -200,
            exact: false,
        };
        let roots = vec![
            RootCandidate {
                mv: position.move_from_uci("d1d5").unwrap(),
                score: 100,
                exact: true,
            },
            bound("e1f2"),
            bound("e1e2"),
        ];
        let mut ranked = safety_filter(&position, &roots, 2);
        assert!(!ranked[0].exact);

        let budget = SearchBudget {
            time_ms: 5_000,
            hard_cap_ms: 5_000,
            min_depth: 2,
            max_depth: 2,
        };
        settle_bounds(
            &position,
            &mut ranked,
            &budget,
            Instant::now(),
            &CancelToken::new(),
            &NoopScheduler,
        );
        assert!(ranked[0].exact);
        let expected = search::rescore_root(
            &position,
            &ranked[0].mv,
            2,
            std::time::Duration::from_secs(5),
            &CancelToken::new(),
            &NoopScheduler,
        )
        .unwrap();
        assert_eq!(ranked[0].search_score, expected);
    }

    #[test]
    fn test_request_json_defaults() {
        let request: MoveRequest = serde_json::from_str(r#"{ "fen": "8/8/8/8/8/8/8/K6k w - - 0 1" }"#).unwrap();
        assert_eq!(request.profile, Profile::Strong);
        assert_eq!(request.difficulty, Difficulty::Medium);
        assert!(request.signatures.is_none());
    }
}
