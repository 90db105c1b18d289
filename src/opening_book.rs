use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::Profile;
use crate::config_error;
use crate::errors::Result;
use crate::position::{Move, Position};

/// A book reply and its relative popularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookMove {
    pub mv: Move,
    pub weight: u32,
}

/// Opening book entry for one position
#[derive(Debug, Clone)]
pub struct OpeningEntry {
    pub name: String,
    pub eco_code: Option<String>, // ECO (Encyclopedia of Chess Openings) code
    pub moves: Vec<BookMove>,
}

/// One row of book data: the moves leading to a position from the initial
/// setup, then the weighted replies in that position. Moves are long algebraic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningLine {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub eco: Option<String>,
    #[serde(default)]
    pub line: Vec<String>,
    pub moves: Vec<(String, u32)>,
}

type StaticLine = (&'static str, &'static str, &'static str, &'static [(&'static str, u32)]);

#[rustfmt::skip]
const STANDARD_LINES: &[StaticLine] = &[
    ("Starting Position", "", "", &[("e2e4", 40), ("d2d4", 35), ("g1f3", 15), ("c2c4", 10)]),
    ("King's Pawn Game", "B00", "e2e4", &[("e7e5", 35), ("c7c5", 30), ("e7e6", 15), ("c7c6", 12), ("d7d5", 8)]),
    ("Open Game", "C20", "e2e4 e7e5", &[("g1f3", 60), ("f1c4", 15), ("b1c3", 15), ("f2f4", 10)]),
    ("King's Knight Opening", "C40", "e2e4 e7e5 g1f3", &[("b8c6", 70), ("g8f6", 20), ("d7d6", 10)]),
    ("Petrov Defense", "C42", "e2e4 e7e5 g1f3 g8f6", &[("f3e5", 60), ("d2d4", 25), ("b1c3", 15)]),
    ("King's Knight Opening: Normal", "C44", "e2e4 e7e5 g1f3 b8c6", &[("f1b5", 45), ("f1c4", 40), ("d2d4", 15)]),
    ("Scotch Game", "C45", "e2e4 e7e5 g1f3 b8c6 d2d4", &[("e5d4", 100)]),
    ("Scotch Game", "C45", "e2e4 e7e5 g1f3 b8c6 d2d4 e5d4", &[("f3d4", 100)]),
    ("Ruy Lopez", "C60", "e2e4 e7e5 g1f3 b8c6 f1b5", &[("a7a6", 60), ("g8f6", 30), ("c6d4", 10)]),
    ("Ruy Lopez: Morphy Defense", "C70", "e2e4 e7e5 g1f3 b8c6 f1b5 a7a6", &[("b5a4", 80), ("b5c6", 20)]),
    ("Italian Game", "C50", "e2e4 e7e5 g1f3 b8c6 f1c4", &[("f8c5", 55), ("g8f6", 45)]),
    ("Italian Game: Giuoco Piano", "C53", "e2e4 e7e5 g1f3 b8c6 f1c4 f8c5", &[("c2c3", 50), ("d2d3", 35), ("b2b4", 15)]),
    ("Italian Game: Two Knights Defense", "C55", "e2e4 e7e5 g1f3 b8c6 f1c4 g8f6", &[("d2d3", 45), ("f3g5", 35), ("d2d4", 20)]),
    ("Sicilian Defense", "B20", "e2e4 c7c5", &[("g1f3", 70), ("b1c3", 20), ("c2c3", 10)]),
    ("Sicilian Defense", "B27", "e2e4 c7c5 g1f3", &[("d7d6", 45), ("b8c6", 30), ("e7e6", 25)]),
    ("Sicilian Defense", "B50", "e2e4 c7c5 g1f3 d7d6", &[("d2d4", 85), ("f1b5", 15)]),
    ("Sicilian Defense: Open", "B53", "e2e4 c7c5 g1f3 d7d6 d2d4", &[("c5d4", 100)]),
    ("Sicilian Defense: Open", "B54", "e2e4 c7c5 g1f3 d7d6 d2d4 c5d4", &[("f3d4", 100)]),
    ("French Defense", "C00", "e2e4 e7e6", &[("d2d4", 90), ("d2d3", 10)]),
    ("French Defense", "C00", "e2e4 e7e6 d2d4", &[("d7d5", 100)]),
    ("French Defense: Main Line", "C01", "e2e4 e7e6 d2d4 d7d5", &[("b1c3", 45), ("e4e5", 30), ("b1d2", 25)]),
    ("Caro-Kann Defense", "B10", "e2e4 c7c6", &[("d2d4", 90), ("b1c3", 10)]),
    ("Caro-Kann Defense", "B12", "e2e4 c7c6 d2d4", &[("d7d5", 100)]),
    ("Caro-Kann Defense: Main Line", "B12", "e2e4 c7c6 d2d4 d7d5", &[("b1c3", 45), ("e4e5", 35), ("e4d5", 20)]),
    ("Scandinavian Defense", "B01", "e2e4 d7d5", &[("e4d5", 100)]),
    ("Scandinavian Defense", "B01", "e2e4 d7d5 e4d5", &[("d8d5", 60), ("g8f6", 40)]),
    ("Queen's Pawn Game", "A40", "d2d4", &[("g8f6", 50), ("d7d5", 40), ("e7e6", 10)]),
    ("Queen's Pawn Game", "D00", "d2d4 d7d5", &[("c2c4", 70), ("g1f3", 20), ("c1f4", 10)]),
    ("Queen's Gambit", "D06", "d2d4 d7d5 c2c4", &[("e7e6", 45), ("c7c6", 40), ("d5c4", 15)]),
    ("Queen's Gambit Declined", "D30", "d2d4 d7d5 c2c4 e7e6", &[("b1c3", 60), ("g1f3", 40)]),
    ("Slav Defense", "D10", "d2d4 d7d5 c2c4 c7c6", &[("g1f3", 60), ("b1c3", 40)]),
    ("Indian Defense", "A45", "d2d4 g8f6", &[("c2c4", 75), ("g1f3", 25)]),
    ("Indian Defense", "A50", "d2d4 g8f6 c2c4", &[("e7e6", 45), ("g7g6", 40), ("c7c5", 15)]),
    ("Indian Defense: East Indian", "E00", "d2d4 g8f6 c2c4 e7e6", &[("b1c3", 50), ("g1f3", 50)]),
    ("Nimzo-Indian Defense", "E20", "d2d4 g8f6 c2c4 e7e6 b1c3", &[("f8b4", 70), ("d7d5", 30)]),
    ("King's Indian Defense", "E60", "d2d4 g8f6 c2c4 g7g6", &[("b1c3", 70), ("g1f3", 30)]),
    ("King's Indian Defense", "E61", "d2d4 g8f6 c2c4 g7g6 b1c3", &[("f8g7", 80), ("d7d5", 20)]),
    ("English Opening", "A10", "c2c4", &[("e7e5", 40), ("g8f6", 35), ("c7c5", 25)]),
    ("English Opening: King's English", "A20", "c2c4 e7e5", &[("b1c3", 70), ("g2g3", 30)]),
    ("Reti Opening", "A04", "g1f3", &[("d7d5", 45), ("g8f6", 45), ("c7c5", 10)]),
    ("Reti Opening", "A06", "g1f3 d7d5", &[("g2g3", 40), ("d2d4", 35), ("c2c4", 25)]),
];

fn standard_lines() -> Vec<OpeningLine> {
    STANDARD_LINES
        .iter()
        .map(|(name, eco, line, moves)| OpeningLine {
            name: name.to_string(),
            eco: (!eco.is_empty()).then(|| eco.to_string()),
            line: line.split_whitespace().map(str::to_string).collect(),
            moves: moves.iter().map(|(mv, w)| (mv.to_string(), *w)).collect(),
        })
        .collect()
}

/// Opening book keyed by the canonical position encoding. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct OpeningBook {
    entries: HashMap<String, OpeningEntry>,
}

impl OpeningBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in book, constructed on first use.
    pub fn standard() -> &'static OpeningBook {
        static STANDARD: OnceLock<OpeningBook> = OnceLock::new();
        STANDARD.get_or_init(|| Self::from_lines(&standard_lines()))
    }

    /// Build a book from raw lines. Lines that do not replay legally are logged and skipped.
    pub fn from_lines(lines: &[OpeningLine]) -> Self {
        let mut book = Self::new();
        for line in lines {
            if let Err(e) = book.add_line(line) {
                warn!(name = %line.name, line = ?line.line, error = %e, "skipping opening line");
            }
        }
        debug!(positions = book.entries.len(), "opening book built");
        book
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let lines: Vec<OpeningLine> = serde_json::from_str(json)?;
        Ok(Self::from_lines(&lines))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Replay `line` from the initial position and record its replies.
    ///
    /// Lines that transpose into an existing entry add only replies not yet listed.
    pub fn add_line(&mut self, line: &OpeningLine) -> Result<()> {
        let mut position = Position::startpos();
        for uci in &line.line {
            let mv = position.move_from_uci(uci)?;
            position = position.apply(&mv)?;
        }

        if line.moves.is_empty() {
            return Err(config_error!("book line '{}' has no replies", line.name));
        }
        let mut moves = Vec::with_capacity(line.moves.len());
        for (uci, weight) in &line.moves {
            if *weight == 0 {
                return Err(config_error!("book move {} has zero weight", uci));
            }
            moves.push(BookMove {
                mv: position.move_from_uci(uci)?,
                weight: *weight,
            });
        }

        let entry = self
            .entries
            .entry(position.canonical_key())
            .or_insert_with(|| OpeningEntry {
                name: line.name.clone(),
                eco_code: line.eco.clone(),
                moves: Vec::new(),
            });
        for book_move in moves {
            if !entry.moves.iter().any(|m| m.mv == book_move.mv) {
                entry.moves.push(book_move);
            }
        }
        Ok(())
    }

    /// Look up position in opening book
    pub fn lookup(&self, position: &Position) -> Option<&[BookMove]> {
        self.entry(position).map(|entry| entry.moves.as_slice())
    }

    pub fn entry(&self, position: &Position) -> Option<&OpeningEntry> {
        self.entries.get(&position.canonical_key())
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.entries.contains_key(&position.canonical_key())
    }

    /// Pick a reply for `profile`: highest weight (first listed on ties) for strong
    /// and teaching play, weight-proportional for varied play.
    pub fn select<R: Rng + ?Sized>(
        &self,
        position: &Position,
        profile: Profile,
        rng: &mut R,
    ) -> Option<BookMove> {
        let moves = self.lookup(position)?;
        let heaviest = || {
            moves
                .iter()
                .copied()
                .reduce(|best, m| if m.weight > best.weight { m } else { best })
        };

        match profile {
            Profile::Strong | Profile::Teaching => heaviest(),
            Profile::Varied => match WeightedIndex::new(moves.iter().map(|m| m.weight)) {
                Ok(dist) => moves.get(dist.sample(rng)).copied(),
                Err(_) => heaviest(),
            },
        }
    }

    /// Get opening book statistics
    pub fn stats(&self) -> OpeningBookStats {
        let total_openings = self.entries.len();
        let eco_coverage = self
            .entries
            .values()
            .filter(|entry| entry.eco_code.is_some())
            .count();

        OpeningBookStats {
            total_openings,
            eco_coverage,
            avg_moves_per_opening: if total_openings > 0 {
                self.entries
                    .values()
                    .map(|entry| entry.moves.len())
                    .sum::<usize>() as f32
                    / total_openings as f32
            } else {
                0.0
            },
        }
    }
}

/// Statistics about the opening book coverage
#[derive(Debug, Clone)]
pub struct OpeningBookStats {
    pub total_openings: usize,
    pub eco_coverage: usize,
    pub avg_moves_per_opening: f32,
}
