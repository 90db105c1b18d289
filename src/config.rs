//! Engine configuration: difficulty budgets, play profiles and the host ceiling.
//!
//! | Difficulty | Base | Hard cap | Depth |
//! |------------|------|----------|-------|
//! | Beginner   | 150ms  | 500ms  | 1-2 |
//! | Easy       | 300ms  | 1000ms | 1-3 |
//! | Medium     | 800ms  | 2500ms | 2-4 |
//! | Hard       | 1500ms | 5000ms | 2-6 |
//! | Expert     | 3000ms | 8000ms | 3-8 |
//!
//! Every hard cap is further bounded by [`EngineConfig::host_ceiling_ms`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config_error;
use crate::errors::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

/// How the final move is chosen among the ranked candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Always the top-ranked move.
    #[default]
    Strong,
    /// Weighted-random book moves, random pick among near-best search moves.
    Varied,
    /// Strong play nudged toward positions that exercise the player's weaknesses.
    Teaching,
}

impl FromStr for Difficulty {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "expert" => Ok(Difficulty::Expert),
            other => Err(config_error!("unknown difficulty '{}'", other)),
        }
    }
}

impl FromStr for Profile {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strong" => Ok(Profile::Strong),
            "varied" => Ok(Profile::Varied),
            "teaching" => Ok(Profile::Teaching),
            other => Err(config_error!("unknown profile '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetEntry {
    pub base_ms: u64,
    pub hard_cap_ms: u64,
    pub min_depth: u32,
    pub max_depth: u32,
}

impl BudgetEntry {
    const fn new(base_ms: u64, hard_cap_ms: u64, min_depth: u32, max_depth: u32) -> Self {
        Self {
            base_ms,
            hard_cap_ms,
            min_depth,
            max_depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetTable {
    pub beginner: BudgetEntry,
    pub easy: BudgetEntry,
    pub medium: BudgetEntry,
    pub hard: BudgetEntry,
    pub expert: BudgetEntry,
}

impl Default for BudgetTable {
    fn default() -> Self {
        Self {
            beginner: BudgetEntry::new(150, 500, 1, 2),
            easy: BudgetEntry::new(300, 1_000, 1, 3),
            medium: BudgetEntry::new(800, 2_500, 2, 4),
            hard: BudgetEntry::new(1_500, 5_000, 2, 6),
            expert: BudgetEntry::new(3_000, 8_000, 3, 8),
        }
    }
}

impl BudgetTable {
    pub fn entry(&self, difficulty: Difficulty) -> &BudgetEntry {
        match difficulty {
            Difficulty::Beginner => &self.beginner,
            Difficulty::Easy => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard => &self.hard,
            Difficulty::Expert => &self.expert,
        }
    }

    fn entries(&self) -> [(Difficulty, &BudgetEntry); 5] {
        [
            (Difficulty::Beginner, &self.beginner),
            (Difficulty::Easy, &self.easy),
            (Difficulty::Medium, &self.medium),
            (Difficulty::Hard, &self.hard),
            (Difficulty::Expert, &self.expert),
        ]
    }
}

/// The clamped budget one search actually runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchBudget {
    pub time_ms: u64,
    pub hard_cap_ms: u64,
    pub min_depth: u32,
    pub max_depth: u32,
}

impl SearchBudget {
    pub fn soft_limit(&self) -> Duration {
        Duration::from_millis(self.time_ms)
    }

    pub fn hard_limit(&self) -> Duration {
        Duration::from_millis(self.hard_cap_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Compute ceiling imposed by the host; bounds every hard cap.
    pub host_ceiling_ms: u64,
    /// Extra time the worker grants past the hard cap before giving up on a search.
    pub backstop_grace_ms: u64,
    /// Varied profile picks among search moves within this many centipawns of the best.
    pub varied_margin_cp: i32,
    pub use_opening_book: bool,
    pub budgets: BudgetTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_ceiling_ms: 10_000,
            backstop_grace_ms: 250,
            varied_margin_cp: 35,
            use_opening_book: true,
            budgets: BudgetTable::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host_ceiling_ms == 0 {
            return Err(config_error!("host_ceiling_ms must be positive"));
        }
        if self.varied_margin_cp < 0 {
            return Err(config_error!("varied_margin_cp must not be negative"));
        }
        for (difficulty, entry) in self.budgets.entries() {
            if entry.min_depth == 0 {
                return Err(config_error!("{:?}: min_depth must be at least 1", difficulty));
            }
            if entry.min_depth > entry.max_depth {
                return Err(config_error!(
                    "{:?}: min_depth {} exceeds max_depth {}",
                    difficulty,
                    entry.min_depth,
                    entry.max_depth
                ));
            }
            if entry.base_ms > entry.hard_cap_ms {
                return Err(config_error!(
                    "{:?}: base budget {}ms exceeds hard cap {}ms",
                    difficulty,
                    entry.base_ms,
                    entry.hard_cap_ms
                ));
            }
        }
        Ok(())
    }

    /// Hard cap for a difficulty after applying the host ceiling.
    pub fn hard_cap_ms(&self, difficulty: Difficulty) -> u64 {
        self.budgets
            .entry(difficulty)
            .hard_cap_ms
            .min(self.host_ceiling_ms)
    }

    /// Clamp a requested time allotment. Requests above the hard cap get exactly the cap.
    pub fn budget_for(&self, difficulty: Difficulty, requested_ms: Option<u64>) -> SearchBudget {
        let entry = self.budgets.entry(difficulty);
        let hard_cap_ms = self.hard_cap_ms(difficulty);
        let time_ms = requested_ms
            .unwrap_or(entry.base_ms)
            .clamp(1, hard_cap_ms.max(1));

        SearchBudget {
            time_ms,
            hard_cap_ms,
            min_depth: entry.min_depth.max(1),
            max_depth: entry.max_depth.max(entry.min_depth).max(1),
        }
    }

    /// How long the worker waits before abandoning a search.
    pub fn backstop(&self, budget: &SearchBudget) -> Duration {
        budget.hard_limit() + Duration::from_millis(self.backstop_grace_ms)
    }
}
