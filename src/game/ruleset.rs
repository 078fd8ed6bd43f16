use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::game::judgment::{JUDGEMENT_COUNT, Judgement};
use crate::game::note::{CATEGORY_COUNT, GraceKind, NoteCategory, NoteType};
use crate::game::timing::TimingProfile;

// Seconds of optimal play that fill the fever bar when the coefficient is
// derived from pattern length.
pub const FEVER_FILL_TARGET_S: f64 = 12.5;

#[derive(Debug, thiserror::Error)]
pub enum RulesetError {
    #[error("Failed to read ruleset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse ruleset: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Judgement windows must be positive and widen from RainbowMax to Miss")]
    UnorderedWindows,

    #[error("Max HP must be positive, got {0}")]
    InvalidMaxHp(i32),

    #[error("Fever duration must be positive, got {0}")]
    InvalidFeverDuration(f64),
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value")]
pub enum FeverCoefficient {
    Constant(f64),
    ByDuration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeverActivation {
    Manual,
    Automatic,
}

/// HP deltas indexed by `[category][judgement]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HpDeltaTable {
    pub normal: [[i32; JUDGEMENT_COUNT]; CATEGORY_COUNT],
    pub fever: [[i32; JUDGEMENT_COUNT]; CATEGORY_COUNT],
}

impl Default for HpDeltaTable {
    fn default() -> Self {
        Self {
            //        RMax Max Cool Good Miss Break
            normal: [
                [3, 3, 2, 1, -30, -50],  // Basic
                [1, 1, 1, 0, -10, -20],  // Chain
                [3, 3, 2, 1, -30, -50],  // Hold
                [3, 3, 2, 1, -30, -50],  // Drag
                [1, 1, 1, 0, -10, -20],  // Repeat
                [2, 2, 1, 1, -20, -30],  // RepeatHold
            ],
            fever: [
                [6, 6, 4, 2, -15, -25],
                [2, 2, 2, 0, -5, -10],
                [6, 6, 4, 2, -15, -25],
                [6, 6, 4, 2, -15, -25],
                [2, 2, 2, 0, -5, -10],
                [4, 4, 2, 2, -10, -15],
            ],
        }
    }
}

/// Judgement, HP, score and fever parameters for one play mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Ruleset {
    pub timing: TimingProfile,
    pub max_hp: i32,
    pub hp_delta: HpDeltaTable,
    // RainbowMax, Max, Cool, Good, Miss, Break.
    pub score_multipliers: [f64; JUDGEMENT_COUNT],
    pub max_score: u32,
    pub fever_coefficient: FeverCoefficient,
    /// Real seconds an Active fever lasts from a full bar.
    pub fever_duration_s: f64,
    pub fever_activation: FeverActivation,
    pub hold_grace_period_s: f64,
    pub drag_grace_period_s: f64,
    /// Total width of a note's hit-box along the scan, in pulses.
    pub hitbox_width_pulses: i32,
    /// Types the pointer may hit under the hybrid scheme.
    pub pointer_note_types: Vec<NoteType>,
    /// Types the keyboard may hit under the hybrid scheme.
    pub key_note_types: Vec<NoteType>,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            timing: TimingProfile::default(),
            max_hp: 1000,
            hp_delta: HpDeltaTable::default(),
            score_multipliers: [1.0, 1.0, 0.7, 0.35, 0.0, 0.0],
            max_score: 300_000,
            fever_coefficient: FeverCoefficient::Constant(8.0),
            fever_duration_s: 10.0,
            fever_activation: FeverActivation::Manual,
            hold_grace_period_s: 0.15,
            drag_grace_period_s: 0.3,
            hitbox_width_pulses: 240,
            pointer_note_types: vec![
                NoteType::Basic,
                NoteType::ChainHead,
                NoteType::ChainNode,
                NoteType::Drag,
            ],
            key_note_types: vec![
                NoteType::Hold,
                NoteType::RepeatHead,
                NoteType::RepeatHeadHold,
                NoteType::Repeat,
                NoteType::RepeatHold,
            ],
        }
    }
}

impl Ruleset {
    pub fn from_json(text: &str) -> Result<Self, RulesetError> {
        let ruleset: Self = serde_json::from_str(text)?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RulesetError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), RulesetError> {
        if !self.timing.is_ordered() {
            return Err(RulesetError::UnorderedWindows);
        }
        if self.max_hp <= 0 {
            return Err(RulesetError::InvalidMaxHp(self.max_hp));
        }
        if !self.fever_duration_s.is_finite() || self.fever_duration_s <= 0.0 {
            return Err(RulesetError::InvalidFeverDuration(self.fever_duration_s));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn hp_delta(&self, judgement: Judgement, category: NoteCategory, fever_active: bool) -> i32 {
        let table = if fever_active { &self.hp_delta.fever } else { &self.hp_delta.normal };
        table[category.index()][judgement.index()]
    }

    #[inline(always)]
    pub fn score_multiplier(&self, judgement: Judgement) -> f64 {
        self.score_multipliers[judgement.index()]
    }

    pub fn grace_period_s(&self, note_type: NoteType) -> f64 {
        match note_type.behavior().grace {
            GraceKind::None => 0.0,
            GraceKind::Hold => self.hold_grace_period_s,
            GraceKind::Drag => self.drag_grace_period_s,
        }
    }

    /// Fever gained per perfect judgement is this over the playable note count.
    pub fn fever_coefficient_for(&self, pattern_length_s: f64) -> f64 {
        match self.fever_coefficient {
            FeverCoefficient::Constant(c) => c,
            FeverCoefficient::ByDuration => (pattern_length_s / FEVER_FILL_TARGET_S).max(0.0),
        }
    }

    #[inline(always)]
    pub fn fever_drain_per_second(&self) -> f64 {
        1.0 / self.fever_duration_s
    }

    #[inline(always)]
    pub fn pointer_plays(&self, note_type: NoteType) -> bool {
        self.pointer_note_types.contains(&note_type)
    }

    #[inline(always)]
    pub fn keys_play(&self, note_type: NoteType) -> bool {
        self.key_note_types.contains(&note_type)
    }
}
