use crate::game::fever::{FeverMeter, FeverState};
use crate::game::judgment::{Judgement, JudgementTallies};
use crate::game::life::LifeMeter;
use crate::game::note::NoteCategory;
use crate::game::ruleset::Ruleset;

/// Combo, tallies and score. Base score is recomputed from the tallies so
/// rounding never accumulates.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreKeeper {
    combo: u32,
    max_combo: u32,
    tallies: JudgementTallies,
    weighted_notes: f64,
    fever_bonus: u64,
    max_score: u32,
    playable_notes: usize,
}

impl ScoreKeeper {
    pub fn new(max_score: u32, playable_notes: usize) -> Self {
        Self {
            combo: 0,
            max_combo: 0,
            tallies: JudgementTallies::default(),
            weighted_notes: 0.0,
            fever_bonus: 0,
            max_score,
            playable_notes,
        }
    }

    #[inline(always)]
    pub fn combo(&self) -> u32 {
        self.combo
    }

    #[inline(always)]
    pub fn max_combo(&self) -> u32 {
        self.max_combo
    }

    pub fn tallies(&self) -> &JudgementTallies {
        &self.tallies
    }

    /// Score one note is worth at the given multiplier.
    pub fn note_value(&self, multiplier: f64) -> f64 {
        if self.playable_notes == 0 {
            return 0.0;
        }
        self.max_score as f64 / self.playable_notes as f64 * multiplier
    }

    pub fn base_score(&self) -> u64 {
        if self.playable_notes == 0 {
            return 0;
        }
        let ratio = (self.weighted_notes / self.playable_notes as f64).clamp(0.0, 1.0);
        // Guard against 0.999.. from summing many multipliers.
        (ratio * self.max_score as f64 + 1e-6).floor() as u64
    }

    pub fn score(&self) -> u64 {
        self.base_score().saturating_add(self.fever_bonus)
    }

    pub fn record(&mut self, judgement: Judgement, multiplier: f64) {
        self.tallies.record(judgement);
        self.weighted_notes += multiplier;
        if judgement.breaks_combo() {
            self.combo = 0;
        } else {
            self.add_combo(1);
        }
    }

    pub fn add_combo(&mut self, n: u32) {
        self.combo = self.combo.saturating_add(n);
        self.max_combo = self.max_combo.max(self.combo);
    }

    pub fn reset_combo(&mut self) {
        self.combo = 0;
    }

    pub fn add_fever_bonus(&mut self, bonus: u32) {
        self.fever_bonus = self.fever_bonus.saturating_add(u64::from(bonus));
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.max_score, self.playable_notes);
    }
}

/// Side effects of one judgement on the meters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MeterOutcome {
    pub failed: bool,
    pub fever_ready: bool,
}

/// All meters of a session, mutated only through resolved judgements.
#[derive(Debug, Clone, PartialEq)]
pub struct Meters {
    pub score: ScoreKeeper,
    pub life: LifeMeter,
    pub fever: FeverMeter,
}

impl Meters {
    pub fn new(ruleset: &Ruleset, playable_notes: usize, pattern_length_s: f64) -> Self {
        Self {
            score: ScoreKeeper::new(ruleset.max_score, playable_notes),
            life: LifeMeter::new(ruleset.max_hp),
            fever: FeverMeter::new(
                ruleset.fever_coefficient_for(pattern_length_s),
                playable_notes,
                ruleset.fever_drain_per_second(),
            ),
        }
    }

    /// Back to a fresh start: no tallies, full HP, empty fever bar.
    pub fn reset(&mut self) {
        self.score.reset();
        self.life.reset();
        self.fever.reset();
    }

    /// Combo, then HP (keyed on whether fever was Active), then fever.
    pub fn apply(
        &mut self,
        ruleset: &Ruleset,
        judgement: Judgement,
        category: NoteCategory,
        current_time: f64,
        no_fail: bool,
    ) -> MeterOutcome {
        let multiplier = ruleset.score_multiplier(judgement);
        self.score.record(judgement, multiplier);

        let fever_active = self.fever.is_active();
        let delta = ruleset.hp_delta(judgement, category, fever_active);
        let failed = self.life.apply(delta, current_time, no_fail);

        self.fever.accrue(self.score.note_value(multiplier));
        let fever_ready = self.fever.on_judgement(judgement);
        MeterOutcome { failed, fever_ready }
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            score: self.score.score(),
            combo: self.score.combo(),
            max_combo: self.score.max_combo(),
            hp: self.life.hp(),
            max_hp: self.life.max_hp(),
            fever_state: self.fever.state(),
            fever_amount: self.fever.amount(),
            tallies: *self.score.tallies(),
        }
    }
}

/// Read-only projection for UI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSnapshot {
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub hp: i32,
    pub max_hp: i32,
    pub fever_state: FeverState,
    pub fever_amount: f64,
    pub tallies: JudgementTallies,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combo_counts_hits_and_resets_on_miss() {
        let mut s = ScoreKeeper::new(300_000, 10);
        s.record(Judgement::Max, 1.0);
        s.record(Judgement::Good, 0.35);
        assert_eq!(s.combo(), 2);
        s.record(Judgement::Miss, 0.0);
        assert_eq!(s.combo(), 0);
        assert_eq!(s.max_combo(), 2);
        s.add_combo(5);
        assert_eq!(s.max_combo(), 5);
    }

    #[test]
    fn perfect_run_reaches_max_score() {
        let mut s = ScoreKeeper::new(300_000, 7);
        for _ in 0..7 {
            s.record(Judgement::RainbowMax, 1.0);
        }
        assert_eq!(s.score(), 300_000);
        s.add_fever_bonus(1234);
        assert_eq!(s.score(), 301_234);
    }

    #[test]
    fn meters_apply_hp_from_table() {
        let ruleset = Ruleset::default();
        let mut m = Meters::new(&ruleset, 4, 10.0);
        let out = m.apply(&ruleset, Judgement::Break, NoteCategory::Basic, 1.0, false);
        assert!(!out.failed);
        assert_eq!(m.life.hp(), 950);
        assert_eq!(m.score.combo(), 0);
        let snap = m.snapshot();
        assert_eq!(snap.tallies.get(Judgement::Break), 1);
        assert_eq!(snap.fever_state, FeverState::Idle);
    }

    #[test]
    fn fever_uses_its_own_hp_column_and_accrues_bonus() {
        let ruleset = Ruleset::default();
        // Constant coefficient 8 over 4 notes: one perfect fills the bar.
        let mut m = Meters::new(&ruleset, 4, 10.0);
        let out = m.apply(&ruleset, Judgement::Max, NoteCategory::Basic, 0.0, false);
        assert!(out.fever_ready);
        assert!(m.fever.activate());
        m.life.apply(-100, 0.0, false);
        m.apply(&ruleset, Judgement::Max, NoteCategory::Basic, 0.0, false);
        assert_eq!(m.life.hp(), 906, "fever column gives +6");
        let bonus = m.fever.update(100.0).expect("drained in one step");
        assert_eq!(bonus, 75_000, "one note worth 300000/4 at full consumption");
    }

    #[test]
    fn reset_returns_every_meter_to_its_start() {
        let ruleset = Ruleset::default();
        let mut m = Meters::new(&ruleset, 4, 10.0);
        m.apply(&ruleset, Judgement::Max, NoteCategory::Basic, 0.0, false);
        m.apply(&ruleset, Judgement::Break, NoteCategory::Basic, 0.5, false);
        m.score.add_fever_bonus(10);
        m.reset();
        assert_eq!(m, Meters::new(&ruleset, 4, 10.0));
    }
}
