use log::info;

use crate::game::judgment::Judgement;

const MISS_FEVER_FACTOR: f64 = 0.75;
const BREAK_FEVER_FACTOR: f64 = 0.5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FeverState {
    Idle,
    Ready,
    Active,
}

impl FeverState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Ready => "Ready",
            Self::Active => "Active",
        }
    }
}

/// Fever bar: filled by perfect judgements while Idle, spent over real time
/// while Active.
#[derive(Debug, Clone, PartialEq)]
pub struct FeverMeter {
    state: FeverState,
    amount: f64,
    gain_per_perfect: f64,
    drain_per_second: f64,
    // Amount held when the current Active phase began.
    consumed: f64,
    // Score earned during the current Active phase.
    pending_bonus: f64,
}

impl FeverMeter {
    pub fn new(coefficient: f64, playable_note_count: usize, drain_per_second: f64) -> Self {
        let gain_per_perfect = if playable_note_count == 0 {
            0.0
        } else {
            coefficient / playable_note_count as f64
        };
        Self {
            state: FeverState::Idle,
            amount: 0.0,
            gain_per_perfect,
            drain_per_second: drain_per_second.max(f64::EPSILON),
            consumed: 0.0,
            pending_bonus: 0.0,
        }
    }

    #[inline(always)]
    pub fn state(&self) -> FeverState {
        self.state
    }

    #[inline(always)]
    pub fn amount(&self) -> f64 {
        self.amount
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.state == FeverState::Active
    }

    /// Feed a resolved judgement. Returns true when the bar just became Ready.
    pub fn on_judgement(&mut self, judgement: Judgement) -> bool {
        match (self.state, judgement) {
            (FeverState::Active, _) => false,
            (FeverState::Idle, j) if j.is_perfect() => {
                self.amount = (self.amount + self.gain_per_perfect).clamp(0.0, 1.0);
                if self.amount >= 1.0 {
                    self.amount = 1.0;
                    self.state = FeverState::Ready;
                    return true;
                }
                false
            }
            (_, Judgement::Miss) => {
                self.amount *= MISS_FEVER_FACTOR;
                if self.amount < 1.0 {
                    self.state = FeverState::Idle;
                }
                false
            }
            (_, Judgement::Break) => {
                self.amount *= BREAK_FEVER_FACTOR;
                self.state = FeverState::Idle;
                false
            }
            _ => false,
        }
    }

    /// Ready to Active. Any other state refuses.
    pub fn activate(&mut self) -> bool {
        if self.state != FeverState::Ready {
            return false;
        }
        self.state = FeverState::Active;
        self.consumed = self.amount;
        self.pending_bonus = 0.0;
        info!("Fever activated.");
        true
    }

    /// Add score earned while Active to the bonus paid out at the end.
    pub fn accrue(&mut self, score_value: f64) {
        if self.is_active() {
            self.pending_bonus += score_value.max(0.0);
        }
    }

    /// Drain by real elapsed seconds. Returns the bonus when Active ends.
    pub fn update(&mut self, real_delta_s: f64) -> Option<u32> {
        if !self.is_active() || !(real_delta_s > 0.0) {
            return None;
        }
        self.amount -= real_delta_s * self.drain_per_second;
        if self.amount > 0.0 {
            return None;
        }
        self.amount = 0.0;
        self.state = FeverState::Idle;
        let bonus = (self.pending_bonus * self.consumed).floor().clamp(0.0, u32::MAX as f64) as u32;
        self.pending_bonus = 0.0;
        self.consumed = 0.0;
        info!("Fever ended with bonus {bonus}.");
        Some(bonus)
    }

    pub fn reset(&mut self) {
        self.state = FeverState::Idle;
        self.amount = 0.0;
        self.consumed = 0.0;
        self.pending_bonus = 0.0;
    }
}
