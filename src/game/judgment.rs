use std::fmt;

/// Accuracy tier awarded to a note, ordered best to worst.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Judgement {
    RainbowMax,
    Max,
    Cool,
    Good,
    Miss,
    // Never hit at all; only the auto-Break pass produces this.
    Break,
}

pub const JUDGEMENT_COUNT: usize = 6;

impl Judgement {
    pub const ALL: [Self; JUDGEMENT_COUNT] =
        [Self::RainbowMax, Self::Max, Self::Cool, Self::Good, Self::Miss, Self::Break];

    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            Self::RainbowMax => 0,
            Self::Max => 1,
            Self::Cool => 2,
            Self::Good => 3,
            Self::Miss => 4,
            Self::Break => 5,
        }
    }

    #[inline(always)]
    pub const fn breaks_combo(self) -> bool {
        matches!(self, Self::Miss | Self::Break)
    }

    /// Judgements that feed the fever meter.
    #[inline(always)]
    pub const fn is_perfect(self) -> bool {
        matches!(self, Self::RainbowMax | Self::Max)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RainbowMax => "RainbowMax",
            Self::Max => "Max",
            Self::Cool => "Cool",
            Self::Good => "Good",
            Self::Miss => "Miss",
            Self::Break => "Break",
        }
    }
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-judgement counters. Append-only for the lifetime of a session.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct JudgementTallies {
    counts: [u32; JUDGEMENT_COUNT],
}

impl JudgementTallies {
    #[inline(always)]
    pub fn record(&mut self, judgement: Judgement) {
        let slot = &mut self.counts[judgement.index()];
        *slot = slot.saturating_add(1);
    }

    #[inline(always)]
    pub fn get(&self, judgement: Judgement) -> u32 {
        self.counts[judgement.index()]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Judgement, u32)> + '_ {
        Judgement::ALL.iter().map(|j| (*j, self.counts[j.index()]))
    }
}
