use serde::{Deserialize, Serialize};

/// Index of a note inside its prepared pattern.
pub type NoteId = usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteType {
    Basic,
    ChainHead,
    ChainNode,
    Hold,
    Drag,
    RepeatHead,
    RepeatHeadHold,
    Repeat,
    RepeatHold,
}

/// Grouping used by the HP table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NoteCategory {
    Basic,
    Chain,
    Hold,
    Drag,
    Repeat,
    RepeatHold,
}

pub const CATEGORY_COUNT: usize = 6;

impl NoteCategory {
    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            Self::Basic => 0,
            Self::Chain => 1,
            Self::Hold => 2,
            Self::Drag => 3,
            Self::Repeat => 4,
            Self::RepeatHold => 5,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GraceKind {
    None,
    Hold,
    Drag,
}

/// Static per-type behavior, selected by match instead of per-note dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NoteBehavior {
    pub has_duration: bool,
    pub category: NoteCategory,
    pub grace: GraceKind,
    // Hit by a held pointer sliding over it, not only by a fresh press.
    pub hit_on_slide: bool,
    // Ongoing region follows the curve instead of the whole lane span.
    pub follows_curve: bool,
}

impl NoteType {
    pub const ALL: [Self; 9] = [
        Self::Basic,
        Self::ChainHead,
        Self::ChainNode,
        Self::Hold,
        Self::Drag,
        Self::RepeatHead,
        Self::RepeatHeadHold,
        Self::Repeat,
        Self::RepeatHold,
    ];

    pub const fn behavior(self) -> NoteBehavior {
        const fn tap(category: NoteCategory) -> NoteBehavior {
            NoteBehavior {
                has_duration: false,
                category,
                grace: GraceKind::None,
                hit_on_slide: false,
                follows_curve: false,
            }
        }
        const fn sustained(category: NoteCategory, grace: GraceKind) -> NoteBehavior {
            NoteBehavior {
                has_duration: true,
                category,
                grace,
                hit_on_slide: false,
                follows_curve: matches!(grace, GraceKind::Drag),
            }
        }
        match self {
            Self::Basic => tap(NoteCategory::Basic),
            Self::ChainHead => tap(NoteCategory::Chain),
            Self::ChainNode => NoteBehavior { hit_on_slide: true, ..tap(NoteCategory::Chain) },
            Self::Hold => sustained(NoteCategory::Hold, GraceKind::Hold),
            Self::Drag => sustained(NoteCategory::Drag, GraceKind::Drag),
            Self::RepeatHead | Self::Repeat => tap(NoteCategory::Repeat),
            Self::RepeatHeadHold | Self::RepeatHold => {
                sustained(NoteCategory::RepeatHold, GraceKind::Hold)
            }
        }
    }

    #[inline(always)]
    pub const fn has_duration(self) -> bool {
        self.behavior().has_duration
    }
}

/// Anchor of a drag curve, relative to the note's own pulse and lane.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragNode {
    pub pulse: i32,
    #[serde(default)]
    pub lane: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NoteKind {
    Basic,
    ChainHead,
    ChainNode,
    Hold { duration: i32 },
    Drag { nodes: Vec<DragNode> },
    RepeatHead,
    RepeatHeadHold { duration: i32 },
    Repeat,
    RepeatHold { duration: i32 },
}

impl NoteKind {
    pub const fn note_type(&self) -> NoteType {
        match self {
            Self::Basic => NoteType::Basic,
            Self::ChainHead => NoteType::ChainHead,
            Self::ChainNode => NoteType::ChainNode,
            Self::Hold { .. } => NoteType::Hold,
            Self::Drag { .. } => NoteType::Drag,
            Self::RepeatHead => NoteType::RepeatHead,
            Self::RepeatHeadHold { .. } => NoteType::RepeatHeadHold,
            Self::Repeat => NoteType::Repeat,
            Self::RepeatHold { .. } => NoteType::RepeatHold,
        }
    }

    /// Length in pulses; zero for instantaneous kinds.
    pub fn duration_pulses(&self) -> i32 {
        match self {
            Self::Hold { duration }
            | Self::RepeatHeadHold { duration }
            | Self::RepeatHold { duration } => *duration,
            Self::Drag { nodes } => nodes.last().map_or(0, |n| n.pulse),
            _ => 0,
        }
    }
}

const fn default_volume() -> u8 {
    100
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub pulse: i32,
    pub lane: usize,
    #[serde(flatten)]
    pub kind: NoteKind,
    /// Empty when the note plays nothing.
    #[serde(default)]
    pub sound: String,
    #[serde(default = "default_volume")]
    pub volume_percent: u8,
    #[serde(default)]
    pub pan_percent: i8,
}

impl Note {
    pub fn new(pulse: i32, lane: usize, kind: NoteKind) -> Self {
        Self {
            pulse,
            lane,
            kind,
            sound: String::new(),
            volume_percent: default_volume(),
            pan_percent: 0,
        }
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = sound.into();
        self
    }

    #[inline(always)]
    pub fn note_type(&self) -> NoteType {
        self.kind.note_type()
    }

    #[inline(always)]
    pub fn end_pulse(&self) -> i32 {
        self.pulse.saturating_add(self.kind.duration_pulses())
    }

    /// Lane position (fractional) of the note at an absolute pulse. Drag
    /// curves interpolate linearly between anchors; other kinds stay put.
    pub fn lane_at(&self, pulse: f64) -> f32 {
        let base = self.lane as f32;
        let NoteKind::Drag { nodes } = &self.kind else {
            return base;
        };
        let rel = pulse - self.pulse as f64;
        let Some(first) = nodes.first() else {
            return base;
        };
        if rel <= first.pulse as f64 {
            return base + first.lane;
        }
        for pair in nodes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if rel <= b.pulse as f64 {
                let span = (b.pulse - a.pulse).max(1) as f64;
                let t = ((rel - a.pulse as f64) / span) as f32;
                return base + (b.lane - a.lane).mul_add(t, a.lane);
            }
        }
        base + nodes.last().map_or(0.0, |n| n.lane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_types_match_behavior_table() {
        let sustained: Vec<NoteType> =
            NoteType::ALL.iter().copied().filter(|t| t.has_duration()).collect();
        assert_eq!(
            sustained,
            vec![NoteType::Hold, NoteType::Drag, NoteType::RepeatHeadHold, NoteType::RepeatHold]
        );
        assert_eq!(NoteType::Drag.behavior().grace, GraceKind::Drag);
        assert!(NoteType::ChainNode.behavior().hit_on_slide);
        assert!(!NoteType::ChainHead.behavior().hit_on_slide);
    }

    #[test]
    fn drag_curve_interpolates_between_anchors() {
        let note = Note::new(
            480,
            1,
            NoteKind::Drag {
                nodes: vec![
                    DragNode { pulse: 0, lane: 0.0 },
                    DragNode { pulse: 240, lane: 1.0 },
                    DragNode { pulse: 480, lane: 1.0 },
                ],
            },
        );
        assert_eq!(note.end_pulse(), 960);
        assert!((note.lane_at(480.0) - 1.0).abs() < 1e-6);
        assert!((note.lane_at(600.0) - 1.5).abs() < 1e-6, "halfway up the first segment");
        assert!((note.lane_at(900.0) - 2.0).abs() < 1e-6);
        assert!((note.lane_at(5000.0) - 2.0).abs() < 1e-6, "clamped past the last anchor");
    }

    #[test]
    fn note_deserializes_with_defaults() {
        let json = r#"{"pulse": 240, "lane": 2, "type": "Hold", "duration": 120, "sound": "kick.wav"}"#;
        let note: Note = serde_json::from_str(json).expect("note json");
        assert_eq!(note.kind, NoteKind::Hold { duration: 120 });
        assert_eq!(note.volume_percent, 100);
        assert_eq!(note.pan_percent, 0);
        assert_eq!(note.end_pulse(), 360);
    }
}
