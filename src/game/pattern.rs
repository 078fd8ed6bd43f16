use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::game::note::{Note, NoteId, NoteKind};
use crate::game::timing::{PULSES_PER_BEAT, TempoEvent, TempoMap};

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid BPM {bpm} at pulse {pulse}")]
    InvalidBpm { pulse: i32, bpm: f64 },

    #[error("More than one tempo change at pulse {0}")]
    DuplicateTempoChange(i32),

    #[error("Tempo event at negative pulse {0}")]
    NegativeTempoPulse(i32),

    #[error("Stop at pulse {pulse} has non-positive duration {duration_pulses}")]
    InvalidStop { pulse: i32, duration_pulses: i32 },

    #[error("Stop at pulse {0} starts inside a previous stop")]
    OverlappingStop(i32),

    #[error("Note {index} has negative pulse {pulse}")]
    NegativeNotePulse { index: usize, pulse: i32 },

    #[error("Note {index} has non-positive duration")]
    InvalidDuration { index: usize },

    #[error("Note {index} has a malformed drag curve")]
    InvalidDragCurve { index: usize },

    #[error("Pattern has no playable lanes")]
    NoPlayableLanes,

    #[error("Beats per scan must be positive, got {0}")]
    InvalidBeatsPerScan(i32),

    #[error("Failed to read pattern: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse pattern: {0}")]
    Parse(#[from] serde_json::Error),
}

const fn default_beats_per_scan() -> i32 {
    4
}

const fn default_playable_lanes() -> usize {
    4
}

/// Pattern data as delivered by the loader, before validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pattern {
    pub title: String,
    pub initial_bpm: f64,
    /// Seconds from the start of the backing track to pulse 0.
    pub first_beat_offset: f64,
    pub beats_per_scan: i32,
    pub playable_lanes: usize,
    pub tempo_events: Vec<TempoEvent>,
    pub notes: Vec<Note>,
    /// Seconds into the backing track at which the video starts.
    pub video_offset: f64,
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            title: String::new(),
            initial_bpm: 120.0,
            first_beat_offset: 0.0,
            beats_per_scan: default_beats_per_scan(),
            playable_lanes: default_playable_lanes(),
            tempo_events: Vec::new(),
            notes: Vec::new(),
            video_offset: 0.0,
        }
    }
}

/// Derived times of one note.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NoteTiming {
    pub time: f64,
    pub end_time: f64,
}

/// A validated pattern with its tempo map and per-note times resolved.
/// Immutable for the rest of the session; the engine only references it.
#[derive(Debug, Clone)]
pub struct PreparedPattern {
    pub title: String,
    pub beats_per_scan: i32,
    pub playable_lanes: usize,
    pub lane_count: usize,
    pub video_offset: f64,
    tempo: TempoMap,
    // Sorted by (pulse, lane); a NoteId indexes both vectors.
    notes: Vec<Note>,
    timings: Vec<NoteTiming>,
    playable_note_count: usize,
    last_scan: i32,
    end_time: f64,
    start_time: f64,
}

impl Pattern {
    pub fn from_json(text: &str) -> Result<Self, PatternError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PatternError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), PatternError> {
        if self.playable_lanes == 0 {
            return Err(PatternError::NoPlayableLanes);
        }
        if self.beats_per_scan <= 0 {
            return Err(PatternError::InvalidBeatsPerScan(self.beats_per_scan));
        }
        for (index, note) in self.notes.iter().enumerate() {
            if note.pulse < 0 {
                return Err(PatternError::NegativeNotePulse { index, pulse: note.pulse });
            }
            match &note.kind {
                NoteKind::Hold { duration }
                | NoteKind::RepeatHeadHold { duration }
                | NoteKind::RepeatHold { duration } => {
                    if *duration <= 0 {
                        return Err(PatternError::InvalidDuration { index });
                    }
                }
                NoteKind::Drag { nodes } => {
                    let starts_at_note = nodes.first().is_some_and(|n| n.pulse == 0);
                    let increasing = nodes.windows(2).all(|w| w[0].pulse < w[1].pulse);
                    if nodes.len() < 2 || !starts_at_note || !increasing {
                        return Err(PatternError::InvalidDragCurve { index });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate, build the tempo map, and resolve note times.
    pub fn prepare(self) -> Result<PreparedPattern, PatternError> {
        self.validate()?;
        let tempo = TempoMap::new(self.initial_bpm, self.first_beat_offset, &self.tempo_events)?;

        let mut notes = self.notes;
        notes.sort_by_key(|n| (n.pulse, n.lane));
        let timings: Vec<NoteTiming> = notes
            .iter()
            .map(|n| NoteTiming {
                time: tempo.pulse_to_time(n.pulse as f64),
                end_time: tempo.pulse_to_time(n.end_pulse() as f64),
            })
            .collect();

        let playable_lanes = self.playable_lanes;
        let lane_count = notes
            .iter()
            .map(|n| n.lane + 1)
            .max()
            .unwrap_or(0)
            .max(playable_lanes);
        let playable_note_count = notes.iter().filter(|n| n.lane < playable_lanes).count();
        let pulses_per_scan = PULSES_PER_BEAT * self.beats_per_scan;
        let last_pulse = notes.iter().map(Note::end_pulse).max().unwrap_or(0);
        let last_scan = last_pulse.div_euclid(pulses_per_scan);
        let start_time = tempo.pulse_to_time(0.0);
        let end_time = timings
            .iter()
            .map(|t| t.end_time)
            .fold(start_time, f64::max);

        info!(
            "Prepared pattern '{}': {} notes ({} playable) across {} lanes, {} scans.",
            self.title,
            notes.len(),
            playable_note_count,
            lane_count,
            last_scan + 1
        );

        Ok(PreparedPattern {
            title: self.title,
            beats_per_scan: self.beats_per_scan,
            playable_lanes,
            lane_count,
            video_offset: self.video_offset,
            tempo,
            notes,
            timings,
            playable_note_count,
            last_scan,
            end_time,
            start_time,
        })
    }
}

impl PreparedPattern {
    #[inline(always)]
    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    #[inline(always)]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    #[inline(always)]
    pub fn note(&self, id: NoteId) -> &Note {
        &self.notes[id]
    }

    #[inline(always)]
    pub fn timing(&self, id: NoteId) -> NoteTiming {
        self.timings[id]
    }

    #[inline(always)]
    pub fn is_playable(&self, id: NoteId) -> bool {
        self.notes[id].lane < self.playable_lanes
    }

    #[inline(always)]
    pub fn pulses_per_scan(&self) -> i32 {
        PULSES_PER_BEAT * self.beats_per_scan
    }

    pub fn playable_note_count(&self) -> usize {
        self.playable_note_count
    }

    pub fn first_scan(&self) -> i32 {
        0
    }

    pub fn last_scan(&self) -> i32 {
        self.last_scan
    }

    /// Time of the last note's end (or of pulse 0 for an empty pattern).
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn length_seconds(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    pub fn scan_start_pulse(&self, scan: i32) -> i32 {
        scan.saturating_mul(self.pulses_per_scan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::note::DragNode;

    fn basic(pulse: i32, lane: usize) -> Note {
        Note::new(pulse, lane, NoteKind::Basic)
    }

    #[test]
    fn prepare_sorts_notes_and_resolves_times() {
        let pattern = Pattern {
            notes: vec![basic(480, 1), basic(0, 2), basic(480, 0), basic(240, 5)],
            ..Pattern::default()
        };
        let prepared = pattern.prepare().expect("valid pattern");
        let order: Vec<(i32, usize)> = prepared.notes().iter().map(|n| (n.pulse, n.lane)).collect();
        assert_eq!(order, vec![(0, 2), (240, 5), (480, 0), (480, 1)]);
        assert!((prepared.timing(2).time - 1.0).abs() < 1e-9, "120 BPM, two beats in");
        assert_eq!(prepared.lane_count, 6, "hidden lane 5 widens the lane count");
        assert_eq!(prepared.playable_note_count(), 3, "lane 5 is hidden");
        assert!(!prepared.is_playable(1));
    }

    #[test]
    fn last_scan_covers_note_ends() {
        let pattern = Pattern {
            notes: vec![Note::new(860, 0, NoteKind::Hold { duration: 100 })],
            ..Pattern::default()
        };
        let prepared = pattern.prepare().expect("valid pattern");
        // 960 pulses per scan: the hold ends exactly on scan 1.
        assert_eq!(prepared.last_scan(), 1);
        assert!((prepared.end_time() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_malformed_notes() {
        let negative = Pattern { notes: vec![basic(-1, 0)], ..Pattern::default() };
        assert!(matches!(negative.prepare(), Err(PatternError::NegativeNotePulse { .. })));

        let hold = Pattern {
            notes: vec![Note::new(0, 0, NoteKind::Hold { duration: 0 })],
            ..Pattern::default()
        };
        assert!(matches!(hold.prepare(), Err(PatternError::InvalidDuration { index: 0 })));

        let drag = Pattern {
            notes: vec![Note::new(
                0,
                0,
                NoteKind::Drag {
                    nodes: vec![DragNode { pulse: 0, lane: 0.0 }, DragNode { pulse: 0, lane: 1.0 }],
                },
            )],
            ..Pattern::default()
        };
        assert!(matches!(drag.prepare(), Err(PatternError::InvalidDragCurve { index: 0 })));

        let lanes = Pattern { playable_lanes: 0, ..Pattern::default() };
        assert!(matches!(lanes.prepare(), Err(PatternError::NoPlayableLanes)));

        let tempo = Pattern { initial_bpm: -10.0, ..Pattern::default() };
        assert!(matches!(tempo.prepare(), Err(PatternError::InvalidBpm { .. })));
    }

    #[test]
    fn parses_json_pattern() {
        let json = r#"{
            "title": "demo",
            "initialBpm": 150,
            "tempoEvents": [{"type": "stop", "pulse": 960, "durationPulses": 240}],
            "notes": [
                {"pulse": 0, "lane": 0, "type": "Basic", "sound": "a.wav"},
                {"pulse": 240, "lane": 1, "type": "Drag", "nodes": [{"pulse": 0}, {"pulse": 240, "lane": 1}]}
            ]
        }"#;
        let pattern = Pattern::from_json(json).expect("pattern json");
        assert_eq!(pattern.beats_per_scan, 4, "defaults fill missing fields");
        assert_eq!(pattern.tempo_events.len(), 1);
        let prepared = pattern.prepare().expect("valid pattern");
        assert_eq!(prepared.notes()[1].end_pulse(), 480);
    }
}
