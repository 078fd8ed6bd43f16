use serde::{Deserialize, Serialize};

use crate::game::judgment::Judgement;
use crate::game::pattern::PatternError;

pub const PULSES_PER_BEAT: i32 = 240;

// ------------------ Judgement Windows ------------------
// All windows are in seconds, measured against latency-compensated offsets.
pub const BASE_RAINBOW_MAX_S: f64 = 0.040;
pub const BASE_MAX_S: f64 = 0.070;
pub const BASE_COOL_S: f64 = 0.100;
pub const BASE_GOOD_S: f64 = 0.150;
pub const BASE_MISS_S: f64 = 0.200;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingProfile {
    // RainbowMax, Max, Cool, Good, Miss.
    pub windows_s: [f64; 5],
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            windows_s: [BASE_RAINBOW_MAX_S, BASE_MAX_S, BASE_COOL_S, BASE_GOOD_S, BASE_MISS_S],
        }
    }
}

impl TimingProfile {
    #[inline(always)]
    pub fn miss_window_s(&self) -> f64 {
        self.windows_s[4]
    }

    #[inline(always)]
    pub fn window_s(&self, judgement: Judgement) -> f64 {
        match judgement {
            Judgement::RainbowMax => self.windows_s[0],
            Judgement::Max => self.windows_s[1],
            Judgement::Cool => self.windows_s[2],
            Judgement::Good => self.windows_s[3],
            Judgement::Miss | Judgement::Break => self.windows_s[4],
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.windows_s.iter().all(|w| w.is_finite() && *w > 0.0)
            && self.windows_s.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Classify an absolute, speed-normalized offset (seconds) into the first
/// judgement whose window contains it.
///
/// Returns `None` when the offset lies outside the Miss window: such a note
/// is not hit at all and is left for the auto-Break pass.
#[inline(always)]
pub fn classify_offset_s(offset_s: f64, profile: &TimingProfile) -> Option<Judgement> {
    let abs = offset_s.abs();
    let w = profile.windows_s;
    if abs <= w[0] {
        Some(Judgement::RainbowMax)
    } else if abs <= w[1] {
        Some(Judgement::Max)
    } else if abs <= w[2] {
        Some(Judgement::Cool)
    } else if abs <= w[3] {
        Some(Judgement::Good)
    } else if abs <= w[4] {
        Some(Judgement::Miss)
    } else {
        None
    }
}

#[inline(always)]
pub fn pulse_to_beat(pulse: f64) -> f64 {
    pulse / PULSES_PER_BEAT as f64
}

#[inline(always)]
fn seconds_per_pulse(bpm: f64) -> f64 {
    60.0 / (bpm * PULSES_PER_BEAT as f64)
}

// ------------------ Tempo Map ------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TempoEvent {
    #[serde(rename_all = "camelCase")]
    Bpm { pulse: i32, bpm: f64 },
    /// Time is held while `duration_pulses` elapse.
    #[serde(rename_all = "camelCase")]
    Stop { pulse: i32, duration_pulses: i32 },
}

impl TempoEvent {
    #[inline(always)]
    pub const fn pulse(&self) -> i32 {
        match self {
            Self::Bpm { pulse, .. } | Self::Stop { pulse, .. } => *pulse,
        }
    }

    // Tempo changes sort ahead of stops on the same pulse.
    const fn order_key(&self) -> (i32, u8) {
        match self {
            Self::Bpm { pulse, .. } => (*pulse, 0),
            Self::Stop { pulse, .. } => (*pulse, 1),
        }
    }
}

/// One piece of the piecewise pulse/time function. A segment with a zero
/// `seconds_per_pulse` is a stop: every pulse inside it maps to `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoSegment {
    pulse: i32,
    time: f64,
    seconds_per_pulse: f64,
}

impl TempoSegment {
    #[inline(always)]
    fn is_stop(&self) -> bool {
        self.seconds_per_pulse <= 0.0
    }
}

#[derive(Debug, Clone)]
pub struct TempoMap {
    segments: Vec<TempoSegment>,
    // Rate used to extrapolate before pulse 0 (lead-in).
    lead_seconds_per_pulse: f64,
}

impl TempoMap {
    pub fn new(
        initial_bpm: f64,
        first_beat_offset_s: f64,
        events: &[TempoEvent],
    ) -> Result<Self, PatternError> {
        if !initial_bpm.is_finite() || initial_bpm <= 0.0 {
            return Err(PatternError::InvalidBpm { pulse: 0, bpm: initial_bpm });
        }
        let mut sorted = events.to_vec();
        sorted.sort_by_key(TempoEvent::order_key);

        let mut segments = vec![TempoSegment {
            pulse: 0,
            time: first_beat_offset_s,
            seconds_per_pulse: seconds_per_pulse(initial_bpm),
        }];
        let mut last_bpm_pulse: Option<i32> = None;
        let mut last_stop_end = i32::MIN;

        for event in sorted {
            if event.pulse() < 0 {
                return Err(PatternError::NegativeTempoPulse(event.pulse()));
            }
            // The last segment is always linear: a stop is always followed by
            // the segment that resumes after it.
            let Some(last) = segments.last().copied() else {
                continue;
            };
            match event {
                TempoEvent::Bpm { pulse, bpm } => {
                    if !bpm.is_finite() || bpm <= 0.0 {
                        return Err(PatternError::InvalidBpm { pulse, bpm });
                    }
                    if last_bpm_pulse == Some(pulse) {
                        return Err(PatternError::DuplicateTempoChange(pulse));
                    }
                    last_bpm_pulse = Some(pulse);
                    let spp = seconds_per_pulse(bpm);
                    if pulse <= last.pulse {
                        // At a segment start or inside a stop: no time has
                        // elapsed yet at the old rate.
                        if let Some(seg) = segments.last_mut() {
                            seg.seconds_per_pulse = spp;
                        }
                    } else {
                        let time = (pulse - last.pulse) as f64 * last.seconds_per_pulse + last.time;
                        segments.push(TempoSegment { pulse, time, seconds_per_pulse: spp });
                    }
                }
                TempoEvent::Stop { pulse, duration_pulses } => {
                    if duration_pulses <= 0 {
                        return Err(PatternError::InvalidStop { pulse, duration_pulses });
                    }
                    if pulse < last_stop_end {
                        return Err(PatternError::OverlappingStop(pulse));
                    }
                    let time = (pulse - last.pulse) as f64 * last.seconds_per_pulse + last.time;
                    let flat = TempoSegment { pulse, time, seconds_per_pulse: 0.0 };
                    if pulse == last.pulse {
                        if let Some(seg) = segments.last_mut() {
                            *seg = flat;
                        }
                    } else {
                        segments.push(flat);
                    }
                    let end = pulse.saturating_add(duration_pulses);
                    segments.push(TempoSegment {
                        pulse: end,
                        time,
                        seconds_per_pulse: last.seconds_per_pulse,
                    });
                    last_stop_end = end;
                }
            }
        }

        let lead_seconds_per_pulse = segments
            .iter()
            .find(|s| !s.is_stop())
            .map_or(seconds_per_pulse(initial_bpm), |s| s.seconds_per_pulse);
        Ok(Self { segments, lead_seconds_per_pulse })
    }

    #[inline(always)]
    fn first(&self) -> TempoSegment {
        self.segments[0]
    }

    pub fn pulse_to_time(&self, pulse: f64) -> f64 {
        let first = self.first();
        if pulse < first.pulse as f64 {
            return (pulse - first.pulse as f64).mul_add(self.lead_seconds_per_pulse, first.time);
        }
        let idx = self.segments.partition_point(|s| s.pulse as f64 <= pulse);
        let seg = self.segments[idx.saturating_sub(1)];
        (pulse - seg.pulse as f64).mul_add(seg.seconds_per_pulse, seg.time)
    }

    /// Inverse of [`Self::pulse_to_time`]. Inside a stop many pulses share one
    /// instant; the earliest of them is returned.
    pub fn time_to_pulse(&self, time: f64) -> f64 {
        let first = self.first();
        if time < first.time {
            return first.pulse as f64 + (time - first.time) / self.lead_seconds_per_pulse;
        }
        let idx = self.segments.partition_point(|s| s.time < time);
        if let Some(seg) = self.segments.get(idx)
            && seg.time == time
        {
            return seg.pulse as f64;
        }
        let seg = self.segments[idx.saturating_sub(1)];
        if seg.is_stop() {
            return seg.pulse as f64;
        }
        seg.pulse as f64 + (time - seg.time) / seg.seconds_per_pulse
    }

    /// True when `pulse` lies strictly inside a stop.
    pub fn is_in_stop(&self, pulse: f64) -> bool {
        let idx = self.segments.partition_point(|s| s.pulse as f64 <= pulse);
        idx > 0 && self.segments[idx - 1].is_stop() && pulse > self.segments[idx - 1].pulse as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_120() -> TempoMap {
        TempoMap::new(120.0, 0.0, &[]).expect("valid tempo")
    }

    #[test]
    fn single_tempo_is_linear() {
        let map = map_120();
        // 120 BPM: one beat every half second.
        assert!((map.pulse_to_time(240.0) - 0.5).abs() < 1e-9);
        assert!((map.pulse_to_time(960.0) - 2.0).abs() < 1e-9);
        assert!((map.time_to_pulse(1.0) - 480.0).abs() < 1e-9);
    }

    #[test]
    fn lead_in_extrapolates_before_first_pulse() {
        let map = TempoMap::new(120.0, 0.25, &[]).expect("valid tempo");
        assert!((map.pulse_to_time(0.0) - 0.25).abs() < 1e-9);
        assert!((map.pulse_to_time(-240.0) + 0.25).abs() < 1e-9);
        assert!((map.time_to_pulse(-0.25) + 240.0).abs() < 1e-9);
    }

    #[test]
    fn tempo_change_accumulates_time() {
        let map = TempoMap::new(
            120.0,
            0.0,
            &[TempoEvent::Bpm { pulse: 960, bpm: 240.0 }],
        )
        .expect("valid tempo");
        // 4 beats at 120 = 2s, then 4 beats at 240 = 1s.
        assert!((map.pulse_to_time(1920.0) - 3.0).abs() < 1e-9);
        assert!((map.time_to_pulse(2.5) - 1440.0).abs() < 1e-9);
    }

    #[test]
    fn round_trip_outside_stops() {
        let map = TempoMap::new(
            150.0,
            0.1,
            &[
                TempoEvent::Bpm { pulse: 480, bpm: 90.0 },
                TempoEvent::Stop { pulse: 1200, duration_pulses: 240 },
                TempoEvent::Bpm { pulse: 2000, bpm: 200.0 },
            ],
        )
        .expect("valid tempo");
        for p in (0..4000).step_by(7) {
            if map.is_in_stop(p as f64) {
                continue;
            }
            let back = map.time_to_pulse(map.pulse_to_time(p as f64));
            // The end of a stop maps back to its start.
            if p == 1440 {
                assert!((back - 1200.0).abs() < 1.0, "stop end maps to stop start");
                continue;
            }
            assert!((back - p as f64).abs() < 1.0, "round trip drifted at pulse {p}: {back}");
        }
    }

    #[test]
    fn stop_is_flat_and_inverse_is_earliest() {
        let map = TempoMap::new(
            120.0,
            0.0,
            &[TempoEvent::Stop { pulse: 480, duration_pulses: 240 }],
        )
        .expect("valid tempo");
        let t0 = map.pulse_to_time(480.0);
        assert!((t0 - 1.0).abs() < 1e-9);
        assert_eq!(map.pulse_to_time(600.0), t0, "time must not advance inside a stop");
        assert_eq!(map.pulse_to_time(720.0), t0, "stop end shares the stop instant");
        assert_eq!(map.time_to_pulse(t0), 480.0, "earliest pulse inside the stop");
        // Time resumes after the stop at the previous rate.
        assert!((map.pulse_to_time(960.0) - 1.5).abs() < 1e-9);
        assert!((map.time_to_pulse(1.25) - 840.0).abs() < 1e-9);
    }

    #[test]
    fn tempo_change_inside_stop_applies_after_it() {
        let map = TempoMap::new(
            120.0,
            0.0,
            &[
                TempoEvent::Stop { pulse: 240, duration_pulses: 240 },
                TempoEvent::Bpm { pulse: 360, bpm: 60.0 },
            ],
        )
        .expect("valid tempo");
        assert!((map.pulse_to_time(480.0) - 0.5).abs() < 1e-9);
        assert!((map.pulse_to_time(720.0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn stop_on_first_pulse() {
        let map = TempoMap::new(
            120.0,
            0.0,
            &[TempoEvent::Stop { pulse: 0, duration_pulses: 240 }],
        )
        .expect("valid tempo");
        assert_eq!(map.pulse_to_time(0.0), 0.0);
        assert_eq!(map.pulse_to_time(240.0), 0.0);
        assert_eq!(map.time_to_pulse(0.0), 0.0);
        assert!((map.pulse_to_time(-240.0) + 0.5).abs() < 1e-9, "lead-in keeps the tempo");
    }

    #[test]
    fn mapping_is_monotonic() {
        let map = TempoMap::new(
            180.0,
            0.0,
            &[
                TempoEvent::Stop { pulse: 300, duration_pulses: 100 },
                TempoEvent::Bpm { pulse: 700, bpm: 45.0 },
            ],
        )
        .expect("valid tempo");
        let mut prev = f64::MIN;
        for p in -100..2000 {
            let t = map.pulse_to_time(p as f64);
            assert!(t >= prev, "pulse_to_time decreased at {p}");
            prev = t;
        }
        let mut prev = f64::MIN;
        for i in -10..400 {
            let p = map.time_to_pulse(i as f64 * 0.01);
            assert!(p >= prev, "time_to_pulse decreased at step {i}");
            prev = p;
        }
    }

    #[test]
    fn rejects_degenerate_tempo() {
        assert!(TempoMap::new(0.0, 0.0, &[]).is_err(), "zero bpm");
        assert!(TempoMap::new(f64::NAN, 0.0, &[]).is_err(), "nan bpm");
        assert!(
            TempoMap::new(120.0, 0.0, &[TempoEvent::Bpm { pulse: 10, bpm: -5.0 }]).is_err(),
            "negative bpm"
        );
        assert!(
            TempoMap::new(
                120.0,
                0.0,
                &[
                    TempoEvent::Bpm { pulse: 10, bpm: 100.0 },
                    TempoEvent::Bpm { pulse: 10, bpm: 110.0 },
                ]
            )
            .is_err(),
            "duplicate pulse"
        );
        assert!(
            TempoMap::new(
                120.0,
                0.0,
                &[
                    TempoEvent::Stop { pulse: 10, duration_pulses: 100 },
                    TempoEvent::Stop { pulse: 50, duration_pulses: 10 },
                ]
            )
            .is_err(),
            "overlapping stops"
        );
    }

    #[test]
    fn classification_is_first_match_and_monotonic() {
        let profile = TimingProfile::default();
        assert_eq!(classify_offset_s(0.0, &profile), Some(Judgement::RainbowMax));
        assert_eq!(classify_offset_s(-0.05, &profile), Some(Judgement::Max));
        assert_eq!(classify_offset_s(0.1, &profile), Some(Judgement::Cool));
        assert_eq!(classify_offset_s(0.2, &profile), Some(Judgement::Miss));
        assert_eq!(classify_offset_s(0.2001, &profile), None);

        let mut prev = Judgement::RainbowMax;
        for i in 0..=200 {
            let Some(j) = classify_offset_s(i as f64 * 0.001, &profile) else {
                panic!("offset {i}ms should be inside the Miss window");
            };
            assert!(j >= prev, "judgement improved as offset grew at {i}ms");
            prev = j;
        }
    }
}
