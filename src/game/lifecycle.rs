use log::debug;
use smallvec::SmallVec;

use crate::core::audio::SoundHandle;
use crate::game::judgment::Judgement;
use crate::game::note::NoteId;
use crate::game::timing::{TimingProfile, classify_offset_s};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoteState {
    NotYetDue,
    Ongoing,
    Resolved(Judgement),
}

/// A duration-bearing note between its hit and its resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct OngoingNote {
    pub id: NoteId,
    pub lane: usize,
    // Banked at the initiating hit; the final judgement unless grace expires.
    pub judgement: Judgement,
    pub touched: bool,
    pub last_touch_time: f64,
    pub sound: Option<SoundHandle>,
    pub next_combo_tick_pulse: i32,
}

/// Per-note numbers the reconciliation pass needs, supplied by the caller.
#[derive(Copy, Clone, Debug)]
pub struct OngoingLimits {
    // End time with input latency already added.
    pub end_time: f64,
    pub grace_period_s: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub note: OngoingNote,
    pub judgement: Judgement,
    pub early: bool,
}

/// Latency-compensated, speed-normalized offset of an input from a note.
#[inline(always)]
pub fn hit_offset_s(now: f64, note_time: f64, latency_s: f64, speed: f64) -> f64 {
    let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
    (now - note_time - latency_s) / speed
}

/// Judgement an input at `now` would earn, or `None` outside the Miss window.
#[inline(always)]
pub fn evaluate_hit(
    now: f64,
    note_time: f64,
    latency_s: f64,
    speed: f64,
    profile: &TimingProfile,
) -> Option<Judgement> {
    classify_offset_s(hit_offset_s(now, note_time, latency_s, speed), profile)
}

/// True once a note can no longer be hit and must Break.
#[inline(always)]
pub fn is_overdue(now: f64, note_time: f64, latency_s: f64, speed: f64, profile: &TimingProfile) -> bool {
    let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
    now > profile.miss_window_s().mul_add(speed, note_time + latency_s)
}

/// Lifecycle tags for every note of a pattern plus the Ongoing set.
#[derive(Debug, Clone, Default)]
pub struct NoteLifecycle {
    states: Vec<NoteState>,
    ongoing: Vec<OngoingNote>,
}

impl NoteLifecycle {
    pub fn new(note_count: usize) -> Self {
        Self { states: vec![NoteState::NotYetDue; note_count], ongoing: Vec::new() }
    }

    pub fn reset(&mut self) {
        self.states.fill(NoteState::NotYetDue);
        self.ongoing.clear();
    }

    #[inline(always)]
    pub fn state(&self, id: NoteId) -> NoteState {
        self.states.get(id).copied().unwrap_or(NoteState::NotYetDue)
    }

    pub fn ongoing(&self) -> &[OngoingNote] {
        &self.ongoing
    }

    pub fn ongoing_in_lane(&self, lane: usize) -> impl Iterator<Item = &OngoingNote> + '_ {
        self.ongoing.iter().filter(move |o| o.lane == lane)
    }

    /// Record a final judgement. Returns false if the note already had one.
    pub fn resolve(&mut self, id: NoteId, judgement: Judgement) -> bool {
        let Some(state) = self.states.get_mut(id) else {
            return false;
        };
        if matches!(state, NoteState::Resolved(_)) {
            debug_assert!(false, "note {id} resolved twice");
            return false;
        }
        *state = NoteState::Resolved(judgement);
        self.ongoing.retain(|o| o.id != id);
        true
    }

    pub fn begin_ongoing(&mut self, note: OngoingNote) {
        if let Some(state) = self.states.get_mut(note.id) {
            *state = NoteState::Ongoing;
            self.ongoing.push(note);
        }
    }

    pub fn clear_touched(&mut self) {
        for o in &mut self.ongoing {
            o.touched = false;
        }
    }

    pub fn touch(&mut self, id: NoteId, now: f64) -> bool {
        let Some(o) = self.ongoing.iter_mut().find(|o| o.id == id) else {
            return false;
        };
        o.touched = true;
        o.last_touch_time = now;
        true
    }

    pub fn touch_all(&mut self, now: f64, mut filter: impl FnMut(&OngoingNote) -> bool) {
        for o in self.ongoing.iter_mut().filter(|o| filter(o)) {
            o.touched = true;
            o.last_touch_time = now;
        }
    }

    /// Count combo ticks that elapsed up to `pulse` across all Ongoing notes.
    pub fn collect_combo_ticks(
        &mut self,
        pulse: f64,
        interval: i32,
        mut end_pulse_of: impl FnMut(NoteId) -> i32,
    ) -> u32 {
        let interval = interval.max(1);
        let mut ticks = 0u32;
        for o in &mut self.ongoing {
            let end = end_pulse_of(o.id);
            while o.next_combo_tick_pulse < end && pulse >= o.next_combo_tick_pulse as f64 {
                ticks = ticks.saturating_add(1);
                o.next_combo_tick_pulse = o.next_combo_tick_pulse.saturating_add(interval);
            }
        }
        ticks
    }

    /// Resolve Ongoing notes that reached their end or outlived their grace
    /// period without a touch this tick.
    pub fn reconcile(
        &mut self,
        now: f64,
        mut limits_of: impl FnMut(NoteId) -> OngoingLimits,
    ) -> SmallVec<[Completion; 4]> {
        let mut done: SmallVec<[Completion; 4]> = SmallVec::new();
        let mut i = 0;
        while i < self.ongoing.len() {
            let o = &self.ongoing[i];
            let limits = limits_of(o.id);
            let outcome = if now >= limits.end_time {
                Some((o.judgement, false))
            } else if !o.touched && now - o.last_touch_time > limits.grace_period_s {
                debug!("GRACE MISS: note {} idle for {:.3}s", o.id, now - o.last_touch_time);
                Some((Judgement::Miss, true))
            } else {
                None
            };
            match outcome {
                Some((judgement, early)) => {
                    let note = self.ongoing.remove(i);
                    if let Some(state) = self.states.get_mut(note.id) {
                        *state = NoteState::Resolved(judgement);
                    }
                    done.push(Completion { note, judgement, early });
                }
                None => i += 1,
            }
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ongoing(id: NoteId, at: f64) -> OngoingNote {
        OngoingNote {
            id,
            lane: 0,
            judgement: Judgement::Cool,
            touched: true,
            last_touch_time: at,
            sound: None,
            next_combo_tick_pulse: 60,
        }
    }

    fn limits(end_time: f64) -> OngoingLimits {
        OngoingLimits { end_time, grace_period_s: 0.15 }
    }

    #[test]
    fn hit_offset_uses_latency_and_speed() {
        let profile = TimingProfile::default();
        assert_eq!(evaluate_hit(1.0, 1.0, 0.0, 1.0, &profile), Some(Judgement::RainbowMax));
        // 0.1s late at 2x speed normalizes to 0.05s.
        assert_eq!(evaluate_hit(1.1, 1.0, 0.0, 2.0, &profile), Some(Judgement::Max));
        // Latency shifts the target.
        assert_eq!(evaluate_hit(1.05, 1.0, 0.05, 1.0, &profile), Some(Judgement::RainbowMax));
        assert_eq!(evaluate_hit(1.5, 1.0, 0.0, 1.0, &profile), None);
    }

    #[test]
    fn overdue_scales_with_speed() {
        let profile = TimingProfile::default();
        assert!(!is_overdue(1.2, 1.0, 0.0, 1.0, &profile), "exactly on the Miss bound");
        assert!(is_overdue(1.21, 1.0, 0.0, 1.0, &profile));
        assert!(!is_overdue(1.3, 1.0, 0.0, 2.0, &profile), "doubled window at 2x");
    }

    #[test]
    fn natural_end_keeps_banked_judgement() {
        let mut lc = NoteLifecycle::new(2);
        lc.begin_ongoing(ongoing(1, 0.0));
        assert_eq!(lc.state(1), NoteState::Ongoing);
        let done = lc.reconcile(0.1, |_| limits(0.5));
        assert!(done.is_empty(), "touched and not yet ended");
        let done = lc.reconcile(0.5, |_| limits(0.5));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].judgement, Judgement::Cool);
        assert!(!done[0].early);
        assert_eq!(lc.state(1), NoteState::Resolved(Judgement::Cool));
        assert!(lc.ongoing().is_empty());
    }

    #[test]
    fn grace_expiry_resolves_as_early_miss() {
        let mut lc = NoteLifecycle::new(1);
        lc.begin_ongoing(ongoing(0, 0.0));
        lc.clear_touched();
        assert!(lc.reconcile(0.15, |_| limits(1.0)).is_empty(), "grace not yet exceeded");
        lc.clear_touched();
        let done = lc.reconcile(0.2, |_| limits(1.0));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].judgement, Judgement::Miss);
        assert!(done[0].early);
    }

    #[test]
    fn touch_refreshes_grace() {
        let mut lc = NoteLifecycle::new(1);
        lc.begin_ongoing(ongoing(0, 0.0));
        lc.clear_touched();
        assert!(lc.touch(0, 0.3));
        lc.clear_touched();
        assert!(lc.reconcile(0.4, |_| limits(1.0)).is_empty(), "last touch at 0.3");
    }

    #[test]
    fn combo_ticks_stop_before_end() {
        let mut lc = NoteLifecycle::new(1);
        lc.begin_ongoing(ongoing(0, 0.0));
        assert_eq!(lc.collect_combo_ticks(59.0, 60, |_| 240), 0);
        assert_eq!(lc.collect_combo_ticks(130.0, 60, |_| 240), 2, "ticks at 60 and 120");
        assert_eq!(lc.collect_combo_ticks(1000.0, 60, |_| 240), 1, "only 180 remains before 240");
    }
}
