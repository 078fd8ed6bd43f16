use crate::game::timing::{TempoMap, pulse_to_beat};

/// Fraction of a scan before its end at which the next scan is announced.
pub const SCAN_LOOKAHEAD_FRACTION: f64 = 0.125;

/// Edge-triggered scan events produced by one advance.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClockStep {
    pub scan_changed: Option<i32>,
    pub about_to_change: Option<i32>,
}

/// Real-time driver. `base_time = (real_elapsed + initial_time) * speed`;
/// pulse and scan are derived from it through the tempo map.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    real_elapsed: f64,
    initial_time: f64,
    speed: f64,
    paused: bool,
    base_time: f64,
    pulse: f64,
    scan: i32,
    announced_scan: i32,
    pulses_per_scan: i32,
}

impl PlaybackClock {
    pub fn new(start_time: f64, pulses_per_scan: i32, tempo: &TempoMap) -> Self {
        let mut clock = Self {
            real_elapsed: 0.0,
            initial_time: start_time,
            speed: 1.0,
            paused: false,
            base_time: start_time,
            pulse: 0.0,
            scan: 0,
            announced_scan: 0,
            pulses_per_scan: pulses_per_scan.max(1),
        };
        clock.resync(tempo);
        clock
    }

    #[inline(always)]
    pub fn base_time(&self) -> f64 {
        self.base_time
    }

    #[inline(always)]
    pub fn pulse(&self) -> f64 {
        self.pulse
    }

    #[inline(always)]
    pub fn beat(&self) -> f64 {
        pulse_to_beat(self.pulse)
    }

    #[inline(always)]
    pub fn scan(&self) -> i32 {
        self.scan
    }

    #[inline(always)]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    #[inline(always)]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline(always)]
    fn scan_of(&self, pulse: f64) -> i32 {
        (pulse / self.pulses_per_scan as f64).floor() as i32
    }

    fn recompute(&mut self, tempo: &TempoMap) {
        self.base_time = (self.real_elapsed + self.initial_time) * self.speed;
        self.pulse = tempo.time_to_pulse(self.base_time);
    }

    // Re-derive everything without emitting scan events.
    fn resync(&mut self, tempo: &TempoMap) {
        self.recompute(tempo);
        self.scan = self.scan_of(self.pulse);
        self.announced_scan = self.scan;
    }

    pub fn advance(&mut self, real_delta_s: f64, tempo: &TempoMap) -> ClockStep {
        let mut step = ClockStep::default();
        if self.paused || !real_delta_s.is_finite() || real_delta_s <= 0.0 {
            return step;
        }
        self.real_elapsed += real_delta_s;
        self.recompute(tempo);

        let new_scan = self.scan_of(self.pulse);
        if new_scan > self.scan {
            self.scan = new_scan;
            step.scan_changed = Some(new_scan);
        }
        let next = self.scan + 1;
        let pps = self.pulses_per_scan as f64;
        let threshold = (next as f64).mul_add(pps, -pps * SCAN_LOOKAHEAD_FRACTION);
        if self.announced_scan < next && self.pulse >= threshold {
            self.announced_scan = next;
            step.about_to_change = Some(next);
        }
        step
    }

    /// Move the time origin so that `base_time` equals `time` right now.
    pub fn jump_to_time(&mut self, time: f64, tempo: &TempoMap) {
        self.initial_time = time / self.speed - self.real_elapsed;
        self.resync(tempo);
    }

    /// Change the real-to-base ratio keeping `base_time` continuous.
    pub fn set_speed(&mut self, speed: f64, tempo: &TempoMap) {
        if !speed.is_finite() || speed <= 0.0 {
            return;
        }
        let base = self.base_time;
        self.initial_time = base / speed - self.real_elapsed;
        self.speed = speed;
        self.recompute(tempo);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempo() -> TempoMap {
        TempoMap::new(120.0, 0.0, &[]).expect("valid tempo")
    }

    #[test]
    fn advances_with_real_time() {
        let t = tempo();
        let mut c = PlaybackClock::new(0.0, 960, &t);
        c.advance(0.5, &t);
        assert!((c.pulse() - 240.0).abs() < 1e-9);
        assert!((c.beat() - 1.0).abs() < 1e-9);
        assert_eq!(c.scan(), 0);
    }

    #[test]
    fn lead_in_starts_before_zero() {
        let t = tempo();
        let c = PlaybackClock::new(-2.0, 960, &t);
        assert_eq!(c.scan(), -1);
        assert!((c.pulse() + 960.0).abs() < 1e-9);
    }

    #[test]
    fn scan_events_are_edge_triggered_once() {
        let t = tempo();
        let mut c = PlaybackClock::new(0.0, 960, &t);
        // 960 pulses = 2s; announce at 840 pulses = 1.75s.
        assert_eq!(c.advance(1.7, &t), ClockStep::default());
        let step = c.advance(0.1, &t);
        assert_eq!(step.about_to_change, Some(1));
        assert_eq!(step.scan_changed, None);
        assert_eq!(c.advance(0.1, &t).about_to_change, None, "fires once");
        let step = c.advance(0.2, &t);
        assert_eq!(step.scan_changed, Some(1));
        assert_eq!(c.advance(0.01, &t).scan_changed, None);
    }

    #[test]
    fn coalesced_ticks_fire_once() {
        let t = tempo();
        let mut c = PlaybackClock::new(0.0, 960, &t);
        let step = c.advance(5.0, &t);
        assert_eq!(step.scan_changed, Some(2), "skipped straight to scan 2");
        assert_eq!(step.about_to_change, None, "scan 3 not yet close");
    }

    #[test]
    fn speed_change_keeps_pulse_continuous() {
        let t = tempo();
        let mut c = PlaybackClock::new(0.0, 960, &t);
        c.advance(1.0, &t);
        let before = c.pulse();
        c.set_speed(1.5, &t);
        assert!((c.pulse() - before).abs() < 1e-9, "no jump at the change");
        c.advance(1.0, &t);
        // 1.5s of music per real second at 480 pulses per second.
        assert!((c.pulse() - before - 720.0).abs() < 1e-6);
    }

    #[test]
    fn jump_and_pause() {
        let t = tempo();
        let mut c = PlaybackClock::new(0.0, 960, &t);
        c.set_speed(2.0, &t);
        c.jump_to_time(10.0, &t);
        assert!((c.base_time() - 10.0).abs() < 1e-9);
        assert_eq!(c.scan(), 5);
        c.pause();
        assert_eq!(c.advance(1.0, &t), ClockStep::default());
        assert!((c.base_time() - 10.0).abs() < 1e-9, "paused clock is frozen");
        c.resume();
        c.advance(0.5, &t);
        assert!((c.base_time() - 11.0).abs() < 1e-9);
    }
}
