pub const MIN_SPEED_PERCENT: u32 = 50;
pub const MAX_SPEED_PERCENT: u32 = 200;

/// Practice-mode options: loop bounds (inclusive scans), speed and auto-play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeSettings {
    pub loop_start: Option<i32>,
    pub loop_end: Option<i32>,
    speed_percent: u32,
    pub autoplay: bool,
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self { loop_start: None, loop_end: None, speed_percent: 100, autoplay: false }
    }
}

impl PracticeSettings {
    #[inline(always)]
    pub fn speed_percent(&self) -> u32 {
        self.speed_percent
    }

    #[inline(always)]
    pub fn speed_factor(&self) -> f64 {
        f64::from(self.speed_percent) / 100.0
    }

    /// Stores the clamped value and returns it.
    pub fn set_speed_percent(&mut self, percent: u32) -> u32 {
        self.speed_percent = percent.clamp(MIN_SPEED_PERCENT, MAX_SPEED_PERCENT);
        self.speed_percent
    }

    /// Loop bounds are kept ordered; a reversed pair is swapped.
    pub fn set_loop(&mut self, start: Option<i32>, end: Option<i32>) {
        match (start, end) {
            (Some(s), Some(e)) if s > e => {
                self.loop_start = Some(e);
                self.loop_end = Some(s);
            }
            _ => {
                self.loop_start = start;
                self.loop_end = end;
            }
        }
    }

    /// Scan to jump to when playback enters `scan`, if any.
    pub fn loop_target(&self, scan: i32, first_scan: i32, last_scan: i32) -> Option<i32> {
        let start = self.loop_start.unwrap_or(first_scan).max(first_scan);
        if let Some(end) = self.loop_end
            && scan > end
        {
            return Some(start);
        }
        if scan > last_scan {
            return Some(first_scan);
        }
        None
    }
}
