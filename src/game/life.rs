use log::info;

/// HP bounded to `[0, max_hp]`. Reaching 0 fails the stage unless no-fail
/// is set, in which case HP simply stays at 0 until it is regained.
#[derive(Debug, Clone, PartialEq)]
pub struct LifeMeter {
    hp: i32,
    max_hp: i32,
    fail_time: Option<f64>,
}

impl LifeMeter {
    pub fn new(max_hp: i32) -> Self {
        let max_hp = max_hp.max(1);
        Self { hp: max_hp, max_hp, fail_time: None }
    }

    #[inline(always)]
    pub fn hp(&self) -> i32 {
        self.hp
    }

    #[inline(always)]
    pub fn max_hp(&self) -> i32 {
        self.max_hp
    }

    #[inline(always)]
    pub fn is_failed(&self) -> bool {
        self.fail_time.is_some()
    }

    /// Returns true on the change that fails the stage.
    pub fn apply(&mut self, delta: i32, current_time: f64, no_fail: bool) -> bool {
        if self.is_failed() {
            self.hp = 0;
            return false;
        }
        self.hp = self.hp.saturating_add(delta).clamp(0, self.max_hp);
        if self.hp == 0 && !no_fail {
            self.fail_time = Some(current_time);
            info!("Player has failed!");
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.hp = self.max_hp;
        self.fail_time = None;
    }
}
