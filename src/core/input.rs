use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;

/// Logical key identifier. Printable keys use their uppercase code point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u32);

impl KeyId {
    #[inline(always)]
    pub fn from_char(c: char) -> Self {
        Self(c.to_ascii_uppercase() as u32)
    }
}

impl FromStr for KeyId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Self::from_char(c)),
            (Some(_), Some(_)) => s.parse::<u32>().map(Self).map_err(|_| ()),
            _ => Err(()),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match char::from_u32(self.0) {
            Some(c) if c.is_ascii_graphic() && !c.is_ascii_digit() => write!(f, "{c}"),
            _ => write!(f, "{}", self.0),
        }
    }
}

/// Raw per-tick input, as delivered by the platform layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    PointerDown { id: u32, pos: [f32; 2] },
    /// Also sent once per tick for every contact still held.
    PointerMove { id: u32, pos: [f32; 2] },
    PointerUp { id: u32 },
    KeyDown(KeyId),
    /// Sent once per tick for every key still held.
    KeyHeld(KeyId),
    KeyUp(KeyId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ControlScheme {
    #[default]
    Touch,
    Keys,
    /// Mouse for instantaneous notes, keyboard for sustained ones.
    KM,
}

impl ControlScheme {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Touch => "Touch",
            Self::Keys => "Keys",
            Self::KM => "KM",
        }
    }
}

impl FromStr for ControlScheme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "touch" => Ok(Self::Touch),
            "keys" | "keyboard" => Ok(Self::Keys),
            "km" | "hybrid" => Ok(Self::KM),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ControlScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lane to key-set bindings for the key-only scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBindings {
    lanes: Vec<Vec<KeyId>>,
    lookup: FxHashMap<KeyId, usize>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new(vec![
            "QWERTYUIOP".chars().map(KeyId::from_char).collect(),
            "ASDFGHJKL".chars().map(KeyId::from_char).collect(),
            "ZXCVBNM".chars().map(KeyId::from_char).collect(),
            "1234567890".chars().map(KeyId::from_char).collect(),
        ])
    }
}

impl KeyBindings {
    /// A key bound to several lanes keeps its first binding.
    pub fn new(lanes: Vec<Vec<KeyId>>) -> Self {
        let mut lookup = FxHashMap::default();
        for (lane, keys) in lanes.iter().enumerate() {
            for key in keys {
                lookup.entry(*key).or_insert(lane);
            }
        }
        Self { lanes, lookup }
    }

    #[inline(always)]
    pub fn lane_for(&self, key: KeyId) -> Option<usize> {
        self.lookup.get(&key).copied()
    }

    pub fn keys_for(&self, lane: usize) -> &[KeyId] {
        self.lanes.get(lane).map_or(&[], Vec::as_slice)
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}

/// Where a screen position falls on the note field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldPoint {
    pub scan: i32,
    pub pulse: f64,
    pub lane: usize,
    // Fractional lane coordinate, for curve hit-tests.
    pub lane_pos: f32,
}

/// Screen geometry of the note field. The top half shows the even scan and
/// the bottom half the odd scan of the current pair; each half is divided
/// into one row per playable lane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldLayout {
    pub width: f32,
    pub height: f32,
    pub playable_lanes: usize,
    pub pulses_per_scan: i32,
}

impl FieldLayout {
    #[inline(always)]
    fn row_height(&self) -> f32 {
        self.height * 0.5 / self.playable_lanes.max(1) as f32
    }

    // The scan shown in a half while `current_scan` is playing.
    #[inline(always)]
    fn scan_in_half(current_scan: i32, bottom: bool) -> i32 {
        let parity = i32::from(bottom);
        if current_scan.rem_euclid(2) == parity { current_scan } else { current_scan + 1 }
    }

    pub fn locate(&self, pos: [f32; 2], current_scan: i32) -> Option<FieldPoint> {
        let [x, y] = pos;
        if !(0.0..self.width).contains(&x) || !(0.0..self.height).contains(&y) {
            return None;
        }
        let half = self.height * 0.5;
        let bottom = y >= half;
        let local_y = if bottom { y - half } else { y };
        let lane_pos = local_y / self.row_height();
        let lane = (lane_pos as usize).min(self.playable_lanes.saturating_sub(1));
        let scan = Self::scan_in_half(current_scan, bottom);
        let pulse = (scan as f64 + (x / self.width) as f64) * self.pulses_per_scan as f64;
        Some(FieldPoint { scan, pulse, lane, lane_pos: lane_pos - 0.5 })
    }

    /// Screen position of the centre of `lane` at `pulse`, if its scan is on screen.
    pub fn position_of(&self, pulse: f64, lane: f32, current_scan: i32) -> Option<[f32; 2]> {
        let pps = self.pulses_per_scan as f64;
        let scan = (pulse / pps).floor() as i32;
        let bottom = scan.rem_euclid(2) == 1;
        if Self::scan_in_half(current_scan, bottom) != scan {
            return None;
        }
        let x = ((pulse - scan as f64 * pps) / pps) as f32 * self.width;
        let half_top = if bottom { self.height * 0.5 } else { 0.0 };
        let y = (lane + 0.5).mul_add(self.row_height(), half_top);
        Some([x, y])
    }
}
