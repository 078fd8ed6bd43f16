use bitflags::bitflags;
use ini::Ini;
use log::{LevelFilter, info, warn};
use std::path::Path;
use std::str::FromStr;

use crate::core::input::{ControlScheme, KeyBindings, KeyId};

pub const CONFIG_PATH: &str = "lanebeat.ini";

const OPTIONS: &str = "Options";
const KEY_BINDINGS: &str = "KeyBindings";
const MAX_BOUND_LANES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const NO_FAIL = 1 << 0;
        const AUTO_PLAY = 1 << 1;
        const AUTO_FEVER = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

/// Player options consumed by the engine at session start.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub control_scheme: ControlScheme,
    pub touch_latency_ms: i32,
    pub keyboard_latency_ms: i32,
    pub mouse_latency_ms: i32,
    pub lead_in_seconds: f64,
    pub modifiers: Modifiers,
    pub log_level: LogLevel,
    pub field_width: f32,
    pub field_height: f32,
    pub key_bindings: KeyBindings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_scheme: ControlScheme::Touch,
            touch_latency_ms: 0,
            keyboard_latency_ms: 0,
            mouse_latency_ms: 0,
            lead_in_seconds: 2.0,
            modifiers: Modifiers::empty(),
            log_level: LogLevel::Info,
            field_width: 1920.0,
            field_height: 1080.0,
            key_bindings: KeyBindings::default(),
        }
    }
}

fn parse_key_list(raw: &str) -> Vec<KeyId> {
    raw.split(',')
        .filter(|t| !t.trim().is_empty())
        .filter_map(|t| match KeyId::from_str(t) {
            Ok(k) => Some(k),
            Err(()) => {
                warn!("Ignoring unknown key '{}' in key bindings.", t.trim());
                None
            }
        })
        .collect()
}

fn parsed<T: FromStr>(conf: &Ini, key: &str) -> Option<T> {
    let raw = conf.get_from(Some(OPTIONS), key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Invalid value '{raw}' for {key}; using default.");
            None
        }
    }
}

fn flag(conf: &Ini, key: &str) -> Option<bool> {
    parsed::<u8>(conf, key).map(|v| v != 0)
}

impl EngineConfig {
    /// Load from `path`; a missing file yields defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}; using defaults.", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_ini_str(&text)
    }

    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let conf = Ini::load_from_str(text)?;
        let default = Self::default();

        let mut modifiers = Modifiers::empty();
        modifiers.set(Modifiers::NO_FAIL, flag(&conf, "NoFail").unwrap_or(false));
        modifiers.set(Modifiers::AUTO_PLAY, flag(&conf, "AutoPlay").unwrap_or(false));
        modifiers.set(Modifiers::AUTO_FEVER, flag(&conf, "AutoFever").unwrap_or(false));

        let key_bindings = conf.section(Some(KEY_BINDINGS)).map_or(default.key_bindings.clone(), |section| {
            let mut lanes: Vec<(usize, Vec<KeyId>)> = section
                .iter()
                .filter_map(|(k, v)| {
                    let lane = k.strip_prefix("Lane")?.parse::<usize>().ok();
                    match lane {
                        Some(lane) if lane < MAX_BOUND_LANES => Some((lane, parse_key_list(v))),
                        _ => {
                            warn!("Ignoring key binding '{k}'; lanes run from Lane0 to Lane{}.", MAX_BOUND_LANES - 1);
                            None
                        }
                    }
                })
                .collect();
            lanes.sort_by_key(|(lane, _)| *lane);
            let count = lanes.last().map_or(0, |(lane, _)| lane + 1);
            let mut out = vec![Vec::new(); count];
            for (lane, keys) in lanes {
                out[lane] = keys;
            }
            KeyBindings::new(out)
        });

        Ok(Self {
            control_scheme: parsed(&conf, "ControlScheme").unwrap_or(default.control_scheme),
            touch_latency_ms: parsed(&conf, "TouchLatencyMs").unwrap_or(default.touch_latency_ms),
            keyboard_latency_ms: parsed(&conf, "KeyboardLatencyMs")
                .unwrap_or(default.keyboard_latency_ms),
            mouse_latency_ms: parsed(&conf, "MouseLatencyMs").unwrap_or(default.mouse_latency_ms),
            lead_in_seconds: parsed::<f64>(&conf, "LeadInSeconds")
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(default.lead_in_seconds),
            modifiers,
            log_level: parsed(&conf, "LogLevel").unwrap_or(default.log_level),
            field_width: parsed::<f32>(&conf, "FieldWidth")
                .filter(|v| *v > 0.0)
                .unwrap_or(default.field_width),
            field_height: parsed::<f32>(&conf, "FieldHeight")
                .filter(|v| *v > 0.0)
                .unwrap_or(default.field_height),
            key_bindings,
        })
    }

    pub fn to_ini(&self) -> Ini {
        let mut conf = Ini::new();
        conf.with_section(Some(OPTIONS))
            .set("ControlScheme", self.control_scheme.as_str())
            .set("TouchLatencyMs", self.touch_latency_ms.to_string())
            .set("KeyboardLatencyMs", self.keyboard_latency_ms.to_string())
            .set("MouseLatencyMs", self.mouse_latency_ms.to_string())
            .set("LeadInSeconds", self.lead_in_seconds.to_string())
            .set("NoFail", u8::from(self.modifiers.contains(Modifiers::NO_FAIL)).to_string())
            .set("AutoPlay", u8::from(self.modifiers.contains(Modifiers::AUTO_PLAY)).to_string())
            .set("AutoFever", u8::from(self.modifiers.contains(Modifiers::AUTO_FEVER)).to_string())
            .set("LogLevel", self.log_level.as_str())
            .set("FieldWidth", self.field_width.to_string())
            .set("FieldHeight", self.field_height.to_string());
        for lane in 0..self.key_bindings.lane_count() {
            let keys: Vec<String> =
                self.key_bindings.keys_for(lane).iter().map(ToString::to_string).collect();
            conf.with_section(Some(KEY_BINDINGS)).set(format!("Lane{lane}"), keys.join(","));
        }
        conf
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    #[inline(always)]
    pub fn latency_s(ms: i32) -> f64 {
        f64::from(ms) / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg = EngineConfig::from_ini_str("[Options]\nControlScheme=Keys\n").expect("ini");
        assert_eq!(cfg.control_scheme, ControlScheme::Keys);
        assert_eq!(cfg.lead_in_seconds, 2.0);
        assert_eq!(cfg.key_bindings, KeyBindings::default());
    }

    #[test]
    fn malformed_values_are_ignored() {
        let cfg = EngineConfig::from_ini_str(
            "[Options]\nTouchLatencyMs=abc\nLeadInSeconds=-3\nLogLevel=loud\nNoFail=1\n",
        )
        .expect("ini");
        assert_eq!(cfg.touch_latency_ms, 0);
        assert_eq!(cfg.lead_in_seconds, 2.0);
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert!(cfg.modifiers.contains(Modifiers::NO_FAIL));
        assert!(!cfg.modifiers.contains(Modifiers::AUTO_PLAY));
    }

    #[test]
    fn key_bindings_section_replaces_defaults() {
        let cfg =
            EngineConfig::from_ini_str("[KeyBindings]\nLane1=J,K\nLane0=D,F\n").expect("ini");
        assert_eq!(cfg.key_bindings.lane_count(), 2);
        assert_eq!(cfg.key_bindings.lane_for(KeyId::from_char('f')), Some(0));
        assert_eq!(cfg.key_bindings.lane_for(KeyId::from_char('j')), Some(1));
        assert_eq!(cfg.key_bindings.lane_for(KeyId::from_char('q')), None);
    }

    #[test]
    fn out_of_range_lane_bindings_are_skipped() {
        let cfg = EngineConfig::from_ini_str(
            "[KeyBindings]\nLane0=D\nLane18446744073709551615=Q\nLane64=W\nLaneX=E\n",
        )
        .expect("ini");
        assert_eq!(cfg.key_bindings.lane_count(), 1);
        assert_eq!(cfg.key_bindings.lane_for(KeyId::from_char('d')), Some(0));
        assert_eq!(cfg.key_bindings.lane_for(KeyId::from_char('q')), None);
        assert_eq!(cfg.key_bindings.lane_for(KeyId::from_char('w')), None);
    }

    #[test]
    fn written_ini_reads_back() {
        let cfg = EngineConfig {
            control_scheme: ControlScheme::KM,
            mouse_latency_ms: 25,
            modifiers: Modifiers::AUTO_FEVER | Modifiers::NO_FAIL,
            log_level: LogLevel::Debug,
            ..EngineConfig::default()
        };
        let mut buf = Vec::new();
        cfg.to_ini().write_to(&mut buf).expect("write ini");
        let text = String::from_utf8(buf).expect("utf8");
        let back = EngineConfig::from_ini_str(&text).expect("ini");
        assert_eq!(back, cfg);
    }

    #[test]
    fn missing_file_is_default() {
        let cfg = EngineConfig::load("/nonexistent/lanebeat.ini").expect("defaults");
        assert_eq!(cfg, EngineConfig::default());
    }
}
