//! Runtime core of a lane-based rhythm game: tempo mapping, note queues,
//! judgement, input routing, meters and a practice-capable playback clock,
//! all advanced by one `Engine::tick` per frame.

pub mod config;
pub mod core;
pub mod game;

pub use crate::config::{EngineConfig, Modifiers};
pub use crate::core::audio::{AudioSink, NullAudio};
pub use crate::core::events::EngineEvent;
pub use crate::core::input::{ControlScheme, InputEvent};
pub use crate::game::gameplay::{Engine, FrameResult, PlayMode, SessionError, StageOutcome};
pub use crate::game::pattern::{Pattern, PreparedPattern};
pub use crate::game::ruleset::Ruleset;
