use std::sync::Arc;

use lanebeat::config::CONFIG_PATH;
use lanebeat::game::judgment::Judgement;
use lanebeat::{Engine, EngineConfig, Modifiers, NullAudio, Pattern, PlayMode, Ruleset};

const FRAME_SECONDS: f64 = 1.0 / 60.0;
// Runs past the pattern end before giving up on an outcome.
const OVERRUN_SECONDS: f64 = 10.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    log::set_max_level(log::LevelFilter::Warn);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(pattern_path) = args.first() else {
        return Err("usage: lanebeat <pattern.json> [ruleset.json] [config.ini]".into());
    };
    let mut config = EngineConfig::load(args.get(2).map_or(CONFIG_PATH, String::as_str))?;
    log::set_max_level(config.log_level.as_level_filter());
    config.modifiers |= Modifiers::AUTO_PLAY;

    let ruleset = match args.get(1) {
        Some(path) => Ruleset::load(path)?,
        None => Ruleset::default(),
    };
    let pattern = Pattern::load(pattern_path)?.prepare()?;
    let mut engine = Engine::new(
        Arc::new(pattern),
        Arc::new(ruleset),
        &config,
        PlayMode::Normal,
        NullAudio::default(),
    )?;

    let budget = engine.pattern().end_time() - engine.clock().base_time() + OVERRUN_SECONDS;
    let max_frames = (budget / FRAME_SECONDS).ceil().max(1.0) as u64;
    let mut frame = engine.tick(0.0, &[]);
    for _ in 0..max_frames {
        if frame.outcome.is_some() {
            break;
        }
        frame = engine.tick(FRAME_SECONDS, &[]);
    }

    let meters = &frame.projection.meters;
    match frame.outcome {
        Some(outcome) => println!("{}: {outcome:?}", engine.pattern().title),
        None => log::warn!("No outcome after {max_frames} frames."),
    }
    println!("Score: {}  Max combo: {}  HP: {}/{}", meters.score, meters.max_combo, meters.hp, meters.max_hp);
    for judgement in Judgement::ALL {
        println!("  {:<11} {}", judgement.as_str(), meters.tallies.get(judgement));
    }
    Ok(())
}
