use std::sync::Arc;

use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::config::{EngineConfig, Modifiers};
use crate::core::audio::{AudioSink, SoundCue, SoundHandle};
use crate::core::events::{EngineEvent, EventDispatcher, SubscriptionId};
use crate::core::input::{ControlScheme, FieldLayout, InputEvent, KeyBindings};
use crate::game::clock::PlaybackClock;
use crate::game::fever::FeverState;
use crate::game::judgment::Judgement;
use crate::game::lanes::{LaneQueues, QueueView};
use crate::game::lifecycle::{
    NoteLifecycle, NoteState, OngoingLimits, OngoingNote, evaluate_hit, is_overdue,
};
use crate::game::note::NoteId;
use crate::game::pattern::PreparedPattern;
use crate::game::practice::PracticeSettings;
use crate::game::router::{DeviceLatency, InputRouter, RouteAction, RouteContext};
use crate::game::ruleset::{FeverActivation, Ruleset};
use crate::game::scoring::{MeterSnapshot, Meters};

/// Pulse interval at which every Ongoing note adds one to the combo.
pub const COMBO_TICK_PULSES: i32 = 60;
/// Real seconds between HP reaching 0 and the Failed outcome.
pub const STAGE_FAILED_DELAY: f64 = 1.5;
const STAGE_CLEAR_PADDING_S: f64 = 1.0;
const STATUS_LOG_INTERVAL_S: f64 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Keysound '{0}' failed to load")]
    MissingSound(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    Cleared,
    Failed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlayMode {
    Normal,
    Practice,
}

pub type FrameEvents = SmallVec<[EngineEvent; 8]>;

/// Read-only projection for UI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub time: f64,
    pub pulse: f64,
    pub beat: f64,
    pub scan: i32,
    pub meters: MeterSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub events: FrameEvents,
    pub projection: Projection,
    pub outcome: Option<StageOutcome>,
}

#[derive(Copy, Clone, Debug)]
struct LiveSound {
    handle: SoundHandle,
    ends_at: f64,
}

/// Everything one play session mutates, owned by a single tick loop.
pub struct State {
    pattern: Arc<PreparedPattern>,
    ruleset: Arc<Ruleset>,
    scheme: ControlScheme,
    latency: DeviceLatency,
    modifiers: Modifiers,
    bindings: KeyBindings,
    layout: FieldLayout,
    practice: Option<PracticeSettings>,

    clock: PlaybackClock,
    lanes: LaneQueues,
    notes: NoteLifecycle,
    meters: Meters,
    router: InputRouter,

    live_sounds: Vec<LiveSound>,
    backing_started: bool,
    real_time: f64,
    fail_deadline: Option<f64>,
    outcome: Option<StageOutcome>,
    pending: FrameEvents,
    log_timer: f64,
}

impl State {
    #[inline(always)]
    fn now(&self) -> f64 {
        self.clock.base_time()
    }

    #[inline(always)]
    fn latency_of(&self, id: NoteId) -> f64 {
        self.latency.for_note(self.scheme, &self.ruleset, self.pattern.note(id).note_type())
    }

    fn no_fail(&self) -> bool {
        self.modifiers.contains(Modifiers::NO_FAIL) || self.practice.is_some()
    }

    fn autoplay(&self) -> bool {
        self.modifiers.contains(Modifiers::AUTO_PLAY)
            || self.practice.as_ref().is_some_and(|p| p.autoplay)
    }

    fn auto_fever(&self) -> bool {
        self.ruleset.fever_activation == FeverActivation::Automatic
            || self.modifiers.contains(Modifiers::AUTO_FEVER)
    }

    #[inline(always)]
    fn has_failed(&self) -> bool {
        self.fail_deadline.is_some()
    }

    fn projection(&self) -> Projection {
        Projection {
            time: self.clock.base_time(),
            pulse: self.clock.pulse(),
            beat: self.clock.beat(),
            scan: self.clock.scan(),
            meters: self.meters.snapshot(),
        }
    }
}

fn route_context(state: &State) -> RouteContext<'_> {
    RouteContext {
        pattern: &state.pattern,
        ruleset: &state.ruleset,
        lanes: &state.lanes,
        notes: &state.notes,
        layout: &state.layout,
        bindings: &state.bindings,
        scheme: state.scheme,
        latency: state.latency,
        now: state.now(),
        pulse: state.clock.pulse(),
        scan: state.clock.scan(),
        speed: state.clock.speed(),
    }
}

fn play_note_sound(
    state: &mut State,
    audio: &mut dyn AudioSink,
    id: NoteId,
    start_offset_s: f64,
    tracked: bool,
) -> Option<SoundHandle> {
    let pattern = Arc::clone(&state.pattern);
    let note = pattern.note(id);
    if note.sound.is_empty() {
        return None;
    }
    let handle = audio.play_sound(SoundCue {
        sound: &note.sound,
        start_offset_s,
        volume_percent: note.volume_percent,
        pan_percent: note.pan_percent,
        hidden: !pattern.is_playable(id),
    })?;
    if tracked {
        let length = audio.clip_length_s(&note.sound).unwrap_or(0.0);
        // Clip seconds equal base seconds: the mixer runs at the clock's speed.
        let ends_at = state.now() + (length - start_offset_s);
        state.live_sounds.push(LiveSound { handle, ends_at });
    }
    Some(handle)
}

fn stop_all_sounds(state: &mut State, audio: &mut dyn AudioSink) {
    for live in state.live_sounds.drain(..) {
        audio.stop_sound(live.handle);
    }
    for handle in state.notes.ongoing().iter().filter_map(|o| o.sound) {
        audio.stop_sound(handle);
    }
}

fn start_backing(state: &mut State, audio: &mut dyn AudioSink, offset_s: f64) {
    audio.play_backing_track(offset_s);
    audio.seek_video(offset_s - state.pattern.video_offset);
    state.backing_started = true;
}

/// Meters, events and fail detection for one resolved judgement.
fn finish_note(state: &mut State, id: NoteId, judgement: Judgement, events: &mut FrameEvents) {
    let category = state.pattern.note(id).note_type().behavior().category;
    let now = state.now();
    let no_fail = state.no_fail();
    let outcome = state.meters.apply(&state.ruleset, judgement, category, now, no_fail);
    events.push(EngineEvent::NoteResolved { note: id, judgement });
    if outcome.fever_ready {
        events.push(EngineEvent::FeverReady);
    }
    if outcome.failed {
        state.fail_deadline = Some(state.real_time + STAGE_FAILED_DELAY);
        events.push(EngineEvent::StageFailed);
    }
}

fn break_note(state: &mut State, id: NoteId, events: &mut FrameEvents) {
    let lane = state.pattern.note(id).lane;
    if !state.lanes.remove(lane, id) {
        return;
    }
    state.notes.resolve(id, Judgement::Break);
    debug!("BREAK: note {id} in lane {lane}");
    finish_note(state, id, Judgement::Break, events);
}

/// Hit `id` as if the input arrived at `at`. Returns false when the note is
/// not queued or `at` is outside its Miss window.
pub fn judge_hit(
    state: &mut State,
    audio: &mut dyn AudioSink,
    id: NoteId,
    at: f64,
    events: &mut FrameEvents,
) -> bool {
    let pattern = Arc::clone(&state.pattern);
    let note = pattern.note(id);
    if !state.lanes.contains(note.lane, id) {
        return false;
    }
    let latency = state.latency_of(id);
    let Some(judgement) =
        evaluate_hit(at, pattern.timing(id).time, latency, state.clock.speed(), &state.ruleset.timing)
    else {
        return false;
    };
    state.lanes.remove(note.lane, id);

    let sustained = note.note_type().has_duration() && judgement != Judgement::Miss;
    let sound = play_note_sound(state, audio, id, 0.0, !sustained);
    if sustained {
        state.notes.begin_ongoing(OngoingNote {
            id,
            lane: note.lane,
            judgement,
            touched: true,
            last_touch_time: at,
            sound,
            next_combo_tick_pulse: note.pulse.saturating_add(COMBO_TICK_PULSES),
        });
        debug!("HOLD START: note {id} lane {} banked {judgement}", note.lane);
        events.push(EngineEvent::NoteHit { note: id, judgement });
    } else {
        state.notes.resolve(id, judgement);
        debug!("HIT: note {id} lane {} {judgement}", note.lane);
        finish_note(state, id, judgement, events);
    }
    true
}

fn ghost_playback(state: &mut State, audio: &mut dyn AudioSink) {
    let pattern = Arc::clone(&state.pattern);
    let now = state.now();
    for lane in state.lanes.hidden_lanes() {
        while let Some(id) = state.lanes.head(lane, QueueView::All) {
            if pattern.timing(id).time > now {
                break;
            }
            state.lanes.pop_front(lane);
            play_note_sound(state, audio, id, 0.0, true);
        }
    }
}

fn break_overdue_notes(state: &mut State, events: &mut FrameEvents) {
    let pattern = Arc::clone(&state.pattern);
    let now = state.now();
    let speed = state.clock.speed();
    for lane in 0..state.lanes.playable_lanes() {
        let overdue: SmallVec<[NoteId; 4]> = state
            .lanes
            .iter(lane, QueueView::All)
            .take_while(|&id| pattern.timing(id).time <= now)
            .filter(|&id| {
                is_overdue(now, pattern.timing(id).time, state.latency_of(id), speed, &state.ruleset.timing)
            })
            .collect();
        for id in overdue {
            break_note(state, id, events);
        }
    }
}

fn advance_clock(state: &mut State, audio: &mut dyn AudioSink, delta_s: f64, events: &mut FrameEvents) {
    let pattern = Arc::clone(&state.pattern);
    let step = state.clock.advance(delta_s, pattern.tempo());
    let now = state.now();
    if !state.backing_started && now >= 0.0 {
        start_backing(state, audio, now);
    }
    if let Some(scan) = step.scan_changed {
        events.push(EngineEvent::ScanChanged { scan });
        if let Some(target) = state
            .practice
            .as_ref()
            .and_then(|p| p.loop_target(scan, pattern.first_scan(), pattern.last_scan()))
        {
            jump_to(state, audio, target, events);
            return;
        }
    }
    if let Some(next_scan) = step.about_to_change {
        events.push(EngineEvent::ScanAboutToChange { next_scan });
    }
}

fn apply_action(state: &mut State, audio: &mut dyn AudioSink, action: RouteAction, events: &mut FrameEvents) {
    let now = state.now();
    match action {
        RouteAction::Touch(id) => {
            state.notes.touch(id, now);
        }
        RouteAction::Hit(id) => {
            judge_hit(state, audio, id, now, events);
        }
        RouteAction::EmptyHit { lane, note } => {
            if let Some(id) = note {
                play_note_sound(state, audio, id, 0.0, true);
            }
            events.push(EngineEvent::EmptyHit { lane, note });
        }
    }
}

fn autoplay(state: &mut State, audio: &mut dyn AudioSink, events: &mut FrameEvents) {
    let pattern = Arc::clone(&state.pattern);
    let now = state.now();
    for lane in 0..state.lanes.playable_lanes() {
        while let Some(id) = state.lanes.head(lane, QueueView::All) {
            let at = pattern.timing(id).time + state.latency_of(id);
            if at > now || !judge_hit(state, audio, id, at, events) {
                break;
            }
        }
    }
    state.notes.touch_all(now, |_| true);
}

fn route_input(state: &mut State, audio: &mut dyn AudioSink, inputs: &[InputEvent], events: &mut FrameEvents) {
    if state.autoplay() {
        autoplay(state, audio, events);
        return;
    }
    let mut router = std::mem::take(&mut state.router);
    for event in inputs {
        if state.has_failed() {
            break;
        }
        if let Some(action) = router.route(event, &route_context(state)) {
            apply_action(state, audio, action, events);
        }
    }
    let held = router.poll_held(&route_context(state));
    state.router = router;
    for action in held {
        apply_action(state, audio, action, events);
    }
}

fn reconcile_ongoing(state: &mut State, audio: &mut dyn AudioSink, events: &mut FrameEvents) {
    let pattern = Arc::clone(&state.pattern);
    let ruleset = Arc::clone(&state.ruleset);
    let (scheme, latency, speed) = (state.scheme, state.latency, state.clock.speed());

    let ticks = state.notes.collect_combo_ticks(state.clock.pulse(), COMBO_TICK_PULSES, |id| {
        pattern.note(id).end_pulse()
    });
    if ticks > 0 {
        state.meters.score.add_combo(ticks);
        events.push(EngineEvent::ComboTick { combo: state.meters.score.combo() });
    }

    let done = state.notes.reconcile(state.clock.base_time(), |id| {
        let note_type = pattern.note(id).note_type();
        OngoingLimits {
            end_time: pattern.timing(id).end_time + latency.for_note(scheme, &ruleset, note_type),
            grace_period_s: ruleset.grace_period_s(note_type) * speed,
        }
    });
    for c in done {
        if c.early
            && let Some(handle) = c.note.sound
        {
            audio.stop_sound(handle);
        }
        debug!("HOLD END: note {} {} (early: {})", c.note.id, c.judgement, c.early);
        finish_note(state, c.note.id, c.judgement, events);
        if state.has_failed() {
            break;
        }
    }
}

fn update_meters(state: &mut State, real_delta_s: f64, events: &mut FrameEvents) {
    if state.meters.fever.state() == FeverState::Ready && state.auto_fever() && state.meters.fever.activate() {
        events.push(EngineEvent::FeverActivated);
    }
    if let Some(bonus) = state.meters.fever.update(real_delta_s) {
        state.meters.score.add_fever_bonus(bonus);
        events.push(EngineEvent::FeverEnded { bonus });
    }
}

fn check_stage_clear(state: &mut State, events: &mut FrameEvents) {
    if state.practice.is_some() || state.outcome.is_some() || state.has_failed() {
        return;
    }
    let speed = state.clock.speed();
    let clear_at = state.pattern.end_time()
        + state.ruleset.timing.miss_window_s() * speed
        + state.latency.max_s()
        + STAGE_CLEAR_PADDING_S;
    // An Active fever runs out first so its bonus lands in the final score.
    if state.now() >= clear_at && state.notes.ongoing().is_empty() && !state.meters.fever.is_active() {
        info!("Pattern end reached. Stage cleared with score {}.", state.meters.score.score());
        state.outcome = Some(StageOutcome::Cleared);
        events.push(EngineEvent::StageCleared);
    }
}

/// Rebuild the session at the start of `scan`.
fn jump_to(state: &mut State, audio: &mut dyn AudioSink, scan: i32, events: &mut FrameEvents) {
    let pattern = Arc::clone(&state.pattern);
    let scan = scan.clamp(pattern.first_scan(), pattern.last_scan());
    let pulse = pattern.scan_start_pulse(scan);
    let time = pattern.tempo().pulse_to_time(f64::from(pulse));

    stop_all_sounds(state, audio);
    state.clock.jump_to_time(time, pattern.tempo());
    state.lanes = LaneQueues::build(&pattern, &state.ruleset, pulse);
    state.notes.reset();
    if scan == pattern.first_scan() {
        state.meters.reset();
        state.fail_deadline = None;
    } else {
        state.meters.score.reset_combo();
    }

    for (id, note) in pattern.notes().iter().enumerate() {
        if note.pulse >= pulse || note.sound.is_empty() {
            continue;
        }
        let elapsed = time - pattern.timing(id).time;
        if audio.clip_length_s(&note.sound).is_some_and(|len| elapsed < len) {
            play_note_sound(state, audio, id, elapsed, true);
        }
    }

    if time >= 0.0 {
        start_backing(state, audio, time);
    } else {
        state.backing_started = false;
    }
    events.push(EngineEvent::JumpedToScan { scan });
    info!("Jumped to scan {scan} at {time:.3}s.");
}

/// One frame: clock, input, Ongoing reconciliation, meters. The order matters.
pub fn update(
    state: &mut State,
    audio: &mut dyn AudioSink,
    delta_s: f64,
    inputs: &[InputEvent],
    events: &mut FrameEvents,
) {
    if state.outcome.is_some() || state.clock.is_paused() {
        return;
    }
    let delta_s = if delta_s.is_finite() { delta_s.max(0.0) } else { 0.0 };
    state.real_time += delta_s;
    if let Some(deadline) = state.fail_deadline {
        if state.real_time >= deadline {
            info!("Stage failed.");
            state.outcome = Some(StageOutcome::Failed);
        }
        return;
    }

    advance_clock(state, audio, delta_s, events);
    ghost_playback(state, audio);
    break_overdue_notes(state, events);
    if state.has_failed() {
        return;
    }

    state.notes.clear_touched();
    route_input(state, audio, inputs, events);
    if state.has_failed() {
        return;
    }

    reconcile_ongoing(state, audio, events);
    if state.has_failed() {
        return;
    }

    update_meters(state, delta_s, events);
    let now = state.now();
    state.live_sounds.retain(|s| s.ends_at > now);
    check_stage_clear(state, events);

    state.log_timer += delta_s;
    if state.log_timer >= STATUS_LOG_INTERVAL_S {
        let snap = state.meters.snapshot();
        info!(
            "Scan: {}, Beat: {:.2}, Time: {:.2}, Score: {}, Combo: {}, HP: {}, Fever: {} ({:.2}), Queued: {}",
            state.clock.scan(),
            state.clock.beat(),
            now,
            snap.score,
            snap.combo,
            snap.hp,
            snap.fever_state.as_str(),
            snap.fever_amount,
            state.lanes.total_len()
        );
        state.log_timer -= STATUS_LOG_INTERVAL_S;
    }
}

/// A play session: session state plus the audio sink and event listeners.
pub struct Engine<A: AudioSink> {
    state: State,
    audio: A,
    listeners: EventDispatcher,
}

impl<A: AudioSink> Engine<A> {
    /// Fails when any keysound the pattern references did not load.
    pub fn new(
        pattern: Arc<PreparedPattern>,
        ruleset: Arc<Ruleset>,
        config: &EngineConfig,
        mode: PlayMode,
        audio: A,
    ) -> Result<Self, SessionError> {
        let mut checked: FxHashSet<&str> = FxHashSet::default();
        for note in pattern.notes() {
            if note.sound.is_empty() || !checked.insert(note.sound.as_str()) {
                continue;
            }
            if audio.clip_length_s(&note.sound).is_none() {
                warn!("Keysound '{}' is missing; aborting session.", note.sound);
                return Err(SessionError::MissingSound(note.sound.clone()));
            }
        }

        let start_time = -config.lead_in_seconds.max(0.0);
        let clock = PlaybackClock::new(start_time, pattern.pulses_per_scan(), pattern.tempo());
        let lanes = LaneQueues::build(&pattern, &ruleset, 0);
        let notes = NoteLifecycle::new(pattern.notes().len());
        let meters = Meters::new(&ruleset, pattern.playable_note_count(), pattern.length_seconds());
        let layout = FieldLayout {
            width: config.field_width,
            height: config.field_height,
            playable_lanes: pattern.playable_lanes,
            pulses_per_scan: pattern.pulses_per_scan(),
        };
        let practice = (mode == PlayMode::Practice).then(PracticeSettings::default);

        info!(
            "Starting '{}' ({} scheme{}) with {:.2}s lead-in.",
            pattern.title,
            config.control_scheme,
            if practice.is_some() { ", practice" } else { "" },
            -start_time
        );

        let mut engine = Self {
            state: State {
                pattern,
                ruleset,
                scheme: config.control_scheme,
                latency: DeviceLatency::from_config(config),
                modifiers: config.modifiers,
                bindings: config.key_bindings.clone(),
                layout,
                practice,
                clock,
                lanes,
                notes,
                meters,
                router: InputRouter::default(),
                live_sounds: Vec::new(),
                backing_started: false,
                real_time: 0.0,
                fail_deadline: None,
                outcome: None,
                pending: FrameEvents::new(),
                log_timer: 0.0,
            },
            audio,
            listeners: EventDispatcher::default(),
        };
        if engine.state.now() >= 0.0 {
            let now = engine.state.now();
            start_backing(&mut engine.state, &mut engine.audio, now);
        }
        Ok(engine)
    }

    pub fn tick(&mut self, delta_s: f64, inputs: &[InputEvent]) -> FrameResult {
        let mut events = std::mem::take(&mut self.state.pending);
        update(&mut self.state, &mut self.audio, delta_s, inputs, &mut events);
        self.listeners.dispatch(&events);
        FrameResult { events, projection: self.state.projection(), outcome: self.state.outcome }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EngineEvent) + 'static) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn snapshot(&self) -> Projection {
        self.state.projection()
    }

    pub fn outcome(&self) -> Option<StageOutcome> {
        self.state.outcome
    }

    pub fn pattern(&self) -> &PreparedPattern {
        &self.state.pattern
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.state.clock
    }

    pub fn lanes(&self) -> &LaneQueues {
        &self.state.lanes
    }

    pub fn note_state(&self, id: NoteId) -> NoteState {
        self.state.notes.state(id)
    }

    pub fn ongoing(&self) -> &[OngoingNote] {
        self.state.notes.ongoing()
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.state.layout
    }

    pub fn practice(&self) -> Option<&PracticeSettings> {
        self.state.practice.as_ref()
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    /// Manual fever activation; only valid while Ready.
    pub fn activate_fever(&mut self) -> bool {
        if self.state.has_failed() || !self.state.meters.fever.activate() {
            warn!("Ignoring fever activation while {:?}.", self.state.meters.fever.state());
            return false;
        }
        self.state.pending.push(EngineEvent::FeverActivated);
        true
    }

    /// Freezes the clock and fever decay. Queues and Ongoing notes are kept.
    pub fn pause(&mut self) {
        if self.state.clock.is_paused() {
            return;
        }
        self.state.clock.pause();
        self.state.router.release_all();
        self.state.pending.push(EngineEvent::Paused);
        info!("Paused at {:.3}s.", self.state.now());
    }

    pub fn resume(&mut self) {
        if !self.state.clock.is_paused() {
            return;
        }
        self.state.clock.resume();
        self.state.pending.push(EngineEvent::Resumed);
        info!("Resumed at {:.3}s.", self.state.now());
    }

    /// Practice only. Rebuilds the session at `scan`, then applies the loop bounds.
    pub fn jump_to_scan(&mut self, scan: i32) -> bool {
        let Some(practice) = self.state.practice.clone() else {
            warn!("Ignoring jump to scan {scan} outside practice mode.");
            return false;
        };
        let mut events = std::mem::take(&mut self.state.pending);
        jump_to(&mut self.state, &mut self.audio, scan, &mut events);
        let pattern = Arc::clone(&self.state.pattern);
        let landed = self.state.clock.scan();
        if let Some(target) = practice.loop_target(landed, pattern.first_scan(), pattern.last_scan())
            && target != landed
        {
            jump_to(&mut self.state, &mut self.audio, target, &mut events);
        }
        self.state.pending = events;
        true
    }

    pub fn set_loop(&mut self, start: Option<i32>, end: Option<i32>) -> bool {
        let Some(practice) = self.state.practice.as_mut() else {
            warn!("Ignoring loop change outside practice mode.");
            return false;
        };
        practice.set_loop(start, end);
        info!("Practice loop set to {:?}..={:?}.", practice.loop_start, practice.loop_end);
        true
    }

    /// Returns the clamped percentage actually applied.
    pub fn set_speed_percent(&mut self, percent: u32) -> Option<u32> {
        let Some(practice) = self.state.practice.as_mut() else {
            warn!("Ignoring speed change outside practice mode.");
            return None;
        };
        let applied = practice.set_speed_percent(percent);
        let factor = practice.speed_factor();
        self.state.clock.set_speed(factor, self.state.pattern.tempo());
        self.audio.set_playback_speed(factor);
        info!("Playback speed set to {applied}%.");
        Some(applied)
    }

    pub fn set_autoplay(&mut self, on: bool) -> bool {
        let Some(practice) = self.state.practice.as_mut() else {
            warn!("Ignoring autoplay toggle outside practice mode.");
            return false;
        };
        practice.autoplay = on;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::{AudioCall, RecordingAudio};
    use crate::game::note::{Note, NoteKind};
    use crate::game::pattern::Pattern;

    fn engine(notes: Vec<Note>, mode: PlayMode) -> Engine<RecordingAudio> {
        let pattern = Pattern { notes, ..Pattern::default() }.prepare().expect("pattern");
        let config = EngineConfig { lead_in_seconds: 0.0, ..EngineConfig::default() };
        Engine::new(
            Arc::new(pattern),
            Arc::new(Ruleset::default()),
            &config,
            mode,
            RecordingAudio::with_clip_length(0.5),
        )
        .expect("engine")
    }

    #[test]
    fn missing_keysound_aborts_the_session() {
        let pattern = Pattern {
            notes: vec![Note::new(0, 0, NoteKind::Basic).with_sound("gone")],
            ..Pattern::default()
        }
        .prepare()
        .expect("pattern");
        let mut audio = RecordingAudio::default();
        audio.missing.push("gone".to_string());
        let result = Engine::new(
            Arc::new(pattern),
            Arc::new(Ruleset::default()),
            &EngineConfig::default(),
            PlayMode::Normal,
            audio,
        );
        assert!(matches!(result, Err(SessionError::MissingSound(s)) if s == "gone"));
    }

    #[test]
    fn backing_track_starts_with_zero_lead_in() {
        let e = engine(Vec::new(), PlayMode::Normal);
        assert_eq!(e.audio().calls.first(), Some(&AudioCall::BackingTrack(0.0)));
    }

    #[test]
    fn pause_freezes_time_and_is_reported() {
        let mut e = engine(vec![Note::new(960, 0, NoteKind::Basic)], PlayMode::Normal);
        e.tick(0.5, &[]);
        e.pause();
        let frame = e.tick(1.0, &[]);
        assert!(frame.events.contains(&EngineEvent::Paused));
        assert!((frame.projection.time - 0.5).abs() < 1e-9, "clock frozen");
        e.resume();
        let frame = e.tick(0.25, &[]);
        assert!(frame.events.contains(&EngineEvent::Resumed));
        assert!((frame.projection.time - 0.75).abs() < 1e-9);
    }

    #[test]
    fn practice_controls_are_rejected_in_normal_play() {
        let mut e = engine(vec![Note::new(0, 0, NoteKind::Basic)], PlayMode::Normal);
        assert!(!e.jump_to_scan(0));
        assert_eq!(e.set_speed_percent(150), None);
        assert!(!e.set_autoplay(true));
        assert!(!e.set_loop(Some(0), Some(1)));
    }

    #[test]
    fn listeners_see_frame_events() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let mut e = engine(vec![Note::new(0, 0, NoteKind::Basic)], PlayMode::Normal);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        e.subscribe(move |ev| sink.borrow_mut().push(ev.clone()));
        e.tick(0.5, &[]);
        assert!(
            seen.borrow().contains(&EngineEvent::NoteResolved { note: 0, judgement: Judgement::Break }),
            "untouched note breaks and is published"
        );
    }
}
