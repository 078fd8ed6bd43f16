use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::EngineConfig;
use crate::core::input::{ControlScheme, FieldLayout, FieldPoint, InputEvent, KeyBindings, KeyId};
use crate::game::judgment::Judgement;
use crate::game::lanes::{LaneQueues, QueueView};
use crate::game::lifecycle::{NoteLifecycle, OngoingNote, evaluate_hit, hit_offset_s};
use crate::game::note::{NoteId, NoteType};
use crate::game::pattern::PreparedPattern;
use crate::game::ruleset::Ruleset;

/// What the engine should do in response to one input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RouteAction {
    Touch(NoteId),
    Hit(NoteId),
    /// Nothing hittable; preview `note`'s sound if set.
    EmptyHit { lane: usize, note: Option<NoteId> },
}

/// Per-device input latency in seconds.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DeviceLatency {
    pub touch_s: f64,
    pub keyboard_s: f64,
    pub mouse_s: f64,
}

impl DeviceLatency {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            touch_s: EngineConfig::latency_s(config.touch_latency_ms),
            keyboard_s: EngineConfig::latency_s(config.keyboard_latency_ms),
            mouse_s: EngineConfig::latency_s(config.mouse_latency_ms),
        }
    }

    pub fn for_note(&self, scheme: ControlScheme, ruleset: &Ruleset, note_type: NoteType) -> f64 {
        match scheme {
            ControlScheme::Touch => self.touch_s,
            ControlScheme::Keys => self.keyboard_s,
            ControlScheme::KM if ruleset.keys_play(note_type) => self.keyboard_s,
            ControlScheme::KM => self.mouse_s,
        }
    }

    pub fn max_s(&self) -> f64 {
        self.touch_s.max(self.keyboard_s).max(self.mouse_s)
    }
}

/// Read-only view of the session an input is routed against.
pub struct RouteContext<'a> {
    pub pattern: &'a PreparedPattern,
    pub ruleset: &'a Ruleset,
    pub lanes: &'a LaneQueues,
    pub notes: &'a NoteLifecycle,
    pub layout: &'a FieldLayout,
    pub bindings: &'a KeyBindings,
    pub scheme: ControlScheme,
    pub latency: DeviceLatency,
    pub now: f64,
    /// Playback pulse at `now`.
    pub pulse: f64,
    pub scan: i32,
    pub speed: f64,
}

impl RouteContext<'_> {
    #[inline(always)]
    fn latency_of(&self, id: NoteId) -> f64 {
        self.latency.for_note(self.scheme, self.ruleset, self.pattern.note(id).note_type())
    }

    fn judgement_for(&self, id: NoteId) -> Option<Judgement> {
        let time = self.pattern.timing(id).time;
        evaluate_hit(self.now, time, self.latency_of(id), self.speed, &self.ruleset.timing)
    }

    // Queues are pulse-ordered, so once a note is this early every later one is too.
    fn too_early(&self, id: NoteId) -> bool {
        let time = self.pattern.timing(id).time;
        hit_offset_s(self.now, time, self.latency_of(id), self.speed) < -self.ruleset.timing.miss_window_s()
    }

    #[inline(always)]
    fn half_hitbox(&self) -> f64 {
        f64::from(self.ruleset.hitbox_width_pulses.max(0)) / 2.0
    }

    fn in_hitbox(&self, id: NoteId, point: &FieldPoint) -> bool {
        let note = self.pattern.note(id);
        note.lane == point.lane && (point.pulse - f64::from(note.pulse)).abs() <= self.half_hitbox()
    }

    /// Hit-test against the body of a note being held.
    pub fn ongoing_region_contains(&self, ongoing: &OngoingNote, point: &FieldPoint) -> bool {
        let note = self.pattern.note(ongoing.id);
        let half = self.half_hitbox();
        if note.note_type().behavior().follows_curve {
            // Only the hit-box around the curve point under the playhead counts.
            let at = self.pulse.clamp(f64::from(note.pulse), f64::from(note.end_pulse()));
            return (point.pulse - at).abs() <= half && (note.lane_at(at) - point.lane_pos).abs() <= 0.5;
        }
        let start = f64::from(note.pulse) - half;
        let end = f64::from(note.end_pulse()) + half;
        note.lane == point.lane && (start..=end).contains(&point.pulse)
    }

    #[inline(always)]
    fn pointer_view(&self) -> QueueView {
        match self.scheme {
            ControlScheme::KM => QueueView::Pointer,
            _ => QueueView::All,
        }
    }

    fn pointer_holds(&self, id: NoteId) -> bool {
        match self.scheme {
            ControlScheme::Touch => true,
            ControlScheme::Keys => false,
            ControlScheme::KM => self.ruleset.pointer_plays(self.pattern.note(id).note_type()),
        }
    }

    fn keys_hold(&self, id: NoteId) -> bool {
        match self.scheme {
            ControlScheme::Touch => false,
            ControlScheme::Keys => true,
            ControlScheme::KM => self.ruleset.keys_play(self.pattern.note(id).note_type()),
        }
    }

    // Duration-bearing notes are never previewed.
    fn preview(&self, head: Option<NoteId>) -> Option<NoteId> {
        head.filter(|&id| !self.pattern.note(id).note_type().has_duration())
    }

    // Earliest pulse first, instantaneous types win ties.
    fn key_priority(&self, id: NoteId) -> (i32, bool, usize) {
        let note = self.pattern.note(id);
        (note.pulse, note.note_type().has_duration(), note.lane)
    }

    fn slide_hittable(&self, id: NoteId, point: &FieldPoint) -> bool {
        let note = self.pattern.note(id);
        if !note.note_type().behavior().hit_on_slide || !self.in_hitbox(id, point) {
            return false;
        }
        let time = self.pattern.timing(id).time;
        hit_offset_s(self.now, time, self.latency_of(id), self.speed) >= 0.0
            && self.judgement_for(id).is_some()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct Contact {
    pos: [f32; 2],
    lane: Option<usize>,
}

/// Turns raw pointer and key events into note actions. Tracks which
/// contacts and keys are down so held notes can be polled every tick.
#[derive(Debug, Default, Clone)]
pub struct InputRouter {
    contacts: FxHashMap<u32, Contact>,
    held_keys: SmallVec<[KeyId; 8]>,
}

impl InputRouter {
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn held_key_count(&self) -> usize {
        self.held_keys.len()
    }

    pub fn release_all(&mut self) {
        self.contacts.clear();
        self.held_keys.clear();
    }

    /// Route one event. A press yields at most one action.
    pub fn route(&mut self, event: &InputEvent, ctx: &RouteContext<'_>) -> Option<RouteAction> {
        match *event {
            InputEvent::PointerDown { id, pos } => {
                let point = ctx.layout.locate(pos, ctx.scan);
                self.contacts.insert(id, Contact { pos, lane: point.map(|p| p.lane) });
                if ctx.scheme == ControlScheme::Keys {
                    return None;
                }
                point.map(|p| press_pointer(ctx, &p))
            }
            InputEvent::PointerMove { id, pos } => {
                let point = ctx.layout.locate(pos, ctx.scan);
                let lane = point.map(|p| p.lane);
                let contact = self.contacts.get_mut(&id)?;
                let entered_lane = lane.is_some() && lane != contact.lane;
                contact.pos = pos;
                contact.lane = lane;
                if !entered_lane || ctx.scheme == ControlScheme::Keys {
                    return None;
                }
                point.map(|p| press_pointer(ctx, &p))
            }
            InputEvent::PointerUp { id } => {
                self.contacts.remove(&id);
                None
            }
            InputEvent::KeyDown(key) => {
                if self.held_keys.contains(&key) {
                    // OS key repeat.
                    return None;
                }
                self.held_keys.push(key);
                match ctx.scheme {
                    ControlScheme::Touch => None,
                    ControlScheme::Keys => ctx.bindings.lane_for(key).map(|lane| press_key_lane(ctx, lane)),
                    ControlScheme::KM => press_key_any(ctx),
                }
            }
            InputEvent::KeyHeld(key) => {
                if !self.held_keys.contains(&key) {
                    self.held_keys.push(key);
                }
                None
            }
            InputEvent::KeyUp(key) => {
                self.held_keys.retain(|k| *k != key);
                None
            }
        }
    }

    /// Touches for every Ongoing note still held, plus chain-node slide hits.
    pub fn poll_held(&self, ctx: &RouteContext<'_>) -> SmallVec<[RouteAction; 8]> {
        let mut out = SmallVec::new();
        if ctx.scheme != ControlScheme::Keys {
            for contact in self.contacts.values() {
                let Some(point) = ctx.layout.locate(contact.pos, ctx.scan) else {
                    continue;
                };
                for o in ctx.notes.ongoing() {
                    if ctx.pointer_holds(o.id) && ctx.ongoing_region_contains(o, &point) {
                        out.push(RouteAction::Touch(o.id));
                    }
                }
                for id in ctx
                    .lanes
                    .iter(point.lane, ctx.pointer_view())
                    .take_while(|&id| !ctx.too_early(id))
                {
                    if ctx.slide_hittable(id, &point) {
                        out.push(RouteAction::Hit(id));
                    }
                }
            }
        }
        match ctx.scheme {
            ControlScheme::Touch => {}
            ControlScheme::Keys => {
                for lane in self.held_keys.iter().filter_map(|&k| ctx.bindings.lane_for(k)) {
                    out.extend(ctx.notes.ongoing_in_lane(lane).map(|o| RouteAction::Touch(o.id)));
                }
            }
            ControlScheme::KM => {
                if !self.held_keys.is_empty() {
                    out.extend(
                        ctx.notes
                            .ongoing()
                            .iter()
                            .filter(|o| ctx.keys_hold(o.id))
                            .map(|o| RouteAction::Touch(o.id)),
                    );
                }
            }
        }
        out
    }
}

fn press_pointer(ctx: &RouteContext<'_>, point: &FieldPoint) -> RouteAction {
    if let Some(o) = ctx
        .notes
        .ongoing()
        .iter()
        .find(|o| ctx.pointer_holds(o.id) && ctx.ongoing_region_contains(o, point))
    {
        return RouteAction::Touch(o.id);
    }
    let view = ctx.pointer_view();
    let target = ctx
        .lanes
        .iter(point.lane, view)
        .take_while(|&id| !ctx.too_early(id))
        .find(|&id| ctx.in_hitbox(id, point) && ctx.judgement_for(id).is_some());
    match target {
        Some(id) => RouteAction::Hit(id),
        None => RouteAction::EmptyHit {
            lane: point.lane,
            note: ctx.preview(ctx.lanes.head(point.lane, view)),
        },
    }
}

fn press_key_lane(ctx: &RouteContext<'_>, lane: usize) -> RouteAction {
    if let Some(o) = ctx.notes.ongoing_in_lane(lane).next() {
        return RouteAction::Touch(o.id);
    }
    let head = ctx.lanes.head(lane, QueueView::All);
    match head {
        Some(id) if ctx.judgement_for(id).is_some() => RouteAction::Hit(id),
        _ => RouteAction::EmptyHit { lane, note: ctx.preview(head) },
    }
}

fn key_heads<'a>(ctx: &'a RouteContext<'_>) -> impl Iterator<Item = NoteId> + 'a {
    (0..ctx.lanes.playable_lanes()).filter_map(move |lane| ctx.lanes.head(lane, QueueView::Keys))
}

// Keys in the hybrid scheme are not lane-bound: a held key-type note absorbs
// the press, otherwise the globally earliest key-type note in reach is hit.
fn press_key_any(ctx: &RouteContext<'_>) -> Option<RouteAction> {
    if let Some(o) = ctx.notes.ongoing().iter().find(|o| ctx.keys_hold(o.id)) {
        return Some(RouteAction::Touch(o.id));
    }
    if let Some(id) = key_heads(ctx)
        .filter(|&id| ctx.judgement_for(id).is_some())
        .min_by_key(|&id| ctx.key_priority(id))
    {
        return Some(RouteAction::Hit(id));
    }
    let next = key_heads(ctx).min_by_key(|&id| ctx.key_priority(id))?;
    Some(RouteAction::EmptyHit { lane: ctx.pattern.note(next).lane, note: ctx.preview(Some(next)) })
}
