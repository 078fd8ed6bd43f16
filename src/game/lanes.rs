use std::collections::VecDeque;

use crate::game::note::NoteId;
use crate::game::pattern::PreparedPattern;
use crate::game::ruleset::Ruleset;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueView {
    All,
    Pointer,
    Keys,
}

/// Unresolved notes of one lane, ordered by pulse, with per-device views.
#[derive(Debug, Clone, Default)]
pub struct LaneQueue {
    all: VecDeque<NoteId>,
    pointer: VecDeque<NoteId>,
    keys: VecDeque<NoteId>,
}

impl LaneQueue {
    #[inline(always)]
    fn view(&self, view: QueueView) -> &VecDeque<NoteId> {
        match view {
            QueueView::All => &self.all,
            QueueView::Pointer => &self.pointer,
            QueueView::Keys => &self.keys,
        }
    }

    fn remove(&mut self, id: NoteId) -> bool {
        let Some(pos) = self.all.iter().position(|&n| n == id) else {
            return false;
        };
        self.all.remove(pos);
        for view in [&mut self.pointer, &mut self.keys] {
            if let Some(pos) = view.iter().position(|&n| n == id) {
                view.remove(pos);
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaneQueues {
    lanes: Vec<LaneQueue>,
    playable_lanes: usize,
}

impl LaneQueues {
    /// Queue every note at or after `from_pulse`. Earlier notes stay out.
    pub fn build(pattern: &PreparedPattern, ruleset: &Ruleset, from_pulse: i32) -> Self {
        let mut lanes = vec![LaneQueue::default(); pattern.lane_count];
        for (id, note) in pattern.notes().iter().enumerate() {
            if note.pulse < from_pulse {
                continue;
            }
            let Some(queue) = lanes.get_mut(note.lane) else {
                continue;
            };
            let note_type = note.note_type();
            queue.all.push_back(id);
            if ruleset.pointer_plays(note_type) {
                queue.pointer.push_back(id);
            }
            if ruleset.keys_play(note_type) {
                queue.keys.push_back(id);
            }
        }
        Self { lanes, playable_lanes: pattern.playable_lanes }
    }

    #[inline(always)]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    #[inline(always)]
    pub fn playable_lanes(&self) -> usize {
        self.playable_lanes.min(self.lanes.len())
    }

    pub fn hidden_lanes(&self) -> std::ops::Range<usize> {
        self.playable_lanes()..self.lanes.len()
    }

    #[inline(always)]
    pub fn head(&self, lane: usize, view: QueueView) -> Option<NoteId> {
        self.lanes.get(lane).and_then(|q| q.view(view).front().copied())
    }

    pub fn iter(&self, lane: usize, view: QueueView) -> impl Iterator<Item = NoteId> + '_ {
        self.lanes.get(lane).into_iter().flat_map(move |q| q.view(view).iter().copied())
    }

    pub fn len(&self, lane: usize) -> usize {
        self.lanes.get(lane).map_or(0, |q| q.all.len())
    }

    pub fn total_len(&self) -> usize {
        self.lanes.iter().map(|q| q.all.len()).sum()
    }

    pub fn contains(&self, lane: usize, id: NoteId) -> bool {
        self.lanes.get(lane).is_some_and(|q| q.all.contains(&id))
    }

    /// Drop a resolved note from the master queue and every view that held it.
    pub fn remove(&mut self, lane: usize, id: NoteId) -> bool {
        self.lanes.get_mut(lane).is_some_and(|q| q.remove(id))
    }

    pub fn pop_front(&mut self, lane: usize) -> Option<NoteId> {
        let id = self.head(lane, QueueView::All)?;
        self.remove(lane, id);
        Some(id)
    }
}
