use crate::game::judgment::Judgement;
use crate::game::note::NoteId;

/// State changes published once per tick, in the order they happened.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    ScanChanged { scan: i32 },
    ScanAboutToChange { next_scan: i32 },
    JumpedToScan { scan: i32 },
    /// A sustained note was hit and is now Ongoing with this judgement banked.
    NoteHit { note: NoteId, judgement: Judgement },
    NoteResolved { note: NoteId, judgement: Judgement },
    /// A press landed on an empty lane; the lane's next sound was previewed.
    EmptyHit { lane: usize, note: Option<NoteId> },
    ComboTick { combo: u32 },
    FeverReady,
    FeverActivated,
    FeverEnded { bonus: u32 },
    StageFailed,
    StageCleared,
    Paused,
    Resumed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&EngineEvent)>;

/// Explicit subscribe/unsubscribe registry for engine events.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl EventDispatcher {
    pub fn subscribe(&mut self, listener: impl FnMut(&EngineEvent) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn dispatch(&mut self, events: &[EngineEvent]) {
        for event in events {
            for (_, listener) in &mut self.listeners {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").field("listeners", &self.listeners.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_receive_until_unsubscribed() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut d = EventDispatcher::default();
        let sink = Rc::clone(&seen);
        let id = d.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        d.dispatch(&[EngineEvent::ScanChanged { scan: 1 }, EngineEvent::FeverReady]);
        assert_eq!(seen.borrow().len(), 2);
        assert!(d.unsubscribe(id));
        assert!(!d.unsubscribe(id), "already removed");
        d.dispatch(&[EngineEvent::Paused]);
        assert_eq!(seen.borrow().len(), 2, "no delivery after unsubscribe");
        assert!(d.listeners.is_empty());
    }
}
