use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Event categories a listener can register for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Data,
    MoveStart,
    Move,
    MoveEnd,
    Render,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDataEvent {
    pub source_id: String,
    pub is_source_loaded: bool,
}

/// Events emitted by the map engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    Data(SourceDataEvent),
    MoveStart,
    Move,
    MoveEnd,
    /// Per-frame repaint; never a reconciliation trigger.
    Render,
}

impl MapEvent {
    pub fn source_data(source_id: impl Into<String>, is_source_loaded: bool) -> Self {
        MapEvent::Data(SourceDataEvent {
            source_id: source_id.into(),
            is_source_loaded,
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::Data(_) => EventKind::Data,
            MapEvent::MoveStart => EventKind::MoveStart,
            MapEvent::Move => EventKind::Move,
            MapEvent::MoveEnd => EventKind::MoveEnd,
            MapEvent::Render => EventKind::Render,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Registration ledger of listeners keyed by event kind.
///
/// The bus records who listens to what; it does not deliver events. The host
/// hands every event to each handler, and a handler acts only on kinds its
/// [`Subscriptions`] hold. `listeners` reports registrations, not routing.
///
/// Ids are allocated monotonically and never reused, so a stale id can only
/// ever refer to nothing.
#[derive(Debug, Default)]
pub struct EventBus {
    next_id: u64,
    listeners: BTreeMap<ListenerId, EventKind>,
}

pub type SharedEventBus = Rc<RefCell<EventBus>>;

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedEventBus {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn on(&mut self, kind: EventKind) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.insert(id, kind);
        id
    }

    /// Returns `true` if the listener was registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn is_listening(&self, id: ListenerId, kind: EventKind) -> bool {
        self.listeners.get(&id) == Some(&kind)
    }

    /// Listeners for `kind`, in registration order.
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        self.listeners
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// A group of listeners acquired together and released together.
///
/// The guard holds the bus weakly; dropping it after the bus is gone is fine.
#[derive(Debug)]
pub struct Subscriptions {
    bus: Weak<RefCell<EventBus>>,
    held: Vec<(EventKind, ListenerId)>,
}

impl Subscriptions {
    pub fn new(bus: &SharedEventBus) -> Self {
        Self {
            bus: Rc::downgrade(bus),
            held: Vec::new(),
        }
    }

    /// Registers a listener for `kind` unless the group already holds one.
    pub fn add(&mut self, kind: EventKind) -> Option<ListenerId> {
        if let Some((_, id)) = self.held.iter().find(|(k, _)| *k == kind) {
            return Some(*id);
        }
        let bus = self.bus.upgrade()?;
        let id = bus.borrow_mut().on(kind);
        self.held.push((kind, id));
        Some(id)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.held.iter().any(|(k, _)| *k == kind)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn release(&mut self) {
        let held = std::mem::take(&mut self.held);
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut bus = bus.borrow_mut();
        for (_, id) in held {
            bus.off(id);
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBus, EventKind, MapEvent, Subscriptions};

    #[test]
    fn ids_are_not_reused() {
        let mut bus = EventBus::new();
        let a = bus.on(EventKind::Move);
        assert!(bus.off(a));
        let b = bus.on(EventKind::Move);
        assert_ne!(a, b);
        assert!(!bus.off(a));
        assert!(bus.is_listening(b, EventKind::Move));
        assert!(!bus.is_listening(b, EventKind::MoveEnd));
    }

    #[test]
    fn listeners_filter_by_kind() {
        let mut bus = EventBus::new();
        let d = bus.on(EventKind::Data);
        let m1 = bus.on(EventKind::Move);
        let m2 = bus.on(EventKind::Move);
        assert_eq!(bus.listeners(EventKind::Move), vec![m1, m2]);
        assert_eq!(bus.listeners(EventKind::Data), vec![d]);
        assert!(bus.listeners(EventKind::Render).is_empty());
    }

    #[test]
    fn dropping_subscriptions_releases_every_listener() {
        let bus = EventBus::shared();
        {
            let mut subs = Subscriptions::new(&bus);
            subs.add(EventKind::Data);
            subs.add(EventKind::Move);
            subs.add(EventKind::MoveEnd);
            assert_eq!(bus.borrow().len(), 3);
        }
        assert!(bus.borrow().is_empty());
    }

    #[test]
    fn add_is_idempotent_per_kind() {
        let bus = EventBus::shared();
        let mut subs = Subscriptions::new(&bus);
        let a = subs.add(EventKind::Move);
        let b = subs.add(EventKind::Move);
        assert_eq!(a, b);
        assert_eq!(bus.borrow().len(), 1);
    }

    #[test]
    fn release_after_bus_dropped_is_noop() {
        let bus = EventBus::shared();
        let mut subs = Subscriptions::new(&bus);
        subs.add(EventKind::Data);
        drop(bus);
        subs.release();
        assert!(subs.is_empty());
        assert_eq!(subs.add(EventKind::Move), None);
    }

    #[test]
    fn handlers_gate_on_their_own_subscriptions() {
        let bus = EventBus::shared();
        let mut subs = Subscriptions::new(&bus);
        subs.add(EventKind::Data);

        let events = [
            MapEvent::source_data("q", true),
            MapEvent::Move,
            MapEvent::Render,
        ];
        let acted: Vec<_> = events.iter().filter(|e| subs.contains(e.kind())).collect();
        assert_eq!(acted, vec![&MapEvent::source_data("q", true)]);
        // the ledger still only records the registration
        assert_eq!(bus.borrow().listeners(EventKind::Move), Vec::new());
    }

    #[test]
    fn event_kinds() {
        assert_eq!(MapEvent::source_data("q", true).kind(), EventKind::Data);
        assert_eq!(MapEvent::MoveEnd.kind(), EventKind::MoveEnd);
    }
}
