use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::ids::FeatureId;

pub type OverlayMap<T> = BTreeMap<FeatureId, Rc<T>>;

/// Result of one carry-over step.
#[derive(Debug)]
pub struct CarryOver<E> {
    /// `false` when the published map is the very same `Rc` as before.
    pub changed: bool,
    pub created: usize,
    pub reused: usize,
    pub dropped: usize,
    pub rejected: Vec<(FeatureId, E)>,
}

/// Identity-keyed overlay elements, replaced wholesale on every update.
///
/// Each update builds a fresh map, moving over the `Rc` of every identity
/// that is still present and creating elements only for new identities. When
/// the identity set is unchanged the previous map is kept, so callers can use
/// `Rc::ptr_eq` on [`RetainedOverlays::published`] to skip re-rendering.
#[derive(Debug)]
pub struct RetainedOverlays<T> {
    current: Rc<OverlayMap<T>>,
}

impl<T> Default for RetainedOverlays<T> {
    fn default() -> Self {
        Self {
            current: Rc::new(BTreeMap::new()),
        }
    }
}

impl<T> RetainedOverlays<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> &Rc<OverlayMap<T>> {
        &self.current
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Rc<T>> {
        self.current.get(id)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn clear(&mut self) {
        if !self.current.is_empty() {
            self.current = Rc::new(BTreeMap::new());
        }
    }

    /// Replaces the map with one mirroring `entries`.
    ///
    /// Repeated identities keep their first occurrence. A failed `create`
    /// leaves that identity out of the new map and reports it in
    /// [`CarryOver::rejected`].
    pub fn carry_over<S, I, C, E>(&mut self, entries: I, mut create: C) -> CarryOver<E>
    where
        I: IntoIterator<Item = (FeatureId, S)>,
        C: FnMut(S) -> Result<T, E>,
    {
        let prev = &self.current;
        let mut next: OverlayMap<T> = BTreeMap::new();
        let mut created = 0;
        let mut reused = 0;
        let mut rejected = Vec::new();

        for (id, source) in entries {
            if next.contains_key(&id) {
                continue;
            }
            if let Some(existing) = prev.get(&id) {
                next.insert(id, Rc::clone(existing));
                reused += 1;
                continue;
            }
            match create(source) {
                Ok(element) => {
                    next.insert(id, Rc::new(element));
                    created += 1;
                }
                Err(e) => rejected.push((id, e)),
            }
        }

        let dropped = prev.len() - reused;
        let changed = created > 0 || next.len() != prev.len();
        if changed {
            self.current = Rc::new(next);
        }

        CarryOver {
            changed,
            created,
            reused,
            dropped,
            rejected,
        }
    }
}
