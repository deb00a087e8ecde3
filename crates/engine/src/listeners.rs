//! Listener traits through which the engine reports back to the field layer.
//!
//! Every listener kind is a broadcast: all registered listeners are called,
//! in registration order. Registration hands out a [`ListenerId`]; the field
//! layer removes its listeners with it when the field is torn down.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Value;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receives `(field, value)` whenever a calculated field changes.
pub trait CalculationListener {
    fn on_calculation_changed(&mut self, field: &str, value: &Value);
}

impl<F: FnMut(&str, &Value)> CalculationListener for F {
    fn on_calculation_changed(&mut self, field: &str, value: &Value) {
        self(field, value)
    }
}

/// Receives visibility toggles produced by VISIBILITY rules.
pub trait VisibilityListener {
    fn on_visibility_changed(&mut self, field: &str, visible: bool);
}

impl<F: FnMut(&str, bool)> VisibilityListener for F {
    fn on_visibility_changed(&mut self, field: &str, visible: bool) {
        self(field, visible)
    }
}

/// Receives the outcome of a field's validation. `None` means valid.
pub trait ValidationListener {
    fn on_validation(&mut self, field: &str, error: Option<&str>);
}

impl<F: FnMut(&str, Option<&str>)> ValidationListener for F {
    fn on_validation(&mut self, field: &str, error: Option<&str>) {
        self(field, error)
    }
}

/// Registration-ordered set of boxed listeners.
pub struct ListenerSet<L: ?Sized> {
    entries: Vec<(ListenerId, Box<L>)>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn add(&mut self, listener: Box<L>) -> ListenerId {
        let id = ListenerId::next();
        self.entries.push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if the id is not registered here.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<L>> {
        self.entries.iter_mut().map(|(_, l)| l)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
