//! Subscription registry for push/stream frames.
//!
//! At most one callback per method id; a later registration replaces the
//! earlier one.  Entries are removed only by `unsubscribe`.

use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;

/// Push callback invoked with each decoded frame.
pub type Callback = Rc<dyn Fn(Value)>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    callbacks: HashMap<u8, Callback>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `cb` for `method_id`.  Returns `true` if it replaced an
    /// existing callback.
    pub fn subscribe(&mut self, method_id: u8, cb: Callback) -> bool {
        self.callbacks.insert(method_id, cb).is_some()
    }

    /// Returns `true` if a callback was removed.
    pub fn unsubscribe(&mut self, method_id: u8) -> bool {
        self.callbacks.remove(&method_id).is_some()
    }

    /// Clone out the callback so it can run without the registry borrowed.
    pub fn get(&self, method_id: u8) -> Option<Callback> {
        self.callbacks.get(&method_id).cloned()
    }

    pub fn contains(&self, method_id: u8) -> bool {
        self.callbacks.contains_key(&method_id)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
