use crate::model::ModelType;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Raised when the cached set of models of one type has changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelChanged {
  /// The type whose cached entries changed.
  pub model_type: ModelType,
}

impl ModelChanged {
  pub fn new(model_type: ModelType) -> Self {
    Self { model_type }
  }
}

impl fmt::Display for ModelChanged {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "models of type {} changed", self.model_type)
  }
}

/// A listener that can be subscribed to a store or service to be told when
/// the models of a type change.
///
/// `on_change` is called synchronously on the thread that performed the
/// change, after all cache locks have been released.
pub trait ChangeListener: Send + Sync {
  fn on_change(&self, event: &ModelChanged);
}

impl<F> ChangeListener for F
where
  F: Fn(&ModelChanged) + Send + Sync,
{
  fn on_change(&self, event: &ModelChanged) {
    self(event)
  }
}

/// Identifies a subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A subscriber list that tolerates concurrent subscribe/unsubscribe while
/// events are being delivered.
///
/// Delivery iterates a snapshot taken under the read lock, so a listener may
/// unsubscribe itself (or others) from inside `on_change`.
pub(crate) struct Listeners {
  next_id: AtomicU64,
  entries: RwLock<Vec<(SubscriptionId, Arc<dyn ChangeListener>)>>,
}

impl Listeners {
  pub(crate) fn new() -> Self {
    Self {
      next_id: AtomicU64::new(1),
      entries: RwLock::new(Vec::new()),
    }
  }

  pub(crate) fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> SubscriptionId {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self.entries.write().push((id, listener));
    id
  }

  pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut entries = self.entries.write();
    let before = entries.len();
    entries.retain(|(entry_id, _)| *entry_id != id);
    entries.len() != before
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub(crate) fn notify(&self, event: &ModelChanged) {
    let snapshot: Vec<Arc<dyn ChangeListener>> = self
      .entries
      .read()
      .iter()
      .map(|(_, listener)| Arc::clone(listener))
      .collect();

    for listener in snapshot {
      listener.on_change(event);
    }
  }
}

impl fmt::Debug for Listeners {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Listeners")
      .field("subscribers", &self.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  struct Order;

  #[test]
  fn delivers_to_every_subscriber() {
    let listeners = Listeners::new();
    let count = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
      let count = count.clone();
      listeners.subscribe(Arc::new(move |_: &ModelChanged| {
        count.fetch_add(1, Ordering::SeqCst);
      }));
    }

    listeners.notify(&ModelChanged::new(ModelType::of::<Order>()));
    assert_eq!(count.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn unsubscribe_stops_delivery() {
    let listeners = Listeners::new();
    let count = Arc::new(AtomicUsize::new(0));
    let id = {
      let count = count.clone();
      listeners.subscribe(Arc::new(move |_: &ModelChanged| {
        count.fetch_add(1, Ordering::SeqCst);
      }))
    };

    assert!(listeners.unsubscribe(id));
    assert!(!listeners.unsubscribe(id));
    listeners.notify(&ModelChanged::new(ModelType::of::<Order>()));
    assert_eq!(count.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn listener_can_unsubscribe_itself_during_delivery() {
    let listeners = Arc::new(Listeners::new());
    let own_id = Arc::new(parking_lot::Mutex::new(None));
    let weak = Arc::downgrade(&listeners);
    let own = own_id.clone();
    let id = listeners.subscribe(Arc::new(move |_: &ModelChanged| {
      let id = *own.lock();
      if let (Some(listeners), Some(id)) = (weak.upgrade(), id) {
        listeners.unsubscribe(id);
      }
    }));
    *own_id.lock() = Some(id);

    listeners.notify(&ModelChanged::new(ModelType::of::<Order>()));
    assert_eq!(listeners.len(), 0);
  }
}
