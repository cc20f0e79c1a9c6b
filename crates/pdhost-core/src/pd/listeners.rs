//! Per-instance listener registries
//!
//! Callbacks are cloned out of the registry before they run, so a
//! listener may register, remove or send on its own instance.

use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub(crate) struct Registry<E> {
    next_id: u64,
    callbacks: Vec<(ListenerId, Callback<E>)>,
    senders: Vec<Sender<E>>,
}

impl<E: Clone> Registry<E> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            callbacks: Vec::new(),
            senders: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, callback: Callback<E>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, callback));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    pub(crate) fn subscribe(&mut self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.len() + self.senders.len()
    }

    /// Push events to channel subscribers (dropping closed ones) and
    /// return the callbacks to run once the lock is released
    pub(crate) fn prepare(&mut self, events: &[E]) -> Vec<Callback<E>> {
        if !events.is_empty() {
            self.senders
                .retain(|tx| events.iter().all(|e| tx.send(e.clone()).is_ok()));
        }
        self.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.callbacks.clear();
        self.senders.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_add_remove() {
        let mut registry: Registry<i32> = Registry::new();
        let id = registry.add(Arc::new(|_| {}));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let mut registry: Registry<i32> = Registry::new();
        let kept = registry.subscribe();
        let dropped = registry.subscribe();
        drop(dropped);

        registry.prepare(&[7]);
        assert_eq!(registry.len(), 1);
        assert_eq!(kept.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_prepare_returns_callbacks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry: Registry<i32> = Registry::new();
        let counter = Arc::clone(&hits);
        registry.add(Arc::new(move |v| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        }));

        for cb in registry.prepare(&[3]) {
            cb(&3);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
