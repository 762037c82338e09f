//! Deferred destruction of GPU objects.
//!
//! Destroying a resource the GPU may still read is undefined behavior, so
//! destruction is recorded as a pending action and executed at a safe point:
//! per-slot queues flush when the slot's fence proves the GPU is done with
//! the previous use, the global queue flushes once at shutdown behind a
//! device-idle barrier.

/// LIFO queue of pending destruction actions.
///
/// Entries run in reverse registration order so dependents die before their
/// dependencies (view before image, set before pool); callers must therefore
/// register in creation order. Actions must not call `defer` on the queue
/// being flushed.
#[derive(Default)]
pub struct DeletionQueue {
    deletors: Vec<Box<dyn FnOnce() + Send>>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a destruction action. O(1) append.
    pub fn defer(&mut self, action: impl FnOnce() + Send + 'static) {
        self.deletors.push(Box::new(action));
    }

    /// Execute all pending actions newest-first and leave the queue empty.
    pub fn flush(&mut self) {
        while let Some(action) = self.deletors.pop() {
            action();
        }
    }

    pub fn len(&self) -> usize {
        self.deletors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deletors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn flush_runs_in_reverse_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut queue = DeletionQueue::new();

        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            queue.defer(move || order.lock().unwrap().push(name));
        }

        queue.flush();
        assert_eq!(*order.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn flush_is_exhaustive() {
        let mut queue = DeletionQueue::new();
        queue.defer(|| {});
        queue.defer(|| {});

        queue.flush();
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_on_empty_queue_is_noop() {
        let mut queue = DeletionQueue::new();
        queue.flush();
        assert!(queue.is_empty());
    }

    #[test]
    fn entries_after_flush_are_new_registrations_only() {
        let count = Arc::new(Mutex::new(0_u32));
        let mut queue = DeletionQueue::new();

        let c = Arc::clone(&count);
        queue.defer(move || *c.lock().unwrap() += 1);
        queue.flush();

        let c = Arc::clone(&count);
        queue.defer(move || *c.lock().unwrap() += 10);
        queue.flush();

        assert_eq!(*count.lock().unwrap(), 11);
        assert!(queue.is_empty());
    }
}
