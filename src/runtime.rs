//! Cooperative single-threaded event loop.
//!
//! Stores never invoke callbacks from inside `listen`/`write`; they post tasks
//! here and the owner of the loop drains them. This gives every delivery a
//! well-defined point on the loop, after the call that caused it returned.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Task queue drained by [`EventLoop::run_until_idle`].
pub struct EventLoop {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Handle for posting tasks onto this loop.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            sender: self.sender.clone(),
        }
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Run one queued task. Returns false if the queue was empty.
    pub fn run_once(&self) -> bool {
        match self.receiver.try_recv() {
            Ok(task) => {
                task();
                true
            }
            Err(_) => false,
        }
    }

    /// Run tasks, including ones posted while running, until the queue is
    /// empty. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable sender side of an [`EventLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    sender: Sender<Task>,
}

impl LoopHandle {
    /// Queue a task. Tasks posted after the loop is dropped are discarded.
    pub fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(task)).is_err() {
            tracing::debug!("event loop gone, task discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_tasks_run_in_order() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = Arc::clone(&seen);
            handle.spawn(move || seen.lock().push(i));
        }

        assert_eq!(event_loop.pending(), 3);
        assert_eq!(event_loop.run_until_idle(), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_nested_spawn_drained() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let count = Arc::new(AtomicUsize::new(0));

        let inner_handle = handle.clone();
        let inner_count = Arc::clone(&count);
        handle.spawn(move || {
            inner_count.fetch_add(1, Ordering::SeqCst);
            let again = Arc::clone(&inner_count);
            inner_handle.spawn(move || {
                again.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(event_loop.run_until_idle(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
