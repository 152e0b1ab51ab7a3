//! Bounded blocking handoff from ingress threads to the engine.
//!
//! Many producers, one consumer. The engine processes commands strictly in
//! pop order, so this queue is the global serialization point of the
//! exchange. `stop()` wakes every blocked producer and the consumer; the
//! consumer then drains whatever is left before seeing end-of-stream.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::command::CommandRecord;

/// Push failed because the queue is shutting down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushError;

struct Inner {
    items: VecDeque<CommandRecord>,
    stopping: bool,
}

/// Bounded MPSC queue with blocking push/pop and stop/drain shutdown.
pub struct CommandQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl CommandQueue {
    /// Create a queue holding at most `capacity` pending commands.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(Inner { items: VecDeque::with_capacity(capacity), stopping: false }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Enqueue a command, blocking while the queue is full.
    ///
    /// Fails immediately once [`stop`] has been called, including for
    /// producers that were blocked waiting for space.
    ///
    /// [`stop`]: CommandQueue::stop
    pub fn push(&self, record: CommandRecord) -> Result<(), PushError> {
        let mut inner = self.inner.lock();
        while !inner.stopping && inner.items.len() >= self.capacity {
            self.not_full.wait(&mut inner);
        }
        if inner.stopping {
            return Err(PushError);
        }
        inner.items.push_back(record);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the next command, blocking while the queue is empty.
    ///
    /// Returns `None` only once [`stop`] has been called AND every queued
    /// command has been drained.
    ///
    /// [`stop`]: CommandQueue::stop
    pub fn pop(&self) -> Option<CommandRecord> {
        let mut inner = self.inner.lock();
        while !inner.stopping && inner.items.is_empty() {
            self.not_empty.wait(&mut inner);
        }
        let record = inner.items.pop_front();
        drop(inner);
        if record.is_some() {
            self.not_full.notify_one();
        }
        record
    }

    /// Mark the queue as shutting down and wake every waiter.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopping = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Number of commands currently waiting.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}
