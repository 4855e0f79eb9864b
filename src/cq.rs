//! Completion queues.
//!
//! A completion queue is the single delivery channel for asynchronous
//! outcomes: every accepted batch eventually produces exactly one event here.
//! Events are FIFO by push time across all producers. The queue mutex is a
//! leaf lock: producers never hold any other lock while pushing, and nothing
//! performs I/O under it.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::status::{Deadline, Event, Tag};

#[derive(Debug, Default)]
struct CqInner {
    queue: VecDeque<Event>,
    shutdown: bool,
}

#[derive(Debug, Default)]
pub struct CompletionQueue {
    inner: Mutex<CqInner>,
    ready: Condvar,
}

impl CompletionQueue {
    pub fn new() -> CompletionQueue {
        CompletionQueue::default()
    }

    /// Append an event and wake one waiter. Pushing to a shut-down queue is
    /// permitted; drained events are still delivered before the shutdown
    /// event.
    pub fn push(&self, event: Event) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_back(event);
        self.ready.notify_one();
    }

    /// Block until any event is available or the deadline passes.
    ///
    /// Returns a `Timeout` event on deadline expiry and a `Shutdown` event
    /// once the queue is shut down and drained.
    pub fn next(&self, deadline: Deadline) -> Event {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(event) = inner.queue.pop_front() {
                return event;
            }
            if inner.shutdown {
                return Event::shutdown();
            }
            match deadline.remaining() {
                Some(timeout) => {
                    if timeout.is_zero() {
                        return Event::timeout();
                    }
                    let (guard, _) = self.ready.wait_timeout(inner, timeout).unwrap();
                    inner = guard;
                }
                None => {
                    inner = self.ready.wait(inner).unwrap();
                }
            }
        }
    }

    /// Block until an event carrying `tag` is available or the deadline
    /// passes. Other queued events keep their relative order.
    pub fn pluck(&self, tag: Tag, deadline: Deadline) -> Event {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let found = inner.queue.iter().position(|e| e.tag == tag);
            if let Some(event) = found.and_then(|pos| inner.queue.remove(pos)) {
                return event;
            }
            if inner.shutdown && inner.queue.is_empty() {
                return Event::shutdown();
            }
            match deadline.remaining() {
                Some(timeout) => {
                    if timeout.is_zero() {
                        return Event::timeout();
                    }
                    let (guard, _) = self.ready.wait_timeout(inner, timeout).unwrap();
                    inner = guard;
                }
                None => {
                    inner = self.ready.wait(inner).unwrap();
                }
            }
        }
    }

    /// Mark the queue shut down and wake every waiter. Waiters observe any
    /// remaining queued events first, then a single `Shutdown` event each.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shutdown = true;
        self.ready.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().unwrap().shutdown
    }

    /// Discard any residual events.
    pub fn drain(&self) {
        self.inner.lock().unwrap().queue.clear();
    }
}
