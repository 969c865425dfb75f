//! Buffer with predicate-selective waiting.
//!
//! Waiters register a predicate and are woken by the first item that
//! matches it. An item that matches no waiter is buffered. Each item is
//! delivered to at most one waiter, in waiter registration order, so a
//! waiter whose predicate never matches cannot hold up later ones.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::trace;

/// Predicate used to select items.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct Waiter<T> {
    id: u64,
    predicate: Predicate<T>,
    tx: oneshot::Sender<T>,
}

struct State<T> {
    items: VecDeque<T>,
    waiters: Vec<Waiter<T>>,
    next_id: u64,
}

/// A concurrency-safe queue supporting selective, blocking retrieval.
pub struct SelectiveWaitQueue<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for SelectiveWaitQueue<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                waiters: Vec::new(),
                next_id: 0,
            }),
        }
    }
}

/// Registered waiter; unregisters itself and returns any item it was
/// handed but never yielded.
struct PendingGet<'a, T> {
    queue: &'a SelectiveWaitQueue<T>,
    id: u64,
    rx: oneshot::Receiver<T>,
    done: bool,
}

impl<T> Drop for PendingGet<'_, T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.rx.close();
        self.queue.remove_waiter(self.id);
        if let Ok(item) = self.rx.try_recv() {
            self.queue.put(item);
        }
    }
}

impl<T> SelectiveWaitQueue<T> {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand `item` to the earliest waiter whose predicate matches, or buffer it.
    pub fn put(&self, item: T) {
        let mut state = self.state.lock();
        let mut item = item;
        loop {
            state.waiters.retain(|w| !w.tx.is_closed());
            let Some(pos) = state.waiters.iter().position(|w| (w.predicate)(&item)) else {
                break;
            };
            let waiter = state.waiters.remove(pos);
            match waiter.tx.send(item) {
                Ok(()) => {
                    trace!(waiter = waiter.id, "item handed to waiter");
                    return;
                }
                Err(returned) => item = returned,
            }
        }
        state.items.push_back(item);
    }

    /// Wait until an item matching `predicate` is available.
    ///
    /// Buffered items are checked first, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing matched within `timeout`.
    pub async fn get(&self, predicate: Predicate<T>, timeout: Duration) -> Result<T> {
        let mut pending = {
            let mut state = self.state.lock();
            if let Some(pos) = state.items.iter().position(|i| predicate(i)) {
                if let Some(item) = state.items.remove(pos) {
                    return Ok(item);
                }
            }
            let (tx, rx) = oneshot::channel();
            let id = state.next_id;
            state.next_id += 1;
            state.waiters.push(Waiter { id, predicate, tx });
            PendingGet {
                queue: self,
                id,
                rx,
                done: false,
            }
        };

        match tokio::time::timeout(timeout, &mut pending.rx).await {
            Ok(Ok(item)) => {
                pending.done = true;
                Ok(item)
            }
            Ok(Err(_)) => Err(Error::Timeout),
            Err(_) => {
                pending.rx.close();
                if let Ok(item) = pending.rx.try_recv() {
                    pending.done = true;
                    return Ok(item);
                }
                trace!(waiter = pending.id, "wait timed out");
                Err(Error::Timeout)
            }
        }
    }

    /// Oldest buffered item matching `predicate`, without waiting.
    pub fn get_now(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let mut state = self.state.lock();
        let pos = state.items.iter().position(|i| predicate(i))?;
        state.items.remove(pos)
    }

    /// Remove and return every buffered item matching `predicate`, in order.
    pub fn get_all(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let mut state = self.state.lock();
        let (matched, rest): (VecDeque<T>, VecDeque<T>) =
            state.items.drain(..).partition(|i| predicate(i));
        state.items = rest;
        matched.into()
    }

    /// Remove and return every buffered item.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// `true` when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registered waiters still listening.
    #[must_use]
    pub fn waiting(&self) -> usize {
        let mut state = self.state.lock();
        state.waiters.retain(|w| !w.tx.is_closed());
        state.waiters.len()
    }

    fn remove_waiter(&self, id: u64) {
        self.state.lock().waiters.retain(|w| w.id != id);
    }
}
