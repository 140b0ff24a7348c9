//! Bounded per-partition queue that coalesces by (entity, source).
//!
//! A pending observation is replaced by a newer one for the same entity and
//! source, so a burst for one entity occupies at most one slot per source.
//! The replacement moves to the back of the queue, which keeps pops in
//! arrival order across sources. When the queue is full the oldest slot is
//! dropped to make room.

use crate::models::observation::{SourceName, SourceObservation};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Enqueued,
    /// Replaced a pending observation of the same entity and source.
    Coalesced,
    /// Queue was full; the returned observation was discarded.
    DroppedOldest(SourceObservation),
    Closed,
}

type Key = (String, SourceName);

#[derive(Debug, Default)]
struct Inner {
    slots: VecDeque<(u64, Key)>,
    pending: HashMap<Key, (u64, SourceObservation)>,
    next_seq: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct CoalescingQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl CoalescingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Queue state stays consistent across a panic in another holder.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, observation: SourceObservation) -> PushOutcome {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return PushOutcome::Closed;
            }

            let key = (observation.entity.clone(), observation.source);
            if let Some((old_seq, pending_ts)) =
                inner.pending.get(&key).map(|(s, p)| (*s, p.timestamp))
            {
                if observation.timestamp >= pending_ts {
                    // The replacement takes the newest slot so pops stay in arrival order.
                    if let Some(pos) = inner.slots.iter().position(|(s, _)| *s == old_seq) {
                        inner.slots.remove(pos);
                    }
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner.slots.push_back((seq, key.clone()));
                    inner.pending.insert(key, (seq, observation));
                }
                PushOutcome::Coalesced
            } else {
                let mut dropped = None;
                while inner.pending.len() >= self.capacity {
                    let Some((seq, oldest)) = inner.slots.pop_front() else {
                        break;
                    };
                    if inner.pending.get(&oldest).is_some_and(|(s, _)| *s == seq) {
                        dropped = inner.pending.remove(&oldest).map(|(_, obs)| obs);
                    }
                }

                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.slots.push_back((seq, key.clone()));
                inner.pending.insert(key, (seq, observation));

                match dropped {
                    Some(observation) => PushOutcome::DroppedOldest(observation),
                    None => PushOutcome::Enqueued,
                }
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Oldest pending observation, if any.
    pub fn pop(&self) -> Option<SourceObservation> {
        let mut inner = self.lock();
        while let Some((seq, key)) = inner.slots.pop_front() {
            if inner.pending.get(&key).is_some_and(|(s, _)| *s == seq) {
                return inner.pending.remove(&key).map(|(_, observation)| observation);
            }
        }
        None
    }

    /// Wait for the next observation; `None` once closed and drained.
    pub async fn recv(&self) -> Option<SourceObservation> {
        loop {
            let notified = self.notify.notified();
            if let Some(observation) = self.pop() {
                return Some(observation);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Remove every pending observation of `entity`.
    pub fn purge(&self, entity: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner.pending.retain(|(e, _), _| e != entity);
        let removed = before - inner.pending.len();
        if removed > 0 {
            inner.slots.retain(|(_, (e, _))| e != entity);
        }
        removed
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
