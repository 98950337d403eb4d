//! Replication primitives shared by the authority and its participants.
//!
//! Two channels are kept apart on purpose:
//! - a reconciled channel ([`Replicated`] on the authority, [`Reconciled`] on
//!   participants) that always converges on the latest authoritative value and
//!   tolerates lost or reordered updates through a version number;
//! - an event channel ([`EventQueue`] / [`EventCursor`]) of one-shot, ordered
//!   notifications that are never reconciled or replayed.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Where a cross-process operation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Only the authoritative server evaluates it.
    Authority,
    /// Every participant receives it, including the one that caused it.
    AllParticipants,
}

/// Authority-side value that participants mirror.
///
/// Each change bumps the version so receivers can discard stale copies.
#[derive(Debug, Clone)]
pub struct Replicated<T> {
    value: T,
    version: u32,
    dirty: bool,
}

impl<T: Clone + PartialEq> Replicated<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            version: 0,
            dirty: false,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Stores `value`. Writing an equal value is not a change.
    pub fn set(&mut self, value: T) {
        if self.value != value {
            self.value = value;
            self.version = self.version.wrapping_add(1);
            self.dirty = true;
        }
    }

    /// Applies `f` to a copy of the value and stores the result.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) {
        let mut next = self.value.clone();
        f(&mut next);
        self.set(next);
    }

    /// Returns the value if it changed since the last call.
    pub fn take_update(&mut self) -> Option<(u32, T)> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.snapshot())
    }

    pub fn snapshot(&self) -> (u32, T) {
        (self.version, self.value.clone())
    }
}

/// Participant-side mirror of a [`Replicated`] value. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct Reconciled<T> {
    latest: Option<(u32, T)>,
}

impl<T: Clone + PartialEq> Reconciled<T> {
    pub fn new() -> Self {
        Self { latest: None }
    }

    pub fn get(&self) -> Option<&T> {
        self.latest.as_ref().map(|(_, value)| value)
    }

    pub fn version(&self) -> Option<u32> {
        self.latest.as_ref().map(|(version, _)| *version)
    }

    /// Accepts `value` if `version` is newer than what we hold.
    ///
    /// Returns the previous value when the update was accepted and the value
    /// actually differs, so callers can raise change notifications.
    pub fn apply(&mut self, version: u32, value: T) -> Option<Option<T>> {
        let (stale, unchanged) = match &self.latest {
            Some((current, previous)) => (version <= *current, *previous == value),
            None => (false, false),
        };
        if stale {
            return None;
        }

        let previous = self.latest.replace((version, value)).map(|(_, previous)| previous);
        if unchanged {
            None
        } else {
            Some(previous)
        }
    }
}

/// An event tagged with its position in the broadcast order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequenced<E> {
    pub sequence: u32,
    pub event: E,
}

/// Authority-side queue of one-shot notifications awaiting broadcast.
#[derive(Debug, Clone)]
pub struct EventQueue<E> {
    next_sequence: u32,
    pending: VecDeque<Sequenced<E>>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            next_sequence: 1,
            pending: VecDeque::new(),
        }
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: E) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.pending.push_back(Sequenced { sequence, event });
    }

    /// Removes and returns every pending event in broadcast order.
    pub fn drain(&mut self) -> Vec<Sequenced<E>> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Participant-side filter that delivers each sequence number at most once and
/// never goes backwards.
#[derive(Debug, Clone, Default)]
pub struct EventCursor {
    last_seen: Option<u32>,
}

impl EventCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, sequence: u32) -> bool {
        match self.last_seen {
            Some(last) if sequence <= last => false,
            _ => {
                self.last_seen = Some(sequence);
                true
            }
        }
    }

    pub fn last_seen(&self) -> Option<u32> {
        self.last_seen
    }
}
