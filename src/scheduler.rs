//! Event queue.
//!
//! A single double-ended queue. New work goes to the back; events replayed
//! after an ARP resolution go to the front, ahead of anything queued before
//! them, and keep the order they were buffered in.

use serde::Serialize;
use std::collections::VecDeque;

use crate::event::Event;

/// Pending events in dispatch order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Appends events in order.
    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    /// Puts `events` at the head of the queue, first element first.
    pub fn replay_front(&mut self, events: Vec<Event>) {
        for event in events.into_iter().rev() {
            self.events.push_front(event);
        }
    }

    pub fn pop_front(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn front(&self) -> Option<&Event> {
        self.events.front()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}
