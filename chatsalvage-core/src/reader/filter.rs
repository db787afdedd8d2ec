//! Pushdown selection shared by both exact readers.
//!
//! Messages are offered one at a time in source order. A bare tail query keeps
//! a ring buffer of `limit` elements; any other query keeps every match and
//! applies `limit` as a final tail truncation.

use crate::types::{FilterSpec, Message};
use std::collections::VecDeque;

/// Upper bound on ring buffer preallocation; the buffer still grows to `limit`.
const MAX_PREALLOCATED: usize = 1024;

enum Retained {
    /// Bare tail-limit: O(limit) memory
    Ring { capacity: usize, items: VecDeque<Message> },
    /// Filtered query (or no limit): O(matches) memory
    Matches(Vec<Message>),
}

/// Incremental application of a [`FilterSpec`].
///
/// `since` acts as a cursor over array order: the first element whose own
/// timestamp is at or after `since` opens the window, and every later element
/// is inside it regardless of its timestamp.
pub struct Selection<'a> {
    filter: &'a FilterSpec,
    needle: Option<String>,
    since_open: bool,
    retained: Retained,
    offered: usize,
}

impl<'a> Selection<'a> {
    pub fn new(filter: &'a FilterSpec) -> Self {
        let retained = match filter.limit {
            Some(capacity) if filter.is_tail_only() => Retained::Ring {
                capacity,
                items: VecDeque::with_capacity(capacity.min(MAX_PREALLOCATED)),
            },
            _ => Retained::Matches(Vec::new()),
        };

        Self {
            filter,
            needle: filter
                .search_term
                .as_ref()
                .map(|term| term.to_lowercase()),
            since_open: filter.since.is_none(),
            retained,
            offered: 0,
        }
    }

    /// Consider the next message in source order.
    pub fn offer(&mut self, message: Message) {
        self.offered += 1;

        if !self.since_open {
            let since = self.filter.since.unwrap_or(i64::MIN);
            if message.timestamp.is_some_and(|ts| ts >= since) {
                self.since_open = true;
            } else {
                return;
            }
        }

        if let Some(needle) = &self.needle {
            if !message.text().to_lowercase().contains(needle.as_str()) {
                return;
            }
        }

        if let Some(predicate) = &self.filter.predicate {
            if !predicate(&message) {
                return;
            }
        }

        match &mut self.retained {
            Retained::Ring { capacity, items } => {
                if *capacity == 0 {
                    return;
                }
                if items.len() == *capacity {
                    items.pop_front();
                }
                items.push_back(message);
            }
            Retained::Matches(items) => items.push(message),
        }
    }

    /// Number of elements offered so far.
    pub fn offered(&self) -> usize {
        self.offered
    }

    /// Number of elements currently held.
    pub fn retained(&self) -> usize {
        match &self.retained {
            Retained::Ring { items, .. } => items.len(),
            Retained::Matches(items) => items.len(),
        }
    }

    /// Selected messages, oldest first.
    pub fn finish(self) -> Vec<Message> {
        match self.retained {
            Retained::Ring { items, .. } => items.into(),
            Retained::Matches(mut items) => {
                if let Some(limit) = self.filter.limit {
                    if items.len() > limit {
                        items.drain(..items.len() - limit);
                    }
                }
                items
            }
        }
    }
}

/// Apply a filter to an in-memory message sequence.
pub fn select<I>(messages: I, filter: &FilterSpec) -> Vec<Message>
where
    I: IntoIterator<Item = Message>,
{
    let mut selection = Selection::new(filter);
    for message in messages {
        selection.offer(message);
    }
    selection.finish()
}
