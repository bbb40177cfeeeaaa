//! Bounded ring buffer of recent events

use std::collections::VecDeque;

use crate::event::StreamEvent;
use crate::subscription::CollectionFilter;

#[derive(Debug)]
pub(crate) struct EventBuffer {
    events: VecDeque<StreamEvent>,
    capacity: usize,
}

impl EventBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(&mut self, event: StreamEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Up to `limit` most recent events accepted by `filter`, newest first
    pub(crate) fn recent(&self, limit: usize, filter: &CollectionFilter) -> Vec<StreamEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn event(sequence: u64) -> StreamEvent {
        StreamEvent {
            did: "did:plc:a".into(),
            sequence,
            kind: EventKind::Identity,
            commit: None,
        }
    }

    #[test]
    fn test_evicts_oldest() {
        let mut buffer = EventBuffer::new(3);
        for n in 1..=5 {
            buffer.push(event(n));
        }
        assert_eq!(buffer.len(), 3);
        let seqs: Vec<u64> = buffer
            .recent(10, &CollectionFilter::default())
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(seqs, vec![5, 4, 3]);
    }

    #[test]
    fn test_limit() {
        let mut buffer = EventBuffer::new(10);
        for n in 1..=5 {
            buffer.push(event(n));
        }
        assert_eq!(buffer.recent(2, &CollectionFilter::default()).len(), 2);
    }
}
