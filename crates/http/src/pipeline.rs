//! Reordering of pipelined responses.
//!
//! Handlers for pipelined requests may finish in any order, but responses must go out in the
//! order the requests arrived. Finished responses wait in a [`PipelineQueue`], a min-heap keyed
//! by the pipelining sequence, until every lower sequence has been written.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::protocol::{PipelineError, Sequenced};

struct Entry<T> {
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

/// A min-heap of sequenced items.
///
/// Items go in as they finish and come out lowest sequence first; [`dequeue_next`](Self::dequeue_next)
/// only releases the item whose turn it is.
pub struct PipelineQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
}

impl<T> Default for PipelineQueue<T> {
    fn default() -> Self {
        Self { heap: BinaryHeap::new() }
    }
}

impl<T: Sequenced> PipelineQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { heap: BinaryHeap::with_capacity(capacity) }
    }

    /// Adds an item, keyed by its pipelining sequence.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingSequence`] if the item carries no sequence. Such an
    /// item can't be ordered and is handed back to nobody.
    pub fn enqueue(&mut self, item: T) -> Result<(), PipelineError> {
        let sequence = item.sequence().ok_or(PipelineError::MissingSequence)?;
        self.heap.push(Reverse(Entry { sequence, item }));
        Ok(())
    }

    /// Removes the item with the lowest sequence.
    pub fn dequeue(&mut self) -> Option<T> {
        self.heap.pop().map(|Reverse(entry)| entry.item)
    }

    /// Removes the item with the lowest sequence only when that sequence is `expected`.
    pub fn dequeue_next(&mut self, expected: u64) -> Option<T> {
        if self.peek_sequence() == Some(expected) { self.dequeue() } else { None }
    }

    pub fn peek_sequence(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(entry)| entry.sequence)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> std::fmt::Debug for PipelineQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sequences: Vec<u64> = self.heap.iter().map(|Reverse(entry)| entry.sequence).collect();
        sequences.sort_unstable();
        f.debug_struct("PipelineQueue").field("sequences", &sequences).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HttpResponse;

    fn response(sequence: u64) -> HttpResponse {
        let mut response = HttpResponse::ok();
        response.set_sequence(sequence);
        response
    }

    #[test]
    fn dequeues_in_sequence_order() {
        let mut queue = PipelineQueue::new();
        for sequence in [3, 0, 4, 1, 2] {
            queue.enqueue(response(sequence)).unwrap();
        }
        assert_eq!(queue.len(), 5);

        let order: Vec<_> = std::iter::from_fn(|| queue.dequeue()).map(|response| response.sequence()).collect();
        assert_eq!(order, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeue_next_waits_for_gaps() {
        let mut queue = PipelineQueue::new();
        queue.enqueue(response(2)).unwrap();
        queue.enqueue(response(1)).unwrap();

        assert!(queue.dequeue_next(0).is_none());
        assert_eq!(queue.peek_sequence(), Some(1));

        queue.enqueue(response(0)).unwrap();
        let mut expected = 0;
        while let Some(response) = queue.dequeue_next(expected) {
            assert_eq!(response.sequence(), Some(expected));
            expected += 1;
        }
        assert_eq!(expected, 3);
    }

    #[test]
    fn rejects_unsequenced_items() {
        let mut queue = PipelineQueue::new();
        assert_eq!(queue.enqueue(HttpResponse::ok()), Err(PipelineError::MissingSequence));
        assert!(queue.is_empty());
    }
}
