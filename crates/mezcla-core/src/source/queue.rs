//! Per-source buffer queue.

use crate::Result;
use crate::error::Error;
use crate::id::BufferId;

/// Per-entry queue flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueState {
    /// The entry's buffer is fed by a callback.
    pub callback: bool,
}

/// One queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    /// Queued buffer, or [`BufferId::NONE`] for the placeholder.
    pub buffer: BufferId,
    /// Entry flags.
    pub state: QueueState,
}

impl QueueEntry {
    const PLACEHOLDER: QueueEntry = QueueEntry {
        buffer: BufferId::NONE,
        state: QueueState { callback: false },
    };
}

/// Ordered buffers a source plays through.
///
/// A fresh queue holds a single placeholder entry. The first append
/// overwrites it in place; later appends grow the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferQueue {
    entries: Vec<QueueEntry>,
    read_index: usize,
    write_index: usize,
    /// Entries counted as consumed once the queue ran out or was stopped.
    finished: Option<usize>,
}

impl Default for BufferQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferQueue {
    /// Creates a queue holding only the placeholder.
    pub fn new() -> Self {
        Self {
            entries: vec![QueueEntry::PLACEHOLDER],
            read_index: 0,
            write_index: 0,
            finished: None,
        }
    }

    /// Appends `buffer`, overwriting the placeholder if the write slot holds it.
    pub fn append(&mut self, buffer: BufferId, state: QueueState) -> Result<()> {
        let entry = QueueEntry { buffer, state };
        if self.entries[self.write_index].buffer.is_none() {
            self.entries[self.write_index] = entry;
            return Ok(());
        }
        self.entries.try_reserve(1)?;
        self.entries.push(entry);
        self.write_index = self.entries.len() - 1;
        Ok(())
    }

    /// Replaces the whole queue with a single entry.
    ///
    /// Returns the buffers that were queued before.
    pub fn set_single(&mut self, buffer: BufferId, state: QueueState) -> Vec<BufferId> {
        let old = self.buffers().collect();
        *self = Self::new();
        self.entries[0] = QueueEntry { buffer, state };
        old
    }

    /// Number of entries, placeholder included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a queue holds at least the placeholder.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in order.
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Real (non-placeholder) buffers in order.
    pub fn buffers(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.entries
            .iter()
            .map(|e| e.buffer)
            .filter(|b| !b.is_none())
    }

    /// Returns true if at least one real buffer is queued.
    pub fn has_buffer(&self) -> bool {
        self.buffers().next().is_some()
    }

    /// Number of real entries.
    pub fn queued(&self) -> usize {
        self.buffers().count()
    }

    /// Number of real entries fully consumed.
    ///
    /// While playing this is the number of entries before the read index.
    /// Once the queue has run out (or the source was stopped) every entry
    /// counts as processed.
    pub fn processed(&self) -> usize {
        let end = self.finished.unwrap_or(self.read_index).min(self.entries.len());
        self.entries[..end]
            .iter()
            .filter(|e| !e.buffer.is_none())
            .count()
    }

    /// Index of the entry being read.
    pub fn read_index(&self) -> usize {
        self.read_index
    }

    /// Index of the last written entry.
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Returns true once every entry has been consumed.
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Buffer of the entry being read.
    pub fn current(&self) -> BufferId {
        self.entries
            .get(self.read_index)
            .map_or(BufferId::NONE, |e| e.buffer)
    }

    /// Buffer of the entry after the one being read, if any.
    pub fn next(&self) -> Option<BufferId> {
        self.entries
            .get(self.read_index + 1)
            .map(|e| e.buffer)
            .filter(|b| !b.is_none())
    }

    /// Moves to the next entry. Returns false at the end of the queue.
    pub fn advance(&mut self) -> bool {
        if self.read_index + 1 < self.entries.len() {
            self.read_index += 1;
            true
        } else {
            false
        }
    }

    /// Moves reading back to the first entry.
    pub fn rewind(&mut self) {
        self.read_index = 0;
        self.finished = None;
    }

    /// Marks every current entry consumed. Entries appended later are not.
    pub fn finish(&mut self) {
        self.finished = Some(self.entries.len());
    }

    /// Removes the first `n` processed entries and returns their buffers.
    ///
    /// Fails with `InvalidValue` if fewer than `n` entries are processed.
    pub fn unqueue(&mut self, n: usize) -> Result<Vec<BufferId>> {
        if n > self.processed() {
            return Err(Error::InvalidValue("more buffers than processed"));
        }
        if n == 0 {
            return Ok(Vec::new());
        }
        let removed: Vec<BufferId> = self.entries.drain(..n).map(|e| e.buffer).collect();
        if self.entries.is_empty() {
            *self = Self::new();
        } else {
            self.read_index = self.read_index.saturating_sub(n);
            self.write_index = self.entries.len() - 1;
            self.finished = self.finished.map(|done| done - n);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: QueueState = QueueState { callback: false };

    #[test]
    fn fresh_queue_holds_placeholder() {
        let queue = BufferQueue::new();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.queued(), 0);
        assert!(queue.current().is_none());
        assert!(!queue.has_buffer());
    }

    #[test]
    fn first_append_overwrites_placeholder() {
        let mut queue = BufferQueue::new();
        queue.append(BufferId(5), S).unwrap();
        assert_eq!(queue.len(), 1);
        queue.append(BufferId(6), S).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.entries()[0].buffer, BufferId(5));
        assert_eq!(queue.entries()[1].buffer, BufferId(6));
        assert_eq!(queue.write_index(), 1);
    }

    #[test]
    fn processed_follows_read_index_then_finish() {
        let mut queue = BufferQueue::new();
        for id in 1..=3 {
            queue.append(BufferId(id), S).unwrap();
        }
        assert_eq!(queue.processed(), 0);
        assert!(queue.advance());
        assert_eq!(queue.processed(), 1);
        assert_eq!(queue.next(), Some(BufferId(3)));
        assert!(queue.advance());
        assert!(!queue.advance());
        assert_eq!(queue.processed(), 2);
        queue.finish();
        assert_eq!(queue.processed(), 3);
    }

    #[test]
    fn unqueue_only_processed() {
        let mut queue = BufferQueue::new();
        queue.append(BufferId(1), S).unwrap();
        queue.append(BufferId(2), S).unwrap();
        queue.advance();
        assert_eq!(
            queue.unqueue(2),
            Err(Error::InvalidValue("more buffers than processed"))
        );
        assert_eq!(queue.unqueue(1).unwrap(), vec![BufferId(1)]);
        assert_eq!(queue.current(), BufferId(2));
        assert_eq!(queue.read_index(), 0);
    }

    #[test]
    fn unqueue_everything_restores_placeholder() {
        let mut queue = BufferQueue::new();
        queue.append(BufferId(1), S).unwrap();
        queue.finish();
        assert_eq!(queue.unqueue(1).unwrap(), vec![BufferId(1)]);
        assert_eq!(queue, BufferQueue::new());
        queue.append(BufferId(9), S).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn append_after_finish_is_not_processed() {
        let mut queue = BufferQueue::new();
        queue.append(BufferId(1), S).unwrap();
        queue.finish();
        queue.append(BufferId(2), S).unwrap();
        assert_eq!(queue.processed(), 1);
        assert_eq!(queue.unqueue(1).unwrap(), vec![BufferId(1)]);
        assert_eq!(queue.processed(), 0);
        assert_eq!(queue.current(), BufferId(2));
    }

    #[test]
    fn set_single_replaces_queue() {
        let mut queue = BufferQueue::new();
        queue.append(BufferId(1), S).unwrap();
        queue.append(BufferId(2), S).unwrap();
        let old = queue.set_single(BufferId(7), S);
        assert_eq!(old, vec![BufferId(1), BufferId(2)]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current(), BufferId(7));

        queue.set_single(BufferId::NONE, S);
        assert!(!queue.has_buffer());
    }
}
