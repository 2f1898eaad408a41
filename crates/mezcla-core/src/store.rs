//! The buffer store: every live buffer plus its reference bookkeeping.
//!
//! References come in two flavours. A source holds a *queued* reference for
//! each queue entry naming the buffer and converts one of them into a
//! *current* reference while it is playing that entry. The four mutating
//! operations below are the only places either set changes:
//!
//! | op        | queued | current |
//! |-----------|--------|---------|
//! | `attach`  | +1     |         |
//! | `detach`  | -1     |         |
//! | `promote` | -1     | +1      |
//! | `demote`  | +1     | -1      |
//!
//! A buffer deleted while referenced is kept with `pending_delete` set and
//! reclaimed by whichever of these operations drops its last reference.

use std::collections::BTreeMap;

use crate::Result;
use crate::buffer::Buffer;
use crate::error::Error;
use crate::id::{BufferId, SourceKey};

/// All buffers of an engine runtime.
#[derive(Debug)]
pub struct BufferStore {
    buffers: BTreeMap<BufferId, Buffer>,
    next_id: u32,
}

impl Default for BufferStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferStore {
    /// Creates an empty store. Ids start at 1.
    pub const fn new() -> Self {
        Self {
            buffers: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Creates `n` buffers, all or nothing.
    pub fn generate(&mut self, n: usize) -> Result<Vec<BufferId>> {
        let last = u32::try_from(n)
            .ok()
            .and_then(|n| self.next_id.checked_add(n))
            .ok_or(Error::OutOfMemory)?;
        let mut ids = Vec::new();
        ids.try_reserve_exact(n)?;
        for raw in self.next_id..last {
            let id = BufferId(raw);
            self.buffers.insert(id, Buffer::new(id));
            ids.push(id);
        }
        self.next_id = last;
        Ok(ids)
    }

    /// Returns true if `id` names a live buffer not pending deletion.
    pub fn is_buffer(&self, id: BufferId) -> bool {
        self.buffers
            .get(&id)
            .is_some_and(|b| !b.flags().pending_delete)
    }

    /// Looks up a live buffer (pending deletions excluded).
    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id).filter(|b| !b.flags().pending_delete)
    }

    /// Looks up a buffer mutably (pending deletions excluded).
    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut Buffer> {
        self.buffers
            .get_mut(&id)
            .filter(|b| !b.flags().pending_delete)
    }

    /// Looks up any stored buffer, including ones pending deletion.
    ///
    /// The mixer uses this: a source may still be playing a buffer the
    /// application already deleted.
    pub(crate) fn get_any_mut(&mut self, id: BufferId) -> Option<&mut Buffer> {
        self.buffers.get_mut(&id)
    }

    pub(crate) fn get_any(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    /// Returns the live buffer or `InvalidName`.
    pub fn require(&self, id: BufferId) -> Result<&Buffer> {
        self.get(id).ok_or(Error::no_buffer(id.raw()))
    }

    /// Returns the live buffer mutably or `InvalidName`.
    pub fn require_mut(&mut self, id: BufferId) -> Result<&mut Buffer> {
        self.get_mut(id).ok_or(Error::no_buffer(id.raw()))
    }

    /// Deletes buffers, all or nothing.
    ///
    /// Every id is validated first. Unreferenced buffers are removed at once;
    /// referenced ones are flagged and reclaimed when released.
    pub fn delete(&mut self, ids: &[BufferId]) -> Result<()> {
        if let Some(bad) = ids.iter().find(|&&id| !self.is_buffer(id)) {
            return Err(Error::no_buffer(bad.raw()));
        }
        for &id in ids {
            let Some(buffer) = self.buffers.get_mut(&id) else {
                continue;
            };
            if buffer.is_referenced() {
                buffer.mark_pending_delete();
                tracing::debug!(buffer = %id, "buffer deletion deferred");
            } else {
                self.buffers.remove(&id);
            }
        }
        Ok(())
    }

    /// Adds a queued reference. Id 0 is ignored.
    pub fn attach(&mut self, id: BufferId, key: SourceKey) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.queued.insert(key);
        }
    }

    /// Drops a queued reference, reclaiming a pending deletion.
    pub fn detach(&mut self, id: BufferId, key: SourceKey) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.queued.remove(key);
        }
        self.reclaim(id);
    }

    /// Converts a queued reference into a current one.
    pub fn promote(&mut self, id: BufferId, key: SourceKey) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.queued.remove(key);
            buffer.current.insert(key);
        }
    }

    /// Converts a current reference back into a queued one.
    pub fn demote(&mut self, id: BufferId, key: SourceKey) {
        if let Some(buffer) = self.buffers.get_mut(&id)
            && buffer.current.remove(key)
        {
            buffer.queued.insert(key);
        }
    }

    fn reclaim(&mut self, id: BufferId) {
        let done = self
            .buffers
            .get(&id)
            .is_some_and(|b| b.flags().pending_delete && !b.is_referenced());
        if done {
            self.buffers.remove(&id);
            tracing::debug!(buffer = %id, "deferred buffer reclaimed");
        }
    }

    /// Number of live buffers (pending deletions excluded).
    pub fn len(&self) -> usize {
        self.buffers
            .values()
            .filter(|b| !b.flags().pending_delete)
            .count()
    }

    /// Returns true if no live buffers exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored buffers, including pending deletions.
    pub fn stored(&self) -> usize {
        self.buffers.len()
    }
}
