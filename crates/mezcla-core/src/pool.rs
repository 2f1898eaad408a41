//! Generic slab pool with stable external ids and one lock per slot.
//!
//! A [`SlabPool`] is a growable array of slots. Each occupied slot holds its
//! payload behind its own [`Mutex`], and is addressed from outside by an id
//! that is never reused by the pool. The engine uses one pool per context for
//! sources and one in the mixer for active mix entries.
//!
//! Structural changes (`alloc`, `dealloc`, `resize`) take `&mut self`; callers
//! guard the pool itself with an outer lock and hand out per-slot locks from
//! `&self`.
//!
//! ```rust
//! use mezcla_core::pool::SlabPool;
//!
//! let mut pool = SlabPool::new();
//! let a = pool.alloc("kick").unwrap();
//! let b = pool.alloc("snare").unwrap();
//! assert_ne!(a, b);
//!
//! *pool.get(a).unwrap().lock() = "hat";
//! assert!(pool.dealloc(a, drop));
//! assert!(!pool.dealloc(a, drop));
//! ```

use parking_lot::Mutex;

use crate::Result;
use crate::error::Error;

/// First id handed out by a pool. Ids below this never name a slot.
pub const POOL_ID_BASE: u32 = 0x4000;

/// Initial slot count for an empty pool's first growth.
const INITIAL_CAPACITY: usize = 4;

/// Growable array of locked slots addressed by stable ids.
pub struct SlabPool<T> {
    slots: Vec<Option<Mutex<T>>>,
    /// External id of each slot; 0 for free slots.
    ids: Vec<u32>,
    next_id: u32,
}

impl<T> Default for SlabPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SlabPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabPool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<T> SlabPool<T> {
    /// Creates an empty pool with no backing storage.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            ids: Vec::new(),
            next_id: POOL_ID_BASE,
        }
    }

    /// Returns the number of slots (free or in use).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of slots in use.
    pub fn len(&self) -> usize {
        self.ids.iter().filter(|&&id| id != 0).count()
    }

    /// Returns true if no slot is in use.
    pub fn is_empty(&self) -> bool {
        self.ids.iter().all(|&id| id == 0)
    }

    /// Grows the pool to at least `min_size` slots. Never shrinks.
    ///
    /// On allocation failure the pool is left unchanged.
    pub fn resize(&mut self, min_size: usize) -> Result<()> {
        let current = self.slots.len();
        if min_size <= current {
            return Ok(());
        }
        let extra = min_size - current;
        self.slots.try_reserve_exact(extra)?;
        self.ids.try_reserve_exact(extra)?;
        self.slots.resize_with(min_size, || None);
        self.ids.resize(min_size, 0);
        Ok(())
    }

    /// Stores `value` in the first free slot and returns its new id.
    ///
    /// Doubles the capacity when every slot is in use.
    pub fn alloc(&mut self, value: T) -> Result<u32> {
        self.alloc_with(|_| value)
    }

    /// Like [`alloc`](Self::alloc), building the payload from its id.
    pub fn alloc_with(&mut self, make: impl FnOnce(u32) -> T) -> Result<u32> {
        let index = match self.ids.iter().position(|&id| id == 0) {
            Some(index) => index,
            None => {
                let index = self.slots.len();
                let grown = (index * 2).max(INITIAL_CAPACITY);
                self.resize(grown)?;
                index
            }
        };

        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).ok_or(Error::OutOfMemory)?;

        self.slots[index] = Some(Mutex::new(make(id)));
        self.ids[index] = id;
        Ok(id)
    }

    /// Maps an external id to its slot index.
    pub fn index(&self, id: u32) -> Option<usize> {
        if id < POOL_ID_BASE {
            return None;
        }
        self.ids.iter().position(|&slot_id| slot_id == id)
    }

    /// Returns true if `id` names an in-use slot.
    pub fn contains(&self, id: u32) -> bool {
        self.index(id).is_some()
    }

    /// Returns the lock guarding the payload of `id`.
    pub fn get(&self, id: u32) -> Option<&Mutex<T>> {
        self.index(id).and_then(|i| self.slots[i].as_ref())
    }

    /// Returns the payload of `id` through exclusive access, without locking.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        let index = self.index(id)?;
        self.slots[index].as_mut().map(Mutex::get_mut)
    }

    /// Runs `destructor` on the payload of `id` and frees the slot.
    ///
    /// Returns `false` (and does nothing) if `id` is not in use.
    pub fn dealloc(&mut self, id: u32, destructor: impl FnOnce(T)) -> bool {
        let Some(index) = self.index(id) else {
            return false;
        };
        let Some(slot) = self.slots[index].take() else {
            return false;
        };
        self.ids[index] = 0;
        destructor(slot.into_inner());
        true
    }

    /// Deallocates every in-use slot, then releases the backing storage.
    pub fn free_all(&mut self, mut destructor: impl FnMut(T)) {
        for (slot, id) in self.slots.iter_mut().zip(self.ids.iter_mut()) {
            if let Some(value) = slot.take() {
                *id = 0;
                destructor(value.into_inner());
            }
        }
        self.slots = Vec::new();
        self.ids = Vec::new();
    }

    /// Iterates over `(id, lock)` for every in-use slot, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Mutex<T>)> {
        self.ids
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(&id, slot)| slot.as_ref().map(|lock| (id, lock)))
    }

    /// Returns the ids of every in-use slot, in slot order.
    pub fn ids(&self) -> Vec<u32> {
        self.ids.iter().copied().filter(|&id| id != 0).collect()
    }
}
