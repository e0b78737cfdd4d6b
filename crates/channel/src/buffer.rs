//! Pooled byte buffers used by channel receives and queued sends.
//!
//! A [`BufferPool`] allocates memory in slabs and hands out fixed size
//! [`BufferSegment`]s carved from them. A segment keeps two cursors over its region:
//!
//! ```text
//!  base_offset (position of the segment inside the slab)
//!  |
//!  [ consumed | unread (offset .. offset + count) | spare (.. capacity) ]
//! ```
//!
//! Segments return to their pool when they are dropped, so every exit path of a read or
//! write cycle, including error paths, gives the memory back.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Default size of a single segment
pub const DEFAULT_SEGMENT_SIZE: usize = 8 * 1024;

/// Default number of segments carved out of one slab allocation
pub const DEFAULT_SEGMENTS_PER_SLAB: usize = 32;

/// Default number of idle segments kept by the pool
pub const DEFAULT_MAX_IDLE_SEGMENTS: usize = 1024;

/// Sizing of a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    pub segment_size: usize,
    pub segments_per_slab: usize,
    pub max_idle_segments: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            segments_per_slab: DEFAULT_SEGMENTS_PER_SLAB,
            max_idle_segments: DEFAULT_MAX_IDLE_SEGMENTS,
        }
    }
}

impl BufferPoolConfig {
    #[must_use]
    pub fn segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size.max(1);
        self
    }

    #[must_use]
    pub fn segments_per_slab(mut self, segments_per_slab: usize) -> Self {
        self.segments_per_slab = segments_per_slab.max(1);
        self
    }

    #[must_use]
    pub fn max_idle_segments(mut self, max_idle_segments: usize) -> Self {
        self.max_idle_segments = max_idle_segments;
        self
    }
}

/// A thread safe pool of [`BufferSegment`]s shared by every connection of a server.
///
/// Cloning the pool is cheap, all clones share the same free list.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: BufferPoolConfig,
    free: Mutex<Vec<Slot>>,
    slabs: AtomicUsize,
    leased: AtomicUsize,
}

struct Slot {
    base_offset: usize,
    storage: BytesMut,
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig) -> Self {
        Self { inner: Arc::new(PoolInner { config, free: Mutex::new(Vec::new()), slabs: AtomicUsize::new(0), leased: AtomicUsize::new(0) }) }
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.inner.config
    }

    pub fn segment_size(&self) -> usize {
        self.inner.config.segment_size
    }

    /// Leases an empty segment, allocating a new slab when the free list is exhausted.
    ///
    /// # Returns
    ///
    /// A segment with `offset == 0`, `count == 0` and `capacity == segment_size`. It returns
    /// to the free list when dropped or passed to [`give_back`](Self::give_back), and is
    /// simply freed if the pool is gone by then.
    pub fn lease(&self) -> BufferSegment {
        let slot = {
            let mut free = self.inner.free.lock();
            match free.pop() {
                Some(slot) => slot,
                None => {
                    let mut fresh = self.inner.allocate_slab();
                    // `allocate_slab` always returns at least one slot
                    let slot = fresh.pop().unwrap_or_else(|| self.inner.detached_slot());
                    free.append(&mut fresh);
                    slot
                }
            }
        };

        self.inner.leased.fetch_add(1, Ordering::Relaxed);
        BufferSegment { storage: slot.storage, base_offset: slot.base_offset, offset: 0, count: 0, pool: Some(Arc::downgrade(&self.inner)) }
    }

    /// Returns a segment to the pool. Dropping the segment has the same effect.
    pub fn give_back(&self, mut segment: BufferSegment) {
        segment.release();
    }

    /// Number of segments currently leased out.
    pub fn leased(&self) -> usize {
        self.inner.leased.load(Ordering::Relaxed)
    }

    /// Number of idle segments ready to be leased.
    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Number of slabs allocated since the pool was created.
    pub fn slabs(&self) -> usize {
        self.inner.slabs.load(Ordering::Relaxed)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolConfig::default())
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.inner.config)
            .field("leased", &self.leased())
            .field("slabs", &self.slabs())
            .finish_non_exhaustive()
    }
}

impl PoolInner {
    fn allocate_slab(&self) -> Vec<Slot> {
        let segment_size = self.config.segment_size;
        let per_slab = self.config.segments_per_slab;
        let slab_index = self.slabs.fetch_add(1, Ordering::Relaxed);
        let slab_base = slab_index * segment_size * per_slab;

        debug!(slab = slab_index, segment_size, segments = per_slab, "allocate buffer slab");

        let mut slab = BytesMut::zeroed(segment_size * per_slab);
        let mut slots = Vec::with_capacity(per_slab);
        for index in 0..per_slab {
            let storage = slab.split_to(segment_size);
            slots.push(Slot { base_offset: slab_base + index * segment_size, storage });
        }
        // hand out the lowest offsets first
        slots.reverse();
        slots
    }

    fn detached_slot(&self) -> Slot {
        Slot { base_offset: 0, storage: BytesMut::zeroed(self.config.segment_size) }
    }

    fn put_back(&self, slot: Slot) {
        self.leased.fetch_sub(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if free.len() < self.config.max_idle_segments {
            free.push(slot);
        } else {
            trace!(base_offset = slot.base_offset, "pool is saturated, dropping segment");
        }
    }
}

/// A bounded byte window leased from a [`BufferPool`].
///
/// Invariant: `offset + count <= capacity`.
pub struct BufferSegment {
    storage: BytesMut,
    base_offset: usize,
    offset: usize,
    count: usize,
    pool: Option<Weak<PoolInner>>,
}

impl BufferSegment {
    /// Creates a segment that does not belong to any pool.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { storage: BytesMut::zeroed(capacity), base_offset: 0, offset: 0, count: 0, pool: None }
    }

    /// Position of this segment inside the slab it was carved from.
    #[inline]
    pub fn base_offset(&self) -> usize {
        self.base_offset
    }

    /// Start of the unread window.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of unread bytes.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Fixed size of the segment, the pool's `segment_size` for leased segments.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes that can still be appended after the unread window.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity() - self.offset - self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The unread bytes `[offset, offset + count)`.
    #[inline]
    pub fn unread(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.count]
    }

    /// The writable region after the unread window.
    #[inline]
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let start = self.offset + self.count;
        &mut self.storage[start..]
    }

    /// Marks `n` bytes written into [`spare_mut`](Self::spare_mut) as unread data.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`remaining_capacity`](Self::remaining_capacity).
    pub fn commit(&mut self, n: usize) {
        assert!(n <= self.remaining_capacity(), "commit {n} bytes exceeds remaining capacity {}", self.remaining_capacity());
        self.count += n;
    }

    /// Marks `n` unread bytes as consumed. The window is reset once it becomes empty.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds [`count`](Self::count).
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.count, "consume {n} bytes but only {} unread", self.count);
        self.offset += n;
        self.count -= n;
        if self.count == 0 {
            self.offset = 0;
        }
    }

    /// Copies as many bytes of `src` as fit into the spare region, returning the amount copied.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining_capacity());
        self.spare_mut()[..n].copy_from_slice(&src[..n]);
        self.count += n;
        n
    }

    /// Moves the unread window to the start of the segment.
    pub fn compact(&mut self) {
        if self.offset == 0 {
            return;
        }
        self.storage.copy_within(self.offset..self.offset + self.count, 0);
        self.offset = 0;
    }

    /// Discards all unread bytes.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.count = 0;
    }

    fn release(&mut self) {
        if let Some(pool) = self.pool.take().and_then(|pool| pool.upgrade()) {
            let storage = std::mem::take(&mut self.storage);
            pool.put_back(Slot { base_offset: self.base_offset, storage });
        }
    }
}

impl Drop for BufferSegment {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BufferSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferSegment")
            .field("base_offset", &self.base_offset)
            .field("offset", &self.offset)
            .field("count", &self.count)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> BufferPool {
        BufferPool::new(BufferPoolConfig::default().segment_size(16).segments_per_slab(4))
    }

    #[test]
    fn lease_carves_segments_from_one_slab() {
        let pool = small_pool();

        let first = pool.lease();
        let second = pool.lease();

        assert_eq!(pool.slabs(), 1);
        assert_eq!(first.base_offset(), 0);
        assert_eq!(second.base_offset(), 16);
        assert_eq!(first.capacity(), 16);
        assert_eq!(pool.leased(), 2);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn dropped_segment_returns_to_pool() {
        let pool = small_pool();
        {
            let _a = pool.lease();
            let _b = pool.lease();
            assert_eq!(pool.leased(), 2);
        }
        assert_eq!(pool.leased(), 0);
        assert_eq!(pool.available(), 4);

        let segment = pool.lease();
        pool.give_back(segment);
        assert_eq!(pool.leased(), 0);
        assert_eq!(pool.slabs(), 1);
    }

    #[test]
    fn exhausted_pool_allocates_next_slab() {
        let pool = small_pool();
        let leases: Vec<_> = (0..5).map(|_| pool.lease()).collect();

        assert_eq!(pool.slabs(), 2);
        assert_eq!(leases[4].base_offset(), 64);
    }

    #[test]
    fn cursors_keep_invariant() {
        let mut segment = BufferSegment::with_capacity(8);

        assert_eq!(segment.write(b"hello world"), 8);
        assert_eq!(segment.unread(), b"hello wo");
        assert_eq!(segment.remaining_capacity(), 0);

        segment.consume(6);
        assert_eq!(segment.offset(), 6);
        assert_eq!(segment.unread(), b"wo");

        segment.compact();
        assert_eq!(segment.offset(), 0);
        assert_eq!(segment.remaining_capacity(), 6);

        segment.spare_mut()[..2].copy_from_slice(b"rl");
        segment.commit(2);
        assert_eq!(segment.unread(), b"worl");

        segment.consume(4);
        assert!(segment.is_empty());
        assert_eq!(segment.offset(), 0);
    }

    #[test]
    #[should_panic(expected = "exceeds remaining capacity")]
    fn commit_past_capacity_panics() {
        let mut segment = BufferSegment::with_capacity(4);
        segment.commit(5);
    }

    #[test]
    fn concurrent_leases_are_balanced() {
        let pool = small_pool();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut segment = pool.lease();
                        segment.write(b"data");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.leased(), 0);
    }
}
