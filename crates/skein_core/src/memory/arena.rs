//! # Arena Allocator
//!
//! A bump allocator over one contiguous byte region, reserved once at startup
//! and released as a whole at shutdown.
//!
//! Every block is prefixed with a hidden `usize` header recording the bytes
//! consumed by alignment padding plus the payload, so a matching
//! [`Arena::deallocate`] can rewind the cursor by exactly that amount. This
//! gives O(1) allocate *and* deallocate without a free list, at the cost of a
//! strict LIFO discipline: only the most recently allocated live block may be
//! released.
//!
//! An arena may be backed by the process heap or carved from a parent arena,
//! so nested arenas form a tree rooted at a heap-backed one.
//!
//! ## Thread Safety
//!
//! This arena is NOT thread-safe. All allocation belongs to the
//! single-threaded setup phase, before the worker pool starts consuming the
//! memory.
//!
//! ## Safety Note
//!
//! This module requires unsafe code for raw pointer arithmetic over the
//! reserved region. All unsafe blocks are reviewed and documented.

#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc, Layout};
use std::cell::Cell;
use std::mem;
use std::ptr::{self, NonNull};

/// Size of the per-block header holding `padding + payload size`.
const HEADER_SIZE: usize = mem::size_of::<usize>();

/// Where a reserved region came from, so `free` and `Drop` release it the
/// same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backing {
    /// `reserve` has not been called, or `free` already ran.
    Unreserved,
    /// Region obtained from the process heap.
    Heap,
    /// Region carved out of a parent arena.
    Parent,
}

/// A bump-pointer arena with LIFO deallocation.
///
/// # Lifecycle
///
/// `reserve` exactly once, allocate/deallocate in stack order, `free` exactly
/// once. After `free` the instance is inert.
///
/// # Example
///
/// ```rust,ignore
/// let arena = Arena::new();
/// assert!(arena.reserve(4096, None));
///
/// let block = arena.allocate::<u64>(16, 0).unwrap();
/// // ... use the block ...
/// arena.deallocate(block, 16);
///
/// arena.free(None);
/// ```
pub struct Arena {
    /// First byte of the reserved region. Null while unreserved.
    start: Cell<*mut u8>,
    /// One past the last byte of the region. Null while unreserved.
    end: Cell<*mut u8>,
    /// Bump cursor: the next free byte.
    cursor: Cell<*mut u8>,
    /// How the region was obtained.
    backing: Cell<Backing>,
}

impl Arena {
    /// Creates an arena with no backing storage; call [`Arena::reserve`]
    /// before allocating.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start: Cell::new(ptr::null_mut()),
            end: Cell::new(ptr::null_mut()),
            cursor: Cell::new(ptr::null_mut()),
            backing: Cell::new(Backing::Unreserved),
        }
    }

    /// Obtains `bytes` of backing storage, from the process heap or carved
    /// from `parent`.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Region size; must be non-zero
    /// * `parent` - Parent arena to carve from, or `None` for the heap
    ///
    /// # Returns
    ///
    /// `false` if the underlying allocation failed; the arena stays
    /// unreserved and may be retried.
    ///
    /// # Panics
    ///
    /// Panics if the arena is already reserved or `bytes` is zero.
    pub fn reserve(&self, bytes: usize, parent: Option<&Arena>) -> bool {
        assert!(
            self.start.get().is_null(),
            "arena reserved twice without an intervening free()"
        );
        assert!(bytes > 0, "cannot reserve an empty arena");

        let start = match parent {
            None => {
                let layout = Self::region_layout(bytes);
                // SAFETY: layout has non-zero size, checked above.
                let region = unsafe { alloc(layout) };
                if region.is_null() {
                    return false;
                }
                self.backing.set(Backing::Heap);
                region
            }
            Some(parent) => {
                let Some(region) = parent.allocate::<u8>(bytes, 0) else {
                    return false;
                };
                self.backing.set(Backing::Parent);
                region.as_ptr()
            }
        };

        self.start.set(start);
        self.cursor.set(start);
        // SAFETY: the backing allocation is `bytes` long, so one-past-the-end
        // stays within the same allocated object.
        self.end.set(unsafe { start.add(bytes) });

        true
    }

    /// Releases the whole region and resets the arena to its unreserved
    /// state.
    ///
    /// # Arguments
    ///
    /// * `parent` - The same parent passed to [`Arena::reserve`], or `None`
    ///   for a heap-backed arena
    ///
    /// # Panics
    ///
    /// Panics if the arena is not reserved, or if `parent` does not match
    /// the backing chosen at reserve time.
    pub fn free(&self, parent: Option<&Arena>) {
        let start = self.start.get();
        assert!(!start.is_null(), "free() on an unreserved arena");

        match (self.backing.get(), parent) {
            (Backing::Heap, None) => {
                let layout = Self::region_layout(self.bytes_reserved());
                // SAFETY: `start` came from `alloc` with this exact layout.
                unsafe { dealloc(start, layout) };
            }
            (Backing::Parent, Some(parent)) => {
                // SAFETY: `start` is non-null, asserted above.
                let region = unsafe { NonNull::new_unchecked(start) };
                parent.deallocate::<u8>(region, self.bytes_reserved());
            }
            (backing, _) => {
                panic!("free() arguments do not match the arena backing ({backing:?})");
            }
        }

        self.start.set(ptr::null_mut());
        self.end.set(ptr::null_mut());
        self.cursor.set(ptr::null_mut());
        self.backing.set(Backing::Unreserved);
    }

    /// Bump-allocates `count` elements of `T`, prefixed by a hidden size
    /// header.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of elements
    /// * `alignment` - Zero for the natural alignment of `T`, otherwise a
    ///   power of two (raised to the natural alignment if below it)
    ///
    /// # Returns
    ///
    /// A pointer to the first element, or `None` when the header plus
    /// payload does not fit - or alignment cannot be satisfied - within the
    /// remaining capacity. On failure the arena is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the arena is not reserved or `alignment` is neither zero
    /// nor a power of two.
    pub fn allocate<T>(&self, count: usize, alignment: usize) -> Option<NonNull<T>> {
        assert!(
            !self.start.get().is_null(),
            "allocate() on an unreserved arena"
        );
        assert!(
            alignment == 0 || alignment.is_power_of_two(),
            "alignment must be zero or a power of two, got {alignment}"
        );

        // References to T are only valid at its natural alignment, so zero
        // ("no constraint beyond natural") still aligns to align_of::<T>().
        let align = alignment.max(mem::align_of::<T>());
        let size = mem::size_of::<T>().checked_mul(count)?;

        let remaining = self.bytes_left();
        if size.checked_add(HEADER_SIZE)? > remaining {
            return None;
        }

        // Candidate payload address sits just past the header slot; align it
        // forward and account the shift as padding.
        let base = self.cursor.get() as usize + HEADER_SIZE;
        let payload = base.checked_add(align - 1)? & !(align - 1);
        let padding = payload - base;

        if padding + HEADER_SIZE + size > remaining {
            return None;
        }

        // SAFETY: header + payload fit inside the reserved region, checked
        // above. The header slot may be unaligned when the payload alignment
        // is below usize's, hence write_unaligned.
        unsafe {
            let header = (payload - HEADER_SIZE) as *mut usize;
            header.write_unaligned(padding + size);
        }
        self.cursor.set((payload + size) as *mut u8);

        NonNull::new(payload as *mut T)
    }

    /// Releases the most recently allocated live block and rewinds the
    /// cursor past its header and padding.
    ///
    /// # Arguments
    ///
    /// * `block` - Pointer previously returned by [`Arena::allocate`]
    /// * `count` - The element count passed to the matching allocate
    ///
    /// # Panics
    ///
    /// Panics if `block` is not the most recent live allocation. The arena
    /// supports only a stack discipline, never arbitrary free.
    pub fn deallocate<T>(&self, block: NonNull<T>, count: usize) {
        assert!(
            !self.start.get().is_null(),
            "deallocate() on an unreserved arena"
        );

        let payload = block.as_ptr() as usize;
        let block_end = payload + count * mem::size_of::<T>();
        assert!(
            block_end == self.cursor.get() as usize,
            "LIFO deallocation order violated: block is not the most recent live allocation"
        );

        // SAFETY: allocate() wrote the header immediately before the payload
        // it returned; the block is live, so the header still is too.
        let block_size = unsafe { ((payload - HEADER_SIZE) as *const usize).read_unaligned() };

        self.cursor
            .set((block_end - block_size - HEADER_SIZE) as *mut u8);
    }

    /// Returns the bytes still available for allocation.
    #[inline]
    #[must_use]
    pub fn bytes_left(&self) -> usize {
        self.end.get() as usize - self.cursor.get() as usize
    }

    /// Returns the total size of the reserved region.
    #[inline]
    #[must_use]
    pub fn bytes_reserved(&self) -> usize {
        self.end.get() as usize - self.start.get() as usize
    }

    /// Returns whether [`Arena::reserve`] has run and [`Arena::free`] has
    /// not.
    #[inline]
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        !self.start.get().is_null()
    }

    fn region_layout(bytes: usize) -> Layout {
        // Header-sized alignment keeps the first header slot naturally
        // aligned for the common case.
        Layout::from_size_align(bytes, HEADER_SIZE).expect("arena region size overflows a Layout")
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        match self.backing.get() {
            Backing::Unreserved => {}
            Backing::Heap => {
                let layout = Self::region_layout(self.bytes_reserved());
                // SAFETY: still reserved, so `start` came from `alloc` with
                // this layout and was not released yet.
                unsafe { dealloc(self.start.get(), layout) };
            }
            Backing::Parent => {
                // The parent is unknown here; rewinding it is the caller's
                // job via free(Some(parent)) before the child goes away.
                debug_assert!(false, "parent-backed arena dropped without free()");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_queries() {
        let arena = Arena::new();
        assert!(!arena.is_reserved());

        assert!(arena.reserve(256, None));
        assert!(arena.is_reserved());
        assert_eq!(arena.bytes_reserved(), 256);
        assert_eq!(arena.bytes_left(), 256);

        arena.free(None);
        assert!(!arena.is_reserved());
    }

    #[test]
    fn test_lifo_restores_capacity() {
        let arena = Arena::new();
        assert!(arena.reserve(512, None));

        let before_a = arena.bytes_left();
        let a = arena.allocate::<u64>(4, 0).unwrap();
        let before_b = arena.bytes_left();
        let b = arena.allocate::<u32>(7, 0).unwrap();

        arena.deallocate(b, 7);
        assert_eq!(arena.bytes_left(), before_b);
        arena.deallocate(a, 4);
        assert_eq!(arena.bytes_left(), before_a);

        arena.free(None);
    }

    #[test]
    fn test_failed_allocate_leaves_state_unchanged() {
        let arena = Arena::new();
        assert!(arena.reserve(64, None));

        let left = arena.bytes_left();
        assert!(arena.allocate::<u8>(256, 0).is_none());
        assert_eq!(arena.bytes_left(), left);
        assert_eq!(arena.bytes_reserved(), 64);

        arena.free(None);
    }

    #[test]
    fn test_sixty_four_byte_scenario() {
        let arena = Arena::new();
        assert!(arena.reserve(64, None));

        // Two header+usize pairs fit; the region start is header-aligned so
        // no padding is consumed.
        let a = arena.allocate::<usize>(1, 8).unwrap();
        assert_eq!(arena.bytes_left(), 48);
        let b = arena.allocate::<usize>(1, 8).unwrap();
        assert_eq!(arena.bytes_left(), 32);

        // A 40-byte request cannot fit its header in the remaining 32.
        assert!(arena.allocate::<u8>(40, 0).is_none());
        assert_eq!(arena.bytes_left(), 32);

        arena.deallocate(b, 1);
        arena.deallocate(a, 1);
        assert_eq!(arena.bytes_left(), 64);

        arena.free(None);
    }

    #[test]
    fn test_alignment_is_honored() {
        let arena = Arena::new();
        assert!(arena.reserve(4096, None));

        // Offset the cursor so the 64-byte request needs padding.
        let misalign = arena.allocate::<u8>(3, 0).unwrap();
        let aligned = arena.allocate::<u8>(16, 64).unwrap();
        assert_eq!(aligned.as_ptr() as usize % 64, 0);

        arena.deallocate(aligned, 16);
        arena.deallocate(misalign, 3);
        assert_eq!(arena.bytes_left(), 4096);

        arena.free(None);
    }

    #[test]
    fn test_nested_arena_round_trip() {
        let parent = Arena::new();
        assert!(parent.reserve(1024, None));

        let child = Arena::new();
        assert!(child.reserve(256, Some(&parent)));
        assert_eq!(child.bytes_reserved(), 256);

        let block = child.allocate::<u32>(8, 0).unwrap();
        child.deallocate(block, 8);
        assert_eq!(child.bytes_left(), 256);

        child.free(Some(&parent));
        assert_eq!(parent.bytes_left(), 1024);

        parent.free(None);
    }

    #[test]
    fn test_oversized_aligned_request_fails_cleanly() {
        let arena = Arena::new();
        assert!(arena.reserve(128, None));

        // 128 bytes of payload can never fit alongside the header.
        let left = arena.bytes_left();
        assert!(arena.allocate::<u8>(128, 64).is_none());
        assert_eq!(arena.bytes_left(), left);

        arena.free(None);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_non_power_of_two_alignment_panics() {
        let arena = Arena::new();
        assert!(arena.reserve(128, None));
        let _ = arena.allocate::<u8>(1, 3);
    }

    #[test]
    #[should_panic(expected = "LIFO")]
    fn test_out_of_order_deallocate_panics() {
        let arena = Arena::new();
        assert!(arena.reserve(256, None));

        let a = arena.allocate::<u64>(2, 0).unwrap();
        let _b = arena.allocate::<u64>(2, 0).unwrap();
        arena.deallocate(a, 2);
    }
}
