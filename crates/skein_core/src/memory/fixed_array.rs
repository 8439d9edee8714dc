//! # Fixed Array
//!
//! A move-only owned slice carved from an [`Arena`]. The length is fixed at
//! construction; destruction drops every element in place and then rewinds
//! the owning arena, so arrays must be torn down in reverse creation order
//! like every other arena block.
//!
//! ## Safety Note
//!
//! This module requires unsafe code to manage the raw element storage. All
//! unsafe blocks are reviewed and documented.

#![allow(unsafe_code)]

use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::ptr::{self, NonNull};
use std::slice;

use super::arena::Arena;

/// An owned, fixed-length slice of `T` backed by arena memory.
///
/// Exactly one owner at a time: the type is not `Clone`, and ownership moves
/// carry the arena back-reference along. A default-constructed (or
/// `mem::take`n) array owns nothing and drops as a no-op.
///
/// # Example
///
/// ```rust,ignore
/// let arena = Arena::new();
/// assert!(arena.reserve(4096, None));
///
/// let mut values: FixedArray<u32> = FixedArray::new(&arena, 64);
/// values[0] = 7;
/// assert_eq!(values.len(), 64);
/// ```
pub struct FixedArray<'a, T> {
    /// First element, or null for an empty array.
    data: *mut T,
    /// Element count, fixed at construction.
    len: usize,
    /// Alignment requested at construction (zero means natural).
    align: usize,
    /// The arena the elements were carved from. Not owned.
    arena: Option<&'a Arena>,
}

impl<'a, T> FixedArray<'a, T> {
    /// Creates an array of `len` default-constructed elements.
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot satisfy the allocation; size the arena for
    /// everything it has to hold.
    #[must_use]
    pub fn new(arena: &'a Arena, len: usize) -> Self
    where
        T: Clone + Default,
    {
        Self::from_value_aligned(arena, len, T::default(), 0)
    }

    /// Creates an array of `len` copies of `value`.
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot satisfy the allocation.
    #[must_use]
    pub fn from_value(arena: &'a Arena, len: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self::from_value_aligned(arena, len, value, 0)
    }

    /// Creates an array of `len` copies of `value` with an explicit payload
    /// alignment.
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot satisfy the allocation.
    #[must_use]
    pub fn from_value_aligned(arena: &'a Arena, len: usize, value: T, alignment: usize) -> Self
    where
        T: Clone,
    {
        Self::from_fn_aligned(arena, len, |_| value.clone(), alignment)
    }

    /// Creates an array by copying `values` in order.
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot satisfy the allocation.
    #[must_use]
    pub fn from_slice(arena: &'a Arena, values: &[T]) -> Self
    where
        T: Clone,
    {
        Self::from_fn_aligned(arena, values.len(), |i| values[i].clone(), 0)
    }

    /// Creates an array whose `i`-th element is `init(i)`.
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot satisfy the allocation.
    #[must_use]
    pub fn from_fn(arena: &'a Arena, len: usize, init: impl FnMut(usize) -> T) -> Self {
        Self::from_fn_aligned(arena, len, init, 0)
    }

    /// Creates an array whose `i`-th element is `init(i)`, with an explicit
    /// payload alignment.
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot satisfy the allocation.
    #[must_use]
    pub fn from_fn_aligned(
        arena: &'a Arena,
        len: usize,
        mut init: impl FnMut(usize) -> T,
        alignment: usize,
    ) -> Self {
        if len == 0 {
            return Self {
                data: ptr::null_mut(),
                len: 0,
                align: alignment,
                arena: Some(arena),
            };
        }

        let Some(block) = arena.allocate::<T>(len, alignment) else {
            panic!("arena exhausted allocating a fixed array of {len} elements");
        };
        let data = block.as_ptr();

        for i in 0..len {
            // SAFETY: `data` points at `len` uninitialized elements; each
            // slot is written exactly once before any read.
            unsafe { data.add(i).write(init(i)) };
        }

        Self {
            data,
            len,
            align: alignment,
            arena: Some(arena),
        }
    }

    /// Returns the element count.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the array owns no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the alignment requested at construction (zero means the
    /// natural alignment of `T`).
    #[inline]
    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.align
    }

    /// Returns the raw element pointer, or `None` for an empty array.
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<NonNull<T>> {
        NonNull::new(self.data)
    }

    /// Returns the elements as a shared slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: `data` points at `len` initialized elements owned by self.
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }

    /// Returns the elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.data.is_null() {
            return &mut [];
        }
        // SAFETY: `data` points at `len` initialized elements owned
        // exclusively by self.
        unsafe { slice::from_raw_parts_mut(self.data, self.len) }
    }
}

impl<T> Default for FixedArray<'_, T> {
    fn default() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            align: 0,
            arena: None,
        }
    }
}

impl<T> Deref for FixedArray<'_, T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for FixedArray<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T> Index<usize> for FixedArray<'_, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T> IndexMut<usize> for FixedArray<'_, T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

impl<T> Drop for FixedArray<'_, T> {
    fn drop(&mut self) {
        let Some(block) = NonNull::new(self.data) else {
            return;
        };

        // SAFETY: the elements are initialized and exclusively owned; after
        // this they are never touched again.
        unsafe { ptr::drop_in_place(self.as_mut_slice() as *mut [T]) };

        if let Some(arena) = self.arena {
            arena.deallocate(block, self.len);
        }
    }
}

// SAFETY: a shared FixedArray only hands out &T; the arena back-reference is
// never exposed and deallocation needs ownership. Mirrors &[T].
unsafe impl<T: Sync> Sync for FixedArray<'_, T> {}
