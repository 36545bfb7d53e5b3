//! Heap controllers: where blocks are carved from and returned to.
//!
//! ```text
//!   grow(n)                                  shrink(n)
//!   ┌────────┬────────┬──────────┐           ┌────────┬────────┐
//!   │ blk 0  │ blk 1  │  n bytes │           │ blk 0  │ blk 1  │ ← n bytes returned
//!   └────────┴────────┴──────────┘           └────────┴────────┘
//!                     ▲          ▲                             ▲
//!                   result      brk                           brk
//! ```

use core::{alloc::Layout, fmt, ptr::NonNull};
use std::alloc;

use libc::{c_void, intptr_t, sbrk};

use crate::{
  align,
  align::BLOCK_ALIGN,
  block::BlockAddr,
  error::AllocError,
};

/// A contiguous region that only grows and shrinks at its end.
pub trait Heap {
  /// Current end of the heap.
  fn brk(&self) -> usize;

  /// Extends the heap by `increment` bytes and returns the start of the new
  /// region, aligned to [`BLOCK_ALIGN`]. On failure nothing changes.
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<BlockAddr, AllocError>;

  /// Gives the last `decrement` bytes below [`Heap::brk`] back. On failure
  /// nothing changes and the bytes stay usable.
  ///
  /// # Safety
  ///
  /// Those bytes must have been obtained from [`Heap::grow`] on this heap and
  /// nothing may reference them afterwards.
  unsafe fn shrink(
    &mut self,
    decrement: usize,
  ) -> Result<(), AllocError>;

  /// Called once the allocator no longer holds any block.
  ///
  /// # Safety
  ///
  /// Nothing obtained from [`Heap::grow`] may still be referenced.
  unsafe fn trim(&mut self) {}
}

/// The process heap, moved with `sbrk(2)`.
///
/// The lock inside [`crate::Allocator`] serializes its own calls, but the
/// program break is process-wide state. If anything else in the process moves
/// the break (another allocator, a direct `brk`/`sbrk` call), a shrink can hand
/// back memory that belongs to that other code. Nothing here can detect that.
#[derive(Debug, Default)]
pub struct Brk {
  /// Alignment lead-in taken by the most recent misaligned grow.
  lead: usize,
  /// Break position right after that lead-in.
  lead_end: usize,
}

impl Brk {
  pub const fn new() -> Self {
    Self {
      lead: 0,
      lead_end: 0,
    }
  }
}

impl Heap for Brk {
  fn brk(&self) -> usize {
    unsafe { sbrk(0) }.expose_provenance()
  }

  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<BlockAddr, AllocError> {
    let exhausted = AllocError::Exhausted { requested: increment };

    // A fresh break is not guaranteed to sit on a block boundary. The lead-in
    // is given back by `trim` once every block is gone.
    let current = self.brk();
    let lead = align!(current) - current;
    let total = increment.checked_add(lead).ok_or(exhausted)?;

    if total > isize::MAX as usize {
      return Err(exhausted);
    }

    let base = unsafe { sbrk(total as intptr_t) };

    if base == usize::MAX as *mut c_void {
      return Err(exhausted);
    }

    let base = base.expose_provenance();
    let start = align!(base);

    if start + increment > base + total {
      // The break moved between the two calls and the lead-in no longer fits.
      unsafe { sbrk(-(total as intptr_t)) };
      return Err(exhausted);
    }

    if start > base {
      self.lead = start - base;
      self.lead_end = start;
    }

    BlockAddr::new(start).ok_or(exhausted)
  }

  unsafe fn shrink(
    &mut self,
    decrement: usize,
  ) -> Result<(), AllocError> {
    if decrement > isize::MAX as usize {
      return Err(AllocError::Shrink { requested: decrement });
    }

    let previous = unsafe { sbrk(-(decrement as intptr_t)) };

    if previous == usize::MAX as *mut c_void {
      awarn!("sbrk refused to give back {decrement} bytes");
      return Err(AllocError::Shrink { requested: decrement });
    }

    Ok(())
  }

  unsafe fn trim(&mut self) {
    // Only the lead-in directly below the break is ours to return; an older one
    // sits under memory someone else grew.
    if self.lead == 0 || self.brk() != self.lead_end {
      return;
    }

    match unsafe { self.shrink(self.lead) } {
      Ok(()) => {
        atrace!("returned {} byte lead-in", self.lead);
        self.lead = 0;
        self.lead_end = 0;
      }
      Err(err) => awarn!("keeping lead-in: {err}"),
    }
  }
}

/// A fixed-capacity region owned by the allocator that behaves like a private
/// program break.
///
/// Independent [`crate::Allocator`]s built on arenas never touch the process
/// break, which makes them suitable for tests and for embedding.
pub struct Arena {
  base: NonNull<u8>,
  capacity: usize,
  used: usize,
}

// The arena exclusively owns its region.
unsafe impl Send for Arena {}

impl Arena {
  /// Reserves `capacity` bytes, rounded up to [`BLOCK_ALIGN`].
  ///
  /// # Panics
  ///
  /// If the backing memory cannot be obtained from the system allocator.
  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = align!(capacity.max(1));
    let layout = Self::layout(capacity);
    let base = unsafe { alloc::alloc_zeroed(layout) };

    let Some(base) = NonNull::new(base) else {
      alloc::handle_alloc_error(layout);
    };

    Self {
      base,
      capacity,
      used: 0,
    }
  }

  fn layout(capacity: usize) -> Layout {
    match Layout::from_size_align(capacity, BLOCK_ALIGN) {
      Ok(layout) => layout,
      Err(_) => panic!("arena capacity {capacity:#x} is too large"),
    }
  }

  /// Start of the region.
  pub fn base(&self) -> usize {
    self.base.as_ptr().expose_provenance()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes currently below the break.
  pub fn used(&self) -> usize {
    self.used
  }
}

impl Heap for Arena {
  fn brk(&self) -> usize {
    self.base() + self.used
  }

  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<BlockAddr, AllocError> {
    if increment > self.capacity - self.used {
      return Err(AllocError::Exhausted { requested: increment });
    }

    let start = self.brk();
    self.used += increment;

    BlockAddr::new(start).ok_or(AllocError::Exhausted { requested: increment })
  }

  unsafe fn shrink(
    &mut self,
    decrement: usize,
  ) -> Result<(), AllocError> {
    if decrement > self.used {
      return Err(AllocError::Shrink { requested: decrement });
    }

    self.used -= decrement;
    Ok(())
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), Self::layout(self.capacity)) };
  }
}

impl fmt::Debug for Arena {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Arena")
      .field("base", &self.base)
      .field("capacity", &self.capacity)
      .field("used", &self.used)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grow_and_shrink() {
    let mut arena = Arena::with_capacity(256);
    let start = arena.brk();

    assert_eq!(start, arena.base());
    assert_eq!(start % BLOCK_ALIGN, 0);

    let first = arena.grow(64).unwrap();
    assert_eq!(first.get(), start);
    assert_eq!(arena.brk(), start + 64);

    let second = arena.grow(32).unwrap();
    assert_eq!(second.get(), start + 64);
    assert_eq!(arena.used(), 96);

    unsafe { arena.shrink(32) }.unwrap();
    assert_eq!(arena.brk(), start + 64);

    unsafe { arena.shrink(64) }.unwrap();
    assert_eq!(arena.brk(), start);
  }

  #[test]
  fn test_arena_shrink_below_base_fails() {
    let mut arena = Arena::with_capacity(256);
    arena.grow(48).unwrap();

    assert_eq!(
      unsafe { arena.shrink(64) },
      Err(AllocError::Shrink { requested: 64 })
    );
    assert_eq!(arena.used(), 48);
  }

  #[test]
  fn test_arena_exhaustion_leaves_break() {
    let mut arena = Arena::with_capacity(100);
    assert_eq!(arena.capacity(), 112);

    arena.grow(96).unwrap();
    let before = arena.brk();

    assert_eq!(
      arena.grow(32),
      Err(AllocError::Exhausted { requested: 32 })
    );
    assert_eq!(arena.brk(), before);

    arena.grow(16).unwrap();
    assert_eq!(arena.brk(), arena.base() + arena.capacity());
  }
}
