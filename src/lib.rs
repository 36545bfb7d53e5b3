//! # sbrkalloc - A First-Fit `sbrk` Allocator
//!
//! This crate provides a small thread-safe general purpose allocator that
//! carves blocks straight out of the program break with `sbrk(2)` and keeps
//! every block it ever carved in a singly linked list.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │   ┌────┬──────┬────┬──────────┬────┬────┬────────────────────────┐   │
//!   │   │ H  │  A1  │ H  │ A2(free) │ H  │ A3 │      unmapped          │   │
//!   │   └────┴──────┴────┴──────────┴────┴────┴────────────────────────┘   │
//!   │     │          ▲ │               ▲      ▲                            │
//!   │     └──────────┘ └───────────────┘      │                            │
//!   │        next           next           Program                         │
//!   │                                       Break                          │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **allocate**: scan the list for the first free block that is large
//!   enough; if there is none, push the break up and append a new block.
//! - **release**: if the block ends exactly at the break, unlink it and pull
//!   the break back down; otherwise just mark it free for reuse.
//! - **reallocate**: keep the block if it is already large enough, otherwise
//!   move the contents into a fresh block.
//! - **zero_allocate**: overflow-checked `count * elem_size`, zero filled.
//! - **allocate_aligned**: for alignments above [`BLOCK_ALIGN`] a free filler
//!   block is carved first so the payload lands on the requested boundary.
//!
//! Free blocks are never split or merged with their neighbours.
//!
//! ## Crate Structure
//!
//! ```text
//!   sbrkalloc
//!   ├── align      - BLOCK_ALIGN and the align! macro
//!   ├── alog       - Logging macros gated by enable_logging() (internal)
//!   ├── block      - Block header and payload <-> header translation
//!   ├── registry   - The block list and first-fit search (internal)
//!   ├── heap       - Heap trait, Brk (sbrk) and Arena backends
//!   ├── allocator  - Allocator<H>, the locked public operations
//!   └── error      - AllocError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sbrkalloc::{Allocator, Brk};
//!
//! #[global_allocator]
//! static ALLOCATOR: Allocator<Brk> = Allocator::new(Brk::new());
//!
//! fn main() {
//!     let v: Vec<u32> = vec![1, 2, 3];
//!     println!("{v:?}");
//! }
//! ```
//!
//! Or through the process-wide instance:
//!
//! ```rust,ignore
//! let ptr = sbrkalloc::zero_allocate(3, 8);
//! unsafe { sbrkalloc::release(ptr) };
//! ```
//!
//! ## Block Format
//!
//! ```text
//!   ┌───────────────────────┬────────────────────────────────┬─────────┐
//!   │    Block Header       │         User Data              │ padding │
//!   │  ┌─────────────────┐  │                                │         │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │         │
//!   │  │ is_free: bool   │  │  │     N bytes usable       │  │         │
//!   │  │ next: None/addr │  │  └──────────────────────────┘  │         │
//!   │  └─────────────────┘  │                                │         │
//!   │    HEADER_SIZE        │                                │         │
//!   └───────────────────────┴────────────────────────────────┴─────────┘
//!                           ▲
//!                           └── Pointer returned to user (16-byte aligned)
//! ```
//!
//! The header records the requested size `N`; the padding up to the next
//! multiple of [`BLOCK_ALIGN`] is implied by it.
//!
//! ## Logging
//!
//! Logging through the [`log`] facade is off by default. [`enable_logging`]
//! turns it on. Do not enable it while an allocator from this crate is the
//! global allocator and the installed logger allocates: the logger would
//! re-enter the allocator while its lock is held.
//!
//! ## Limitations
//!
//! - **No coalescing**: adjacent free blocks stay separate
//! - **Shared break**: anything else moving the program break can make a
//!   shrink return memory that is not ours
//! - **No pointer validation**: releasing a foreign pointer is undefined
//!   behaviour
//! - **Unix-only**: requires `libc` and `sbrk`

use core::sync::atomic::{AtomicBool, Ordering};

#[macro_use]
#[allow(unused_macros)]
mod alog;

pub mod align;
mod allocator;
mod block;
mod error;
pub mod heap;
mod registry;

pub use align::BLOCK_ALIGN;
pub use allocator::{Allocator, BlockInfo};
pub use block::{BlockAddr, HEADER_SIZE};
pub use error::AllocError;
pub use heap::{Arena, Brk, Heap};

static ALLOC_LOG: AtomicBool = AtomicBool::new(false);

/// Enables logging for the allocator.
pub fn enable_logging() {
  ALLOC_LOG.store(true, Ordering::Relaxed);
}

/// Disables logging for the allocator.
pub fn disable_logging() {
  ALLOC_LOG.store(false, Ordering::Relaxed);
}

pub(crate) fn should_log() -> bool {
  ALLOC_LOG.load(Ordering::Relaxed)
}

/// The process-wide allocator behind the free functions below.
pub static GLOBAL: Allocator<Brk> = Allocator::new(Brk::new());

/// [`Allocator::allocate`] on [`GLOBAL`].
pub fn allocate(size: usize) -> *mut u8 {
  GLOBAL.allocate(size)
}

/// [`Allocator::zero_allocate`] on [`GLOBAL`].
pub fn zero_allocate(
  count: usize,
  elem_size: usize,
) -> *mut u8 {
  GLOBAL.zero_allocate(count, elem_size)
}

/// [`Allocator::reallocate`] on [`GLOBAL`].
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by [`GLOBAL`].
pub unsafe fn reallocate(
  ptr: *mut u8,
  new_size: usize,
) -> *mut u8 {
  unsafe { GLOBAL.reallocate(ptr, new_size) }
}

/// [`Allocator::release`] on [`GLOBAL`].
///
/// # Safety
///
/// `ptr` must be null or a live pointer returned by [`GLOBAL`].
pub unsafe fn release(ptr: *mut u8) {
  unsafe { GLOBAL.release(ptr) }
}

#[cfg(test)]
pub(crate) mod test_common {
  use crate::{Allocator, Arena};

  #[ctor::ctor]
  fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
    crate::enable_logging();
  }

  pub fn arena_allocator(capacity: usize) -> Allocator<Arena> {
    Allocator::new(Arena::with_capacity(capacity))
  }
}
