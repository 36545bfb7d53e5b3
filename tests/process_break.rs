//! Exercises the process-wide allocator against the real program break.
//!
//! Kept to a single test so nothing else in this binary moves the break while
//! it runs.

use core::slice;

use sbrkalloc::{BLOCK_ALIGN, GLOBAL, HEADER_SIZE, align};

#[test]
fn test_global_follows_program_break() {
  // Leave the break off a block boundary so the first grow needs a lead-in.
  let current = GLOBAL.heap_end();
  let offset = align!(current) - current + 8;
  unsafe { libc::sbrk(offset as libc::intptr_t) };

  let start = GLOBAL.heap_end();
  assert_ne!(start % BLOCK_ALIGN, 0);
  assert!(sbrkalloc::allocate(0).is_null());
  assert_eq!(GLOBAL.heap_end(), start);

  let first = sbrkalloc::allocate(100);
  assert!(!first.is_null());
  assert_eq!(first as usize % BLOCK_ALIGN, 0);
  assert_eq!(first as usize - HEADER_SIZE, align!(start));
  assert_eq!(GLOBAL.heap_end(), first as usize + align!(100));

  unsafe { first.write_bytes(0x7F, 100) };

  let zeroed = sbrkalloc::zero_allocate(3, 8);
  assert!(zeroed > first);
  assert!(unsafe { slice::from_raw_parts(zeroed, 24) }.iter().all(|&byte| byte == 0));
  let end = GLOBAL.heap_end();

  // Not the last block: only flagged free.
  unsafe { sbrkalloc::release(first) };
  assert_eq!(GLOBAL.heap_end(), end);

  let reused = sbrkalloc::allocate(50);
  assert_eq!(reused, first);

  assert_eq!(unsafe { sbrkalloc::reallocate(zeroed, 8) }, zeroed);

  unsafe { sbrkalloc::release(zeroed) };
  assert_eq!(GLOBAL.heap_end(), zeroed as usize - HEADER_SIZE);

  // Releasing the sole block gives back the block and the lead-in.
  unsafe { sbrkalloc::release(reused) };
  assert_eq!(GLOBAL.heap_end(), start);

  let mut count = 0;
  GLOBAL.for_each_block(|_| count += 1);
  assert_eq!(count, 0);

  assert!(sbrkalloc::zero_allocate(usize::MAX, 2).is_null());
  unsafe { sbrkalloc::release(core::ptr::null_mut()) };

  unsafe { libc::sbrk(-(offset as libc::intptr_t)) };
  assert_eq!(GLOBAL.heap_end(), current);
}
