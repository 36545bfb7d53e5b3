use core::{
  alloc::{GlobalAlloc, Layout},
  fmt, ptr,
};

use spin::Mutex;

use crate::{
  align,
  align::BLOCK_ALIGN,
  block::{BlockAddr, HEADER_SIZE, Header, footprint},
  error::AllocError,
  heap::Heap,
  registry::Registry,
};


/// A block as seen by [`Allocator::for_each_block`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub block: BlockAddr,
  pub payload: *mut u8,
  pub size: usize,
  pub is_free: bool,
}

struct State<H> {
  registry: Registry,
  heap: H,
}

/// First-fit allocator over a [`Heap`].
///
/// Every operation takes the internal lock for its whole duration, so an
/// `Allocator` can be shared between threads and installed as the
/// `#[global_allocator]`.
pub struct Allocator<H: Heap> {
  state: Mutex<State<H>>,
}

impl<H: Heap> Allocator<H> {
  pub const fn new(heap: H) -> Self {
    Self {
      state: Mutex::new(State {
        registry: Registry::new(),
        heap,
      }),
    }
  }

  /// Returns `size` uninitialized bytes aligned to [`BLOCK_ALIGN`], or null
  /// if `size` is zero or the heap cannot grow.
  pub fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    self.allocate_aligned(size, BLOCK_ALIGN)
  }

  /// Like [`Allocator::allocate`], with the payload on a multiple of `align`.
  ///
  /// Alignments below [`BLOCK_ALIGN`] are raised to it. A non power of two
  /// `align` yields null.
  pub fn allocate_aligned(
    &self,
    size: usize,
    align: usize,
  ) -> *mut u8 {
    if size == 0 {
      adebug!("allocate: {}", AllocError::ZeroSize);
      return ptr::null_mut();
    }

    if !align.is_power_of_two() {
      adebug!("allocate: {}", AllocError::Unaligned { align });
      return ptr::null_mut();
    }

    let mut state = self.state.lock();

    match state.allocate(size, align.max(BLOCK_ALIGN)) {
      Ok(block) => block.payload(),
      Err(err) => {
        awarn!("allocate({size}, align {align}) failed: {err}");
        ptr::null_mut()
      }
    }
  }

  /// Returns `count * elem_size` zeroed bytes, or null on overflow, on a
  /// zero-byte request, or when the heap cannot grow.
  pub fn zero_allocate(
    &self,
    count: usize,
    elem_size: usize,
  ) -> *mut u8 {
    let Some(size) = count.checked_mul(elem_size) else {
      adebug!("{}", AllocError::Overflow { count, elem_size });
      return ptr::null_mut();
    };

    zeroed(self.allocate(size), size)
  }

  /// Resizes the allocation at `payload` to `new_size` bytes.
  ///
  /// A null `payload` allocates and a zero `new_size` releases. If the block
  /// already holds `new_size` bytes the same pointer comes back. Otherwise the
  /// contents move to a new block and the old one is released. On failure the
  /// old block is left untouched and null is returned.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer returned by this allocator.
  pub unsafe fn reallocate(
    &self,
    payload: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    unsafe { self.reallocate_aligned(payload, new_size, BLOCK_ALIGN) }
  }

  /// [`Allocator::reallocate`] keeping the payload on a multiple of `align`.
  ///
  /// # Safety
  ///
  /// Same as [`Allocator::reallocate`]. A non-null `payload` must already be
  /// aligned to `align`.
  pub unsafe fn reallocate_aligned(
    &self,
    payload: *mut u8,
    new_size: usize,
    align: usize,
  ) -> *mut u8 {
    let Some(old) = BlockAddr::from_payload(payload) else {
      return self.allocate_aligned(new_size, align);
    };

    if new_size == 0 {
      unsafe { self.release(payload) };
      return ptr::null_mut();
    }

    let mut state = self.state.lock();
    let old_size = unsafe { old.read() }.size;

    if old_size >= new_size {
      atrace!("reallocate {old:?} in place ({old_size} >= {new_size})");
      return payload;
    }

    let new = match state.allocate(new_size, align.max(BLOCK_ALIGN)) {
      Ok(block) => block,
      Err(err) => {
        awarn!("reallocate({old:?}, {new_size}) failed: {err}");
        return ptr::null_mut();
      }
    };

    unsafe {
      ptr::copy_nonoverlapping(payload, new.payload(), old_size.min(new_size));
      state.release(old);
    }

    atrace!("reallocate moved {old:?} -> {new:?}");
    new.payload()
  }

  /// Gives the allocation at `payload` back. Null is ignored.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer returned by this allocator, and
  /// must not be used afterwards.
  pub unsafe fn release(
    &self,
    payload: *mut u8,
  ) {
    let Some(block) = BlockAddr::from_payload(payload) else {
      return;
    };

    let mut state = self.state.lock();
    unsafe { state.release(block) };
  }

  /// Current end of the underlying heap.
  pub fn heap_end(&self) -> usize {
    self.state.lock().heap.brk()
  }

  /// Calls `f` for every registered block in carve order, under the lock.
  ///
  /// `f` must not call back into this allocator.
  pub fn for_each_block<F>(
    &self,
    mut f: F,
  ) where
    F: FnMut(BlockInfo),
  {
    let state = self.state.lock();

    for (block, header) in unsafe { state.registry.iter() } {
      f(BlockInfo {
        block,
        payload: block.payload(),
        size: header.size,
        is_free: header.is_free,
      });
    }
  }
}

fn zeroed(
  payload: *mut u8,
  size: usize,
) -> *mut u8 {
  if !payload.is_null() {
    unsafe { ptr::write_bytes(payload, 0, size) };
  }

  payload
}

impl<H: Heap> State<H> {
  /// `align` is a power of two no smaller than [`BLOCK_ALIGN`].
  fn allocate(
    &mut self,
    size: usize,
    align: usize,
  ) -> Result<BlockAddr, AllocError> {
    if let Some(block) = unsafe { self.registry.first_fit(size, align) } {
      unsafe { block.set_free(false) };
      atrace!("reusing {block:?} for {size} bytes");
      return Ok(block);
    }

    let total = footprint(size).ok_or(AllocError::Exhausted { requested: size })?;
    let filler = self.carve_filler(align)?;

    let block = match self.heap.grow(total) {
      Ok(block) => block,
      Err(err) => {
        if let Some(filler) = filler {
          unsafe { self.release(filler) };
        }
        return Err(err);
      }
    };

    unsafe {
      block.write(Header::new(size, false, None));
      self.registry.push(block);
    }

    if block.payload_addr() % align != 0 {
      // Someone else moved the break between the two grows.
      unsafe {
        self.release(block);
        if let Some(filler) = filler {
          self.release(filler);
        }
      }
      return Err(AllocError::Unaligned { align });
    }

    atrace!("carved {block:?}, {size} bytes, break = {:#x}", self.heap.brk());
    Ok(block)
  }

  /// Carves a free block in front of the next one so that the next payload
  /// lands on a multiple of `align`. Nothing is carved when it already does.
  fn carve_filler(
    &mut self,
    align: usize,
  ) -> Result<Option<BlockAddr>, AllocError> {
    if align <= BLOCK_ALIGN {
      return Ok(None);
    }

    let exhausted = AllocError::Exhausted { requested: align };
    let payload = align!(self.heap.brk()) + HEADER_SIZE;
    let gap = payload.checked_next_multiple_of(align).ok_or(exhausted)? - payload;

    if gap == 0 {
      return Ok(None);
    }

    // The filler needs room for its own header.
    let total = if gap < HEADER_SIZE {
      gap.checked_add(align).ok_or(exhausted)?
    } else {
      gap
    };

    let filler = self.heap.grow(total)?;

    unsafe {
      filler.write(Header::new(total - HEADER_SIZE, true, None));
      self.registry.push(filler);
    }

    atrace!("carved {total} byte filler {filler:?} for alignment {align}");
    Ok(Some(filler))
  }

  unsafe fn release(
    &mut self,
    block: BlockAddr,
  ) {
    let header = unsafe { block.read() };
    let end = block.payload_addr() + align!(header.size);

    if end != self.heap.brk() {
      unsafe { block.set_free(true) };
      atrace!("{block:?} marked free");
      return;
    }

    debug_assert_eq!(self.registry.tail(), Some(block));

    let removed = unsafe { self.registry.pop_tail() };
    debug_assert_eq!(removed, Some(block));

    // Only reached when `grow` produced exactly this footprint.
    let total = footprint(header.size).unwrap_or_default();

    if let Err(err) = unsafe { self.heap.shrink(total) } {
      // The bytes are still ours: keep the block around as a free one.
      awarn!("keeping {block:?} registered: {err}");
      unsafe {
        block.write(Header::new(header.size, true, None));
        self.registry.push(block);
      }
      return;
    }

    atrace!("returned {block:?} to the heap, break = {:#x}", self.heap.brk());

    if self.registry.head().is_none() {
      unsafe { self.heap.trim() };
    }
  }
}

unsafe impl<H: Heap> GlobalAlloc for Allocator<H> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    self.allocate_aligned(layout.size(), layout.align())
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    zeroed(
      self.allocate_aligned(layout.size(), layout.align()),
      layout.size(),
    )
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    unsafe { self.release(ptr) }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    unsafe { self.reallocate_aligned(ptr, new_size, layout.align()) }
  }
}

impl<H: Heap + fmt::Debug> fmt::Debug for Allocator<H> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self.state.try_lock() {
      Some(state) => f
        .debug_struct("Allocator")
        .field("head", &state.registry.head())
        .field("tail", &state.registry.tail())
        .field("heap", &state.heap)
        .finish(),
      None => f.debug_struct("Allocator").finish_non_exhaustive(),
    }
  }
}
