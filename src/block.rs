//! Block headers and the payload/header address translation.
//!
//! This is the only module that reinterprets heap memory as a [`Header`].
//! Everything above it handles blocks as [`BlockAddr`] values.

use core::{fmt, mem, num::NonZeroUsize, ptr};

use crate::align::{BLOCK_ALIGN, checked_align};

/// Metadata stored in front of every payload.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Header {
  /// Payload byte count as requested by the caller, header excluded.
  pub size: usize,
  pub is_free: bool,
  /// Next block in carve order, `None` for the tail.
  pub next: Option<BlockAddr>,
}

impl Header {
  pub fn new(
    size: usize,
    is_free: bool,
    next: Option<BlockAddr>,
  ) -> Self {
    Self { size, is_free, next }
  }
}

/// Distance from a header to its payload.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

const _: () = assert!(HEADER_SIZE % BLOCK_ALIGN == 0);

/// Payload address for the header at `header`.
pub const fn payload_of(header: usize) -> usize {
  header + HEADER_SIZE
}

/// Header address for the payload at `payload`.
pub const fn header_of(payload: usize) -> usize {
  payload.wrapping_sub(HEADER_SIZE)
}

/// Bytes a block with a `size`-byte payload occupies on the heap.
///
/// Growth and shrink both go through this, so the alignment padding is
/// always derived from the recorded size and never tracked on its own.
pub const fn footprint(size: usize) -> Option<usize> {
  match checked_align(size) {
    Some(padded) => padded.checked_add(HEADER_SIZE),
    None => None,
  }
}

/// Address of a block header.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockAddr(NonZeroUsize);

impl BlockAddr {
  pub const fn new(addr: usize) -> Option<Self> {
    match NonZeroUsize::new(addr) {
      Some(addr) => Some(Self(addr)),
      None => None,
    }
  }

  /// Recovers the block owning `payload`. `None` for null.
  pub fn from_payload(payload: *mut u8) -> Option<Self> {
    if payload.is_null() {
      return None;
    }

    Self::new(header_of(payload.expose_provenance()))
  }

  pub const fn get(self) -> usize {
    self.0.get()
  }

  pub const fn payload_addr(self) -> usize {
    payload_of(self.get())
  }

  pub fn payload(self) -> *mut u8 {
    ptr::with_exposed_provenance_mut(self.payload_addr())
  }

  fn as_ptr(self) -> *mut Header {
    ptr::with_exposed_provenance_mut(self.get())
  }

  /// # Safety
  ///
  /// `self` must address a header written by [`BlockAddr::write`] whose
  /// memory is still owned by the allocator.
  pub(crate) unsafe fn read(self) -> Header {
    unsafe { self.as_ptr().read() }
  }

  /// # Safety
  ///
  /// `self` must address `HEADER_SIZE` writable bytes owned by the allocator,
  /// aligned to [`BLOCK_ALIGN`].
  pub(crate) unsafe fn write(
    self,
    header: Header,
  ) {
    unsafe { self.as_ptr().write(header) }
  }

  /// # Safety
  ///
  /// Same as [`BlockAddr::read`].
  pub(crate) unsafe fn set_free(
    self,
    is_free: bool,
  ) {
    unsafe { (*self.as_ptr()).is_free = is_free }
  }

  /// # Safety
  ///
  /// Same as [`BlockAddr::read`].
  pub(crate) unsafe fn set_next(
    self,
    next: Option<BlockAddr>,
  ) {
    unsafe { (*self.as_ptr()).next = next }
  }
}

impl fmt::Debug for BlockAddr {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "BlockAddr({:#x})", self.get())
  }
}
