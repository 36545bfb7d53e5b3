use crate::block::{BlockAddr, Header};

/// Every block carved from the heap, free or not, in carve order.
///
/// ```text
///   head                                 tail
///    │                                    │
///    ▼                                    ▼
///   ┌───────┐    ┌───────┐    ┌───────┐  ┌───────┐
///   │ used  │──▶ │ free  │──▶ │ used  │─▶│ used  │──▶ None
///   └───────┘    └───────┘    └───────┘  └───────┘
/// ```
///
/// All methods that read headers are unsafe: the caller guarantees every
/// linked block still addresses a live header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Registry {
  head: Option<BlockAddr>,
  tail: Option<BlockAddr>,
}

impl Registry {
  pub const fn new() -> Self {
    Self {
      head: None,
      tail: None,
    }
  }

  pub fn head(&self) -> Option<BlockAddr> {
    self.head
  }

  pub fn tail(&self) -> Option<BlockAddr> {
    self.tail
  }

  /// First free block, in carve order, holding at least `size` bytes with its
  /// payload on a multiple of `align`.
  pub unsafe fn first_fit(
    &self,
    size: usize,
    align: usize,
  ) -> Option<BlockAddr> {
    unsafe { self.iter() }
      .find(|(block, header)| {
        header.is_free && header.size >= size && block.payload_addr() % align == 0
      })
      .map(|(block, _)| block)
  }

  /// Links `block` after the current tail. Its header must already be
  /// written with `next == None`.
  pub unsafe fn push(
    &mut self,
    block: BlockAddr,
  ) {
    match self.tail {
      Some(tail) => unsafe { tail.set_next(Some(block)) },
      None => self.head = Some(block),
    }

    self.tail = Some(block);
  }

  /// Unlinks the tail and returns it.
  pub unsafe fn pop_tail(&mut self) -> Option<BlockAddr> {
    let tail = self.tail?;

    if self.head == Some(tail) {
      self.head = None;
      self.tail = None;
      return Some(tail);
    }

    let previous = unsafe { self.iter() }
      .find(|(_, header)| header.next == Some(tail))
      .map(|(block, _)| block);

    if let Some(previous) = previous {
      unsafe { previous.set_next(None) };
    }
    self.tail = previous;

    Some(tail)
  }

  /// Walks the chain from `head`.
  pub unsafe fn iter(&self) -> Blocks {
    Blocks { current: self.head }
  }
}

pub(crate) struct Blocks {
  current: Option<BlockAddr>,
}

impl Iterator for Blocks {
  type Item = (BlockAddr, Header);

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current?;
    // Guaranteed live by the contract of `Registry::iter`.
    let header = unsafe { block.read() };
    self.current = header.next;

    Some((block, header))
  }
}
