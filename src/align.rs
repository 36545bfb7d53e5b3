/// Alignment, in bytes, of every header and every payload handed out.
pub const BLOCK_ALIGN: usize = 16;

/// Rounds the given size up to the next multiple of [`BLOCK_ALIGN`].
///
/// # Examples
///
/// ```rust
/// use sbrkalloc::align;
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(17), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::BLOCK_ALIGN - 1) & !($crate::BLOCK_ALIGN - 1)
  };
}

/// Rounds `value` up to a multiple of [`BLOCK_ALIGN`], or `None` if that
/// would overflow `usize`.
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(BLOCK_ALIGN - 1) {
    Some(padded) => Some(padded & !(BLOCK_ALIGN - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (BLOCK_ALIGN * i + 1)..=(BLOCK_ALIGN * (i + 1));

      let expected_alignment = BLOCK_ALIGN * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - BLOCK_ALIGN + 2), None);
    assert_eq!(
      checked_align(usize::MAX - BLOCK_ALIGN + 1),
      Some(usize::MAX - BLOCK_ALIGN + 1)
    );
  }
}
