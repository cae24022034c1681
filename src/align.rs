use std::mem;

/// Size of a header or footer word.
pub const WORD_SIZE: usize = mem::size_of::<usize>();

/// Every payload address and every block size is a multiple of this.
pub const ALIGNMENT: usize = 2 * WORD_SIZE;

/// Bytes of metadata carried by every block: one header word, one footer word.
pub const OVERHEAD: usize = 2 * WORD_SIZE;

/// Smallest block that can hold a header, the two free-list links and a footer.
pub const MIN_BLOCK_SIZE: usize = 2 * ALIGNMENT;

/// Default number of bytes requested from the arena when no free block fits.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Rounds a byte count up to the next multiple of [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use segalloc::{align, align::ALIGNMENT};
///
/// assert_eq!(align!(1), ALIGNMENT);
/// assert_eq!(align!(ALIGNMENT), ALIGNMENT);
/// assert_eq!(align!(ALIGNMENT + 1), 2 * ALIGNMENT);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Same as [`align!`] but returns `None` instead of wrapping on overflow.
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(ALIGNMENT - 1) {
    Some(padded) => Some(padded & !(ALIGNMENT - 1)),
    None => None,
  }
}

/// Block size needed to serve a request of `size` payload bytes.
///
/// Requests that fit in one minimum payload get a minimum block; anything
/// larger pays the header/footer overhead and is rounded to [`ALIGNMENT`].
/// Returns `None` if the adjusted size does not fit in a `usize`.
pub const fn adjusted_size(size: usize) -> Option<usize> {
  if size <= ALIGNMENT {
    return Some(MIN_BLOCK_SIZE);
  }

  match size.checked_add(OVERHEAD) {
    Some(total) => checked_align(total),
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
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

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
    assert_eq!(checked_align(0), Some(0));
  }

  #[test]
  fn test_adjusted_size() {
    assert_eq!(adjusted_size(1), Some(MIN_BLOCK_SIZE));
    assert_eq!(adjusted_size(ALIGNMENT), Some(MIN_BLOCK_SIZE));
    assert_eq!(adjusted_size(ALIGNMENT + 1), Some(align!(ALIGNMENT + 1 + OVERHEAD)));
    assert_eq!(adjusted_size(usize::MAX), None);
    assert_eq!(adjusted_size(usize::MAX - OVERHEAD), None);

    for size in 1..1024 {
      let asize = adjusted_size(size).unwrap();
      assert_eq!(asize % ALIGNMENT, 0);
      assert!(asize >= MIN_BLOCK_SIZE);
      assert!(asize - OVERHEAD >= size);
    }
  }

  #[cfg(target_pointer_width = "64")]
  #[test]
  fn test_reference_constants() {
    assert_eq!(WORD_SIZE, 8);
    assert_eq!(ALIGNMENT, 16);
    assert_eq!(MIN_BLOCK_SIZE, 32);
    assert_eq!(adjusted_size(17), Some(48));
    assert_eq!(adjusted_size(100), Some(128));
  }
}
