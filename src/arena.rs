//! Arena providers.
//!
//! An arena is one contiguous byte range that only ever grows at its high
//! end. The allocator asks for more space with [`Arena::grow`] and never gives
//! any back.

use std::{io, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};
use thiserror::Error;
use tracing::{debug, warn};

use crate::align::{ALIGNMENT, checked_align};

#[derive(Debug, Error)]
pub enum ArenaError {
  #[error("arena exhausted: requested {requested} bytes, {available} available")]
  Exhausted { requested: usize, available: usize },
  #[error("the system refused to extend the program break")]
  Refused(#[source] io::Error),
  #[error("program break was moved outside the arena")]
  Discontiguous,
  #[error("failed to reserve arena memory")]
  Reserve(#[source] io::Error),
}

/// A growable, contiguous byte range.
pub trait Arena {
  /// Extends the arena by `additional` bytes and returns the old end, which
  /// is the start of the new bytes.
  fn grow(
    &mut self,
    additional: usize,
  ) -> Result<NonNull<u8>, ArenaError>;

  /// First byte of the arena.
  fn low(&self) -> NonNull<u8>;

  /// One past the last byte of the arena.
  fn high(&self) -> NonNull<u8>;

  fn len(&self) -> usize {
    self.high().as_ptr().addr() - self.low().as_ptr().addr()
  }

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// An arena carved out of one private anonymous mapping.
///
/// The whole capacity is reserved up front and handed out monotonically, so
/// growth past the capacity fails the same way a denied `sbrk` would.
///
/// ```text
///   base            brk                      base + capacity
///   ┌───────────────┬────────────────────────┐
///   │   in use      │   reserved, not grown  │
///   └───────────────┴────────────────────────┘
/// ```
#[derive(Debug)]
pub struct MmapArena {
  base: NonNull<u8>,
  brk: usize,
  capacity: usize,
}

impl MmapArena {
  pub fn with_capacity(capacity: usize) -> Result<Self, ArenaError> {
    let capacity = checked_align(capacity.max(ALIGNMENT))
      .ok_or_else(|| ArenaError::Reserve(io::Error::from(io::ErrorKind::InvalidInput)))?;

    let address = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        capacity,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(ArenaError::Reserve(io::Error::last_os_error()));
    }

    let base = NonNull::new(address.cast::<u8>())
      .ok_or_else(|| ArenaError::Reserve(io::Error::other("null mapping")))?;

    debug!(?base, capacity, "reserved mmap arena");

    Ok(Self {
      base,
      brk: 0,
      capacity,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes that can still be grown into.
  pub fn remaining(&self) -> usize {
    self.capacity - self.brk
  }
}

impl Arena for MmapArena {
  fn grow(
    &mut self,
    additional: usize,
  ) -> Result<NonNull<u8>, ArenaError> {
    if additional > self.remaining() {
      return Err(ArenaError::Exhausted {
        requested: additional,
        available: self.remaining(),
      });
    }

    let old_end = unsafe { self.base.add(self.brk) };
    self.brk += additional;

    Ok(old_end)
  }

  fn low(&self) -> NonNull<u8> {
    self.base
  }

  fn high(&self) -> NonNull<u8> {
    unsafe { self.base.add(self.brk) }
  }
}

impl Drop for MmapArena {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.base.as_ptr().cast::<c_void>(), self.capacity);
    }
  }
}

/// The process data segment, grown with `sbrk(2)`.
///
/// Anything else in the process that moves the break (the system `malloc`,
/// for one) breaks contiguity; that is detected on the next growth, the
/// bytes just obtained are given back, and the growth fails with
/// [`ArenaError::Discontiguous`].
#[derive(Debug)]
pub struct SbrkArena {
  low: NonNull<u8>,
  high: NonNull<u8>,
}

impl SbrkArena {
  /// Takes the current program break as the arena start, padding it up to
  /// [`ALIGNMENT`] first.
  pub fn new() -> Result<Self, ArenaError> {
    let current = program_break()?;
    let padding = crate::align!(current.as_ptr().addr()) - current.as_ptr().addr();

    let low = if padding == 0 {
      current
    } else {
      let old = raw_sbrk(padding)?;
      if old != current {
        let _ = release(padding);
        return Err(ArenaError::Discontiguous);
      }
      unsafe { old.add(padding) }
    };

    debug!(?low, padding, "sbrk arena anchored");

    Ok(Self { low, high: low })
  }
}

impl Arena for SbrkArena {
  fn grow(
    &mut self,
    additional: usize,
  ) -> Result<NonNull<u8>, ArenaError> {
    let old_end = raw_sbrk(additional)?;

    if old_end != self.high {
      warn!(
        expected = ?self.high,
        found = ?old_end,
        "program break moved underneath the arena"
      );
      // the new bytes sit on top of the foreign ones, so handing them back
      // leaves the break where the other mover put it
      if let Err(err) = release(additional) {
        warn!(%err, additional, "could not give back a discontiguous growth");
      }
      return Err(ArenaError::Discontiguous);
    }

    self.high = unsafe { old_end.add(additional) };
    Ok(old_end)
  }

  fn low(&self) -> NonNull<u8> {
    self.low
  }

  fn high(&self) -> NonNull<u8> {
    self.high
  }
}

fn program_break() -> Result<NonNull<u8>, ArenaError> {
  raw_sbrk(0)
}

fn raw_sbrk(increment: usize) -> Result<NonNull<u8>, ArenaError> {
  let increment = intptr_t::try_from(increment)
    .map_err(|_| ArenaError::Refused(io::Error::from(io::ErrorKind::InvalidInput)))?;

  signed_sbrk(increment)
}

/// Moves the break down by `bytes`.
fn release(bytes: usize) -> Result<NonNull<u8>, ArenaError> {
  let decrement = intptr_t::try_from(bytes)
    .map_err(|_| ArenaError::Refused(io::Error::from(io::ErrorKind::InvalidInput)))?;

  signed_sbrk(-decrement)
}

fn signed_sbrk(increment: intptr_t) -> Result<NonNull<u8>, ArenaError> {
  let address = unsafe { sbrk(increment) };

  if address == usize::MAX as *mut c_void {
    return Err(ArenaError::Refused(io::Error::last_os_error()));
  }

  NonNull::new(address.cast::<u8>()).ok_or(ArenaError::Discontiguous)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mmap_grow() {
    let mut arena = MmapArena::with_capacity(4096).unwrap();

    assert!(arena.is_empty());
    assert_eq!(arena.low().as_ptr().addr() % ALIGNMENT, 0);

    let first = arena.grow(64).unwrap();
    assert_eq!(first, arena.low());
    assert_eq!(arena.len(), 64);

    let second = arena.grow(128).unwrap();
    assert_eq!(second.as_ptr().addr(), first.as_ptr().addr() + 64);
    assert_eq!(arena.high().as_ptr().addr(), arena.low().as_ptr().addr() + 192);

    unsafe {
      second.as_ptr().write_bytes(0xAB, 128);
      assert_eq!(*second.as_ptr().add(127), 0xAB);
    }
  }

  #[test]
  fn test_mmap_exhausted() {
    let mut arena = MmapArena::with_capacity(256).unwrap();
    arena.grow(200).unwrap();

    let err = arena.grow(100).unwrap_err();
    assert!(matches!(
      err,
      ArenaError::Exhausted {
        requested: 100,
        available: 56
      }
    ));

    // a refused growth leaves the bounds alone
    assert_eq!(arena.len(), 200);
    assert!(arena.grow(56).is_ok());
    assert_eq!(arena.remaining(), 0);
  }

  #[test]
  fn test_sbrk_discontiguous() {
    let mut arena = SbrkArena::new().unwrap();
    assert_eq!(arena.low().as_ptr().addr() % ALIGNMENT, 0);
    assert!(arena.is_empty());

    // someone else moves the break between two growths
    unsafe { sbrk(16) };

    let err = arena.grow(32).unwrap_err();
    assert!(matches!(err, ArenaError::Discontiguous));
    assert_eq!(arena.len(), 0);
    assert_eq!(arena.high(), arena.low());

    // unrepresentable increments never reach sbrk
    let err = arena.grow(usize::MAX).unwrap_err();
    assert!(matches!(err, ArenaError::Refused(_)));
    assert!(arena.is_empty());
  }

  #[test]
  fn test_mmap_capacity_rounded() {
    let arena = MmapArena::with_capacity(1).unwrap();
    assert_eq!(arena.capacity(), ALIGNMENT);
  }
}
