use thiserror::Error;

use crate::arena::ArenaError;

#[derive(Debug, Error)]
pub enum AllocError {
  #[error("zero-size allocation")]
  ZeroSize,
  #[error("request of {requested} bytes cannot be represented as a block")]
  TooLarge { requested: usize },
  #[error("out of memory")]
  OutOfMemory(#[from] ArenaError),
  #[error("arena base {addr:#x} is not aligned")]
  Misaligned { addr: usize },
}

/// A broken heap invariant found by [`Allocator::check`](crate::Allocator::check).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeapError {
  #[error("prologue block is damaged")]
  BadPrologue,
  #[error("epilogue block is damaged")]
  BadEpilogue,
  #[error("block {addr:#x} is not aligned")]
  Misaligned { addr: usize },
  #[error("block {addr:#x} has invalid size {size}")]
  BadSize { addr: usize, size: usize },
  #[error("block {addr:#x} header and footer disagree")]
  TagMismatch { addr: usize },
  #[error("free blocks {addr:#x} and its successor were not coalesced")]
  Uncoalesced { addr: usize },
  #[error("free block {addr:#x} is missing from the free index")]
  Unindexed { addr: usize },
  #[error("block {addr:#x} of {size} bytes is listed in class {class}")]
  WrongClass {
    addr: usize,
    size: usize,
    class: usize,
  },
  #[error("allocated block {addr:#x} is listed in the free index")]
  IndexedAllocated { addr: usize },
  #[error("free list link at {addr:#x} is inconsistent")]
  BrokenLink { addr: usize },
  #[error("blocks span {spanned} bytes but the arena holds {expected}")]
  Conservation { spanned: usize, expected: usize },
  #[error("next-fit rover {addr:#x} is not a block")]
  StrayRover { addr: usize },
}
