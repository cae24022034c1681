//! Segregated free lists.
//!
//! Free blocks are threaded through their own payloads into one doubly
//! linked list per size class. Class `i` holds blocks whose size is at most
//! `MIN_BLOCK_SIZE << i`; the last class takes everything larger.
//!
//! ```text
//!   class 0 (≤32)   ─► [32] ⇄ [32]
//!   class 1 (≤64)   ─► [48] ⇄ [64] ⇄ [48]
//!   class 2 (≤128)  ─► ∅
//!   ...
//!   class 9 (>8192) ─► [65536]
//! ```

use crate::align::MIN_BLOCK_SIZE;
use crate::block::Block;

pub const CLASS_COUNT: usize = 10;

/// Size class a block of `size` bytes belongs to.
///
/// Monotonic in `size`, so a block of at least `size` bytes always lives in
/// `class_of(size)` or above.
pub const fn class_of(size: usize) -> usize {
  if size <= MIN_BLOCK_SIZE {
    return 0;
  }
  if size > MIN_BLOCK_SIZE << (CLASS_COUNT - 2) {
    return CLASS_COUNT - 1;
  }

  (size.next_power_of_two().trailing_zeros() - MIN_BLOCK_SIZE.trailing_zeros()) as usize
}

#[derive(Debug)]
pub struct FreeIndex {
  heads: [Option<Block>; CLASS_COUNT],
}

impl Default for FreeIndex {
  fn default() -> Self {
    Self::new()
  }
}

impl FreeIndex {
  pub const fn new() -> Self {
    Self {
      heads: [None; CLASS_COUNT],
    }
  }

  pub fn head(
    &self,
    class: usize,
  ) -> Option<Block> {
    self.heads[class]
  }

  /// Pushes a free block on the front of its class list.
  ///
  /// # Safety
  ///
  /// `block` must be a free block with valid tags that is not already listed.
  pub unsafe fn insert(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let class = class_of(block.size());
      let head = self.heads[class];

      block.set_pred(None);
      block.set_succ(head);
      if let Some(head) = head {
        head.set_pred(Some(block));
      }
      self.heads[class] = Some(block);
    }
  }

  /// Splices a block out of its class list using its own links.
  ///
  /// # Safety
  ///
  /// `block` must currently be listed, and its size must not have changed
  /// since it was inserted.
  pub unsafe fn remove(
    &mut self,
    block: Block,
  ) {
    unsafe {
      let pred = block.pred();
      let succ = block.succ();

      match pred {
        Some(pred) => pred.set_succ(succ),
        None => self.heads[class_of(block.size())] = succ,
      }
      if let Some(succ) = succ {
        succ.set_pred(pred);
      }
    }
  }

  /// Smallest listed block of at least `asize` bytes.
  ///
  /// Classes are scanned upwards from `class_of(asize)`. An exact match is
  /// returned immediately; otherwise the scan stops at the first class that
  /// produced any candidate, since every higher class only holds larger
  /// blocks.
  ///
  /// # Safety
  ///
  /// Every listed block must be a valid free block.
  pub unsafe fn find_best_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    for class in class_of(asize)..CLASS_COUNT {
      let mut best: Option<(Block, usize)> = None;

      for block in unsafe { self.iter(class) } {
        let size = unsafe { block.size() };
        if size < asize {
          continue;
        }
        if size == asize {
          return Some(block);
        }
        if best.is_none_or(|(_, best_size)| size < best_size) {
          best = Some((block, size));
        }
      }

      if let Some((block, _)) = best {
        return Some(block);
      }
    }

    None
  }

  /// First listed block of at least `asize` bytes, in class order.
  ///
  /// # Safety
  ///
  /// Every listed block must be a valid free block.
  pub unsafe fn find_first_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    (class_of(asize)..CLASS_COUNT)
      .flat_map(|class| unsafe { self.iter(class) })
      .find(|block| unsafe { block.size() } >= asize)
  }

  /// Walks one class list from its head.
  ///
  /// # Safety
  ///
  /// The list must not be modified while the iterator is alive, and every
  /// listed block must be a valid free block.
  pub unsafe fn iter(
    &self,
    class: usize,
  ) -> ClassIter {
    ClassIter {
      cursor: self.heads[class],
    }
  }
}

pub struct ClassIter {
  cursor: Option<Block>,
}

impl Iterator for ClassIter {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let block = self.cursor?;
    self.cursor = unsafe { block.succ() };
    Some(block)
  }
}
