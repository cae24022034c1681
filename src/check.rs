//! Heap walking and consistency checks.

use std::{collections::HashSet, ptr::NonNull};

use crate::{
  align::{ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD},
  allocator::{Allocator, HEAP_PREFIX, chain_from},
  arena::Arena,
  block::{BlockState, pack},
  error::HeapError,
  index::{CLASS_COUNT, class_of},
};

/// One block as seen by a heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: NonNull<u8>,
  pub size: usize,
  pub allocated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Total arena bytes, sentinels included.
  pub arena_bytes: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  /// Bytes usable by callers across all allocated blocks.
  pub payload_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

impl HeapStats {
  /// Share of the arena handed out as payload.
  pub fn utilization(&self) -> f64 {
    if self.arena_bytes == 0 {
      return 0.0;
    }
    self.payload_bytes as f64 / self.arena_bytes as f64
  }

  fn record(
    &mut self,
    size: usize,
    allocated: bool,
  ) {
    if allocated {
      self.allocated_blocks += 1;
      self.allocated_bytes += size;
      self.payload_bytes += size - OVERHEAD;
    } else {
      self.free_blocks += 1;
      self.free_bytes += size;
      self.largest_free = self.largest_free.max(size);
    }
  }
}

impl<A: Arena> Allocator<A> {
  /// Every block between the prologue and the epilogue, in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    unsafe { chain_from(self.first_block()) }.map(|block| unsafe {
      BlockInfo {
        payload: block.payload(),
        size: block.size(),
        allocated: block.is_allocated(),
      }
    })
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      arena_bytes: self.arena.len(),
      ..HeapStats::default()
    };
    for info in self.blocks() {
      stats.record(info.size, info.allocated);
    }
    stats
  }

  /// Walks the whole heap and the free index and reports the first broken
  /// invariant found.
  pub fn check(&self) -> Result<HeapStats, HeapError> {
    let end = self.arena.high().as_ptr().addr();
    let mut stats = HeapStats {
      arena_bytes: self.arena.len(),
      ..HeapStats::default()
    };
    let mut free = Vec::new();

    unsafe {
      let prologue = self.prologue;
      if prologue.tag() != pack(OVERHEAD, true) || prologue.footer_tag() != pack(OVERHEAD, true) {
        return Err(HeapError::BadPrologue);
      }

      let mut rover_seen = self.rover == prologue;
      let mut prev_free = false;
      let mut spanned = 0;
      let mut block = prologue.next();

      loop {
        let addr = block.addr();
        if addr > end {
          return Err(HeapError::BadEpilogue);
        }

        let size = block.size();
        if size == 0 {
          break;
        }
        if addr % ALIGNMENT != 0 {
          return Err(HeapError::Misaligned { addr });
        }
        if size % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE || addr + size > end {
          return Err(HeapError::BadSize { addr, size });
        }
        if block.tag() != block.footer_tag() {
          return Err(HeapError::TagMismatch { addr });
        }

        let allocated = block.is_allocated();
        if !allocated {
          if prev_free {
            return Err(HeapError::Uncoalesced {
              addr: block.prev().addr(),
            });
          }
          free.push(addr);
        }

        rover_seen |= block == self.rover;
        stats.record(size, allocated);
        prev_free = !allocated;
        spanned += size;
        block = block.next();
      }

      if block.addr() != end || block.tag() != pack(0, true) {
        return Err(HeapError::BadEpilogue);
      }

      let expected = end - self.heap_start() - HEAP_PREFIX;
      if spanned != expected {
        return Err(HeapError::Conservation { spanned, expected });
      }

      if !rover_seen {
        return Err(HeapError::StrayRover {
          addr: self.rover.addr(),
        });
      }

      self.check_index(&free, end)?;
    }

    Ok(stats)
  }

  /// Every free block must be listed exactly once, in its own class, with
  /// links that agree in both directions.
  unsafe fn check_index(
    &self,
    free: &[usize],
    end: usize,
  ) -> Result<(), HeapError> {
    let blocks: HashSet<usize> = free.iter().copied().collect();
    let mut listed = HashSet::new();
    let first = self.first_block().addr();

    for class in 0..CLASS_COUNT {
      let mut pred = None;
      let mut cursor = self.index.head(class);

      while let Some(block) = cursor {
        let addr = block.addr();
        if addr < first || addr >= end || !listed.insert(addr) {
          return Err(HeapError::BrokenLink { addr });
        }

        let BlockState::Free { pred: linked, succ } = (unsafe { block.state() }) else {
          return Err(HeapError::IndexedAllocated { addr });
        };
        if !blocks.contains(&addr) || linked != pred {
          return Err(HeapError::BrokenLink { addr });
        }

        let size = unsafe { block.size() };
        if class_of(size) != class {
          return Err(HeapError::WrongClass { addr, size, class });
        }

        pred = Some(block);
        cursor = succ;
      }
    }

    match free.iter().find(|addr| !listed.contains(addr)) {
      Some(&addr) => Err(HeapError::Unindexed { addr }),
      None => Ok(()),
    }
  }
}
