use std::ptr::{self, NonNull};

use tracing::{debug, trace, warn};

use crate::{
  align::{ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD, WORD_SIZE, adjusted_size},
  arena::Arena,
  block::{Block, Word},
  config::{Config, FitPolicy, growth_bytes},
  error::AllocError,
  index::FreeIndex,
};

/// Bytes taken from the arena before the first real block: one padding
/// word, the prologue header and footer, and the epilogue header.
pub const HEAP_PREFIX: usize = 4 * WORD_SIZE;

/// A segregated-fit allocator over a single growable arena.
///
/// ```text
///   low                                                           high
///   ┌─────┬──────────┬──────────┬─────────┬─────────┬─────┬─────────┐
///   │ pad │ pro hdr  │ pro ftr  │ block   │ block   │ ... │ epi hdr │
///   └─────┴──────────┴──────────┴─────────┴─────────┴─────┴─────────┘
///              prologue (16, a)                          epilogue (0, a)
/// ```
#[derive(Debug)]
pub struct Allocator<A: Arena> {
  pub(crate) arena: A,
  pub(crate) prologue: Block,
  pub(crate) index: FreeIndex,
  pub(crate) config: Config,
  pub(crate) rover: Block,
}

impl<A: Arena> Allocator<A> {
  /// Builds a heap on an empty arena with the default [`Config`].
  pub fn new(arena: A) -> Result<Self, AllocError> {
    Self::with_config(arena, Config::default())
  }

  /// Writes the sentinels and seeds the heap with its initial free space.
  /// Fails if the arena cannot supply it.
  pub fn with_config(
    mut arena: A,
    config: Config,
  ) -> Result<Self, AllocError> {
    let addr = arena.high().as_ptr().addr();
    if addr % ALIGNMENT != 0 {
      return Err(AllocError::Misaligned { addr });
    }

    let start = arena.grow(HEAP_PREFIX)?;

    let prologue = unsafe {
      start.cast::<Word>().write(0);
      let prologue = Block::from_payload(start.add(2 * WORD_SIZE));
      prologue.write(OVERHEAD, true);
      prologue.next().write_header(0, true);
      prologue
    };

    let mut allocator = Self {
      arena,
      prologue,
      index: FreeIndex::new(),
      config,
      rover: prologue,
    };

    allocator.extend(config.chunk_bytes())?;
    if let Some(extra) = config.initial_extra_bytes() {
      allocator.extend(extra)?;
    }

    debug!(heap = allocator.arena.len(), ?config, "heap initialized");

    Ok(allocator)
  }

  /// Returns a payload of at least `size` bytes, aligned to [`ALIGNMENT`].
  ///
  /// Growth failures leave the heap exactly as it was.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let asize = adjusted_size(size).ok_or(AllocError::TooLarge { requested: size })?;

    let block = match self.find_fit(asize) {
      Some(block) => block,
      None => self.extend(asize.max(self.config.chunk_bytes()))?,
    };

    unsafe { self.place(block, asize) };

    if self.config.fit_policy() == FitPolicy::NextFit {
      self.rover = block;
    }

    trace!(size, asize, payload = ?block.payload(), "allocate");

    Ok(block.payload())
  }

  /// Releases a block and merges it with free neighbours. Null is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live payload returned by this allocator.
  pub unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    let Some(payload) = NonNull::new(ptr) else {
      return;
    };

    unsafe {
      let block = Block::from_payload(payload);
      debug_assert!(block.is_allocated(), "{block:?} freed twice");

      let size = block.size();
      block.write(size, false);
      let merged = self.coalesce(block);

      trace!(?payload, size, merged = merged.size(), "free");
    }
  }

  /// Changes the size of a block, in place when possible.
  ///
  /// A null `ptr` allocates; a zero `size` frees and returns `Ok(None)`.
  /// If a fresh block is needed and cannot be had, the old block is left
  /// untouched and the error is returned.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live payload returned by this allocator.
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(payload) = NonNull::new(ptr) else {
      return self.allocate(size).map(Some);
    };

    if size == 0 {
      unsafe { self.free(ptr) };
      return Ok(None);
    }

    let asize = adjusted_size(size).ok_or(AllocError::TooLarge { requested: size })?;

    unsafe {
      let block = Block::from_payload(payload);
      let csize = block.size();

      if asize <= csize {
        if self.config.shrinks_in_place() && csize - asize >= MIN_BLOCK_SIZE {
          self.shrink(block, asize, csize);
        }
        trace!(?payload, size, csize, "resize in place");
        return Ok(Some(payload));
      }

      let next = block.next();
      if !next.is_allocated() && csize + next.size() >= asize {
        let total = csize + next.size();
        self.index.remove(next);
        self.retarget_rover(block, total);

        if total - asize >= MIN_BLOCK_SIZE {
          self.shrink(block, asize, total);
        } else {
          block.write(total, true);
        }
        trace!(?payload, size, total, "resize into next block");
        return Ok(Some(payload));
      }

      let fresh = self.allocate(size)?;
      let copied = (csize - OVERHEAD).min(size);
      ptr::copy(payload.as_ptr(), fresh.as_ptr(), copied);
      self.free(ptr);

      trace!(from = ?payload, to = ?fresh, copied, "resize by copy");
      Ok(Some(fresh))
    }
  }

  /// Usable bytes of a live block.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live payload returned by this allocator.
  pub unsafe fn payload_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { Block::from_payload(ptr).size() - OVERHEAD }
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Grows the arena by one free block, merges it with a free block that
  /// ended the heap, and returns the result (already indexed).
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<Block, AllocError> {
    let size = growth_bytes(bytes);

    let old_end = self
      .arena
      .grow(size)
      .inspect_err(|err| warn!(%err, size, "arena refused to grow"))?;

    debug!(size, heap = self.arena.len(), "arena grown");

    unsafe {
      // the old epilogue header becomes the new block's header
      let block = Block::from_payload(old_end);
      block.write(size, false);
      block.next().write_header(0, true);
      Ok(self.coalesce(block))
    }
  }

  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    unsafe {
      match self.config.fit_policy() {
        FitPolicy::BestFit => self.index.find_best_fit(asize),
        FitPolicy::FirstFit => self.index.find_first_fit(asize),
        FitPolicy::NextFit => self.find_next_fit(asize),
      }
    }
  }

  /// Address-order search starting after the rover, wrapping around once.
  unsafe fn find_next_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    let fits = |block: &Block| unsafe { !block.is_allocated() && block.size() >= asize };

    unsafe {
      chain_from(self.rover.next()).find(fits).or_else(|| {
        chain_from(self.first_block())
          .take_while(|block| *block <= self.rover)
          .find(fits)
      })
    }
  }

  /// Carves `asize` bytes from the front of an indexed free block; a
  /// remainder big enough to be a block goes back to the index.
  unsafe fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    unsafe {
      self.index.remove(block);
      let csize = block.size();

      if csize - asize >= MIN_BLOCK_SIZE {
        block.write(asize, true);
        let rest = block.next();
        rest.write(csize - asize, false);
        self.index.insert(rest);
      } else {
        block.write(csize, true);
      }
    }
  }

  /// Cuts an allocated region of `total` bytes down to `asize` and frees the
  /// tail, which may merge with the block after it.
  unsafe fn shrink(
    &mut self,
    block: Block,
    asize: usize,
    total: usize,
  ) {
    unsafe {
      block.write(asize, true);
      let rest = block.next();
      rest.write(total - asize, false);
      self.coalesce(rest);
    }
  }

  /// Merges a free, unindexed block with its free neighbours and indexes the
  /// result.
  ///
  /// ```text
  ///   prev   next     result
  ///   used   used     block
  ///   used   free     block + next
  ///   free   used     prev + block
  ///   free   free     prev + block + next
  /// ```
  unsafe fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    unsafe {
      let prev_allocated = block.prev_allocated();
      let next = block.next();
      let next_allocated = next.is_allocated();
      let mut size = block.size();

      let merged = match (prev_allocated, next_allocated) {
        (true, true) => block,
        (true, false) => {
          self.index.remove(next);
          size += next.size();
          block
        }
        (false, true) => {
          let prev = block.prev();
          self.index.remove(prev);
          size += prev.size();
          prev
        }
        (false, false) => {
          let prev = block.prev();
          self.index.remove(prev);
          self.index.remove(next);
          size += prev.size() + next.size();
          prev
        }
      };

      merged.write(size, false);
      self.index.insert(merged);
      self.retarget_rover(merged, size);

      merged
    }
  }

  /// Keeps the rover on a block boundary when the block it names is absorbed
  /// into `[start, start + size)`.
  fn retarget_rover(
    &mut self,
    start: Block,
    size: usize,
  ) {
    let rover = self.rover.addr();
    if rover > start.addr() && rover < start.addr() + size {
      self.rover = start;
    }
  }

  pub(crate) fn first_block(&self) -> Block {
    unsafe { self.prologue.next() }
  }

  pub(crate) fn heap_start(&self) -> usize {
    self.prologue.addr() - 2 * WORD_SIZE
  }
}

/// Blocks in address order from `start` up to, not including, the epilogue.
///
/// # Safety
///
/// `start` must be a block of an initialized heap and the heap must not be
/// modified while the iterator is alive.
pub(crate) unsafe fn chain_from(start: Block) -> impl Iterator<Item = Block> {
  std::iter::successors(Some(start), |block| Some(unsafe { block.next() }))
    .take_while(|block| unsafe { block.size() } != 0)
}
