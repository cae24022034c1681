//! Physical block encoding.
//!
//! ```text
//!   header                                       footer
//!   ┌──────────┬──────────────────────────────────┬──────────┐
//!   │ size | a │ payload ...                      │ size | a │
//!   └──────────┴──────────────────────────────────┴──────────┘
//!              ▲
//!              └── Block (payload pointer)
//!
//!   free payload: [ pred ][ succ ][ unused ... ]
//! ```
//!
//! A [`Block`] is a view over arena bytes identified by its payload address.
//! Every raw read and write of block metadata happens here.

use std::ptr::{self, NonNull};

use crate::align::{ALIGNMENT, OVERHEAD, WORD_SIZE};

pub type Word = usize;

const ALLOCATED: Word = 0x1;
const SIZE_MASK: Word = !(ALIGNMENT - 1);

/// Packs a block size and its allocated bit into one tag word.
pub const fn pack(
  size: usize,
  allocated: bool,
) -> Word {
  debug_assert!(size & !SIZE_MASK == 0);
  size | allocated as Word
}

pub const fn unpack_size(word: Word) -> usize {
  word & SIZE_MASK
}

pub const fn unpack_allocated(word: Word) -> bool {
  word & ALLOCATED != 0
}

/// Decoded state of a block, including the free-list links that only exist
/// while it is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
  Free {
    pred: Option<Block>,
    succ: Option<Block>,
  },
  Allocated,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(NonNull<u8>);

impl std::fmt::Debug for Block {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    write!(f, "Block({:p})", self.0)
  }
}

impl Block {
  /// # Safety
  ///
  /// `payload` must be the payload address of a block inside an initialized
  /// heap: one word before it must hold a valid header.
  pub const unsafe fn from_payload(payload: NonNull<u8>) -> Self {
    Self(payload)
  }

  pub const fn payload(self) -> NonNull<u8> {
    self.0
  }

  pub fn addr(self) -> usize {
    self.0.as_ptr().addr()
  }

  fn header(self) -> *mut Word {
    self.0.as_ptr().wrapping_sub(WORD_SIZE).cast()
  }

  /// # Safety
  ///
  /// The header must be readable.
  unsafe fn footer(self) -> *mut Word {
    unsafe { self.0.as_ptr().add(self.size()).sub(OVERHEAD).cast() }
  }

  /// # Safety
  ///
  /// The block's header must lie inside the arena.
  pub unsafe fn tag(self) -> Word {
    unsafe { self.header().read() }
  }

  /// # Safety
  ///
  /// The block's header must lie inside the arena.
  pub unsafe fn size(self) -> usize {
    unpack_size(unsafe { self.tag() })
  }

  /// # Safety
  ///
  /// The block's header must lie inside the arena.
  pub unsafe fn is_allocated(self) -> bool {
    unpack_allocated(unsafe { self.tag() })
  }

  /// Raw footer word, for consistency checks.
  ///
  /// # Safety
  ///
  /// The block must span `size()` bytes of the arena.
  pub unsafe fn footer_tag(self) -> Word {
    unsafe { self.footer().read() }
  }

  /// Writes matching header and footer tags. The footer position is derived
  /// from the new `size`, so this also moves the footer when resizing.
  ///
  /// # Safety
  ///
  /// `size` bytes starting at the header must belong to the arena.
  pub unsafe fn write(
    self,
    size: usize,
    allocated: bool,
  ) {
    let tag = pack(size, allocated);
    unsafe {
      self.header().write(tag);
      self.footer().write(tag);
    }
  }

  /// Writes only the header. Used for the zero-size epilogue, which has no
  /// footer.
  ///
  /// # Safety
  ///
  /// The header word must belong to the arena.
  pub unsafe fn write_header(
    self,
    size: usize,
    allocated: bool,
  ) {
    unsafe { self.header().write(pack(size, allocated)) }
  }

  /// The physically following block. Must not be called on the epilogue.
  ///
  /// # Safety
  ///
  /// The header must be valid and the block must not be the epilogue.
  pub unsafe fn next(self) -> Block {
    unsafe { Block(self.0.add(self.size())) }
  }

  /// Whether the physically preceding block is allocated, read from its
  /// footer.
  ///
  /// # Safety
  ///
  /// The block must not be the prologue.
  pub unsafe fn prev_allocated(self) -> bool {
    unsafe { unpack_allocated(self.prev_footer()) }
  }

  /// The physically preceding block. Must not be called on the prologue.
  ///
  /// # Safety
  ///
  /// The block must not be the prologue and the previous block's footer must
  /// be valid.
  pub unsafe fn prev(self) -> Block {
    unsafe { Block(self.0.sub(unpack_size(self.prev_footer()))) }
  }

  unsafe fn prev_footer(self) -> Word {
    unsafe { self.0.as_ptr().sub(OVERHEAD).cast::<Word>().read() }
  }

  fn link_slot(
    self,
    offset: usize,
  ) -> *mut *mut u8 {
    self.0.as_ptr().wrapping_add(offset).cast()
  }

  /// # Safety
  ///
  /// The block must be free.
  pub unsafe fn pred(self) -> Option<Block> {
    debug_assert!(unsafe { !self.is_allocated() }, "links read on {self:?}");
    NonNull::new(unsafe { self.link_slot(0).read() }).map(Block)
  }

  /// # Safety
  ///
  /// The block must be free.
  pub unsafe fn succ(self) -> Option<Block> {
    debug_assert!(unsafe { !self.is_allocated() }, "links read on {self:?}");
    NonNull::new(unsafe { self.link_slot(WORD_SIZE).read() }).map(Block)
  }

  /// # Safety
  ///
  /// The block must be free.
  pub unsafe fn set_pred(
    self,
    pred: Option<Block>,
  ) {
    debug_assert!(unsafe { !self.is_allocated() }, "links written on {self:?}");
    unsafe { self.link_slot(0).write(link(pred)) }
  }

  /// # Safety
  ///
  /// The block must be free.
  pub unsafe fn set_succ(
    self,
    succ: Option<Block>,
  ) {
    debug_assert!(unsafe { !self.is_allocated() }, "links written on {self:?}");
    unsafe { self.link_slot(WORD_SIZE).write(link(succ)) }
  }

  /// # Safety
  ///
  /// The header must be valid, and so must the links if the block is free.
  pub unsafe fn state(self) -> BlockState {
    unsafe {
      if self.is_allocated() {
        BlockState::Allocated
      } else {
        BlockState::Free {
          pred: self.pred(),
          succ: self.succ(),
        }
      }
    }
  }
}

fn link(block: Option<Block>) -> *mut u8 {
  block.map_or(ptr::null_mut(), |block| block.0.as_ptr())
}
