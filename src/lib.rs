//! # segalloc - A Segregated-Fit Memory Allocator
//!
//! This crate provides a general-purpose **boundary-tag allocator** that
//! manages one contiguous, growable arena and serves `allocate`, `free` and
//! `resize` requests from it.
//!
//! ## Overview
//!
//! The arena is split into blocks that tile it completely. Every block
//! carries its size and an allocated bit in a header word, and a copy of the
//! same word in a footer, so both neighbours of any block can be found in
//! constant time:
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                            ARENA                                     │
//!   │                                                                      │
//!   │   ┌─────┬──────────┬────────┬────────┬────────┬──────────┬───────┐   │
//!   │   │ pad │ prologue │  used  │  free  │  used  │   free   │  epi  │   │
//!   │   └─────┴──────────┴────────┴────────┴────────┴──────────┴───────┘   │
//!   │   ▲                                                              ▲   │
//!   │   │                                                              │   │
//!   │  low                                                           high  │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   The prologue and epilogue are always allocated and never merged, so
//!   the first and last real blocks need no special cases.
//! ```
//!
//! Free blocks are additionally linked into one of ten **size classes**. The
//! links live inside the free block's payload, which costs nothing while the
//! block is unused:
//!
//! ```text
//!   Free-Space Index:
//!
//!   class 0  (≤ 32)    ──▶ [32] ──▶ [32] ──▶ ∅
//!   class 1  (≤ 64)    ──▶ [48] ──▶ ∅
//!   class 2  (≤ 128)   ──▶ ∅
//!     ...
//!   class 8  (≤ 8192)  ──▶ [4128] ──▶ ∅
//!   class 9  (> 8192)  ──▶ ∅
//!
//!   New entries go to the head of their list (LIFO).
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Word/alignment constants, align! macro, request rounding
//!   ├── arena      - Arena trait, MmapArena and SbrkArena providers
//!   ├── block      - Block view over header/footer tags and free links
//!   ├── index      - Segregated free lists and fit searches
//!   ├── allocator  - Allocator: init, allocate, free, resize
//!   ├── config     - Config and FitPolicy
//!   ├── check      - Heap walk, statistics, consistency checker
//!   └── error      - AllocError and HeapError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use segalloc::{Allocator, MmapArena};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let arena = MmapArena::with_capacity(1 << 20)?;
//!   let mut allocator = Allocator::new(arena)?;
//!
//!   let ptr = allocator.allocate(100)?;
//!
//!   unsafe {
//!     ptr.as_ptr().write_bytes(0xAB, 100);
//!
//!     // grows in place when the next block is free, copies otherwise
//!     let ptr = allocator.resize(ptr.as_ptr(), 400)?.unwrap();
//!     allocator.free(ptr.as_ptr());
//!   }
//!
//!   allocator.check()?;
//!   Ok(())
//! }
//! ```
//!
//! ## How It Works
//!
//! A request of `n` bytes is rounded to a block size (`n` plus header and
//! footer, aligned to 16 bytes, at least 32). The free index is searched
//! according to the configured [`FitPolicy`]; when nothing fits the arena
//! grows by at least one chunk. A block much larger than the request is
//! split and the remainder goes back to the index:
//!
//! ```text
//!   Placement of allocate(100):
//!
//!   before   ┌─────────────────────────────────────────────────┐
//!            │ hdr │           free block (256)          │ ftr │
//!            └─────────────────────────────────────────────────┘
//!
//!   after    ┌────────────────────────┬────────────────────────┐
//!            │ hdr │ used (128) │ ftr │ hdr │ free (128) │ ftr │
//!            └────────────────────────┴────────────────────────┘
//!                  ▲
//!                  └── Pointer returned to user
//! ```
//!
//! Freeing a block merges it with whichever neighbours are free, so two
//! free blocks are never adjacent.
//!
//! ## Features
//!
//! - **Constant-time free**: boundary tags give both neighbours directly
//! - **Pluggable search**: best-fit, first-fit or next-fit at construction
//! - **In-place resize**: shrinks split, grows absorb a free neighbour
//! - **Heap checker**: [`Allocator::check`] validates every invariant
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Allocator` takes `&mut self` everywhere
//! - **Never shrinks**: the arena only grows
//! - **No misuse detection**: double frees and foreign pointers are undefined
//!   behaviour
//! - **Unix-only**: arenas are built on `mmap` and `sbrk`
//!
//! ## Safety
//!
//! `free`, `resize` and `payload_size` take raw pointers and are `unsafe`:
//! the pointer must be null or a live payload returned by the same
//! allocator. The block view and the free index are internal, so nothing
//! outside the crate can forge block headers or free-list links:
//!
//! ```compile_fail
//! use segalloc::block::Block;
//! ```

pub mod align;
pub mod arena;

mod allocator;
mod block;
mod check;
mod config;
mod error;
mod index;
mod tests;

pub use allocator::{Allocator, HEAP_PREFIX};
pub use arena::{Arena, ArenaError, MmapArena, SbrkArena};
pub use check::{BlockInfo, HeapStats};
pub use config::{Config, FitPolicy};
pub use error::{AllocError, HeapError};
