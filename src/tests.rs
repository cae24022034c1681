#![cfg(test)]

use std::{ptr::NonNull, slice};

use fastrand::Rng;
use tracing_subscriber::EnvFilter;

use crate::{Allocator, Config, FitPolicy, MmapArena, align::OVERHEAD};

const TRACE_CAPACITY: usize = 16 << 20;
const MAX_LIVE: usize = 64;
const STEPS: usize = 2000;

fn tracing_init() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

fn heap(fit: FitPolicy) -> Allocator<MmapArena> {
  let arena = MmapArena::with_capacity(TRACE_CAPACITY).unwrap();
  Allocator::with_config(arena, Config::new().fit(fit)).unwrap()
}

struct Live {
  ptr: NonNull<u8>,
  len: usize,
  byte: u8,
}

impl Live {
  fn bytes(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
  }

  fn fill(&mut self) {
    unsafe { self.ptr.as_ptr().write_bytes(self.byte, self.len) };
  }

  fn assert_intact(&self) {
    assert!(
      self.bytes().iter().all(|&b| b == self.byte),
      "payload at {:?} was overwritten",
      self.ptr
    );
  }
}

fn request_size(rng: &mut Rng) -> usize {
  match rng.u8(0..20) {
    0 => rng.usize(8193..20000),
    1..=4 => rng.usize(512..6000),
    _ => rng.usize(1..=512),
  }
}

fn assert_disjoint(
  allocator: &Allocator<MmapArena>,
  live: &[Live],
) {
  let mut spans: Vec<_> = live
    .iter()
    .map(|entry| {
      let start = entry.ptr.as_ptr().addr();
      let size = unsafe { allocator.payload_size(entry.ptr) };
      assert!(size >= entry.len);
      (start, start + size + OVERHEAD)
    })
    .collect();
  spans.sort_unstable();

  for pair in spans.windows(2) {
    assert!(pair[0].1 <= pair[1].0, "{:#x?} overlaps {:#x?}", pair[0], pair[1]);
  }
}

fn run_trace(
  fit: FitPolicy,
  seed: u64,
) {
  tracing_init();

  let mut rng = Rng::with_seed(seed);
  let mut allocator = heap(fit);
  let mut live: Vec<Live> = Vec::new();

  for step in 0..STEPS {
    match rng.u8(0..10) {
      0..=4 if live.len() < MAX_LIVE => {
        let len = request_size(&mut rng);
        let ptr = allocator.allocate(len).unwrap();
        let mut entry = Live {
          ptr,
          len,
          byte: rng.u8(..),
        };
        entry.fill();
        live.push(entry);
      }
      0..=7 if !live.is_empty() => {
        let entry = live.swap_remove(rng.usize(..live.len()));
        entry.assert_intact();
        unsafe { allocator.free(entry.ptr.as_ptr()) };
      }
      _ if !live.is_empty() => {
        let at = rng.usize(..live.len());
        let len = request_size(&mut rng);
        let entry = &mut live[at];

        let kept = entry.len.min(len);
        let ptr = unsafe { allocator.resize(entry.ptr.as_ptr(), len) }
          .unwrap()
          .unwrap();
        entry.ptr = ptr;
        entry.len = kept;
        entry.assert_intact();

        entry.len = len;
        entry.byte = rng.u8(..);
        entry.fill();
      }
      _ => continue,
    }

    let stats = allocator.check().unwrap_or_else(|err| panic!("step {step}: {err}"));
    assert_eq!(stats.allocated_blocks, live.len());

    if step % 64 == 0 {
      live.iter().for_each(Live::assert_intact);
      assert_disjoint(&allocator, &live);
    }
  }

  live.iter().for_each(Live::assert_intact);
  assert_disjoint(&allocator, &live);

  tracing::debug!(?fit, seed, stats = ?allocator.stats(), "trace finished");

  for entry in live.drain(..) {
    unsafe { allocator.free(entry.ptr.as_ptr()) };
  }
  let stats = allocator.check().unwrap();
  assert_eq!(stats.allocated_blocks, 0);
  assert_eq!(stats.free_blocks, 1);
}

#[test]
fn test_trace_best_fit() {
  for seed in [1, 0x5eed, 0xdead_beef] {
    run_trace(FitPolicy::BestFit, seed);
  }
}

#[test]
fn test_trace_first_fit() {
  for seed in [2, 0xf1257, 0xcafe_babe] {
    run_trace(FitPolicy::FirstFit, seed);
  }
}

#[test]
fn test_trace_next_fit() {
  for seed in [3, 0x4e87, 0xfeed_face] {
    run_trace(FitPolicy::NextFit, seed);
  }
}

#[test]
fn test_round_trip() {
  tracing_init();

  for fit in [FitPolicy::BestFit, FitPolicy::FirstFit, FitPolicy::NextFit] {
    let mut allocator = heap(fit);
    let mut live = Vec::new();

    for (i, len) in [1, 15, 16, 17, 1024, 4096].into_iter().enumerate() {
      let ptr = allocator.allocate(len).unwrap();
      assert_eq!(ptr.as_ptr().addr() % crate::align::ALIGNMENT, 0);

      let mut entry = Live {
        ptr,
        len,
        byte: 0xA0 | i as u8,
      };
      entry.fill();
      live.push(entry);
    }

    live.iter().for_each(Live::assert_intact);
    assert_disjoint(&allocator, &live);
    allocator.check().unwrap();
  }
}

#[test]
fn test_out_of_memory_keeps_heap() {
  tracing_init();

  let arena = MmapArena::with_capacity(64 << 10).unwrap();
  let mut allocator = Allocator::new(arena).unwrap();
  let mut live = Vec::new();

  // exhaust the arena one chunk at a time
  let err = loop {
    match allocator.allocate(3000) {
      Ok(ptr) => live.push(ptr),
      Err(err) => break err,
    }
  };
  assert!(matches!(err, crate::AllocError::OutOfMemory(_)));
  let stats = allocator.check().unwrap();
  assert_eq!(stats.allocated_blocks, live.len());

  // the tail left over by the last split still serves small requests
  assert!(stats.largest_free >= 64);
  allocator.allocate(16).unwrap();
  allocator.check().unwrap();
}
