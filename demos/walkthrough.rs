use std::{error::Error, io::Read};

use libc::sbrk;
use segalloc::{Allocator, Config, HeapStats, SbrkArena};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb`, or just watch how the program break moves.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_stats(stats: &HeapStats) {
  println!(
    "    arena {} B | {} used blocks ({} B) | {} free blocks ({} B, largest {}) | {:.1}% payload",
    stats.arena_bytes,
    stats.allocated_blocks,
    stats.allocated_bytes,
    stats.free_blocks,
    stats.free_bytes,
    stats.largest_free,
    stats.utilization() * 100.0,
  );
}

fn print_heap(allocator: &Allocator<SbrkArena>) {
  for block in allocator.blocks() {
    println!(
      "    {:?} {:>6} B {}",
      block.payload,
      block.size,
      if block.allocated { "used" } else { "free" }
    );
  }
  print_stats(&allocator.stats());
}

fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  // The system allocator shares the break with us; a large chunk keeps our
  // own growth rare so the two are less likely to interleave.
  print_program_break("start");
  let arena = SbrkArena::new()?;
  let mut allocator = Allocator::with_config(arena, Config::new().chunk_size(256 * 1024))?;

  print_program_break("after init");
  print_heap(&allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Small allocations are split off the front of the free space.
  // --------------------------------------------------------------------
  let first = allocator.allocate(4)?;
  let second = allocator.allocate(12)?;
  let third = allocator.allocate(100)?;
  println!("\n[1] Allocated 4, 12 and 100 bytes");
  println!("    first = {first:?}, second = {second:?}, third = {third:?}");

  unsafe {
    first.cast::<u32>().write(0xDEADBEEF);
    second.as_ptr().write_bytes(0xAB, 12);
    println!("[1] Value written to first = 0x{:X}", first.cast::<u32>().read());
  }
  print_heap(&allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Freeing the middle block leaves a hole; freeing its neighbour
  //    merges the two.
  // --------------------------------------------------------------------
  unsafe {
    allocator.free(second.as_ptr());
    println!("\n[2] Freed second");
    print_heap(&allocator);

    allocator.free(first.as_ptr());
    println!("[2] Freed first, which merges with the hole after it");
    print_heap(&allocator);
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A new small request reuses the hole instead of growing.
  // --------------------------------------------------------------------
  let reused = allocator.allocate(2)?;
  println!(
    "\n[3] Allocated 2 bytes at {:?}: {}",
    reused,
    if reused == first {
      "reused the freed block"
    } else {
      "placed somewhere else"
    }
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Resizing: the block after `third` is free, so growing is in place.
  // --------------------------------------------------------------------
  unsafe {
    third.as_ptr().write_bytes(0x42, 100);
    let grown = allocator.resize(third.as_ptr(), 1000)?.ok_or("resize returned nothing")?;
    println!(
      "\n[4] Resized third to 1000 bytes: {:?} ({}), first byte still 0x{:X}",
      grown,
      if grown == third { "in place" } else { "moved" },
      grown.as_ptr().read(),
    );
  }
  print_heap(&allocator);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) A request larger than all free space moves the program break.
  // --------------------------------------------------------------------
  print_program_break("before large alloc");
  let big = allocator.allocate(512 * 1024)?;
  println!("\n[5] Allocated 512 KiB at {big:?}");
  print_program_break("after large alloc");
  print_stats(&allocator.check()?);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) End of demo. The arena is never returned; the OS reclaims it at exit.
  // --------------------------------------------------------------------
  println!("\n[6] End of walkthrough. Heap is consistent: {:?}", allocator.check().is_ok());
  Ok(())
}
