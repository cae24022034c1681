use crate::align::{CHUNK_SIZE, MIN_BLOCK_SIZE, checked_align};

/// How a free block is chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitPolicy {
  /// Smallest sufficient block in the lowest class that has one.
  #[default]
  BestFit,
  /// First sufficient block in class order.
  FirstFit,
  /// First sufficient block in address order, resuming after the previous
  /// placement and wrapping around once.
  NextFit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  chunk_size: usize,
  initial_extra: usize,
  fit: FitPolicy,
  split_on_shrink: bool,
}

impl Config {
  /// Extra growth done once at startup so the very first minimum-size
  /// requests are served without touching the big chunk.
  pub const DEFAULT_INITIAL_EXTRA: usize = MIN_BLOCK_SIZE;

  pub const fn new() -> Self {
    Self {
      chunk_size: CHUNK_SIZE,
      initial_extra: Self::DEFAULT_INITIAL_EXTRA,
      fit: FitPolicy::BestFit,
      split_on_shrink: true,
    }
  }

  /// Minimum number of bytes requested from the arena when nothing fits.
  pub const fn chunk_size(
    mut self,
    bytes: usize,
  ) -> Self {
    self.chunk_size = bytes;
    self
  }

  /// Size of the second growth performed at startup; `0` skips it.
  pub const fn initial_extra(
    mut self,
    bytes: usize,
  ) -> Self {
    self.initial_extra = bytes;
    self
  }

  pub const fn fit(
    mut self,
    fit: FitPolicy,
  ) -> Self {
    self.fit = fit;
    self
  }

  /// Whether shrinking `resize` calls give their tail back to the free index.
  pub const fn split_on_shrink(
    mut self,
    split: bool,
  ) -> Self {
    self.split_on_shrink = split;
    self
  }

  pub const fn fit_policy(&self) -> FitPolicy {
    self.fit
  }

  pub const fn shrinks_in_place(&self) -> bool {
    self.split_on_shrink
  }

  /// Chunk size as a usable block size.
  pub const fn chunk_bytes(&self) -> usize {
    growth_bytes(self.chunk_size)
  }

  /// Initial extra growth as a usable block size, or `None` if disabled.
  pub const fn initial_extra_bytes(&self) -> Option<usize> {
    match self.initial_extra {
      0 => None,
      bytes => Some(growth_bytes(bytes)),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}

/// Rounds a growth request to something that can hold one block.
pub(crate) const fn growth_bytes(bytes: usize) -> usize {
  let bytes = if bytes < MIN_BLOCK_SIZE { MIN_BLOCK_SIZE } else { bytes };
  match checked_align(bytes) {
    Some(aligned) => aligned,
    None => usize::MAX & !(crate::align::ALIGNMENT - 1),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::ALIGNMENT;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.chunk_bytes(), CHUNK_SIZE);
    assert_eq!(config.initial_extra_bytes(), Some(MIN_BLOCK_SIZE));
    assert_eq!(config.fit_policy(), FitPolicy::BestFit);
    assert!(config.shrinks_in_place());
  }

  #[test]
  fn test_rounding() {
    let config = Config::new().chunk_size(1).initial_extra(MIN_BLOCK_SIZE + 1);
    assert_eq!(config.chunk_bytes(), MIN_BLOCK_SIZE);
    assert_eq!(config.initial_extra_bytes(), Some(MIN_BLOCK_SIZE + ALIGNMENT));

    let config = Config::new().initial_extra(0).fit(FitPolicy::NextFit);
    assert_eq!(config.initial_extra_bytes(), None);
    assert_eq!(config.fit_policy(), FitPolicy::NextFit);
  }
}
