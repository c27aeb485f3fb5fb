use getset::CloneGetters;

use crate::classes::DEFAULT_BLOCK_SIZE;

/// Smallest region size accepted, in MB. RDMA registration is expensive
/// enough that smaller regions are never worth it.
pub const MIN_REGION_MB: usize = 64;

/// Hard cap on installed regions; the reverse lookup stays a linear scan.
pub const MAX_REGIONS: usize = 16;

const DEFAULT_REGION_MB: usize = 1024;
const DEFAULT_BUCKETS: usize = 4;

#[derive(Clone, Copy, Debug, CloneGetters)]
pub struct PoolConfig {
  /// Size of the first region in MB.
  #[getset(get_clone = "pub")]
  initial_size_mb: usize,
  /// Size of every subsequent region in MB.
  #[getset(get_clone = "pub")]
  increase_size_mb: usize,
  /// Cap on installed regions.
  #[getset(get_clone = "pub")]
  max_regions: usize,
  /// Idle-list fan-out per size class.
  #[getset(get_clone = "pub")]
  buckets: usize,
  /// Base block size; the class table is `{B, 2B, 4B, 8B}`.
  #[getset(get_clone = "pub")]
  block_size: usize,
}

impl PoolConfig {
  pub fn new() -> Self {
    Self {
      initial_size_mb: DEFAULT_REGION_MB,
      increase_size_mb: DEFAULT_REGION_MB,
      max_regions: MAX_REGIONS,
      buckets: DEFAULT_BUCKETS,
      block_size: DEFAULT_BLOCK_SIZE,
    }
  }

  pub fn with_initial_size_mb(mut self, mb: usize) -> Self {
    self.initial_size_mb = mb;
    self
  }

  pub fn with_increase_size_mb(mut self, mb: usize) -> Self {
    self.increase_size_mb = mb;
    self
  }

  pub fn with_max_regions(mut self, regions: usize) -> Self {
    self.max_regions = regions;
    self
  }

  pub fn with_buckets(mut self, buckets: usize) -> Self {
    self.buckets = buckets;
    self
  }

  pub fn with_block_size(mut self, bytes: usize) -> Self {
    self.block_size = bytes;
    self
  }

  /// Clamps every field into its supported range.
  pub(crate) fn sanitized(mut self) -> Self {
    self.initial_size_mb = self.initial_size_mb.max(MIN_REGION_MB);
    self.increase_size_mb = self.increase_size_mb.max(MIN_REGION_MB);
    self.max_regions = self.max_regions.clamp(1, MAX_REGIONS);
    self.buckets = self.buckets.max(1);
    if self.block_size == 0 {
      self.block_size = DEFAULT_BLOCK_SIZE;
    }
    self
  }
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sanitize_clamps_fields() {
    let cfg = PoolConfig::new()
      .with_initial_size_mb(1)
      .with_increase_size_mb(0)
      .with_max_regions(100)
      .with_buckets(0)
      .with_block_size(0)
      .sanitized();

    assert_eq!(cfg.initial_size_mb(), MIN_REGION_MB);
    assert_eq!(cfg.increase_size_mb(), MIN_REGION_MB);
    assert_eq!(cfg.max_regions(), MAX_REGIONS);
    assert_eq!(cfg.buckets(), 1);
    assert_eq!(cfg.block_size(), DEFAULT_BLOCK_SIZE);
  }

  #[test]
  fn sanitize_keeps_valid_fields() {
    let cfg = PoolConfig::new()
      .with_initial_size_mb(64)
      .with_increase_size_mb(128)
      .with_max_regions(4)
      .with_buckets(8)
      .sanitized();

    assert_eq!(cfg.initial_size_mb(), 64);
    assert_eq!(cfg.increase_size_mb(), 128);
    assert_eq!(cfg.max_regions(), 4);
    assert_eq!(cfg.buckets(), 8);
  }
}
