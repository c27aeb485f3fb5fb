use core::{
  cell::UnsafeCell,
  sync::atomic::{
    AtomicUsize,
    Ordering,
  },
};

use getset::CloneGetters;

use crate::{
  classes::ClassIdx,
  config::MAX_REGIONS,
};

/// Metadata of one registered memory region. Immutable once installed.
#[derive(Clone, Copy, Debug, CloneGetters)]
pub struct Region {
  /// Base address of the page-aligned span.
  #[getset(get_clone = "pub")]
  start: usize,
  /// Byte length, a multiple of `class size * bucket count`.
  #[getset(get_clone = "pub")]
  size: usize,
  /// Key returned by the registration callback; zero never occurs on an
  /// installed region.
  #[getset(get_clone = "pub")]
  lkey: u32,
  /// The single size class this region's blocks belong to.
  #[getset(get_clone = "pub")]
  class: ClassIdx,
}

impl Region {
  pub fn new(start: usize, size: usize, lkey: u32, class: ClassIdx) -> Self {
    Self {
      start,
      size,
      lkey,
      class,
    }
  }

  const fn empty() -> Self {
    Self {
      start: 0,
      size: 0,
      lkey: 0,
      class: ClassIdx(0),
    }
  }

  #[inline(always)]
  pub fn contains(&self, addr: usize) -> bool {
    addr >= self.start && addr < self.start + self.size
  }

  /// Bucket an address belongs to; holds for every block of the region
  /// regardless of which bucket's list it currently sits on.
  #[inline(always)]
  pub fn bucket_of(&self, addr: usize, buckets: usize) -> usize {
    (addr - self.start) * buckets / self.size
  }
}

/// Fixed-capacity table of installed regions.
///
/// Slots are written under the extend lock and published by advancing
/// `installed` with release ordering; readers go through the acquire load and
/// only ever see fully written slots. A reader racing with an install may
/// miss the new region and must re-check after synchronizing elsewhere.
pub struct RegionTable {
  slots: [UnsafeCell<Region>; MAX_REGIONS],
  installed: AtomicUsize,
}

// SAFETY: see above; published slots are never written again.
unsafe impl Send for RegionTable {}
unsafe impl Sync for RegionTable {}

impl RegionTable {
  pub fn new() -> Self {
    Self {
      slots: [const { UnsafeCell::new(Region::empty()) }; MAX_REGIONS],
      installed: AtomicUsize::new(0),
    }
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.installed.load(Ordering::Acquire)
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn get(&self, idx: usize) -> Option<&Region> {
    if idx >= self.len() {
      return None;
    }
    Some(unsafe { &*self.slots[idx].get() })
  }

  /// Linear scan over the installed prefix.
  pub fn lookup(&self, addr: usize) -> Option<&Region> {
    let installed = self.len();
    for slot in self.slots.iter().take(installed) {
      let region = unsafe { &*slot.get() };
      if region.contains(addr) {
        return Some(region);
      }
    }
    None
  }

  /// Installs `region` in the next free slot and publishes it.
  ///
  /// # Safety
  ///
  /// Caller must hold the extend lock so that no two installs race.
  pub unsafe fn install(&self, region: Region) -> Option<usize> {
    let idx = self.installed.load(Ordering::Relaxed);
    if idx >= MAX_REGIONS {
      return None;
    }

    unsafe { *self.slots[idx].get() = region };
    self.installed.store(idx + 1, Ordering::Release);
    Some(idx)
  }
}

impl Default for RegionTable {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn install_publishes_in_order() {
    let table = RegionTable::new();
    assert!(table.is_empty());
    assert!(table.get(0).is_none());

    let idx = unsafe { table.install(Region::new(0x10000, 0x1000, 7, ClassIdx(0))) };
    assert_eq!(idx, Some(0));
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0).map(|r| r.lkey()), Some(7));
  }

  #[test]
  fn lookup_matches_containing_range() {
    let table = RegionTable::new();
    unsafe {
      table.install(Region::new(0x10000, 0x1000, 1, ClassIdx(0)));
      table.install(Region::new(0x20000, 0x2000, 2, ClassIdx(1)));
    }

    assert_eq!(table.lookup(0x10000).map(|r| r.lkey()), Some(1));
    assert_eq!(table.lookup(0x10fff).map(|r| r.lkey()), Some(1));
    assert!(table.lookup(0x11000).is_none());
    assert_eq!(table.lookup(0x21000).map(|r| r.lkey()), Some(2));
    assert!(table.lookup(0).is_none());
  }

  #[test]
  fn install_stops_at_capacity() {
    let table = RegionTable::new();
    for i in 0..MAX_REGIONS {
      let region = Region::new(0x1000 * (i + 1), 0x1000, i as u32 + 1, ClassIdx(0));
      assert!(unsafe { table.install(region) }.is_some());
    }

    let overflow = Region::new(0x100000, 0x1000, 99, ClassIdx(0));
    assert!(unsafe { table.install(overflow) }.is_none());
    assert_eq!(table.len(), MAX_REGIONS);
  }

  #[test]
  fn bucket_of_partitions_evenly() {
    let region = Region::new(0, 1024, 1, ClassIdx(0));
    assert_eq!(region.bucket_of(0, 4), 0);
    assert_eq!(region.bucket_of(255, 4), 0);
    assert_eq!(region.bucket_of(256, 4), 1);
    assert_eq!(region.bucket_of(768, 4), 3);
    assert_eq!(region.bucket_of(1023, 4), 3);
  }
}
