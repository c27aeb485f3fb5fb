use core::ptr::NonNull;

use dmapool_extent::Extent;
use dmapool_freelist::{
  DEFAULT_CHUNK_SIZE,
  FreeList,
  IdleNode,
  NodePool,
};
use rand::Rng;
use spin::Mutex;

use crate::{
  classes::{
    BLOCK_CLASS_COUNT,
    ClassIdx,
    ClassTable,
  },
  config::{
    MAX_REGIONS,
    MIN_REGION_MB,
    PoolConfig,
  },
  error::{
    PoolError,
    PoolResult,
  },
  region::{
    Region,
    RegionTable,
  },
  throttle::LogThrottle,
};

const BYTES_IN_MB: usize = 1 << 20;

/// Registers a freshly mapped span with the RDMA NIC and returns its lkey.
/// A zero return means registration failed.
pub type RegisterFn = Box<dyn Fn(NonNull<u8>, usize) -> u32 + Send + Sync>;

/// State guarded by the extend lock: the per-class staging lists of freshly
/// minted extents and the backing memory of every installed region.
struct ExtendState {
  ready: [FreeList; BLOCK_CLASS_COUNT],
  extents: [Option<Extent>; MAX_REGIONS],
}

/// Block pool over RDMA-registered regions.
///
/// Regions are registered once, up front, through the callback supplied at
/// construction; allocation then only touches one bucket lock in steady
/// state. Blocks of a class are interchangeable, so freeing never coalesces.
pub struct BlockPool {
  cfg: PoolConfig,
  classes: ClassTable,
  regions: RegionTable,
  idle: [Vec<Mutex<FreeList>>; BLOCK_CLASS_COUNT],
  extend: Mutex<ExtendState>,
  nodes: Mutex<NodePool>,
  register: RegisterFn,
  throttle: LogThrottle,
}

impl core::fmt::Debug for BlockPool {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("BlockPool")
      .field("cfg", &self.cfg)
      .finish_non_exhaustive()
  }
}

impl BlockPool {
  /// Builds the pool and maps, registers, and stages the first region.
  pub fn new(cfg: PoolConfig, register: RegisterFn) -> PoolResult<Self> {
    let cfg = cfg.sanitized();
    let classes = ClassTable::new(cfg.block_size());
    let buckets = cfg.buckets();

    let idle: [Vec<Mutex<FreeList>>; BLOCK_CLASS_COUNT] = core::array::from_fn(|_| {
      (0..buckets)
        .map(|_| Mutex::new(FreeList::new()))
        .collect()
    });

    let pool = Self {
      cfg,
      classes,
      regions: RegionTable::new(),
      idle,
      extend: Mutex::new(ExtendState {
        ready: [const { FreeList::new() }; BLOCK_CLASS_COUNT],
        extents: [const { None }; MAX_REGIONS],
      }),
      nodes: Mutex::new(NodePool::new(DEFAULT_CHUNK_SIZE)),
      register,
      throttle: LogThrottle::new(),
    };

    {
      let mut state = pool.extend.lock();
      pool.extend_region(&mut state, pool.cfg.initial_size_mb(), ClassIdx(0))?;
    }

    Ok(pool)
  }

  /// Maps a new region, registers it, installs it, and stages one ready
  /// extent per bucket. Caller holds the extend lock via `state`.
  fn extend_region(
    &self,
    state: &mut ExtendState,
    size_mb: usize,
    class: ClassIdx,
  ) -> PoolResult<NonNull<u8>> {
    if size_mb < MIN_REGION_MB {
      return Err(PoolError::InvalidArgument);
    }
    if self.regions.len() >= self.cfg.max_regions() {
      return Err(PoolError::OutOfMemory);
    }

    let buckets = self.cfg.buckets();
    let class_size = self.classes.size(class);

    // Regularize so every bucket receives a whole number of blocks.
    let span = class_size * buckets;
    let actual = size_mb * BYTES_IN_MB / span * span;
    if actual == 0 {
      return Err(PoolError::InvalidArgument);
    }

    let extent = Extent::new(actual)?;
    let base = extent.base();

    let lkey = (self.register)(base, actual);
    if lkey == 0 {
      return Err(PoolError::RegistrationFailed);
    }

    let mut held: Vec<NonNull<IdleNode>> = Vec::with_capacity(buckets);
    {
      let mut nodes = self.nodes.lock();
      for _ in 0..buckets {
        match nodes.acquire() {
          Ok(node_ptr) => held.push(node_ptr),
          Err(err) => {
            for node_ptr in held.drain(..) {
              nodes.release(node_ptr);
            }
            return Err(err.into());
          }
        }
      }
    }

    let region = Region::new(base.as_ptr() as usize, actual, lkey, class);
    let Some(idx) = (unsafe { self.regions.install(region) }) else {
      let mut nodes = self.nodes.lock();
      for node_ptr in held.drain(..) {
        nodes.release(node_ptr);
      }
      return Err(PoolError::OutOfMemory);
    };
    state.extents[idx] = Some(extent);

    let per_bucket = actual / buckets;
    for (i, node_ptr) in held.into_iter().enumerate() {
      let node = unsafe { &mut *node_ptr.as_ptr() };
      node.reset(unsafe { base.add(i * per_bucket) }, per_bucket);
      state.ready[class.0].push(node_ptr);
    }

    Ok(base)
  }

  /// Moves at most one staged extent belonging to `bucket` from the class's
  /// ready list onto the given idle shard.
  fn pick_ready(
    &self,
    state: &mut ExtendState,
    shard: &mut FreeList,
    class: ClassIdx,
    bucket: usize,
  ) {
    let buckets = self.cfg.buckets();
    let detached = state.ready[class.0].detach_first(|node| {
      let addr = node.start().as_ptr() as usize;
      match self.regions.lookup(addr) {
        Some(region) => region.bucket_of(addr, buckets) == bucket,
        None => false,
      }
    });

    if let Some(node_ptr) = detached {
      shard.push(node_ptr);
    }
  }

  /// Hands out one block of at least `size` bytes.
  pub fn alloc(&self, size: usize) -> PoolResult<NonNull<u8>> {
    if size == 0 || size > self.classes.largest() {
      return Err(PoolError::InvalidArgument);
    }
    let class = self
      .classes
      .class_for(size)
      .ok_or(PoolError::InvalidArgument)?;

    self.alloc_from(class)
  }

  fn alloc_from(&self, class: ClassIdx) -> PoolResult<NonNull<u8>> {
    let bucket = rand::rng().random_range(0..self.cfg.buckets());
    let mut shard = self.idle[class.0][bucket].lock();

    if shard.is_empty() {
      // Bucket lock is always taken before the extend lock, never the
      // reverse, so the nesting cannot deadlock.
      let mut state = self.extend.lock();
      self.pick_ready(&mut state, &mut shard, class, bucket);
      if shard.is_empty() {
        match self.extend_region(&mut state, self.cfg.increase_size_mb(), class) {
          Ok(_) => self.pick_ready(&mut state, &mut shard, class, bucket),
          Err(err) => {
            if self.throttle.allow() {
              log::error!(
                "failed to extend block pool ({:?}); raise the region size or the region cap",
                err
              );
            }
            return Err(err);
          }
        }
      }
    }

    let class_size = self.classes.size(class);
    let Some(mut head_ptr) = shard.head() else {
      return Err(PoolError::OutOfMemory);
    };

    let head = unsafe { head_ptr.as_mut() };
    let ptr = head.start();
    if head.len() > class_size {
      head.advance(class_size);
    } else {
      debug_assert_eq!(head.len(), class_size);
      shard.pop();
      self.nodes.lock().release(head_ptr);
    }

    Ok(ptr)
  }

  /// Returns a block to its bucket's idle list.
  ///
  /// On node-pool exhaustion the block is leaked and success is still
  /// reported; the caller has no recovery path that would not risk a
  /// double free.
  pub fn dealloc(&self, ptr: NonNull<u8>) -> PoolResult<()> {
    let addr = ptr.as_ptr() as usize;
    let Some(region) = self.regions.lookup(addr) else {
      return Err(PoolError::OutOfRange);
    };

    let class = region.class();
    let class_size = self.classes.size(class);
    let bucket = region.bucket_of(addr, self.cfg.buckets());

    let node_ptr = match self.nodes.lock().acquire() {
      Ok(node_ptr) => node_ptr,
      Err(err) => {
        if self.throttle.allow() {
          log::error!("idle-node pool exhausted ({:?}), leaking one block", err);
        }
        return Ok(());
      }
    };

    unsafe { (*node_ptr.as_ptr()).reset(ptr, class_size) };
    self.idle[class.0][bucket].lock().push(node_ptr);
    Ok(())
  }

  /// The region's lkey, or zero when no installed region contains `ptr`.
  pub fn region_id_of(&self, ptr: *const u8) -> u32 {
    if ptr.is_null() {
      return 0;
    }

    self
      .regions
      .lookup(ptr as usize)
      .map(|region| region.lkey())
      .unwrap_or(0)
  }

  pub fn block_type_of(&self, ptr: NonNull<u8>) -> PoolResult<ClassIdx> {
    self
      .regions
      .lookup(ptr.as_ptr() as usize)
      .map(|region| region.class())
      .ok_or(PoolError::OutOfRange)
  }

  pub fn block_size(&self, class: ClassIdx) -> usize {
    self.classes.size(class)
  }

  /// Total idle bytes across a class's bucket shards.
  pub fn global_len(&self, class: ClassIdx) -> usize {
    self.idle[class.0]
      .iter()
      .map(|shard| shard.lock().total_len())
      .sum()
  }

  /// Bytes still staged on a class's ready list.
  pub fn ready_len(&self, class: ClassIdx) -> usize {
    self.extend.lock().ready[class.0].total_len()
  }

  pub fn region_num(&self) -> usize {
    self.regions.len()
  }

  pub fn region_base(&self, idx: usize) -> Option<NonNull<u8>> {
    let region = self.regions.get(idx)?;
    NonNull::new(region.start() as *mut u8)
  }

  pub fn regions(&self) -> &RegionTable {
    &self.regions
  }

  pub fn config(&self) -> &PoolConfig {
    &self.cfg
  }
}

impl Drop for BlockPool {
  fn drop(&mut self) {
    let nodes = self.nodes.get_mut();

    for shards in self.idle.iter_mut() {
      for shard in shards.iter_mut() {
        let list = shard.get_mut();
        while let Some(node_ptr) = list.pop() {
          nodes.release(node_ptr);
        }
      }
    }

    let state = self.extend.get_mut();
    for list in state.ready.iter_mut() {
      while let Some(node_ptr) = list.pop() {
        nodes.release(node_ptr);
      }
    }
    // Region backing memory is unmapped when `state.extents` drops.
    // Deregistration stays with the callback's owner, which holds the
    // protection domain.
  }
}
