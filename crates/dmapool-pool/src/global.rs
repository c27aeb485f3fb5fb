use core::{
  ptr,
  ptr::NonNull,
  sync::atomic::{
    AtomicPtr,
    Ordering,
  },
};

use crate::{
  classes::{
    BLOCK_CLASS_COUNT,
    ClassIdx,
  },
  config::PoolConfig,
  error::{
    PoolError,
    PoolResult,
  },
  pool::{
    BlockPool,
    RegisterFn,
  },
};

static POOL: AtomicPtr<BlockPool> = AtomicPtr::new(ptr::null_mut());

/// Installs the process-wide pool and returns the base of its first region.
/// Fails with `InvalidArgument` if a pool is already installed.
pub fn init_block_pool(cfg: PoolConfig, register: RegisterFn) -> PoolResult<NonNull<u8>> {
  if !POOL.load(Ordering::Acquire).is_null() {
    return Err(PoolError::InvalidArgument);
  }

  let pool = Box::new(BlockPool::new(cfg, register)?);
  let base = pool.region_base(0).ok_or(PoolError::OutOfMemory)?;

  let raw = Box::into_raw(pool);
  if POOL
    .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
    .is_err()
  {
    // Lost a racing init; this instance was never published.
    drop(unsafe { Box::from_raw(raw) });
    return Err(PoolError::InvalidArgument);
  }

  Ok(base)
}

fn with_pool<R>(f: impl FnOnce(&BlockPool) -> PoolResult<R>) -> PoolResult<R> {
  let raw = POOL.load(Ordering::Acquire);
  if raw.is_null() {
    return Err(PoolError::InvalidArgument);
  }

  f(unsafe { &*raw })
}

pub fn alloc_block(size: usize) -> PoolResult<NonNull<u8>> {
  with_pool(|pool| pool.alloc(size))
}

pub fn dealloc_block(ptr: *mut u8) -> PoolResult<()> {
  let ptr = NonNull::new(ptr).ok_or(PoolError::InvalidArgument)?;
  with_pool(|pool| pool.dealloc(ptr))
}

pub fn get_region_id(ptr: *const u8) -> u32 {
  let raw = POOL.load(Ordering::Acquire);
  if raw.is_null() {
    return 0;
  }

  unsafe { &*raw }.region_id_of(ptr)
}

pub fn get_block_type(ptr: *mut u8) -> PoolResult<ClassIdx> {
  let ptr = NonNull::new(ptr).ok_or(PoolError::InvalidArgument)?;
  with_pool(|pool| pool.block_type_of(ptr))
}

pub fn get_block_size(class: ClassIdx) -> PoolResult<usize> {
  if class.0 >= BLOCK_CLASS_COUNT {
    return Err(PoolError::InvalidArgument);
  }

  with_pool(|pool| Ok(pool.block_size(class)))
}

pub fn get_global_len(class: ClassIdx) -> PoolResult<usize> {
  if class.0 >= BLOCK_CLASS_COUNT {
    return Err(PoolError::InvalidArgument);
  }

  with_pool(|pool| Ok(pool.global_len(class)))
}

pub fn get_region_num() -> usize {
  let raw = POOL.load(Ordering::Acquire);
  if raw.is_null() {
    return 0;
  }

  unsafe { &*raw }.region_num()
}

/// Tears the process-wide pool down.
///
/// Callers must guarantee no allocation or deallocation is still in flight;
/// blocks handed out by the pool are invalid afterwards.
pub fn destroy_block_pool() {
  let raw = POOL.swap(ptr::null_mut(), Ordering::AcqRel);
  if !raw.is_null() {
    drop(unsafe { Box::from_raw(raw) });
  }
}
