//! C surface of the block pool. Errors come back as null pointers or -1,
//! with the kind readable through the per-thread `LastBlockPoolError`.

#![allow(non_snake_case)]

use core::{
  ffi::{
    c_int,
    c_void,
  },
  ptr,
  ptr::NonNull,
};

use dmapool_pool::{
  ClassIdx,
  PoolConfig,
  PoolError,
  error,
  global,
};

pub type BlockPoolCallback = unsafe extern "C" fn(*mut c_void, usize) -> u32;

const ERR_NONE: c_int = 0;
const ERR_INVALID_ARGUMENT: c_int = 1;
const ERR_OUT_OF_MEMORY: c_int = 2;
const ERR_OUT_OF_RANGE: c_int = 3;
const ERR_REGISTRATION_FAILED: c_int = 4;

fn error_code(err: PoolError) -> c_int {
  match err {
    PoolError::InvalidArgument => ERR_INVALID_ARGUMENT,
    PoolError::OutOfMemory => ERR_OUT_OF_MEMORY,
    PoolError::OutOfRange => ERR_OUT_OF_RANGE,
    PoolError::RegistrationFailed => ERR_REGISTRATION_FAILED,
  }
}

fn fail<T>(err: PoolError, value: T) -> T {
  error::set_last_error(err);
  value
}

#[unsafe(no_mangle)]
pub extern "C" fn InitBlockPool(cb: Option<BlockPoolCallback>) -> *mut c_void {
  let Some(cb) = cb else {
    return fail(PoolError::InvalidArgument, ptr::null_mut());
  };

  let register = Box::new(move |base: NonNull<u8>, len: usize| unsafe {
    cb(base.as_ptr() as *mut c_void, len)
  });

  match global::init_block_pool(PoolConfig::default(), register) {
    Ok(base) => base.as_ptr() as *mut c_void,
    Err(err) => fail(err, ptr::null_mut()),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn AllocBlock(size: usize) -> *mut c_void {
  match global::alloc_block(size) {
    Ok(ptr) => ptr.as_ptr() as *mut c_void,
    Err(err) => fail(err, ptr::null_mut()),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn DeallocBlock(buf: *mut c_void) -> c_int {
  match global::dealloc_block(buf as *mut u8) {
    Ok(()) => 0,
    Err(err) => fail(err, -1),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn GetRegionId(buf: *const c_void) -> u32 {
  if buf.is_null() {
    return fail(PoolError::InvalidArgument, 0);
  }
  global::get_region_id(buf as *const u8)
}

#[unsafe(no_mangle)]
pub extern "C" fn GetBlockType(buf: *mut c_void) -> c_int {
  match global::get_block_type(buf as *mut u8) {
    Ok(class) => class.0 as c_int,
    Err(err) => fail(err, -1),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn GetBlockSize(class: c_int) -> usize {
  if class < 0 {
    return fail(PoolError::InvalidArgument, 0);
  }

  match global::get_block_size(ClassIdx(class as usize)) {
    Ok(size) => size,
    Err(err) => fail(err, 0),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn GetGlobalLen(class: c_int) -> usize {
  if class < 0 {
    return fail(PoolError::InvalidArgument, 0);
  }

  match global::get_global_len(ClassIdx(class as usize)) {
    Ok(len) => len,
    Err(err) => fail(err, 0),
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn GetRegionNum() -> usize {
  global::get_region_num()
}

#[unsafe(no_mangle)]
pub extern "C" fn DestroyBlockPool() {
  global::destroy_block_pool();
}

/// Error kind recorded by the last failing call on this thread; reading
/// clears it.
#[unsafe(no_mangle)]
pub extern "C" fn LastBlockPoolError() -> c_int {
  match error::take_last_error() {
    Some(err) => error_code(err),
    None => ERR_NONE,
  }
}
