#![cfg_attr(not(test), no_std)]

use core::ptr::NonNull;

use dmapool_sys::{
  GLOBAL_SYSTEM,
  prim::{
    PrimError,
    page_align,
  },
  system::SysError,
};

#[derive(Debug)]
pub enum ExtentError {
  Prim(PrimError),
  System(SysError),
}

pub type ExtentResult<T> = Result<T, ExtentError>;

/// A contiguous span of committed page-aligned memory, unmapped on drop.
pub struct Extent {
  slice: &'static mut [u8],
}

impl Extent {
  /// Maps at least `size` bytes; the span is rounded up to a page multiple.
  pub fn new(size: usize) -> ExtentResult<Extent> {
    let size = page_align(size).map_err(ExtentError::Prim)?;
    let slice = unsafe { GLOBAL_SYSTEM.alloc(size) }.map_err(ExtentError::System)?;

    Ok(Extent { slice })
  }

  #[inline(always)]
  pub fn base(&self) -> NonNull<u8> {
    // SAFETY: the slice comes from a successful mapping and is never null.
    unsafe { NonNull::new_unchecked(self.slice.as_ptr() as *mut u8) }
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.slice.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.slice.is_empty()
  }
}

impl AsRef<[u8]> for Extent {
  fn as_ref(&self) -> &[u8] {
    self.slice
  }
}

impl AsMut<[u8]> for Extent {
  fn as_mut(&mut self) -> &mut [u8] {
    self.slice
  }
}

impl Drop for Extent {
  fn drop(&mut self) {
    let _ = unsafe { GLOBAL_SYSTEM.dealloc(self.slice) };
  }
}
