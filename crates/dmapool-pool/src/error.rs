use core::cell::Cell;

use dmapool_extent::ExtentError;
use dmapool_freelist::NodePoolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolError {
  InvalidArgument,
  OutOfMemory,
  OutOfRange,
  RegistrationFailed,
}

pub type PoolResult<T> = Result<T, PoolError>;

impl From<ExtentError> for PoolError {
  fn from(_: ExtentError) -> Self {
    PoolError::OutOfMemory
  }
}

impl From<NodePoolError> for PoolError {
  fn from(_: NodePoolError) -> Self {
    PoolError::OutOfMemory
  }
}

std::thread_local! {
  static LAST_ERROR: Cell<Option<PoolError>> = const { Cell::new(None) };
}

/// Records `err` in the calling thread's error indicator.
pub fn set_last_error(err: PoolError) {
  LAST_ERROR.with(|slot| slot.set(Some(err)));
}

pub fn last_error() -> Option<PoolError> {
  LAST_ERROR.with(|slot| slot.get())
}

pub fn take_last_error() -> Option<PoolError> {
  LAST_ERROR.with(|slot| slot.take())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn indicator_is_per_thread() {
    set_last_error(PoolError::OutOfMemory);
    assert_eq!(last_error(), Some(PoolError::OutOfMemory));

    std::thread::spawn(|| {
      assert_eq!(last_error(), None);
      set_last_error(PoolError::OutOfRange);
      assert_eq!(last_error(), Some(PoolError::OutOfRange));
    })
    .join()
    .unwrap();

    assert_eq!(take_last_error(), Some(PoolError::OutOfMemory));
    assert_eq!(last_error(), None);
  }
}
