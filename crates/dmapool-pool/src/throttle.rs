use core::sync::atomic::{
  AtomicU64,
  Ordering,
};
use std::time::{
  SystemTime,
  UNIX_EPOCH,
};

/// Coarse once-per-second gate for failure logging.
pub struct LogThrottle {
  last: AtomicU64,
}

impl LogThrottle {
  pub const fn new() -> Self {
    Self {
      last: AtomicU64::new(0),
    }
  }

  /// True at most once per wall-clock second across all threads.
  pub fn allow(&self) -> bool {
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|elapsed| elapsed.as_secs())
      .unwrap_or(0);

    let prev = self.last.load(Ordering::Relaxed);
    now != prev
      && self
        .last
        .compare_exchange(prev, now, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
  }
}
