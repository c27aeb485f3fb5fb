//! Block allocator for RDMA-registered memory.
//!
//! Registration of memory with an RDMA NIC is too expensive for any hot
//! path, so [`BlockPool`] registers large page-aligned regions up front
//! (through a caller-supplied callback that returns each region's lkey) and
//! carves fixed-size blocks out of them. Free blocks sit on per-size-class,
//! per-bucket idle lists so that concurrent allocators rarely share a lock,
//! and any pointer maps back to its region (and therefore its lkey) with a
//! bounded linear scan.
//!
//! [`cm`] wraps the platform RDMA connection manager for the transport that
//! consumes the pool.

pub use dmapool_cm as cm;
pub use dmapool_pool::{
  BLOCK_CLASS_COUNT,
  BlockPool,
  ClassIdx,
  ClassTable,
  DEFAULT_BLOCK_SIZE,
  PoolConfig,
  PoolError,
  PoolResult,
  Region,
  RegisterFn,
  global,
};

pub mod prelude {
  pub use dmapool_cm::prelude::*;
  pub use dmapool_pool::prelude::*;
}
