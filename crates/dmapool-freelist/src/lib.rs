#![cfg_attr(not(test), no_std)]

use core::{
  mem::ManuallyDrop,
  ptr::NonNull,
};

use dmapool_extent::{
  Extent,
  ExtentError,
};
use dmapool_sys::math::align_up;

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Descriptor of a contiguous run of free blocks of a single size class.
///
/// A node covers either one block or a freshly minted multi-block extent that
/// is carved from the front one block at a time.
pub struct IdleNode {
  start: NonNull<u8>,
  len: usize,
  next: Option<NonNull<IdleNode>>,
}

impl IdleNode {
  fn empty() -> Self {
    Self {
      start: NonNull::dangling(),
      len: 0,
      next: None,
    }
  }

  pub fn reset(&mut self, start: NonNull<u8>, len: usize) {
    self.start = start;
    self.len = len;
    self.next = None;
  }

  #[inline(always)]
  pub fn start(&self) -> NonNull<u8> {
    self.start
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.len
  }

  /// Carves `bytes` off the front of the run. `bytes` must be less than the
  /// current length.
  #[inline(always)]
  pub fn advance(&mut self, bytes: usize) {
    debug_assert!(bytes < self.len);
    self.start = unsafe { self.start.add(bytes) };
    self.len -= bytes;
  }
}

/// Singly-linked LIFO of idle nodes. Callers provide the locking.
pub struct FreeList {
  head: Option<NonNull<IdleNode>>,
}

// SAFETY: nodes are owned by the pool that owns the list; every list is
// accessed under a caller-held lock.
unsafe impl Send for FreeList {}

impl FreeList {
  pub const fn new() -> Self {
    Self { head: None }
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  #[inline(always)]
  pub fn head(&self) -> Option<NonNull<IdleNode>> {
    self.head
  }

  pub fn push(&mut self, mut node_ptr: NonNull<IdleNode>) {
    let node = unsafe { node_ptr.as_mut() };
    node.next = self.head;
    self.head = Some(node_ptr);
  }

  pub fn pop(&mut self) -> Option<NonNull<IdleNode>> {
    let mut node_ptr = self.head.take()?;
    let node = unsafe { node_ptr.as_mut() };
    self.head = node.next.take();
    Some(node_ptr)
  }

  /// Unlinks and returns the first node matching `pred`, keeping the rest of
  /// the list intact.
  pub fn detach_first<F>(&mut self, mut pred: F) -> Option<NonNull<IdleNode>>
  where
    F: FnMut(&IdleNode) -> bool,
  {
    let mut prev: Option<NonNull<IdleNode>> = None;
    let mut current = self.head;

    while let Some(mut node_ptr) = current {
      let node = unsafe { node_ptr.as_mut() };
      if pred(node) {
        match prev {
          Some(mut prev_ptr) => unsafe { prev_ptr.as_mut() }.next = node.next.take(),
          None => self.head = node.next.take(),
        }
        return Some(node_ptr);
      }
      prev = current;
      current = node.next;
    }

    None
  }

  pub fn total_len(&self) -> usize {
    let mut sum = 0;
    let mut current = self.head;
    while let Some(node_ptr) = current {
      let node = unsafe { node_ptr.as_ref() };
      sum += node.len;
      current = node.next;
    }
    sum
  }
}

impl Default for FreeList {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug)]
pub enum NodePoolError {
  Extent(ExtentError),
  Layout,
}

pub type NodePoolResult<T> = Result<T, NodePoolError>;

struct Chunk {
  next: Option<NonNull<Chunk>>,
  extent: ManuallyDrop<Extent>,
}

impl Chunk {
  fn data_offset() -> NodePoolResult<usize> {
    align_up(
      core::mem::size_of::<Chunk>(),
      core::mem::align_of::<IdleNode>(),
    )
    .ok_or(NodePoolError::Layout)
  }
}

/// Object pool of idle nodes: chunk-bumped storage plus an intrusive free
/// stack. Nodes are recycled, never individually freed; chunks are unmapped
/// when the pool drops.
pub struct NodePool {
  chunk_size: usize,
  chunks: Option<NonNull<Chunk>>,
  cursor: usize,
  free: Option<NonNull<IdleNode>>,
}

// SAFETY: callers wrap the pool in a lock; chunks and nodes never leave it.
unsafe impl Send for NodePool {}

impl NodePool {
  pub const fn new(chunk_size: usize) -> Self {
    Self {
      chunk_size,
      chunks: None,
      cursor: 0,
      free: None,
    }
  }

  fn grow(&mut self) -> NodePoolResult<()> {
    let offset = Chunk::data_offset()?;
    let extent = Extent::new(self.chunk_size).map_err(NodePoolError::Extent)?;
    let base = extent.base().as_ptr() as *mut Chunk;

    unsafe {
      base.write(Chunk {
        next: self.chunks,
        extent: ManuallyDrop::new(extent),
      });
    }

    self.chunks = NonNull::new(base);
    self.cursor = offset;
    Ok(())
  }

  fn bump(&mut self) -> Option<NonNull<IdleNode>> {
    let chunk_ptr = self.chunks?;
    let chunk = unsafe { chunk_ptr.as_ref() };
    let node_size = core::mem::size_of::<IdleNode>();

    if self.cursor + node_size > chunk.extent.len() {
      return None;
    }

    let addr = chunk_ptr.as_ptr() as usize + self.cursor;
    self.cursor += node_size;
    NonNull::new(addr as *mut IdleNode)
  }

  pub fn acquire(&mut self) -> NodePoolResult<NonNull<IdleNode>> {
    if let Some(mut node_ptr) = self.free {
      let node = unsafe { node_ptr.as_mut() };
      self.free = node.next.take();
      node.start = NonNull::dangling();
      node.len = 0;
      return Ok(node_ptr);
    }

    if let Some(node_ptr) = self.bump() {
      unsafe { node_ptr.as_ptr().write(IdleNode::empty()) };
      return Ok(node_ptr);
    }

    self.grow()?;
    let node_ptr = self.bump().ok_or(NodePoolError::Layout)?;
    unsafe { node_ptr.as_ptr().write(IdleNode::empty()) };
    Ok(node_ptr)
  }

  pub fn release(&mut self, mut node_ptr: NonNull<IdleNode>) {
    let node = unsafe { node_ptr.as_mut() };
    node.next = self.free;
    self.free = Some(node_ptr);
  }
}

impl Drop for NodePool {
  fn drop(&mut self) {
    let mut current = self.chunks.take();
    while let Some(chunk_ptr) = current {
      let chunk = unsafe { &mut *chunk_ptr.as_ptr() };
      current = chunk.next.take();

      // SAFETY: the header lives inside the extent it owns; take the extent
      // out before its storage is unmapped.
      let extent = unsafe { ManuallyDrop::take(&mut chunk.extent) };
      drop(extent);
    }
  }
}

#[cfg(test)]
mod tests;

pub mod prelude {
  pub use super::{
    DEFAULT_CHUNK_SIZE,
    FreeList,
    IdleNode,
    NodePool,
    NodePoolError,
  };
}
