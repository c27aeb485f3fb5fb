use core::ptr::NonNull;

use crate::{
  FreeList,
  NodePool,
};

fn addr_of(buf: &mut [u8], offset: usize) -> NonNull<u8> {
  NonNull::new(unsafe { buf.as_mut_ptr().add(offset) }).unwrap()
}

#[test]
fn push_pop_is_lifo() {
  let mut pool = NodePool::new(4096);
  let mut list = FreeList::new();
  let mut buf = [0u8; 64];

  for offset in [0usize, 16, 32] {
    let node_ptr = pool.acquire().unwrap();
    unsafe { (*node_ptr.as_ptr()).reset(addr_of(&mut buf, offset), 16) };
    list.push(node_ptr);
  }

  let expected: [usize; 3] = [32, 16, 0];
  for offset in expected {
    let node_ptr = list.pop().unwrap();
    let node = unsafe { node_ptr.as_ref() };
    assert_eq!(node.start(), addr_of(&mut buf, offset));
    pool.release(node_ptr);
  }
  assert!(list.is_empty());
}

#[test]
fn advance_carves_front() {
  let mut pool = NodePool::new(4096);
  let mut buf = [0u8; 64];

  let node_ptr = pool.acquire().unwrap();
  let node = unsafe { &mut *node_ptr.as_ptr() };
  node.reset(addr_of(&mut buf, 0), 64);

  node.advance(16);
  assert_eq!(node.start(), addr_of(&mut buf, 16));
  assert_eq!(node.len(), 48);

  node.advance(16);
  assert_eq!(node.start(), addr_of(&mut buf, 32));
  assert_eq!(node.len(), 32);
}

#[test]
fn detach_first_keeps_rest_intact() {
  let mut pool = NodePool::new(4096);
  let mut list = FreeList::new();
  let mut buf = [0u8; 128];

  for offset in [0usize, 32, 64, 96] {
    let node_ptr = pool.acquire().unwrap();
    unsafe { (*node_ptr.as_ptr()).reset(addr_of(&mut buf, offset), 32) };
    list.push(node_ptr);
  }

  let wanted = addr_of(&mut buf, 32);
  let detached = list.detach_first(|node| node.start() == wanted).unwrap();
  assert_eq!(unsafe { detached.as_ref() }.start(), wanted);
  assert_eq!(list.total_len(), 96);

  assert!(list.detach_first(|node| node.start() == wanted).is_none());

  let mut remaining = 0;
  while let Some(node_ptr) = list.pop() {
    remaining += 1;
    pool.release(node_ptr);
  }
  assert_eq!(remaining, 3);
  pool.release(detached);
}

#[test]
fn total_len_sums_runs() {
  let mut pool = NodePool::new(4096);
  let mut list = FreeList::new();
  let mut buf = [0u8; 256];

  assert_eq!(list.total_len(), 0);

  for (offset, len) in [(0usize, 128usize), (128, 64), (192, 32)] {
    let node_ptr = pool.acquire().unwrap();
    unsafe { (*node_ptr.as_ptr()).reset(addr_of(&mut buf, offset), len) };
    list.push(node_ptr);
  }

  assert_eq!(list.total_len(), 224);
}

#[test]
fn released_nodes_are_reused() {
  let mut pool = NodePool::new(4096);

  let first = pool.acquire().unwrap();
  pool.release(first);
  let second = pool.acquire().unwrap();
  assert_eq!(first, second);

  let node = unsafe { second.as_ref() };
  assert_eq!(node.len(), 0);
}

#[test]
fn pool_grows_past_one_chunk() {
  let mut pool = NodePool::new(4096);
  let mut nodes = Vec::new();

  for _ in 0..1000 {
    nodes.push(pool.acquire().unwrap());
  }

  nodes.sort();
  nodes.dedup();
  assert_eq!(nodes.len(), 1000);

  for node_ptr in nodes {
    pool.release(node_ptr);
  }
}
