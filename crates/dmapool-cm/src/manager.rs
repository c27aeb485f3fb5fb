use core::ffi::c_void;
use core::ptr::{
  self,
  NonNull,
};
use std::net::SocketAddrV4;

use crate::event::CmEvent;
#[cfg(feature = "verbs")]
use crate::{
  event,
  fd,
  verbs,
};

pub const BACKLOG: i32 = 1024;
pub const CONN_TIMEOUT_MS: i32 = 500;

const FLOW_CONTROL: u8 = 1;
const RETRY_COUNT: u8 = 1;
const RNR_RETRY_COUNT: u8 = 0;
const MAX_SEND_SGE: u32 = 4;
const MAX_RECV_SGE: u32 = 1;
const MAX_INLINE_DATA: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmError {
  /// Built without the `verbs` feature, or no RDMA stack present.
  Unsupported,
  /// An errno reported by librdmacm/libibverbs.
  Sys(i32),
}

pub type CmResult<T> = Result<T, CmError>;

impl CmError {
  pub(crate) fn last_os() -> Self {
    CmError::Sys(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
  }
}

/// Owner of one RDMA-CM identifier and its event channel.
///
/// The channel fd is non-blocking and close-on-exec from construction on, so
/// the event pump can sit in a poller next to ordinary sockets. The wrapper
/// destroys the queue pair, the id, and the channel on drop.
#[derive(Debug)]
pub struct CmManager {
  channel: *mut c_void,
  id: *mut c_void,
  event: *mut c_void,
  conn_data: Vec<u8>,
}

// SAFETY: the raw pointers are owned exclusively by this wrapper; librdmacm
// ids may be driven from any single thread at a time.
unsafe impl Send for CmManager {}

impl CmManager {
  fn from_parts(channel: *mut c_void, id: *mut c_void) -> Self {
    Self {
      channel,
      id,
      event: ptr::null_mut(),
      conn_data: Vec::new(),
    }
  }

  /// Private data attached to the most recent connection event.
  pub fn conn_data(&self) -> &[u8] {
    &self.conn_data
  }
}

#[cfg(feature = "verbs")]
fn sockaddr_of(endpoint: &SocketAddrV4) -> libc::sockaddr_in {
  let mut addr: libc::sockaddr_in = unsafe { core::mem::zeroed() };
  addr.sin_family = libc::AF_INET as libc::sa_family_t;
  addr.sin_port = endpoint.port().to_be();
  addr.sin_addr = libc::in_addr {
    s_addr: u32::from_ne_bytes(endpoint.ip().octets()),
  };
  addr
}

#[cfg(feature = "verbs")]
fn conn_param(data: &[u8]) -> verbs::rdma_conn_param {
  let mut param: verbs::rdma_conn_param = unsafe { core::mem::zeroed() };
  if !data.is_empty() {
    param.private_data = data.as_ptr() as *const c_void;
    param.private_data_len = data.len() as u8;
  }
  param.flow_control = FLOW_CONTROL;
  param.retry_count = RETRY_COUNT;
  param.rnr_retry_count = RNR_RETRY_COUNT;
  param
}

#[cfg(feature = "verbs")]
impl CmManager {
  fn raw_id(&self) -> *mut verbs::rdma_cm_id {
    self.id as *mut verbs::rdma_cm_id
  }

  fn raw_channel(&self) -> *mut verbs::rdma_event_channel {
    self.channel as *mut verbs::rdma_event_channel
  }

  fn setup_channel_fd(channel: *mut verbs::rdma_event_channel) -> CmResult<()> {
    let fd = unsafe { (*channel).fd };
    fd::make_close_on_exec(fd)?;
    fd::make_non_blocking(fd)
  }

  pub fn create() -> CmResult<CmManager> {
    let channel = unsafe { verbs::rdma_create_event_channel() };
    if channel.is_null() {
      return Err(CmError::last_os());
    }

    let mut id: *mut verbs::rdma_cm_id = ptr::null_mut();
    let rc = unsafe {
      verbs::rdma_create_id(channel, &mut id, ptr::null_mut(), verbs::RDMA_PS_TCP)
    };
    if rc < 0 {
      let err = CmError::last_os();
      unsafe { verbs::rdma_destroy_event_channel(channel) };
      return Err(err);
    }

    let manager = CmManager::from_parts(channel as *mut c_void, id as *mut c_void);
    Self::setup_channel_fd(channel)?;
    Ok(manager)
  }

  /// Creates a bound, listening id for `endpoint`.
  pub fn listen(endpoint: SocketAddrV4) -> CmResult<CmManager> {
    let manager = Self::create()?;
    let mut addr = sockaddr_of(&endpoint);

    let rc = unsafe {
      verbs::rdma_bind_addr(
        manager.raw_id(),
        &mut addr as *mut libc::sockaddr_in as *mut libc::sockaddr,
      )
    };
    if rc < 0 {
      return Err(CmError::last_os());
    }

    if unsafe { verbs::rdma_listen(manager.raw_id(), BACKLOG) } < 0 {
      return Err(CmError::last_os());
    }

    Ok(manager)
  }

  /// Takes one pending connection request off a listening id, if any.
  ///
  /// The child is migrated onto its own event channel; the request's private
  /// data is available through `conn_data` on the returned wrapper.
  pub fn get_request(&self) -> CmResult<Option<CmManager>> {
    let mut raw_event: *mut verbs::rdma_cm_event = ptr::null_mut();
    if unsafe { verbs::rdma_get_cm_event(self.raw_channel(), &mut raw_event) } < 0 {
      let err = CmError::last_os();
      if err == CmError::Sys(libc::EAGAIN) {
        return Ok(None);
      }
      return Err(err);
    }

    let request = unsafe { &*raw_event };
    if request.event != event::RDMA_CM_EVENT_CONNECT_REQUEST {
      unsafe { verbs::rdma_ack_cm_event(raw_event) };
      return Ok(None);
    }

    let child_id = request.id;
    let data = unsafe {
      let len = request.param.conn.private_data_len as usize;
      let bytes = request.param.conn.private_data as *const u8;
      if bytes.is_null() || len == 0 {
        Vec::new()
      } else {
        core::slice::from_raw_parts(bytes, len).to_vec()
      }
    };

    let channel = unsafe { verbs::rdma_create_event_channel() };
    if channel.is_null() {
      let err = CmError::last_os();
      unsafe {
        verbs::rdma_ack_cm_event(raw_event);
        verbs::rdma_destroy_id(child_id);
      }
      return Err(err);
    }

    if unsafe { verbs::rdma_migrate_id(child_id, channel) } < 0 {
      let err = CmError::last_os();
      unsafe {
        verbs::rdma_ack_cm_event(raw_event);
        verbs::rdma_destroy_id(child_id);
        verbs::rdma_destroy_event_channel(channel);
      }
      return Err(err);
    }

    unsafe { verbs::rdma_ack_cm_event(raw_event) };

    let mut child =
      CmManager::from_parts(channel as *mut c_void, child_id as *mut c_void);
    child.conn_data = data;
    Self::setup_channel_fd(channel)?;
    Ok(Some(child))
  }

  pub fn resolve_addr(&self, remote: SocketAddrV4) -> CmResult<()> {
    let mut addr = sockaddr_of(&remote);
    let rc = unsafe {
      verbs::rdma_resolve_addr(
        self.raw_id(),
        ptr::null_mut(),
        &mut addr as *mut libc::sockaddr_in as *mut libc::sockaddr,
        CONN_TIMEOUT_MS / 2,
      )
    };
    if rc < 0 {
      return Err(CmError::last_os());
    }
    Ok(())
  }

  pub fn resolve_route(&self) -> CmResult<()> {
    if unsafe { verbs::rdma_resolve_route(self.raw_id(), CONN_TIMEOUT_MS / 2) } < 0 {
      return Err(CmError::last_os());
    }
    Ok(())
  }

  pub fn connect(&self, data: &[u8]) -> CmResult<()> {
    let mut param = conn_param(data);
    if unsafe { verbs::rdma_connect(self.raw_id(), &mut param) } < 0 {
      return Err(CmError::last_os());
    }
    Ok(())
  }

  pub fn accept(&self, data: &[u8]) -> CmResult<()> {
    let mut param = conn_param(data);
    if unsafe { verbs::rdma_accept(self.raw_id(), &mut param) } < 0 {
      return Err(CmError::last_os());
    }
    Ok(())
  }

  /// Acks the previously returned event and reads the next one.
  pub fn get_event(&mut self) -> CmEvent {
    if !self.event.is_null() {
      let rc = unsafe { verbs::rdma_ack_cm_event(self.event as *mut verbs::rdma_cm_event) };
      self.event = ptr::null_mut();
      if rc < 0 {
        log::warn!("failed to ack rdmacm event");
        return CmEvent::Error;
      }
    }

    let mut raw_event: *mut verbs::rdma_cm_event = ptr::null_mut();
    if unsafe { verbs::rdma_get_cm_event(self.raw_channel(), &mut raw_event) } < 0 {
      if CmError::last_os() == CmError::Sys(libc::EAGAIN) {
        return CmEvent::None;
      }
      return CmEvent::Error;
    }

    self.event = raw_event as *mut c_void;
    let pending = unsafe { &*raw_event };

    self.conn_data.clear();
    if event::CmEvent::carries_conn_data(pending.event) {
      unsafe {
        let len = pending.param.conn.private_data_len as usize;
        let bytes = pending.param.conn.private_data as *const u8;
        if !bytes.is_null() && len > 0 {
          self
            .conn_data
            .extend_from_slice(core::slice::from_raw_parts(bytes, len));
        }
      }
    }

    CmEvent::from_raw(pending.event)
  }

  /// Creates an RC queue pair on the id. `cq` is used for both directions;
  /// `pd` is the protection domain the consumer registered its memory with.
  pub fn create_qp(
    &self,
    sq_size: u32,
    rq_size: u32,
    cq: *mut c_void,
    pd: *mut c_void,
    qp_context: u64,
  ) -> CmResult<NonNull<c_void>> {
    let mut attr: verbs::ibv_qp_init_attr = unsafe { core::mem::zeroed() };
    attr.qp_context = qp_context as *mut c_void;
    attr.send_cq = cq;
    attr.recv_cq = cq;
    attr.qp_type = verbs::IBV_QPT_RC;
    attr.sq_sig_all = 0;
    attr.cap = verbs::ibv_qp_cap {
      max_send_wr: sq_size,
      max_recv_wr: rq_size,
      max_send_sge: MAX_SEND_SGE,
      max_recv_sge: MAX_RECV_SGE,
      max_inline_data: MAX_INLINE_DATA,
    };

    if unsafe { verbs::rdma_create_qp(self.raw_id(), pd, &mut attr) } < 0 {
      return Err(CmError::last_os());
    }

    NonNull::new(unsafe { (*self.raw_id()).qp }).ok_or(CmError::last_os())
  }

  /// Destroys the queue pair only; the completion queue stays with its owner.
  pub fn release_qp(&self) {
    if self.id.is_null() {
      return;
    }

    let id = self.raw_id();
    let qp = unsafe { (*id).qp };
    if !qp.is_null() {
      unsafe {
        verbs::ibv_destroy_qp(qp);
        (*id).qp = ptr::null_mut();
      }
    }
  }

  pub fn event_fd(&self) -> Option<i32> {
    if self.channel.is_null() {
      return None;
    }
    Some(unsafe { (*self.raw_channel()).fd })
  }
}

#[cfg(feature = "verbs")]
impl Drop for CmManager {
  fn drop(&mut self) {
    self.release_qp();

    if !self.event.is_null() {
      unsafe { verbs::rdma_ack_cm_event(self.event as *mut verbs::rdma_cm_event) };
      self.event = ptr::null_mut();
    }
    if !self.id.is_null() {
      unsafe { verbs::rdma_destroy_id(self.raw_id()) };
      self.id = ptr::null_mut();
    }
    if !self.channel.is_null() {
      unsafe { verbs::rdma_destroy_event_channel(self.raw_channel()) };
      self.channel = ptr::null_mut();
    }
  }
}

#[cfg(not(feature = "verbs"))]
impl CmManager {
  pub fn create() -> CmResult<CmManager> {
    Err(CmError::Unsupported)
  }

  pub fn listen(_endpoint: SocketAddrV4) -> CmResult<CmManager> {
    Err(CmError::Unsupported)
  }

  pub fn get_request(&self) -> CmResult<Option<CmManager>> {
    Err(CmError::Unsupported)
  }

  pub fn resolve_addr(&self, _remote: SocketAddrV4) -> CmResult<()> {
    Err(CmError::Unsupported)
  }

  pub fn resolve_route(&self) -> CmResult<()> {
    Err(CmError::Unsupported)
  }

  pub fn connect(&self, _data: &[u8]) -> CmResult<()> {
    Err(CmError::Unsupported)
  }

  pub fn accept(&self, _data: &[u8]) -> CmResult<()> {
    Err(CmError::Unsupported)
  }

  pub fn get_event(&mut self) -> CmEvent {
    CmEvent::Error
  }

  pub fn create_qp(
    &self,
    _sq_size: u32,
    _rq_size: u32,
    _cq: *mut c_void,
    _pd: *mut c_void,
    _qp_context: u64,
  ) -> CmResult<NonNull<c_void>> {
    Err(CmError::Unsupported)
  }

  pub fn release_qp(&self) {}

  pub fn event_fd(&self) -> Option<i32> {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(not(feature = "verbs"))]
  #[test]
  fn operations_report_unsupported_without_verbs() {
    let endpoint: SocketAddrV4 = "127.0.0.1:7000".parse().unwrap();

    assert_eq!(CmManager::create().unwrap_err(), CmError::Unsupported);
    assert_eq!(CmManager::listen(endpoint).unwrap_err(), CmError::Unsupported);

    let mut manager = CmManager::from_parts(ptr::null_mut(), ptr::null_mut());
    assert_eq!(manager.get_request().unwrap_err(), CmError::Unsupported);
    assert_eq!(
      manager.resolve_addr(endpoint).unwrap_err(),
      CmError::Unsupported
    );
    assert_eq!(manager.resolve_route().unwrap_err(), CmError::Unsupported);
    assert_eq!(manager.connect(&[]).unwrap_err(), CmError::Unsupported);
    assert_eq!(manager.accept(&[]).unwrap_err(), CmError::Unsupported);
    assert_eq!(manager.get_event(), CmEvent::Error);
    assert_eq!(manager.event_fd(), None);
    assert!(manager.conn_data().is_empty());
    manager.release_qp();
  }
}
