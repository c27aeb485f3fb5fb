//! Minimal librdmacm/libibverbs bindings, limited to what the wrapper calls.

#![allow(non_camel_case_types)]

use core::ffi::{
  c_int,
  c_void,
};

pub const RDMA_PS_TCP: c_int = 0x0106;
pub const IBV_QPT_RC: c_int = 2;

#[repr(C)]
pub struct rdma_event_channel {
  pub fd: c_int,
}

/// Leading fields of `struct rdma_cm_id`; instances are always allocated and
/// freed by librdmacm, so the tail can stay unmodeled.
#[repr(C)]
pub struct rdma_cm_id {
  pub verbs: *mut c_void,
  pub channel: *mut rdma_event_channel,
  pub context: *mut c_void,
  pub qp: *mut c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct rdma_conn_param {
  pub private_data: *const c_void,
  pub private_data_len: u8,
  pub responder_resources: u8,
  pub initiator_depth: u8,
  pub flow_control: u8,
  pub retry_count: u8,
  pub rnr_retry_count: u8,
  pub srq: u8,
  pub qp_num: u32,
}

#[repr(C)]
pub union rdma_event_param {
  pub conn: rdma_conn_param,
  // Sized to cover the datagram arm of the union as well.
  pub pad: [u64; 16],
}

#[repr(C)]
pub struct rdma_cm_event {
  pub id: *mut rdma_cm_id,
  pub listen_id: *mut rdma_cm_id,
  pub event: c_int,
  pub status: c_int,
  pub param: rdma_event_param,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ibv_qp_cap {
  pub max_send_wr: u32,
  pub max_recv_wr: u32,
  pub max_send_sge: u32,
  pub max_recv_sge: u32,
  pub max_inline_data: u32,
}

#[repr(C)]
pub struct ibv_qp_init_attr {
  pub qp_context: *mut c_void,
  pub send_cq: *mut c_void,
  pub recv_cq: *mut c_void,
  pub srq: *mut c_void,
  pub cap: ibv_qp_cap,
  pub qp_type: c_int,
  pub sq_sig_all: c_int,
}

#[link(name = "rdmacm")]
unsafe extern "C" {
  pub fn rdma_create_event_channel() -> *mut rdma_event_channel;
  pub fn rdma_destroy_event_channel(channel: *mut rdma_event_channel);
  pub fn rdma_create_id(
    channel: *mut rdma_event_channel,
    id: *mut *mut rdma_cm_id,
    context: *mut c_void,
    ps: c_int,
  ) -> c_int;
  pub fn rdma_destroy_id(id: *mut rdma_cm_id) -> c_int;
  pub fn rdma_bind_addr(id: *mut rdma_cm_id, addr: *mut libc::sockaddr) -> c_int;
  pub fn rdma_listen(id: *mut rdma_cm_id, backlog: c_int) -> c_int;
  pub fn rdma_resolve_addr(
    id: *mut rdma_cm_id,
    src_addr: *mut libc::sockaddr,
    dst_addr: *mut libc::sockaddr,
    timeout_ms: c_int,
  ) -> c_int;
  pub fn rdma_resolve_route(id: *mut rdma_cm_id, timeout_ms: c_int) -> c_int;
  pub fn rdma_connect(id: *mut rdma_cm_id, conn_param: *mut rdma_conn_param) -> c_int;
  pub fn rdma_accept(id: *mut rdma_cm_id, conn_param: *mut rdma_conn_param) -> c_int;
  pub fn rdma_get_cm_event(
    channel: *mut rdma_event_channel,
    event: *mut *mut rdma_cm_event,
  ) -> c_int;
  pub fn rdma_ack_cm_event(event: *mut rdma_cm_event) -> c_int;
  pub fn rdma_migrate_id(id: *mut rdma_cm_id, channel: *mut rdma_event_channel) -> c_int;
  pub fn rdma_create_qp(
    id: *mut rdma_cm_id,
    pd: *mut c_void,
    qp_init_attr: *mut ibv_qp_init_attr,
  ) -> c_int;
}

#[link(name = "ibverbs")]
unsafe extern "C" {
  pub fn ibv_destroy_qp(qp: *mut c_void) -> c_int;
}
