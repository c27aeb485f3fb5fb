// rdma_cm_event_type values from <rdma/rdma_cma.h>.
pub(crate) const RDMA_CM_EVENT_ADDR_RESOLVED: i32 = 0;
pub(crate) const RDMA_CM_EVENT_ROUTE_RESOLVED: i32 = 2;
pub(crate) const RDMA_CM_EVENT_CONNECT_REQUEST: i32 = 4;
pub(crate) const RDMA_CM_EVENT_CONNECT_RESPONSE: i32 = 5;
pub(crate) const RDMA_CM_EVENT_ESTABLISHED: i32 = 9;
pub(crate) const RDMA_CM_EVENT_DISCONNECTED: i32 = 10;

/// Connection-manager events surfaced to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmEvent {
  AddrResolved,
  RouteResolved,
  Established,
  Disconnect,
  /// An event the transport does not act on (rejects, device removal, ...).
  Other,
  /// No event pending; the channel would block.
  None,
  Error,
}

impl CmEvent {
  pub(crate) fn from_raw(event: i32) -> CmEvent {
    match event {
      RDMA_CM_EVENT_ADDR_RESOLVED => CmEvent::AddrResolved,
      RDMA_CM_EVENT_ROUTE_RESOLVED => CmEvent::RouteResolved,
      RDMA_CM_EVENT_ESTABLISHED => CmEvent::Established,
      RDMA_CM_EVENT_DISCONNECTED => CmEvent::Disconnect,
      _ => CmEvent::Other,
    }
  }

  /// True for the event types whose payload carries connection private data.
  pub(crate) fn carries_conn_data(event: i32) -> bool {
    matches!(
      event,
      RDMA_CM_EVENT_CONNECT_REQUEST | RDMA_CM_EVENT_CONNECT_RESPONSE | RDMA_CM_EVENT_ESTABLISHED
    )
  }
}
