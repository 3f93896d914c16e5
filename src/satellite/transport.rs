//! Transport contract consumed by the session.

use std::future::Future;

use serde_json::Value;
use tokio::sync::mpsc;

use super::error::TransportError;
use super::types::OutboundEvent;

/// Why a connection ended without the local side asking for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
  /// The peer closed the connection or left the namespace.
  Remote,
  /// The peer refused the connection attempt.
  Rejected(String),
  /// The network failed (read/write error, missed heartbeat).
  Error(String),
}

/// Signals delivered by a transport, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
  /// The remote endpoint accepted the connection.
  Connected,
  /// A named event with its payload.
  Event { name: String, payload: Value },
  /// The connection dropped. Never sent for a local `disconnect()`.
  Closed(CloseReason),
}

/// A persistent, message-oriented channel to one remote endpoint.
///
/// `connect` hands back the receiving end of the event stream; the session
/// drains it as its single dispatch entry point. Sends are queued and never
/// wait on the network.
pub trait Transport: Send + 'static {
  fn connect(
    &mut self,
    endpoint: &str,
  ) -> impl Future<Output = Result<mpsc::Receiver<TransportEvent>, TransportError>> + Send;

  fn send(&mut self, event: &OutboundEvent) -> Result<(), TransportError>;

  /// Close the connection. Safe to call when not connected.
  fn disconnect(&mut self) -> impl Future<Output = ()> + Send;
}
