//! Satellite error types.

use thiserror::Error;

use super::types::SessionState;
use crate::socketio::PacketError;

/// Errors raised by a [`Transport`](super::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("WebSocket error: {0}")]
  WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

  #[error("JSON serialization error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Malformed packet: {0}")]
  Packet(#[from] PacketError),

  #[error("Invalid server URL: {0}")]
  InvalidUrl(String),

  #[error("Not connected to server")]
  NotConnected,
}

/// Errors returned by session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error("Session terminated after authentication failure")]
  Terminated,

  #[error("Connection failed: {0}")]
  Connect(#[from] TransportError),

  #[error("Cannot {op} while {from}")]
  InvalidState { from: SessionState, op: &'static str },
}
