//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Reference: https://socket.io/docs/v4/engine-io-protocol/ and
//! https://socket.io/docs/v4/socket-io-protocol/
//!
//! Only the text subset used by the satellite protocol is handled: the
//! default namespace, events without binary attachments, and heartbeats.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketError {
  #[error("empty packet")]
  Empty,
  #[error("unknown packet type '{0}'")]
  UnknownType(char),
  #[error("invalid JSON body: {0}")]
  Json(#[from] serde_json::Error),
  #[error("event packet without a name")]
  MissingEventName,
}

/// Parameters announced by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
  pub sid: String,
  /// Milliseconds between server pings.
  pub ping_interval: u64,
  /// Milliseconds the server waits for a pong.
  pub ping_timeout: u64,
}

/// Engine.IO packet (transport layer).
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
  Open(Handshake),
  Close,
  Ping,
  Pong,
  Message(SocketPacket),
  Upgrade,
  Noop,
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
  Connect,
  Disconnect,
  Event { name: String, payload: Value },
  Ack,
  ConnectError(String),
  Binary,
}

impl EnginePacket {
  pub fn parse(text: &str) -> Result<Self, PacketError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let body = chars.as_str();

    match kind {
      '0' => Ok(EnginePacket::Open(serde_json::from_str(body)?)),
      '1' => Ok(EnginePacket::Close),
      '2' => Ok(EnginePacket::Ping),
      '3' => Ok(EnginePacket::Pong),
      '4' => Ok(EnginePacket::Message(SocketPacket::parse(body)?)),
      '5' => Ok(EnginePacket::Upgrade),
      '6' => Ok(EnginePacket::Noop),
      other => Err(PacketError::UnknownType(other)),
    }
  }

  pub fn encode(&self) -> Result<String, PacketError> {
    let text = match self {
      EnginePacket::Open(_) => return Err(PacketError::UnknownType('0')),
      EnginePacket::Close => "1".to_string(),
      EnginePacket::Ping => "2".to_string(),
      EnginePacket::Pong => "3".to_string(),
      EnginePacket::Message(packet) => format!("4{}", packet.encode()?),
      EnginePacket::Upgrade => "5".to_string(),
      EnginePacket::Noop => "6".to_string(),
    };
    Ok(text)
  }

  /// Encode a named event for the default namespace.
  pub fn event(name: &str, payload: Value) -> Result<String, PacketError> {
    EnginePacket::Message(SocketPacket::Event {
      name: name.to_string(),
      payload,
    })
    .encode()
  }
}

impl SocketPacket {
  fn parse(text: &str) -> Result<Self, PacketError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let body = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
      '0' => Ok(SocketPacket::Connect),
      '1' => Ok(SocketPacket::Disconnect),
      '2' => {
        let mut args: Vec<Value> = serde_json::from_str(body)?;
        if args.is_empty() {
          return Err(PacketError::MissingEventName);
        }
        let name = match args.remove(0) {
          Value::String(name) => name,
          _ => return Err(PacketError::MissingEventName),
        };
        // extra arguments are not part of the protocol and are dropped
        let payload = args.into_iter().next().unwrap_or(Value::Null);
        Ok(SocketPacket::Event { name, payload })
      }
      '3' => Ok(SocketPacket::Ack),
      '4' => {
        let message = match serde_json::from_str::<Value>(body) {
          Ok(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("connection refused")
            .to_string(),
          Ok(Value::String(s)) => s,
          _ => "connection refused".to_string(),
        };
        Ok(SocketPacket::ConnectError(message))
      }
      '5' | '6' => Ok(SocketPacket::Binary),
      other => Err(PacketError::UnknownType(other)),
    }
  }

  fn encode(&self) -> Result<String, PacketError> {
    let text = match self {
      SocketPacket::Connect => "0".to_string(),
      SocketPacket::Disconnect => "1".to_string(),
      SocketPacket::Event { name, payload } => {
        format!("2{}", serde_json::to_string(&[Value::from(name.as_str()), payload.clone()])?)
      }
      SocketPacket::Ack => "3[]".to_string(),
      SocketPacket::ConnectError(message) => {
        format!("4{}", serde_json::json!({ "message": message }))
      }
      SocketPacket::Binary => return Err(PacketError::UnknownType('5')),
    };
    Ok(text)
  }
}

/// Drop a `/namespace,` prefix.
fn strip_namespace(body: &str) -> &str {
  if body.starts_with('/') {
    match body.find(',') {
      Some(idx) => &body[idx + 1..],
      None => "",
    }
  } else {
    body
  }
}

/// Drop a numeric ack id preceding the JSON body.
fn strip_ack_id(body: &str) -> &str {
  body.trim_start_matches(|c: char| c.is_ascii_digit())
}
