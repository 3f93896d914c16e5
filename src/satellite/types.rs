//! Satellite protocol types.
//!
//! Inbound events are decoded leniently: unknown command strings and query
//! kinds become `Unrecognized` values instead of errors, and unknown event
//! names become [`InboundEvent::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names used on the wire.
pub mod event {
  pub const REGISTER: &str = "register";
  pub const REGISTERED: &str = "registered";
  pub const AUTH_ERROR: &str = "auth_error";
  pub const MEDIA_COMMAND: &str = "media_command";
  pub const MEDIA_QUERY: &str = "media_query";
  pub const MEDIA_INFO_RESPONSE: &str = "media_info_response";
}

/// Identity presented to the control plane on every connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
  user_id: String,
  token: String,
}

impl Credentials {
  pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
    Self {
      user_id: user_id.into(),
      token: token.into(),
    }
  }

  pub fn user_id(&self) -> &str {
    &self.user_id
  }

  pub fn token(&self) -> &str {
    &self.token
  }
}

impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credentials")
      .field("user_id", &self.user_id)
      .field("token", &"[REDACTED]")
      .finish()
  }
}

/// Lifecycle state of the single session owned by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
  Disconnected,
  Connecting,
  AwaitingAuth,
  Active,
  Paused,
  Terminated,
}

impl SessionState {
  /// States in which a transport connection is held open.
  pub fn is_connected(self) -> bool {
    matches!(
      self,
      SessionState::AwaitingAuth | SessionState::Active | SessionState::Paused
    )
  }
}

impl fmt::Display for SessionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SessionState::Disconnected => "disconnected",
      SessionState::Connecting => "connecting",
      SessionState::AwaitingAuth => "awaiting auth",
      SessionState::Active => "active",
      SessionState::Paused => "paused",
      SessionState::Terminated => "terminated",
    };
    f.write_str(name)
  }
}

/// A media action the local machine can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaAction {
  PlayPause,
  Next,
  Previous,
}

impl fmt::Display for MediaAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MediaAction::PlayPause => "play/pause",
      MediaAction::Next => "next track",
      MediaAction::Previous => "previous track",
    };
    f.write_str(name)
  }
}

/// Decoded `media_command` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Action(MediaAction),
  Unrecognized(String),
}

impl Command {
  /// Map a wire command string. Play and pause both toggle, since the
  /// local mechanism only exposes a single play/pause key.
  pub fn from_wire(command: &str) -> Self {
    match command {
      "MEDIA_PAUSE" | "MEDIA_PLAY" => Command::Action(MediaAction::PlayPause),
      "MEDIA_NEXT" => Command::Action(MediaAction::Next),
      "MEDIA_PREV" => Command::Action(MediaAction::Previous),
      other => Command::Unrecognized(other.to_string()),
    }
  }
}

/// Correlation token chosen by the peer and echoed back untouched.
///
/// Kept as a raw JSON value so that whatever the peer sent (string, number,
/// or even null) is returned byte-for-byte equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Value);

impl RequestId {
  pub fn as_value(&self) -> &Value {
    &self.0
  }
}

impl From<&str> for RequestId {
  fn from(value: &str) -> Self {
    RequestId(Value::String(value.to_string()))
  }
}

impl fmt::Display for RequestId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.0 {
      Value::String(s) => f.write_str(s),
      other => write!(f, "{}", other),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
  MediaInfo,
  Unrecognized(String),
}

impl QueryKind {
  pub fn from_wire(command: &str) -> Self {
    match command {
      "MEDIA_INFO" => QueryKind::MediaInfo,
      other => QueryKind::Unrecognized(other.to_string()),
    }
  }
}

/// Decoded `media_query` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
  pub request_id: RequestId,
  pub kind: QueryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
  Playing,
  Unknown,
}

/// What is currently playing on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
  pub title: String,
  pub artist: String,
  pub status: PlaybackStatus,
}

/// `register` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload<'a> {
  pub user_id: &'a str,
  pub token: &'a str,
}

/// `media_info_response` payload. `info` serializes as `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfoResponse {
  pub request_id: RequestId,
  pub info: Option<MediaInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaCommandPayload {
  #[serde(default)]
  command: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaQueryPayload {
  #[serde(default)]
  request_id: Value,
  #[serde(default)]
  command: Option<String>,
}

/// An event received from the control plane.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
  Registered(String),
  AuthError(String),
  MediaCommand(Command),
  MediaQuery(Query),
  Unknown(String),
}

impl InboundEvent {
  /// Decode a named event. Never fails: payloads that do not match the
  /// expected shape decode to their `Unrecognized` forms.
  pub fn decode(name: &str, payload: Value) -> Self {
    match name {
      event::REGISTERED => InboundEvent::Registered(message_text(payload)),
      event::AUTH_ERROR => InboundEvent::AuthError(message_text(payload)),
      event::MEDIA_COMMAND => {
        let payload: MediaCommandPayload = serde_json::from_value(payload).unwrap_or_default();
        let command = payload.command.unwrap_or_default();
        InboundEvent::MediaCommand(Command::from_wire(&command))
      }
      event::MEDIA_QUERY => {
        let payload: MediaQueryPayload = serde_json::from_value(payload).unwrap_or_default();
        let command = payload.command.unwrap_or_default();
        InboundEvent::MediaQuery(Query {
          request_id: RequestId(payload.request_id),
          kind: QueryKind::from_wire(&command),
        })
      }
      other => InboundEvent::Unknown(other.to_string()),
    }
  }
}

fn message_text(payload: Value) -> String {
  match payload {
    Value::String(s) => s,
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

/// An event sent to the control plane.
#[derive(Clone, PartialEq)]
pub enum OutboundEvent {
  Register { user_id: String, token: String },
  MediaInfoResponse(MediaInfoResponse),
}

impl fmt::Debug for OutboundEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OutboundEvent::Register { user_id, .. } => f
        .debug_struct("Register")
        .field("user_id", user_id)
        .field("token", &"[REDACTED]")
        .finish(),
      OutboundEvent::MediaInfoResponse(response) => {
        f.debug_tuple("MediaInfoResponse").field(response).finish()
      }
    }
  }
}

impl OutboundEvent {
  pub fn register(credentials: &Credentials) -> Self {
    OutboundEvent::Register {
      user_id: credentials.user_id().to_string(),
      token: credentials.token().to_string(),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      OutboundEvent::Register { .. } => event::REGISTER,
      OutboundEvent::MediaInfoResponse(_) => event::MEDIA_INFO_RESPONSE,
    }
  }

  pub fn payload(&self) -> Result<Value, serde_json::Error> {
    match self {
      OutboundEvent::Register { user_id, token } => serde_json::to_value(RegisterPayload {
        user_id,
        token,
      }),
      OutboundEvent::MediaInfoResponse(response) => serde_json::to_value(response),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_command_mapping() {
    assert_eq!(Command::from_wire("MEDIA_PAUSE"), Command::Action(MediaAction::PlayPause));
    assert_eq!(Command::from_wire("MEDIA_PLAY"), Command::Action(MediaAction::PlayPause));
    assert_eq!(Command::from_wire("MEDIA_NEXT"), Command::Action(MediaAction::Next));
    assert_eq!(Command::from_wire("MEDIA_PREV"), Command::Action(MediaAction::Previous));
    assert_eq!(
      Command::from_wire("MEDIA_SHUFFLE"),
      Command::Unrecognized("MEDIA_SHUFFLE".to_string())
    );
  }

  #[test]
  fn test_decode_media_command_without_command_field() {
    let event = InboundEvent::decode("media_command", json!({ "payload": {} }));
    assert_eq!(event, InboundEvent::MediaCommand(Command::Unrecognized(String::new())));

    let event = InboundEvent::decode("media_command", json!("garbage"));
    assert_eq!(event, InboundEvent::MediaCommand(Command::Unrecognized(String::new())));
  }

  #[test]
  fn test_decode_media_query() {
    let event = InboundEvent::decode(
      "media_query",
      json!({ "requestId": "abc123", "command": "MEDIA_INFO" }),
    );
    assert_eq!(
      event,
      InboundEvent::MediaQuery(Query {
        request_id: RequestId::from("abc123"),
        kind: QueryKind::MediaInfo,
      })
    );
  }

  #[test]
  fn test_decode_unknown_event() {
    let event = InboundEvent::decode("volume_command", json!({ "level": 3 }));
    assert_eq!(event, InboundEvent::Unknown("volume_command".to_string()));
  }

  #[test]
  fn test_registered_message_text() {
    let event = InboundEvent::decode("registered", json!("Connected to Mina Satellite Network"));
    assert_eq!(
      event,
      InboundEvent::Registered("Connected to Mina Satellite Network".to_string())
    );
  }

  #[test]
  fn test_response_echoes_non_string_request_id() {
    let event = InboundEvent::decode("media_query", json!({ "requestId": 42, "command": "MEDIA_INFO" }));
    let InboundEvent::MediaQuery(query) = event else {
      panic!("Expected media query");
    };
    let response = OutboundEvent::MediaInfoResponse(MediaInfoResponse {
      request_id: query.request_id,
      info: None,
    });
    assert_eq!(response.payload().unwrap(), json!({ "requestId": 42, "info": null }));
  }

  #[test]
  fn test_response_payload_with_info() {
    let response = OutboundEvent::MediaInfoResponse(MediaInfoResponse {
      request_id: RequestId::from("abc123"),
      info: Some(MediaInfo {
        title: "Song A".to_string(),
        artist: "Artist B".to_string(),
        status: PlaybackStatus::Playing,
      }),
    });
    assert_eq!(response.name(), "media_info_response");
    assert_eq!(
      response.payload().unwrap(),
      json!({
        "requestId": "abc123",
        "info": { "title": "Song A", "artist": "Artist B", "status": "Playing" }
      })
    );
  }

  #[test]
  fn test_credentials_debug_hides_token() {
    let creds = Credentials::new("1234", "hunter2");
    let debug = format!("{:?}", creds);
    assert!(debug.contains("1234"));
    assert!(!debug.contains("hunter2"));
  }

  #[test]
  fn test_register_payload() {
    let register = OutboundEvent::register(&Credentials::new("1234", "secret"));
    assert_eq!(register.name(), "register");
    assert_eq!(
      register.payload().unwrap(),
      json!({ "userId": "1234", "token": "secret" })
    );
  }

  #[test]
  fn test_register_debug_hides_token() {
    let register = OutboundEvent::register(&Credentials::new("1234", "hunter2"));
    let debug = format!("{:?}", register);
    assert!(debug.contains("1234"));
    assert!(!debug.contains("hunter2"));
  }
}
