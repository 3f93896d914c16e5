//! Remote-control satellite: executes media commands and answers
//! "what's playing?" queries for a bot server over Socket.IO.

pub mod config;
pub mod media;
pub mod satellite;
pub mod socketio;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, ConfigError, Settings};
pub use media::Capabilities;
pub use satellite::{Dispatcher, Session, SessionControl, SessionNotification, SessionState};
pub use socketio::SocketIoTransport;
pub use worker::SessionWorker;

/// Build a session for validated settings using the detected OS capabilities.
pub fn build_session(settings: Settings) -> Session<SocketIoTransport> {
  let dispatcher = Dispatcher::new(
    Capabilities::detect(),
    settings.query_timeout,
    settings.query_policy,
  );
  let session = Session::new(
    SocketIoTransport::default(),
    settings.endpoint,
    settings.credentials,
    dispatcher,
  );
  if settings.auto_reconnect {
    session
  } else {
    session.with_backoff(None)
  }
}
