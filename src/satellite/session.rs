//! Session - connection lifecycle, authentication and the pause gate.
//!
//! ```text
//! Disconnected --connect--> Connecting --transport up--> AwaitingAuth
//! AwaitingAuth --registered--> Active <--pause/resume--> Paused
//! any live state --auth_error--> Terminated (absorbing)
//! any live state --transport drop--> Disconnected
//! ```

use std::ops::ControlFlow;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::dispatcher::{Completion, Dispatcher, Effect};
use super::error::SessionError;
use super::reconnect::Backoff;
use super::transport::{CloseReason, Transport, TransportEvent};
use super::types::*;
use crate::media::CapabilityError;

/// Requests sent to a running session from outside its event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
  Connect,
  Disconnect,
  Pause,
  Resume,
  Shutdown,
}

/// Observable changes pushed to front-ends.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
  StateChanged(SessionState),
  Registered(String),
  AuthRejected(String),
  ConnectFailed(String),
  CommandExecuted(MediaAction),
  CommandFailed { action: MediaAction, error: String },
  QueryAnswered { request_id: RequestId, info: Option<MediaInfo> },
}

/// The single session of this process.
pub struct Session<T: Transport> {
  transport: T,
  endpoint: String,
  credentials: Credentials,
  dispatcher: Dispatcher,
  state: SessionState,
  events: Option<mpsc::Receiver<TransportEvent>>,
  /// `None` disables automatic reconnects.
  backoff: Option<Backoff>,
  reconnect_at: Option<Instant>,
  notifications: Option<async_channel::Sender<SessionNotification>>,
}

impl<T: Transport> Session<T> {
  pub fn new(
    transport: T,
    endpoint: impl Into<String>,
    credentials: Credentials,
    dispatcher: Dispatcher,
  ) -> Self {
    Self {
      transport,
      endpoint: endpoint.into(),
      credentials,
      dispatcher,
      state: SessionState::Disconnected,
      events: None,
      backoff: Some(Backoff::default()),
      reconnect_at: None,
      notifications: None,
    }
  }

  /// Replace the reconnect schedule; `None` turns automatic reconnects off.
  pub fn with_backoff(mut self, backoff: Option<Backoff>) -> Self {
    self.backoff = backoff;
    self
  }

  /// Push observable changes into `sender`.
  pub fn with_notifications(mut self, sender: async_channel::Sender<SessionNotification>) -> Self {
    self.notifications = Some(sender);
    self
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn reconnect_scheduled(&self) -> bool {
    self.reconnect_at.is_some()
  }

  /// Open the transport. The session stays `Connecting` until the
  /// transport reports it is up.
  pub async fn connect(&mut self) -> Result<(), SessionError> {
    match self.state {
      SessionState::Terminated => return Err(SessionError::Terminated),
      SessionState::Disconnected => {}
      _ => return Ok(()),
    }

    self.reconnect_at = None;
    self.set_state(SessionState::Connecting);
    log::info!("Connecting to {}...", self.endpoint);

    match self.transport.connect(&self.endpoint).await {
      Ok(events) => {
        self.events = Some(events);
        Ok(())
      }
      Err(e) => {
        log::error!("Connection failed: {}", e);
        self.notify(SessionNotification::ConnectFailed(e.to_string()));
        self.set_state(SessionState::Disconnected);
        Err(e.into())
      }
    }
  }

  /// Leave the server. Safe in every state; only the first call from a
  /// connected state reaches the transport.
  pub async fn disconnect(&mut self) {
    self.reconnect_at = None;
    if matches!(self.state, SessionState::Disconnected | SessionState::Terminated) {
      return;
    }

    log::info!("Disconnecting...");
    self.close_transport().await;
    self.set_state(SessionState::Disconnected);
  }

  /// Stop executing commands until [`resume`](Self::resume).
  pub fn pause(&mut self) -> Result<(), SessionError> {
    match self.state {
      SessionState::Active => {
        self.set_state(SessionState::Paused);
        log::warn!("Satellite paused - commands will be ignored");
        Ok(())
      }
      SessionState::Paused => Ok(()),
      from => Err(SessionError::InvalidState { from, op: "pause" }),
    }
  }

  pub fn resume(&mut self) -> Result<(), SessionError> {
    match self.state {
      SessionState::Paused => {
        self.set_state(SessionState::Active);
        log::info!("Satellite resumed - ready for commands");
        Ok(())
      }
      SessionState::Active => Ok(()),
      from => Err(SessionError::InvalidState { from, op: "resume" }),
    }
  }

  /// Connect at startup, retrying once straight away before handing over
  /// to the backoff schedule.
  pub async fn start(&mut self) {
    if self.connect().await.is_ok() {
      return;
    }
    log::info!("Retrying connection once");
    if let Err(SessionError::Connect(_)) = self.connect().await {
      self.schedule_reconnect();
    }
  }

  /// Run the event loop until shut down, the control channel closes, or
  /// authentication fails. Returns the final state.
  pub async fn run(mut self, control: async_channel::Receiver<SessionControl>) -> SessionState {
    self.start().await;

    while self.state != SessionState::Terminated {
      let reconnect_at = self.reconnect_at;

      tokio::select! {
        request = control.recv() => {
          // a closed control channel means nobody can steer the session any more
          let request = request.unwrap_or(SessionControl::Shutdown);
          if self.handle_control(request).await.is_break() {
            break;
          }
        }
        event = next_event(&mut self.events) => match event {
          Some(event) => self.handle_transport_event(event).await,
          None => {
            self
              .handle_connection_lost(CloseReason::Error("event stream ended".to_string()))
              .await
          }
        },
        completion = self.dispatcher.next_completion(), if self.dispatcher.is_busy() => match completion {
          Some(Completion::Action((action, result))) => self.report_action(action, result),
          Some(Completion::Query(response)) => self.send_response(response),
          None => {}
        },
        _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
          self.reconnect_at = None;
          if let Err(SessionError::Connect(_)) = self.connect().await {
            self.schedule_reconnect();
          }
        }
      }
    }

    log::info!("Session finished ({})", self.state);
    self.state
  }

  async fn handle_control(&mut self, request: SessionControl) -> ControlFlow<()> {
    match request {
      SessionControl::Connect => {
        if let Err(e) = self.connect().await {
          log::warn!("Connect request failed: {}", e);
        }
      }
      SessionControl::Disconnect => self.disconnect().await,
      SessionControl::Pause => {
        if let Err(e) = self.pause() {
          log::warn!("{}", e);
        }
      }
      SessionControl::Resume => {
        if let Err(e) = self.resume() {
          log::warn!("{}", e);
        }
      }
      SessionControl::Shutdown => {
        self.disconnect().await;
        return ControlFlow::Break(());
      }
    }
    ControlFlow::Continue(())
  }

  /// Process one transport signal.
  pub async fn handle_transport_event(&mut self, event: TransportEvent) {
    match event {
      TransportEvent::Connected => self.handle_connected(),
      TransportEvent::Event { name, payload } => {
        let event = InboundEvent::decode(&name, payload);
        self.handle_inbound(event).await;
      }
      TransportEvent::Closed(reason) => self.handle_connection_lost(reason).await,
    }
  }

  fn handle_connected(&mut self) {
    if self.state != SessionState::Connecting {
      log::debug!("Ignoring transport connected signal while {}", self.state);
      return;
    }

    log::info!("Connected to server!");
    self.set_state(SessionState::AwaitingAuth);
    log::info!("Registering as user {}", self.credentials.user_id());
    if let Err(e) = self.transport.send(&OutboundEvent::register(&self.credentials)) {
      // the transport reports the drop separately
      log::error!("Failed to send register: {}", e);
    }
  }

  async fn handle_inbound(&mut self, event: InboundEvent) {
    match &event {
      InboundEvent::MediaCommand(command) => log::info!("Command received: {:?}", command),
      InboundEvent::MediaQuery(query) => {
        log::info!("Query received: {:?} (ID: {})", query.kind, query.request_id)
      }
      InboundEvent::Unknown(name) => log::debug!("Ignoring unknown event '{}'", name),
      InboundEvent::Registered(_) | InboundEvent::AuthError(_) => {}
    }

    let previous = self.state;
    let transition = self.dispatcher.route(previous, &event);

    if transition.effects.is_empty() && transition.next == previous {
      if !matches!(event, InboundEvent::Unknown(_)) {
        log::debug!("Dropping {:?} while {}", event, previous);
      }
      return;
    }

    for effect in transition.effects {
      match effect {
        Effect::Execute(action) => self.dispatcher.execute(action),
        Effect::Resolve(request_id) => self.dispatcher.resolve(request_id),
        Effect::Disconnect => self.close_transport().await,
      }
    }

    match event {
      InboundEvent::Registered(message) if transition.next == SessionState::Active => {
        log::info!("{}", message);
        log::info!("Ready for commands...");
        if let Some(backoff) = self.backoff.as_mut() {
          backoff.reset();
        }
        self.notify(SessionNotification::Registered(message));
      }
      InboundEvent::AuthError(message) => {
        log::error!("Authentication error: {}", message);
        self.reconnect_at = None;
        self.notify(SessionNotification::AuthRejected(message));
      }
      _ => {}
    }

    self.set_state(transition.next);
  }

  async fn handle_connection_lost(&mut self, reason: CloseReason) {
    match self.state {
      SessionState::Disconnected | SessionState::Terminated => return,
      SessionState::Connecting => {
        let message = match &reason {
          CloseReason::Rejected(message) => message.clone(),
          CloseReason::Error(message) => message.clone(),
          CloseReason::Remote => "closed by server".to_string(),
        };
        log::error!("Connection failed: {}", message);
        self.notify(SessionNotification::ConnectFailed(message));
      }
      _ => log::warn!("Disconnected from server: {:?}", reason),
    }

    self.close_transport().await;
    self.set_state(SessionState::Disconnected);
    self.schedule_reconnect();
  }

  fn report_action(&self, action: MediaAction, result: Result<(), CapabilityError>) {
    match result {
      Ok(()) => {
        log::info!("Executed: {}", action);
        self.notify(SessionNotification::CommandExecuted(action));
      }
      Err(e) => {
        log::error!("Error executing {}: {}", action, e);
        self.notify(SessionNotification::CommandFailed {
          action,
          error: e.to_string(),
        });
      }
    }
  }

  fn send_response(&mut self, response: MediaInfoResponse) {
    if !self.state.is_connected() {
      log::debug!("Discarding response for {} while {}", response.request_id, self.state);
      return;
    }

    match &response.info {
      Some(info) => log::info!("Media info: {} - {}", info.title, info.artist),
      None => log::info!("No media playing"),
    }

    let notification = SessionNotification::QueryAnswered {
      request_id: response.request_id.clone(),
      info: response.info.clone(),
    };
    match self.transport.send(&OutboundEvent::MediaInfoResponse(response)) {
      Ok(()) => self.notify(notification),
      Err(e) => log::warn!("Failed to send media info response: {}", e),
    }
  }

  /// Abandon queries and close the transport without touching the state.
  async fn close_transport(&mut self) {
    self.dispatcher.abandon_all();
    self.events = None;
    self.transport.disconnect().await;
  }

  fn schedule_reconnect(&mut self) {
    if self.state == SessionState::Terminated {
      return;
    }
    if let Some(backoff) = self.backoff.as_mut() {
      let delay = backoff.next_delay();
      log::info!(
        "Attempting reconnection in {:?} (attempt {})",
        delay,
        backoff.attempt()
      );
      self.reconnect_at = Some(Instant::now() + delay);
    }
  }

  fn set_state(&mut self, next: SessionState) {
    if self.state == next {
      return;
    }
    log::debug!("Session state: {} -> {}", self.state, next);
    self.state = next;
    self.notify(SessionNotification::StateChanged(next));
  }

  fn notify(&self, notification: SessionNotification) {
    if let Some(sender) = &self.notifications {
      // unbounded; fails only when every receiver is gone
      let _ = sender.try_send(notification);
    }
  }
}

/// Next event from the current connection; pends forever while there is none.
async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
  match events {
    Some(rx) => rx.recv().await,
    None => std::future::pending().await,
  }
}
