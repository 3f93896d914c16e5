//! Test doubles for the transport and the media capabilities.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::media::{ActionBackend, Capabilities, CapabilityError, MediaInfoProvider};
use crate::satellite::{
  MediaAction, MediaInfo, OutboundEvent, PlaybackStatus, Transport, TransportError, TransportEvent,
};

#[derive(Default)]
struct TransportLog {
  connects: usize,
  disconnects: usize,
  failures_left: usize,
  sent: Vec<OutboundEvent>,
  events_tx: Option<mpsc::Sender<TransportEvent>>,
}

/// In-memory transport. The paired [`Remote`] plays the server.
pub struct MockTransport {
  log: Arc<Mutex<TransportLog>>,
  sent_tx: mpsc::UnboundedSender<OutboundEvent>,
}

/// Server side of a [`MockTransport`].
pub struct Remote {
  log: Arc<Mutex<TransportLog>>,
  sent_rx: mpsc::UnboundedReceiver<OutboundEvent>,
}

impl MockTransport {
  pub fn pair() -> (MockTransport, Remote) {
    Self::failing(0)
  }

  /// A transport whose first `failures` connect attempts fail.
  pub fn failing(failures: usize) -> (MockTransport, Remote) {
    let log = Arc::new(Mutex::new(TransportLog {
      failures_left: failures,
      ..Default::default()
    }));
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    (
      MockTransport {
        log: log.clone(),
        sent_tx,
      },
      Remote { log, sent_rx },
    )
  }
}

impl Transport for MockTransport {
  async fn connect(
    &mut self,
    _endpoint: &str,
  ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
    let mut log = self.log.lock();
    log.connects += 1;
    if log.failures_left > 0 {
      log.failures_left -= 1;
      return Err(TransportError::NotConnected);
    }
    let (tx, rx) = mpsc::channel(64);
    log.events_tx = Some(tx);
    Ok(rx)
  }

  fn send(&mut self, event: &OutboundEvent) -> Result<(), TransportError> {
    let mut log = self.log.lock();
    if log.events_tx.is_none() {
      return Err(TransportError::NotConnected);
    }
    log.sent.push(event.clone());
    let _ = self.sent_tx.send(event.clone());
    Ok(())
  }

  async fn disconnect(&mut self) {
    let mut log = self.log.lock();
    if log.events_tx.take().is_some() {
      log.disconnects += 1;
    }
  }
}

impl Remote {
  /// Deliver an event to the client. Returns false when not connected.
  pub async fn push(&self, event: TransportEvent) -> bool {
    let tx = self.log.lock().events_tx.clone();
    match tx {
      Some(tx) => tx.send(event).await.is_ok(),
      None => false,
    }
  }

  pub async fn emit(&self, name: &str, payload: serde_json::Value) -> bool {
    self
      .push(TransportEvent::Event {
        name: name.to_string(),
        payload,
      })
      .await
  }

  /// Wait for the next outbound event, failing the test after two seconds.
  pub async fn next_sent(&mut self) -> OutboundEvent {
    tokio::time::timeout(Duration::from_secs(2), self.sent_rx.recv())
      .await
      .expect("timed out waiting for an outbound event")
      .expect("transport dropped")
  }

  /// Wait until the client has connected `count` times.
  pub async fn wait_for_connects(&self, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
      while self.connects() < count || self.log.lock().events_tx.is_none() {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .expect("timed out waiting for connect");
  }

  pub fn connects(&self) -> usize {
    self.log.lock().connects
  }

  pub fn disconnects(&self) -> usize {
    self.log.lock().disconnects
  }

  pub fn sent(&self) -> Vec<OutboundEvent> {
    self.log.lock().sent.clone()
  }

  pub fn registers_sent(&self) -> usize {
    self
      .sent()
      .iter()
      .filter(|e| matches!(e, OutboundEvent::Register { .. }))
      .count()
  }
}

/// Records every action it is asked to perform.
#[derive(Default)]
pub struct FakeActions {
  executed: Mutex<Vec<MediaAction>>,
  fail: bool,
  delay: Option<Duration>,
}

impl FakeActions {
  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Default::default()
    }
  }

  /// Each action takes `delay` to finish.
  pub fn slow(delay: Duration) -> Self {
    Self {
      delay: Some(delay),
      ..Default::default()
    }
  }

  pub fn executed(&self) -> Vec<MediaAction> {
    self.executed.lock().clone()
  }
}

impl ActionBackend for FakeActions {
  fn name(&self) -> &'static str {
    "fake"
  }

  fn execute(&self, action: MediaAction) -> BoxFuture<'_, Result<(), CapabilityError>> {
    self.executed.lock().push(action);
    Box::pin(async move {
      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }
      if self.fail {
        Err(CapabilityError::Failed("key press rejected".to_string()))
      } else {
        Ok(())
      }
    })
  }
}

enum Behavior {
  Answer(Option<MediaInfo>),
  Delayed(Duration, Option<MediaInfo>),
  Hang,
  Panic,
  PanicOnCall,
}

/// Media info provider with scripted behavior.
pub struct FakeMediaInfo {
  behavior: Behavior,
  calls: Mutex<usize>,
}

impl FakeMediaInfo {
  fn with(behavior: Behavior) -> Self {
    Self {
      behavior,
      calls: Mutex::new(0),
    }
  }

  pub fn playing(title: &str, artist: &str) -> Self {
    Self::with(Behavior::Answer(Some(track(title, artist))))
  }

  pub fn nothing() -> Self {
    Self::with(Behavior::Answer(None))
  }

  pub fn delayed(delay: Duration, title: &str, artist: &str) -> Self {
    Self::with(Behavior::Delayed(delay, Some(track(title, artist))))
  }

  pub fn hanging() -> Self {
    Self::with(Behavior::Hang)
  }

  pub fn panicking() -> Self {
    Self::with(Behavior::Panic)
  }

  /// Panics in `fetch` itself, before any future exists.
  pub fn panicking_on_call() -> Self {
    Self::with(Behavior::PanicOnCall)
  }

  pub fn calls(&self) -> usize {
    *self.calls.lock()
  }
}

impl MediaInfoProvider for FakeMediaInfo {
  fn name(&self) -> &'static str {
    "fake"
  }

  fn fetch(&self) -> BoxFuture<'_, Result<Option<MediaInfo>, CapabilityError>> {
    *self.calls.lock() += 1;
    if let Behavior::PanicOnCall = self.behavior {
      panic!("media session API unreachable");
    }
    Box::pin(async move {
      match &self.behavior {
        Behavior::Answer(info) => Ok(info.clone()),
        Behavior::Delayed(delay, info) => {
          tokio::time::sleep(*delay).await;
          Ok(info.clone())
        }
        Behavior::Hang => std::future::pending().await,
        Behavior::Panic => panic!("media session API crashed"),
        Behavior::PanicOnCall => unreachable!(),
      }
    })
  }
}

pub fn track(title: &str, artist: &str) -> MediaInfo {
  MediaInfo {
    title: title.to_string(),
    artist: artist.to_string(),
    status: PlaybackStatus::Playing,
  }
}

pub fn capabilities(actions: Arc<FakeActions>, media_info: Arc<FakeMediaInfo>) -> Capabilities {
  Capabilities {
    actions,
    media_info,
  }
}
