//! Socket.IO client transport over a websocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::protocol::{EnginePacket, SocketPacket};
use crate::satellite::{CloseReason, OutboundEvent, Transport, TransportError, TransportEvent};

const ENGINE_IO_PATH: &str = "/socket.io/";
/// Heartbeat window used until the server announces its own.
const DEFAULT_PING_WINDOW: Duration = Duration::from_secs(45);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const EVENT_BUFFER: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the Engine.IO websocket URL for a server address.
///
/// `http://host:3001` becomes `ws://host:3001/socket.io/?EIO=4&transport=websocket`.
pub fn engine_io_url(endpoint: &str) -> Result<String, TransportError> {
  let endpoint = endpoint.trim().trim_end_matches('/');

  let (scheme, rest) = if let Some(rest) = endpoint.strip_prefix("http://") {
    ("ws", rest)
  } else if let Some(rest) = endpoint.strip_prefix("https://") {
    ("wss", rest)
  } else if let Some(rest) = endpoint.strip_prefix("ws://") {
    ("ws", rest)
  } else if let Some(rest) = endpoint.strip_prefix("wss://") {
    ("wss", rest)
  } else {
    return Err(TransportError::InvalidUrl(format!(
      "{} (must start with http://, https://, ws:// or wss://)",
      endpoint
    )));
  };

  if rest.is_empty() || rest.starts_with('/') {
    return Err(TransportError::InvalidUrl(format!("{} (missing host)", endpoint)));
  }

  // keep an explicit socket.io path if the caller already gave one
  let host_and_path = if rest.contains(ENGINE_IO_PATH.trim_end_matches('/')) {
    rest.trim_end_matches('/').to_string() + "/"
  } else {
    format!("{}{}", rest, ENGINE_IO_PATH)
  };

  Ok(format!(
    "{}://{}?EIO=4&transport=websocket",
    scheme, host_and_path
  ))
}

/// Socket.IO connection to the satellite server.
#[derive(Default)]
pub struct SocketIoTransport {
  outbound: Option<mpsc::UnboundedSender<Message>>,
  cancel_token: Option<CancellationToken>,
  task_handle: Option<JoinHandle<()>>,
}

impl SocketIoTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drive one connection until it closes or is cancelled.
  async fn run_connection(
    ws_stream: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    event_tx: mpsc::Sender<TransportEvent>,
    cancel_token: CancellationToken,
  ) {
    let (mut write, mut read) = ws_stream.split();
    let mut outbound_open = true;
    let mut ping_window = DEFAULT_PING_WINDOW;
    let heartbeat = tokio::time::sleep(ping_window);
    tokio::pin!(heartbeat);

    let reason = loop {
      tokio::select! {
        _ = cancel_token.cancelled() => {
          log::info!("Socket.IO shutdown requested via cancellation");
          if let Ok(text) = EnginePacket::Message(SocketPacket::Disconnect).encode() {
            let _ = write.send(Message::Text(text.into())).await;
          }
          let _ = write.close().await;
          return;
        }
        _ = &mut heartbeat => {
          log::warn!("No heartbeat from server within {:?}", ping_window);
          break CloseReason::Error("heartbeat timeout".to_string());
        }
        outgoing = outbound_rx.recv(), if outbound_open => {
          let Some(message) = outgoing else {
            outbound_open = false;
            continue;
          };
          if let Err(e) = write.send(message).await {
            log::error!("Failed to write to server: {}", e);
            break CloseReason::Error(e.to_string());
          }
        }
        incoming = read.next() => {
          let text = match incoming {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) => {
              log::info!("WebSocket closed by server");
              break CloseReason::Remote;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
              log::error!("WebSocket error: {}", e);
              break CloseReason::Error(e.to_string());
            }
            None => {
              log::info!("WebSocket stream ended");
              break CloseReason::Remote;
            }
          };

          let packet = match EnginePacket::parse(text.as_str()) {
            Ok(packet) => packet,
            Err(e) => {
              log::warn!("Ignoring malformed packet: {} - {}", e, text.as_str());
              continue;
            }
          };

          match packet {
            EnginePacket::Open(handshake) => {
              ping_window = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
              heartbeat.as_mut().reset(Instant::now() + ping_window);
              log::debug!("Engine.IO session opened (ping window {:?})", ping_window);
              if let Err(e) = Self::write_packet(&mut write, EnginePacket::Message(SocketPacket::Connect)).await {
                break CloseReason::Error(e.to_string());
              }
            }
            EnginePacket::Ping => {
              heartbeat.as_mut().reset(Instant::now() + ping_window);
              if let Err(e) = Self::write_packet(&mut write, EnginePacket::Pong).await {
                break CloseReason::Error(e.to_string());
              }
            }
            EnginePacket::Close => break CloseReason::Remote,
            EnginePacket::Message(SocketPacket::Connect) => {
              if event_tx.send(TransportEvent::Connected).await.is_err() {
                return;
              }
            }
            EnginePacket::Message(SocketPacket::Disconnect) => {
              log::info!("Server closed the namespace");
              break CloseReason::Remote;
            }
            EnginePacket::Message(SocketPacket::ConnectError(message)) => {
              break CloseReason::Rejected(message);
            }
            EnginePacket::Message(SocketPacket::Event { name, payload }) => {
              if event_tx.send(TransportEvent::Event { name, payload }).await.is_err() {
                return;
              }
            }
            EnginePacket::Message(SocketPacket::Binary) => {
              log::debug!("Ignoring binary Socket.IO packet");
            }
            EnginePacket::Pong
            | EnginePacket::Upgrade
            | EnginePacket::Noop
            | EnginePacket::Message(SocketPacket::Ack) => {}
          }
        }
      }
    };

    let _ = write.close().await;
    let _ = event_tx.send(TransportEvent::Closed(reason)).await;
  }

  async fn write_packet<W>(write: &mut W, packet: EnginePacket) -> Result<(), TransportError>
  where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
  {
    let text = packet.encode()?;
    write.send(Message::Text(text.into())).await?;
    Ok(())
  }
}

impl Transport for SocketIoTransport {
  async fn connect(
    &mut self,
    endpoint: &str,
  ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
    // Drop any previous connection
    self.disconnect().await;

    let url = engine_io_url(endpoint)?;
    log::info!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let cancel_token = CancellationToken::new();

    let handle = tokio::spawn(Self::run_connection(
      ws_stream,
      outbound_rx,
      event_tx,
      cancel_token.clone(),
    ));

    self.outbound = Some(outbound_tx);
    self.cancel_token = Some(cancel_token);
    self.task_handle = Some(handle);

    Ok(event_rx)
  }

  fn send(&mut self, event: &OutboundEvent) -> Result<(), TransportError> {
    let outbound = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
    let text = EnginePacket::event(event.name(), event.payload()?)?;
    outbound
      .send(Message::Text(text.into()))
      .map_err(|_| TransportError::NotConnected)
  }

  async fn disconnect(&mut self) {
    self.outbound = None;

    if let Some(token) = self.cancel_token.take() {
      token.cancel();
    }

    if let Some(handle) = self.task_handle.take() {
      let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle).await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_http_endpoint_maps_to_ws() {
    assert_eq!(
      engine_io_url("http://localhost:3001").unwrap(),
      "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
    );
  }

  #[test]
  fn test_https_endpoint_maps_to_wss() {
    assert_eq!(
      engine_io_url("https://mina.example.com/").unwrap(),
      "wss://mina.example.com/socket.io/?EIO=4&transport=websocket"
    );
  }

  #[test]
  fn test_existing_socketio_path_is_kept() {
    assert_eq!(
      engine_io_url("ws://10.0.0.2:3001/socket.io").unwrap(),
      "ws://10.0.0.2:3001/socket.io/?EIO=4&transport=websocket"
    );
  }

  #[test]
  fn test_invalid_endpoints() {
    assert!(matches!(engine_io_url("localhost:3001"), Err(TransportError::InvalidUrl(_))));
    assert!(matches!(engine_io_url("http://"), Err(TransportError::InvalidUrl(_))));
  }

  #[tokio::test]
  async fn test_send_without_connection_fails() {
    let mut transport = SocketIoTransport::new();
    let register = OutboundEvent::Register {
      user_id: "1".to_string(),
      token: "t".to_string(),
    };
    assert!(matches!(transport.send(&register), Err(TransportError::NotConnected)));
  }

  #[tokio::test]
  async fn test_disconnect_when_idle_is_noop() {
    let mut transport = SocketIoTransport::new();
    transport.disconnect().await;
    transport.disconnect().await;
    assert!(transport.outbound.is_none());
  }

  // Connection behavior against a scripted server on localhost.

  use serde_json::json;
  use tokio::net::TcpListener;

  type ServerStream = WebSocketStream<TcpStream>;

  const WAIT: Duration = Duration::from_secs(2);

  struct Connection {
    transport: SocketIoTransport,
    events: mpsc::Receiver<TransportEvent>,
    server: ServerStream,
  }

  fn open_packet(ping_interval: u64, ping_timeout: u64) -> String {
    format!(
      r#"0{{"sid":"abc","upgrades":[],"pingInterval":{},"pingTimeout":{},"maxPayload":1000000}}"#,
      ping_interval, ping_timeout
    )
  }

  async fn server_send(server: &mut ServerStream, text: &str) {
    server.send(Message::Text(text.into())).await.unwrap();
  }

  /// Next text frame the client wrote, or `None` once it closed.
  async fn server_recv(server: &mut ServerStream) -> Option<String> {
    tokio::time::timeout(WAIT, async {
      loop {
        match server.next().await {
          Some(Ok(Message::Text(text))) => return Some(text.as_str().to_string()),
          Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
          Some(Ok(_)) => {}
        }
      }
    })
    .await
    .expect("client wrote nothing")
  }

  async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> Option<TransportEvent> {
    tokio::time::timeout(WAIT, events.recv())
      .await
      .expect("no transport event")
  }

  /// Connect a transport and complete the Engine.IO open exchange.
  async fn open_connection(ping_interval: u64, ping_timeout: u64) -> Connection {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let mut transport = SocketIoTransport::new();

    let accept = async {
      let (stream, _) = listener.accept().await.unwrap();
      tokio_tungstenite::accept_async(stream).await.unwrap()
    };
    let (events, mut server) = tokio::join!(transport.connect(&endpoint), accept);
    let events = events.unwrap();

    server_send(&mut server, &open_packet(ping_interval, ping_timeout)).await;
    assert_eq!(server_recv(&mut server).await.as_deref(), Some("40"));

    Connection {
      transport,
      events,
      server,
    }
  }

  #[tokio::test]
  async fn test_session_traffic() {
    let mut c = open_connection(25_000, 20_000).await;

    server_send(&mut c.server, r#"40{"sid":"xyz"}"#).await;
    assert!(matches!(next_event(&mut c.events).await, Some(TransportEvent::Connected)));

    server_send(&mut c.server, "2").await;
    assert_eq!(server_recv(&mut c.server).await.as_deref(), Some("3"));

    server_send(&mut c.server, r#"42["registered","ok"]"#).await;
    match next_event(&mut c.events).await {
      Some(TransportEvent::Event { name, payload }) => {
        assert_eq!(name, "registered");
        assert_eq!(payload, json!("ok"));
      }
      other => panic!("unexpected {:?}", other),
    }

    let register = OutboundEvent::Register {
      user_id: "1".to_string(),
      token: "t".to_string(),
    };
    c.transport.send(&register).unwrap();
    let written = server_recv(&mut c.server).await.unwrap();
    assert_eq!(
      EnginePacket::parse(&written).unwrap(),
      EnginePacket::Message(SocketPacket::Event {
        name: "register".to_string(),
        payload: json!({ "userId": "1", "token": "t" }),
      })
    );
  }

  #[tokio::test]
  async fn test_local_disconnect_says_goodbye_without_closed_event() {
    let mut c = open_connection(25_000, 20_000).await;
    server_send(&mut c.server, "40").await;
    assert!(matches!(next_event(&mut c.events).await, Some(TransportEvent::Connected)));

    let (_, goodbye) = tokio::join!(c.transport.disconnect(), server_recv(&mut c.server));
    assert_eq!(goodbye.as_deref(), Some("41"));
    assert_eq!(server_recv(&mut c.server).await, None);

    // the event stream just ends
    assert!(next_event(&mut c.events).await.is_none());
    assert!(matches!(
      c.transport.send(&OutboundEvent::Register {
        user_id: "1".to_string(),
        token: "t".to_string(),
      }),
      Err(TransportError::NotConnected)
    ));
  }

  #[tokio::test]
  async fn test_connect_error_is_rejection() {
    let mut c = open_connection(25_000, 20_000).await;
    server_send(&mut c.server, r#"44{"message":"Invalid namespace"}"#).await;

    match next_event(&mut c.events).await {
      Some(TransportEvent::Closed(CloseReason::Rejected(message))) => {
        assert_eq!(message, "Invalid namespace")
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_server_close_packets_end_connection() {
    for packet in ["41", "1"] {
      let mut c = open_connection(25_000, 20_000).await;
      server_send(&mut c.server, packet).await;
      assert!(
        matches!(
          next_event(&mut c.events).await,
          Some(TransportEvent::Closed(CloseReason::Remote))
        ),
        "for {}",
        packet
      );
    }
  }

  #[tokio::test]
  async fn test_close_frame_ends_connection() {
    let mut c = open_connection(25_000, 20_000).await;
    c.server.close(None).await.unwrap();
    assert!(matches!(
      next_event(&mut c.events).await,
      Some(TransportEvent::Closed(CloseReason::Remote))
    ));
  }

  #[tokio::test]
  async fn test_silent_server_hits_heartbeat_timeout() {
    let mut c = open_connection(50, 50).await;
    server_send(&mut c.server, "40").await;
    assert!(matches!(next_event(&mut c.events).await, Some(TransportEvent::Connected)));

    match next_event(&mut c.events).await {
      Some(TransportEvent::Closed(CloseReason::Error(message))) => {
        assert_eq!(message, "heartbeat timeout")
      }
      other => panic!("unexpected {:?}", other),
    }
  }
}
