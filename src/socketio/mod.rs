//! Socket.IO client used as the satellite transport.
//!
//! Architecture:
//! - `protocol.rs` - Engine.IO / Socket.IO text packet codec
//! - `transport.rs` - websocket connection task, heartbeats, outbound queue

mod protocol;
mod transport;

pub use protocol::{EnginePacket, Handshake, PacketError, SocketPacket};
pub use transport::{engine_io_url, SocketIoTransport};
