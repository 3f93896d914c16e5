//! Satellite session core.
//!
//! Handles the connection to the control plane, the register handshake,
//! routing of commands and queries to the local media capabilities, and
//! the local pause gate.

mod dispatcher;
mod error;
mod reconnect;
mod session;
mod transport;
mod types;

pub use dispatcher::{route, ActionOutcome, Completion, Dispatcher, Effect, QueryPolicy, Transition};
pub use error::{SessionError, TransportError};
pub use reconnect::Backoff;
pub use session::{Session, SessionControl, SessionNotification};
pub use transport::{CloseReason, Transport, TransportEvent};
pub use types::*;
