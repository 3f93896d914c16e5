//! Runs a session on its own thread for front-ends with their own event
//! loop (console, tray, GUI).

use std::io;
use std::thread::JoinHandle;

use crate::satellite::{Session, SessionControl, SessionNotification, SessionState, Transport};

/// Handle to a session running on a dedicated worker thread.
///
/// Control requests and notifications cross the thread boundary through
/// `async-channel` queues, which can be used from blocking and async code.
pub struct SessionWorker {
  control: async_channel::Sender<SessionControl>,
  notifications: async_channel::Receiver<SessionNotification>,
  thread: Option<JoinHandle<SessionState>>,
}

impl SessionWorker {
  /// Spawn the worker thread and start connecting.
  pub fn spawn<T: Transport>(session: Session<T>) -> io::Result<Self> {
    let (control, control_rx) = async_channel::unbounded();
    let (notify_tx, notifications) = async_channel::unbounded();
    let session = session.with_notifications(notify_tx);

    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()?;

    let thread = std::thread::Builder::new()
      .name("satellite-session".to_string())
      .spawn(move || {
        let state = runtime.block_on(session.run(control_rx));
        log::debug!("Session worker exiting");
        state
      })?;

    Ok(Self {
      control,
      notifications,
      thread: Some(thread),
    })
  }

  /// Queue a control request. Returns false once the session has stopped.
  pub fn request(&self, request: SessionControl) -> bool {
    self.control.try_send(request).is_ok()
  }

  /// Notifications from the session, in the order they happened.
  pub fn notifications(&self) -> async_channel::Receiver<SessionNotification> {
    self.notifications.clone()
  }

  pub fn is_finished(&self) -> bool {
    self.thread.as_ref().map_or(true, JoinHandle::is_finished)
  }

  /// Ask the session to shut down and wait for the thread to exit.
  pub fn shutdown(mut self) -> Option<SessionState> {
    self.request(SessionControl::Shutdown);
    self.join()
  }

  /// Wait for the worker thread. Blocks the calling thread.
  pub fn join(&mut self) -> Option<SessionState> {
    let thread = self.thread.take()?;
    match thread.join() {
      Ok(state) => Some(state),
      Err(_) => {
        log::error!("Session worker panicked");
        None
      }
    }
  }
}

impl Drop for SessionWorker {
  fn drop(&mut self) {
    // Closing the control queue stops the session loop.
    self.control.close();
  }
}
