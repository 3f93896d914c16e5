//! Media key injection through `xdotool` (X11).

use std::path::PathBuf;
use std::process::Stdio;

use futures_util::future::BoxFuture;
use tokio::process::Command;

use super::{ActionBackend, CapabilityError};
use crate::satellite::MediaAction;

/// Presses XF86 media keys. Reaches players that do not speak MPRIS, as long
/// as they listen for global media keys.
#[derive(Debug, Clone)]
pub struct Xdotool {
  path: PathBuf,
}

impl Xdotool {
  pub fn detect() -> Option<Self> {
    // key injection needs an X display
    std::env::var_os("DISPLAY")?;
    which::which("xdotool").ok().map(|path| Self { path })
  }

  fn keysym(action: MediaAction) -> &'static str {
    match action {
      MediaAction::PlayPause => "XF86AudioPlay",
      MediaAction::Next => "XF86AudioNext",
      MediaAction::Previous => "XF86AudioPrev",
    }
  }
}

impl ActionBackend for Xdotool {
  fn name(&self) -> &'static str {
    "xdotool"
  }

  fn execute(&self, action: MediaAction) -> BoxFuture<'_, Result<(), CapabilityError>> {
    Box::pin(async move {
      let keysym = Self::keysym(action);
      let status = Command::new(&self.path)
        .args(["key", keysym])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await?;

      if status.success() {
        Ok(())
      } else {
        Err(CapabilityError::Failed(format!(
          "xdotool key {} exited with {}",
          keysym, status
        )))
      }
    })
  }
}
