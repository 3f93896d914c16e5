//! Local media capabilities.
//!
//! Two capability interfaces sit between the session and the OS:
//! - [`ActionBackend`] performs play/pause, next and previous
//! - [`MediaInfoProvider`] reports what is currently playing
//!
//! Concrete backends are probed once at startup in preference order and the
//! first available one is kept for the process lifetime. When nothing is
//! available, [`Unavailable`] stands in and reports
//! [`CapabilityError::Unavailable`] on every call.

mod playerctl;
mod xdotool;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::satellite::{MediaAction, MediaInfo};

pub use playerctl::Playerctl;
pub use xdotool::Xdotool;

#[derive(Debug, Error)]
pub enum CapabilityError {
  #[error("No backend available on this machine")]
  Unavailable,
  #[error("Backend call failed: {0}")]
  Failed(String),
  #[error("Failed to run backend: {0}")]
  Io(#[from] std::io::Error),
}

/// Performs media actions against the local machine. The returned future
/// must not block the executor; OS calls go through `tokio::process`.
pub trait ActionBackend: Send + Sync {
  fn name(&self) -> &'static str;
  fn execute(&self, action: MediaAction) -> BoxFuture<'_, Result<(), CapabilityError>>;
}

/// Reads current track metadata. Implementations must tolerate concurrent
/// calls; `Ok(None)` means nothing is playing.
pub trait MediaInfoProvider: Send + Sync {
  fn name(&self) -> &'static str;
  fn fetch(&self) -> BoxFuture<'_, Result<Option<MediaInfo>, CapabilityError>>;
}

/// Fallback used when no backend could be found.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl ActionBackend for Unavailable {
  fn name(&self) -> &'static str {
    "unavailable"
  }

  fn execute(&self, _action: MediaAction) -> BoxFuture<'_, Result<(), CapabilityError>> {
    Box::pin(async { Err(CapabilityError::Unavailable) })
  }
}

impl MediaInfoProvider for Unavailable {
  fn name(&self) -> &'static str {
    "unavailable"
  }

  fn fetch(&self) -> BoxFuture<'_, Result<Option<MediaInfo>, CapabilityError>> {
    Box::pin(async { Err(CapabilityError::Unavailable) })
  }
}

/// Probe for an action backend; `None` when it cannot run here.
pub type ActionCandidate = fn() -> Option<Arc<dyn ActionBackend>>;

/// Probe for a media info provider; `None` when it cannot run here.
pub type MediaInfoCandidate = fn() -> Option<Arc<dyn MediaInfoProvider>>;

/// Action backends in preference order.
pub const ACTION_CANDIDATES: &[ActionCandidate] = &[playerctl_actions, xdotool_actions];

/// Media info providers in preference order.
pub const MEDIA_INFO_CANDIDATES: &[MediaInfoCandidate] = &[playerctl_media_info];

fn playerctl_actions() -> Option<Arc<dyn ActionBackend>> {
  Playerctl::detect().map(|p| Arc::new(p) as Arc<dyn ActionBackend>)
}

fn xdotool_actions() -> Option<Arc<dyn ActionBackend>> {
  Xdotool::detect().map(|x| Arc::new(x) as Arc<dyn ActionBackend>)
}

fn playerctl_media_info() -> Option<Arc<dyn MediaInfoProvider>> {
  Playerctl::detect().map(|p| Arc::new(p) as Arc<dyn MediaInfoProvider>)
}

pub fn select_action_backend(candidates: &[ActionCandidate]) -> Arc<dyn ActionBackend> {
  candidates
    .iter()
    .find_map(|probe| probe())
    .unwrap_or_else(|| Arc::new(Unavailable))
}

pub fn select_media_info_provider(candidates: &[MediaInfoCandidate]) -> Arc<dyn MediaInfoProvider> {
  candidates
    .iter()
    .find_map(|probe| probe())
    .unwrap_or_else(|| Arc::new(Unavailable))
}

/// The capability pair selected for this process.
#[derive(Clone)]
pub struct Capabilities {
  pub actions: Arc<dyn ActionBackend>,
  pub media_info: Arc<dyn MediaInfoProvider>,
}

impl Capabilities {
  /// Probe the default candidate lists.
  pub fn detect() -> Self {
    let capabilities = Self {
      actions: select_action_backend(ACTION_CANDIDATES),
      media_info: select_media_info_provider(MEDIA_INFO_CANDIDATES),
    };

    if capabilities.actions.name() == "unavailable" {
      log::warn!("No media control backend found - commands will have no effect");
    } else {
      log::info!("Media control backend: {}", capabilities.actions.name());
    }
    if capabilities.media_info.name() == "unavailable" {
      log::warn!("No media info backend found - \"what's playing?\" will report nothing");
    } else {
      log::info!("Media info backend: {}", capabilities.media_info.name());
    }

    capabilities
  }

  pub fn unavailable() -> Self {
    Self {
      actions: Arc::new(Unavailable),
      media_info: Arc::new(Unavailable),
    }
  }
}
