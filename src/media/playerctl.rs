//! MPRIS control through the `playerctl` command-line tool.

use std::path::PathBuf;
use std::process::Stdio;

use futures_util::future::BoxFuture;
use tokio::process::Command;

use super::{ActionBackend, CapabilityError, MediaInfoProvider};
use crate::satellite::{MediaAction, MediaInfo, PlaybackStatus};

/// Fields are separated by the ASCII unit separator so titles may contain tabs.
const METADATA_FORMAT: &str = "{{title}}\u{1f}{{artist}}\u{1f}{{status}}";
const FIELD_SEPARATOR: char = '\u{1f}';

/// Drives whichever MPRIS player `playerctl` considers active.
#[derive(Debug, Clone)]
pub struct Playerctl {
  path: PathBuf,
}

impl Playerctl {
  pub fn detect() -> Option<Self> {
    which::which("playerctl").ok().map(|path| Self { path })
  }

  fn verb(action: MediaAction) -> &'static str {
    match action {
      MediaAction::PlayPause => "play-pause",
      MediaAction::Next => "next",
      MediaAction::Previous => "previous",
    }
  }
}

impl ActionBackend for Playerctl {
  fn name(&self) -> &'static str {
    "playerctl"
  }

  fn execute(&self, action: MediaAction) -> BoxFuture<'_, Result<(), CapabilityError>> {
    Box::pin(async move {
      let verb = Self::verb(action);
      let status = Command::new(&self.path)
        .arg(verb)
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
          "playerctl {} exited with {}",
          verb, status
        )))
      }
    })
  }
}

impl MediaInfoProvider for Playerctl {
  fn name(&self) -> &'static str {
    "playerctl"
  }

  fn fetch(&self) -> BoxFuture<'_, Result<Option<MediaInfo>, CapabilityError>> {
    Box::pin(async move {
      let output = Command::new(&self.path)
        .args(["metadata", "--format", METADATA_FORMAT])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

      // playerctl exits non-zero when no player is running
      if !output.status.success() {
        log::debug!(
          "playerctl metadata exited with {}: {}",
          output.status,
          String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(None);
      }

      Ok(parse_metadata(&String::from_utf8_lossy(&output.stdout)))
    })
  }
}

/// Parse one line of `playerctl metadata --format` output.
fn parse_metadata(line: &str) -> Option<MediaInfo> {
  let mut fields = line.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR);
  let title = fields.next()?.trim();
  let artist = fields.next().unwrap_or_default().trim();
  let status = fields.next().unwrap_or_default().trim();

  let status = match status {
    "Playing" => PlaybackStatus::Playing,
    "Stopped" => return None,
    _ => PlaybackStatus::Unknown,
  };

  if title.is_empty() && artist.is_empty() {
    return None;
  }

  Some(MediaInfo {
    title: title.to_string(),
    artist: artist.to_string(),
    status,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_playing() {
    let info = parse_metadata("Song A\u{1f}Artist B\u{1f}Playing\n").unwrap();
    assert_eq!(info.title, "Song A");
    assert_eq!(info.artist, "Artist B");
    assert_eq!(info.status, PlaybackStatus::Playing);
  }

  #[test]
  fn test_parse_paused_is_unknown_status() {
    let info = parse_metadata("Song A\u{1f}Artist B\u{1f}Paused").unwrap();
    assert_eq!(info.status, PlaybackStatus::Unknown);
  }

  #[test]
  fn test_parse_stopped_or_empty_is_nothing_playing() {
    assert_eq!(parse_metadata("Song A\u{1f}Artist B\u{1f}Stopped"), None);
    assert_eq!(parse_metadata("\u{1f}\u{1f}Playing"), None);
    assert_eq!(parse_metadata(""), None);
  }

  #[test]
  fn test_title_may_contain_tabs() {
    let info = parse_metadata("Intro\tOutro\u{1f}Band\u{1f}Playing").unwrap();
    assert_eq!(info.title, "Intro\tOutro");
  }
}
