use satellite::{AppConfig, SessionControl, SessionNotification, SessionWorker};
use tokio::io::{AsyncBufReadExt, BufReader};

const CONSOLE_HELP: &str = "Commands: pause, resume, connect, disconnect, quit";

#[tokio::main]
async fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let settings = match AppConfig::load().and_then(|config| config.resolve()) {
    Ok(settings) => settings,
    Err(e) => {
      log::error!("{}", e);
      eprintln!("Usage: DISCORD_USER_ID=<id> SATELLITE_TOKEN=<token> [SATELLITE_SERVER=<url>] mina-satellite");
      std::process::exit(1);
    }
  };

  log::info!(
    "Satellite for user {} connecting to {}",
    settings.credentials.user_id(),
    settings.endpoint
  );

  let session = satellite::build_session(settings);
  let worker = match SessionWorker::spawn(session) {
    Ok(worker) => worker,
    Err(e) => {
      log::error!("Failed to start session worker: {}", e);
      std::process::exit(1);
    }
  };

  log::info!("{}", CONSOLE_HELP);

  let notifications = worker.notifications();
  let mut stdin = BufReader::new(tokio::io::stdin()).lines();
  let mut stdin_open = true;

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        log::info!("Interrupted, shutting down");
        break;
      }
      line = stdin.next_line(), if stdin_open => match line {
        Ok(Some(line)) => {
          let request = match line.trim().to_ascii_lowercase().as_str() {
            "" => continue,
            "pause" => SessionControl::Pause,
            "resume" => SessionControl::Resume,
            "connect" => SessionControl::Connect,
            "disconnect" => SessionControl::Disconnect,
            "quit" | "exit" => break,
            other => {
              log::warn!("Unknown command '{}'. {}", other, CONSOLE_HELP);
              continue;
            }
          };
          worker.request(request);
        }
        Ok(None) | Err(_) => stdin_open = false,
      },
      notification = notifications.recv() => match notification {
        Ok(notification) => report(notification),
        // Session ended on its own (authentication rejected).
        Err(_) => break,
      },
    }
  }

  let state = tokio::task::spawn_blocking(move || worker.shutdown())
    .await
    .ok()
    .flatten();
  if state == Some(satellite::SessionState::Terminated) {
    std::process::exit(1);
  }
}

fn report(notification: SessionNotification) {
  match notification {
    SessionNotification::StateChanged(state) => log::info!("Status: {}", state),
    SessionNotification::Registered(message) => log::info!("Registered: {}", message),
    SessionNotification::AuthRejected(message) => log::error!("Authentication failed: {}", message),
    SessionNotification::ConnectFailed(error) => log::warn!("Connection failed: {}", error),
    SessionNotification::CommandExecuted(action) => log::info!("Executed {}", action),
    SessionNotification::CommandFailed { action, error } => {
      log::warn!("Failed to execute {}: {}", action, error)
    }
    SessionNotification::QueryAnswered { request_id, info } => match info {
      Some(info) => log::info!("Answered {}: {} - {}", request_id, info.title, info.artist),
      None => log::info!("Answered {}: nothing playing", request_id),
    },
  }
}
