//! Event routing and query correlation.
//!
//! [`route`] is the dispatch table: a pure function from the current session
//! state and a decoded event to the next state plus the effects to perform.
//! [`Dispatcher`] performs those effects against the local capabilities and
//! keeps the table of queries still being resolved.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::{self, JoinHandle, JoinSet};

use super::types::*;
use crate::media::{ActionBackend, Capabilities, CapabilityError, MediaInfoProvider};

/// Whether queries are answered while the session is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryPolicy {
  #[default]
  AnswerWhilePaused,
  SuppressWhilePaused,
}

/// Work requested by the dispatch table.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
  Execute(MediaAction),
  Resolve(RequestId),
  Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
  pub next: SessionState,
  pub effects: Vec<Effect>,
}

impl Transition {
  fn stay(state: SessionState) -> Self {
    Self {
      next: state,
      effects: Vec::new(),
    }
  }

  fn to(next: SessionState, effects: Vec<Effect>) -> Self {
    Self { next, effects }
  }
}

/// Dispatch table for inbound events.
pub fn route(state: SessionState, event: &InboundEvent, policy: QueryPolicy) -> Transition {
  use SessionState::*;

  match (state, event) {
    (Terminated, _) => Transition::stay(Terminated),

    (AwaitingAuth, InboundEvent::Registered(_)) => Transition::to(Active, Vec::new()),

    // authentication is final: leave and never come back with these credentials
    (_, InboundEvent::AuthError(_)) => Transition::to(Terminated, vec![Effect::Disconnect]),

    (Active, InboundEvent::MediaCommand(Command::Action(action))) => {
      Transition::to(Active, vec![Effect::Execute(*action)])
    }

    (Active, InboundEvent::MediaQuery(query)) => resolve_query(Active, query),

    (Paused, InboundEvent::MediaQuery(query)) if policy == QueryPolicy::AnswerWhilePaused => {
      resolve_query(Paused, query)
    }

    // paused commands, unrecognized commands, early events, unknown names
    (state, _) => Transition::stay(state),
  }
}

fn resolve_query(state: SessionState, query: &Query) -> Transition {
  match query.kind {
    QueryKind::MediaInfo => Transition::to(state, vec![Effect::Resolve(query.request_id.clone())]),
    QueryKind::Unrecognized(_) => Transition::stay(state),
  }
}

/// Upper bound for a single media action before it is reported as failed.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A finished media action and how it went.
pub type ActionOutcome = (MediaAction, Result<(), CapabilityError>);

/// Background work that finished.
#[derive(Debug)]
pub enum Completion {
  Action(ActionOutcome),
  Query(MediaInfoResponse),
}

/// Queries whose media info lookup is still running, keyed by task id so
/// duplicate request ids from the peer stay independent.
#[derive(Default)]
struct PendingQueries {
  tasks: JoinSet<Option<MediaInfo>>,
  in_flight: HashMap<task::Id, RequestId>,
}

impl PendingQueries {
  async fn next_response(&mut self) -> Option<MediaInfoResponse> {
    loop {
      let Some(joined) = self.tasks.join_next_with_id().await else {
        self.in_flight.clear();
        return None;
      };
      let (id, info) = match joined {
        Ok((id, info)) => (id, info),
        Err(e) if e.is_cancelled() => {
          self.in_flight.remove(&e.id());
          continue;
        }
        Err(e) => {
          log::error!("Media info task failed: {}", e);
          (e.id(), None)
        }
      };
      if let Some(request_id) = self.in_flight.remove(&id) {
        return Some(MediaInfoResponse { request_id, info });
      }
    }
  }
}

/// Actions run one at a time in arrival order, off the event loop.
#[derive(Default)]
struct CommandQueue {
  queued: VecDeque<MediaAction>,
  running: Option<(MediaAction, JoinHandle<Result<(), CapabilityError>>)>,
}

impl CommandQueue {
  /// Wait for the running action. Does not start the next one.
  async fn finish_running(&mut self) -> Option<ActionOutcome> {
    let (action, handle) = self.running.as_mut()?;
    let action = *action;
    let result = match handle.await {
      Ok(result) => result,
      Err(e) => Err(CapabilityError::Failed(format!("action task ended: {}", e))),
    };
    self.running = None;
    Some((action, result))
  }
}

/// Executes routed effects against the local capabilities.
pub struct Dispatcher {
  capabilities: Capabilities,
  query_timeout: Duration,
  action_timeout: Duration,
  policy: QueryPolicy,
  pending: PendingQueries,
  commands: CommandQueue,
}

impl Dispatcher {
  pub fn new(capabilities: Capabilities, query_timeout: Duration, policy: QueryPolicy) -> Self {
    Self {
      capabilities,
      query_timeout,
      action_timeout: DEFAULT_ACTION_TIMEOUT,
      policy,
      pending: PendingQueries::default(),
      commands: CommandQueue::default(),
    }
  }

  pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
    self.action_timeout = timeout;
    self
  }

  pub fn route(&self, state: SessionState, event: &InboundEvent) -> Transition {
    route(state, event, self.policy)
  }

  /// Queue a media action. It starts once every earlier action has
  /// finished; results come back through [`next_outcome`](Self::next_outcome).
  pub fn execute(&mut self, action: MediaAction) {
    log::info!("Executing {} via {}", action, self.capabilities.actions.name());
    self.commands.queued.push_back(action);
    if self.commands.running.is_none() {
      self.start_next_action();
    }
  }

  fn start_next_action(&mut self) {
    if let Some(action) = self.commands.queued.pop_front() {
      let backend = self.capabilities.actions.clone();
      let timeout = self.action_timeout;
      let handle = tokio::spawn(async move { run_action(backend.as_ref(), action, timeout).await });
      self.commands.running = Some((action, handle));
    }
  }

  pub fn has_running_action(&self) -> bool {
    self.commands.running.is_some()
  }

  /// Wait for the running action to finish and start the next one.
  ///
  /// Returns `None` when no action is running.
  pub async fn next_outcome(&mut self) -> Option<ActionOutcome> {
    let outcome = self.commands.finish_running().await?;
    self.start_next_action();
    Some(outcome)
  }

  /// Start resolving a media info query in the background.
  pub fn resolve(&mut self, request_id: RequestId) {
    let provider = self.capabilities.media_info.clone();
    let timeout = self.query_timeout;
    let handle = self
      .pending
      .tasks
      .spawn(async move { fetch_media_info(provider.as_ref(), timeout).await });
    self.pending.in_flight.insert(handle.id(), request_id);
  }

  pub fn has_pending(&self) -> bool {
    !self.pending.in_flight.is_empty()
  }

  pub fn pending_len(&self) -> usize {
    self.pending.in_flight.len()
  }

  /// Wait for the next query to finish and build its response. A task that
  /// died still answers, with no media info.
  ///
  /// Returns `None` once nothing is pending.
  pub async fn next_response(&mut self) -> Option<MediaInfoResponse> {
    self.pending.next_response().await
  }

  /// Whether an action or a query is still running.
  pub fn is_busy(&self) -> bool {
    self.has_running_action() || self.has_pending()
  }

  /// Wait for whichever action or query finishes first.
  ///
  /// Returns `None` when nothing is running.
  pub async fn next_completion(&mut self) -> Option<Completion> {
    tokio::select! {
      Some(outcome) = self.commands.finish_running() => {
        self.start_next_action();
        Some(Completion::Action(outcome))
      }
      Some(response) = self.pending.next_response() => Some(Completion::Query(response)),
      else => None,
    }
  }

  /// Drop every in-flight query; their results will never be sent.
  pub fn abandon_all(&mut self) -> usize {
    let abandoned = self.pending.in_flight.len();
    if abandoned > 0 {
      log::info!("Abandoning {} in-flight queries", abandoned);
    }
    // dropping the set aborts every task in it
    self.pending.tasks = JoinSet::new();
    self.pending.in_flight.clear();
    abandoned
  }
}

/// Run one action with a bounded wait. Panics in the backend are reported
/// as failures.
async fn run_action(
  backend: &dyn ActionBackend,
  action: MediaAction,
  timeout: Duration,
) -> Result<(), CapabilityError> {
  let Ok(execute) = std::panic::catch_unwind(AssertUnwindSafe(|| backend.execute(action))) else {
    return Err(CapabilityError::Failed(format!("{} panicked", backend.name())));
  };
  match tokio::time::timeout(timeout, AssertUnwindSafe(execute).catch_unwind()).await {
    Ok(Ok(result)) => result,
    Ok(Err(_)) => Err(CapabilityError::Failed(format!("{} panicked", backend.name()))),
    Err(_) => Err(CapabilityError::Failed(format!(
      "{} did not finish within {:?}",
      backend.name(),
      timeout
    ))),
  }
}

/// Fetch media info with a bounded wait. Timeouts, provider errors and
/// provider panics all collapse to "nothing playing".
async fn fetch_media_info(provider: &dyn MediaInfoProvider, timeout: Duration) -> Option<MediaInfo> {
  let Ok(fetch) = std::panic::catch_unwind(AssertUnwindSafe(|| provider.fetch())) else {
    log::error!("Media info provider {} panicked", provider.name());
    return None;
  };
  match tokio::time::timeout(timeout, AssertUnwindSafe(fetch).catch_unwind()).await {
    Ok(Ok(Ok(info))) => info,
    Ok(Ok(Err(CapabilityError::Unavailable))) => None,
    Ok(Ok(Err(e))) => {
      log::warn!("Failed to get media info from {}: {}", provider.name(), e);
      None
    }
    Ok(Err(_)) => {
      log::error!("Media info provider {} panicked", provider.name());
      None
    }
    Err(_) => {
      log::warn!(
        "Media info provider {} did not answer within {:?}",
        provider.name(),
        timeout
      );
      None
    }
  }
}
