//! Command correlation.
//!
//! A moderation command sent into the session has no request id; the only
//! confirmation is a chat line that matches the family's expected wording.
//! The correlator keeps the in-flight commands, tests every inbound event
//! against them in registration order, and guarantees each command resolves
//! exactly once across pattern-match, timeout, cancellation, and disconnect.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use fancy_regex::Regex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::common::error::{CommandError, CommandResult};
use crate::common::types::ChatEvent;

/// What a command waits for.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Command text, without the leading slash.
    pub command: String,
    pub success: Regex,
    pub abort: Option<Regex>,
    pub timeout: Duration,
}

/// Terminal outcome delivered through the pending command's channel.
#[derive(Debug)]
enum Outcome {
    Matched(ChatEvent),
    Rejected(String),
    Aborted,
    Disconnected,
}

struct PendingCommand {
    id: u64,
    command: String,
    success: Regex,
    abort: Option<Regex>,
    tx: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    /// Registration order.
    pending: Vec<PendingCommand>,
}

impl Inner {
    fn resolve(&mut self, index: usize, outcome: Outcome) {
        let entry = self.pending.remove(index);
        // The receiver may already be gone (caller dropped); that's fine.
        let _ = entry.tx.send(outcome);
    }
}

/// Correlates issued commands with their chat responses.
///
/// Cheap to clone; clones share the pending set.
#[derive(Clone, Default)]
pub struct CommandCorrelator {
    inner: Arc<Mutex<Inner>>,
}

impl CommandCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending command and get back its cancellation handle and
    /// completion future. The command text is not sent here; the caller
    /// queues it.
    pub fn register(&self, spec: CommandSpec) -> RegisteredCommand {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.pending.push(PendingCommand {
            id,
            command: spec.command.clone(),
            success: spec.success,
            abort: spec.abort,
            tx,
        });

        RegisteredCommand {
            handle: CommandHandle {
                id,
                inner: Arc::downgrade(&self.inner),
            },
            rx,
            command: spec.command,
            timeout: spec.timeout,
        }
    }

    /// Test one inbound event against every pending command.
    ///
    /// Commands are tested in registration order, success pattern before
    /// abort pattern. One event may resolve several commands.
    pub fn observe(&self, event: &ChatEvent) {
        let mut inner = self.inner.lock().unwrap();
        let mut index = 0;
        while index < inner.pending.len() {
            // Callers that dropped their future without awaiting are
            // garbage-collected here instead of lingering until disconnect.
            if inner.pending[index].tx.is_closed() {
                inner.pending.remove(index);
                continue;
            }

            let entry = &inner.pending[index];
            let text = &event.plain_content;

            let success = entry.success.is_match(text).unwrap_or_else(|e| {
                warn!(command = %entry.command, error = %e, "Success pattern failed to run");
                false
            });
            if success {
                debug!(command = %inner.pending[index].command, "Command response matched");
                inner.resolve(index, Outcome::Matched(event.clone()));
                continue;
            }

            let aborted = entry
                .abort
                .as_ref()
                .map(|p| p.is_match(text).unwrap_or(false))
                .unwrap_or(false);
            if aborted {
                debug!(command = %inner.pending[index].command, "Command rejected by server");
                inner.resolve(index, Outcome::Rejected(text.clone()));
                continue;
            }

            index += 1;
        }
    }

    /// Reject every pending command. Called on disconnect so callers fail
    /// fast instead of waiting out their individual timeouts.
    pub fn fail_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        let pending = std::mem::take(&mut inner.pending);
        for entry in pending {
            debug!(command = %entry.command, "Failing pending command: session disconnected");
            let _ = entry.tx.send(Outcome::Disconnected);
        }
    }

    /// Number of commands currently awaiting a response.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

/// Cancellation handle for one pending command.
#[derive(Clone)]
pub struct CommandHandle {
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl CommandHandle {
    /// Cancel the command, rejecting its future as Aborted. Returns false
    /// when the command already resolved.
    pub fn cancel(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut inner = inner.lock().unwrap();
        if let Some(index) = inner.pending.iter().position(|p| p.id == self.id) {
            inner.resolve(index, Outcome::Aborted);
            true
        } else {
            false
        }
    }

    /// Drop the pending entry without delivering an outcome. Used by the
    /// timeout path, which reports the error itself.
    fn discard(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap();
            if let Some(index) = inner.pending.iter().position(|p| p.id == self.id) {
                inner.pending.remove(index);
            }
        }
    }
}

/// A registered command, waiting for its response.
pub struct RegisteredCommand {
    handle: CommandHandle,
    rx: oneshot::Receiver<Outcome>,
    command: String,
    timeout: Duration,
}

impl RegisteredCommand {
    /// The cancellation handle for this command.
    pub fn handle(&self) -> CommandHandle {
        self.handle.clone()
    }

    /// Await resolution, enforcing the command's deadline.
    pub async fn wait(self) -> CommandResult<ChatEvent> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(Outcome::Matched(event))) => Ok(event),
            Ok(Ok(Outcome::Rejected(matched))) => Err(CommandError::Rejected { matched }),
            Ok(Ok(Outcome::Aborted)) => Err(CommandError::Aborted),
            Ok(Ok(Outcome::Disconnected)) => Err(CommandError::Disconnected),
            // Correlator dropped out from under us: treat as disconnect.
            Ok(Err(_)) => Err(CommandError::Disconnected),
            Err(_) => {
                self.handle.discard();
                Err(CommandError::Timeout {
                    command: self.command,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ChatEvent;

    fn event(plain: &str) -> ChatEvent {
        ChatEvent::system(plain.to_string(), plain.to_string())
    }

    fn spec(command: &str, success: &str, abort: Option<&str>, timeout: Duration) -> CommandSpec {
        CommandSpec {
            command: command.to_string(),
            success: Regex::new(success).unwrap(),
            abort: abort.map(|p| Regex::new(p).unwrap()),
            timeout,
        }
    }

    #[tokio::test]
    async fn test_resolves_on_success_match() {
        let correlator = CommandCorrelator::new();
        let registered = correlator.register(spec(
            "g promote Foo",
            r"(?i)Foo was promoted from [\w ]+ to [\w ]+",
            None,
            Duration::from_secs(5),
        ));

        correlator.observe(&event("Foo was promoted from Member to Officer"));

        let resolved = registered.wait().await.unwrap();
        assert_eq!(
            resolved.plain_content,
            "Foo was promoted from Member to Officer"
        );
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_rejects_on_abort_match_with_text() {
        let correlator = CommandCorrelator::new();
        let registered = correlator.register(spec(
            "g promote Foo",
            r"(?i)Foo was promoted",
            Some(r"(?i)You do not have permission"),
            Duration::from_secs(5),
        ));

        correlator.observe(&event("You do not have permission to use this command!"));

        match registered.wait().await {
            Err(CommandError::Rejected { matched }) => {
                assert_eq!(matched, "You do not have permission to use this command!");
            }
            other => panic!("expected Rejected, got {:?}", other.map(|e| e.plain_content)),
        }
    }

    #[tokio::test]
    async fn test_success_tested_before_abort() {
        // A line matching both patterns must resolve, not reject.
        let correlator = CommandCorrelator::new();
        let registered = correlator.register(spec(
            "g mute Foo 1h",
            r"(?i)has muted Foo",
            Some(r"(?i)muted"),
            Duration::from_secs(5),
        ));

        correlator.observe(&event("Mod has muted Foo for 1h"));

        assert!(registered.wait().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_command_text() {
        let correlator = CommandCorrelator::new();
        let registered = correlator.register(spec(
            "g promote Foo",
            r"never matches",
            None,
            Duration::from_secs(5),
        ));

        let started = tokio::time::Instant::now();
        let result = registered.wait().await;

        match result {
            Err(CommandError::Timeout { command }) => assert_eq!(command, "g promote Foo"),
            other => panic!("expected Timeout, got {:?}", other.map(|e| e.plain_content)),
        }
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_rejects_as_aborted() {
        let correlator = CommandCorrelator::new();
        let registered = correlator.register(spec(
            "g kick Foo spam",
            r"was kicked",
            None,
            Duration::from_secs(60),
        ));
        let handle = registered.handle();

        assert!(handle.cancel());
        assert!(matches!(registered.wait().await, Err(CommandError::Aborted)));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_resolution_is_noop() {
        let correlator = CommandCorrelator::new();
        let registered = correlator.register(spec(
            "g promote Foo",
            r"(?i)Foo was promoted",
            None,
            Duration::from_secs(5),
        ));
        let handle = registered.handle();

        correlator.observe(&event("Foo was promoted from Member to Officer"));

        assert!(!handle.cancel());
        assert!(registered.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_fails_all_immediately() {
        let correlator = CommandCorrelator::new();
        let first = correlator.register(spec("g promote Foo", r"xxx", None, Duration::from_secs(60)));
        let second = correlator.register(spec("g kick Bar spam", r"yyy", None, Duration::from_secs(60)));

        correlator.fail_all();

        assert!(matches!(first.wait().await, Err(CommandError::Disconnected)));
        assert!(matches!(second.wait().await, Err(CommandError::Disconnected)));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_one_event_can_resolve_multiple_commands() {
        let correlator = CommandCorrelator::new();
        let first = correlator.register(spec("a", r"(?i)promoted", None, Duration::from_secs(5)));
        let second = correlator.register(spec("b", r"(?i)Foo was", None, Duration::from_secs(5)));

        correlator.observe(&event("Foo was promoted from Member to Officer"));

        assert!(first.wait().await.is_ok());
        assert!(second.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_non_matching_events_leave_commands_pending() {
        let correlator = CommandCorrelator::new();
        let _registered = correlator.register(spec(
            "g promote Foo",
            r"(?i)Foo was promoted",
            None,
            Duration::from_secs(60),
        ));

        correlator.observe(&event("Bar was promoted from Member to Officer... wait, no"));
        correlator.observe(&event("unrelated chatter"));

        assert_eq!(correlator.pending_len(), 1);
    }
}
