//! One-shot pattern trigger shared by both output streams

use super::processor::StreamProcessor;
use super::types::StreamSource;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Prompt printed by the tunnel client when it wants a browser login
pub const AUTH_PROMPT_PATTERN: &str = r"Authenticate at '([^']+)'";

/// External action run with the captured value of a trigger pattern
#[async_trait]
pub trait TriggerAction: Send + Sync {
    async fn fire(&self, captured: &str) -> Result<()>;
}

/// Fires its action for the first matching line of a run and never again.
///
/// The winner is decided with a compare-and-set before the action runs, so
/// two pumps matching at the same moment cannot both fire and cannot both
/// lose.
pub struct TriggerWatcher {
    pattern: Regex,
    fired: AtomicBool,
    action: Arc<dyn TriggerAction>,
}

impl TriggerWatcher {
    /// The pattern must have exactly one capture group
    pub fn new(pattern: Regex, action: Arc<dyn TriggerAction>) -> Result<Self> {
        let groups = pattern.captures_len() - 1;
        if groups != 1 {
            return Err(anyhow!(
                "Trigger pattern '{}' must have exactly one capture group, found {}",
                pattern,
                groups
            ));
        }
        Ok(Self {
            pattern,
            fired: AtomicBool::new(false),
            action,
        })
    }

    /// Watcher for the tunnel client's browser login prompt
    pub fn auth_prompt(action: Arc<dyn TriggerAction>) -> Result<Self> {
        Self::new(Regex::new(AUTH_PROMPT_PATTERN)?, action)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Check one line, running the action if this is the first match.
    ///
    /// Returns whether this call fired. A failing action still counts as
    /// fired; the failure is logged.
    pub async fn observe(&self, line: &str) -> bool {
        let Some(captured) = self
            .pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            return false;
        };

        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("Trigger already fired, ignoring match '{}'", captured);
            return false;
        }

        if let Err(e) = self.action.fire(captured).await {
            tracing::warn!("Trigger action failed for '{}': {:#}", captured, e);
        }
        true
    }
}

#[async_trait]
impl StreamProcessor for TriggerWatcher {
    async fn process_line(&self, line: &str, _source: StreamSource) -> Result<()> {
        self.observe(line).await;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every captured value it is fired with
    #[derive(Default)]
    pub(crate) struct RecordingAction {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) delay: Option<Duration>,
        pub(crate) fail: bool,
    }

    impl RecordingAction {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TriggerAction for RecordingAction {
        async fn fire(&self, captured: &str) -> Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.lock().unwrap().push(captured.to_string());
            if self.fail {
                return Err(anyhow!("opener unavailable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fires_once_with_captured_value() {
        let action = Arc::new(RecordingAction::default());
        let watcher = TriggerWatcher::auth_prompt(action.clone()).unwrap();

        assert!(!watcher.observe("Connecting...").await);
        assert!(watcher.observe("Authenticate at 'https://x/y'").await);
        assert!(!watcher.observe("Authenticate at 'https://x/y'").await);
        assert!(!watcher.observe("Authenticate at 'https://other/z'").await);

        assert_eq!(action.calls(), vec!["https://x/y"]);
        assert!(watcher.has_fired());
    }

    #[tokio::test]
    async fn test_non_matching_lines_do_not_consume_trigger() {
        let action = Arc::new(RecordingAction::default());
        let watcher = TriggerWatcher::auth_prompt(action.clone()).unwrap();

        assert!(!watcher.observe("Authenticate at ''").await);
        assert!(!watcher.observe("authenticate at 'https://x/y'").await);
        assert!(!watcher.has_fired());
        assert!(action.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_action_still_counts_as_fired() {
        let action = Arc::new(RecordingAction {
            fail: true,
            ..Default::default()
        });
        let watcher = TriggerWatcher::auth_prompt(action.clone()).unwrap();

        assert!(watcher.observe("Authenticate at 'not a url'").await);
        assert!(!watcher.observe("Authenticate at 'https://x/y'").await);
        assert_eq!(action.calls(), vec!["not a url"]);
    }

    #[test]
    fn test_rejects_pattern_without_single_group() {
        let action = Arc::new(RecordingAction::default());
        assert!(TriggerWatcher::new(Regex::new("no groups").unwrap(), action.clone()).is_err());
        assert!(TriggerWatcher::new(Regex::new("(a)(b)").unwrap(), action).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_matches_fire_exactly_once() {
        for _ in 0..20 {
            let action = Arc::new(RecordingAction {
                delay: Some(Duration::from_millis(5)),
                ..Default::default()
            });
            let watcher = Arc::new(TriggerWatcher::auth_prompt(action.clone()).unwrap());

            let handles: Vec<_> = [StreamSource::Stdout, StreamSource::Stderr]
                .into_iter()
                .map(|source| {
                    let watcher = Arc::clone(&watcher);
                    tokio::spawn(async move {
                        watcher
                            .process_line("Authenticate at 'https://x/y'", source)
                            .await
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            assert_eq!(action.calls(), vec!["https://x/y"]);
        }
    }
}
