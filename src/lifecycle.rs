//! Start-to-stop sequence for one tunnel session
//!
//! ```text
//! validate config -> add DNS rule -> start tunnel -> wait for stop
//!     -> terminate -> remove DNS rule -> bounded wait for exit
//! ```
//!
//! Every failure after the DNS rule was requested removes it again before
//! the error is returned.

use crate::browser::BrowserOpener;
use crate::config::{ConfigValidator, TunnelConfig};
use crate::dns::RoutingRule;
use crate::error::TunnelError;
use crate::subprocess::streaming::{TriggerAction, TriggerWatcher};
use crate::subprocess::{
    ExitStatus, ProcessRunner, ProcessSupervisor, SupervisorContext, SupervisorState,
};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TunnelService {
    config: TunnelConfig,
    rule: Arc<dyn RoutingRule>,
    runner: Arc<dyn ProcessRunner>,
    trigger_action: Arc<dyn TriggerAction>,
}

impl TunnelService {
    /// Service that opens the login URL in the browser
    pub fn new(
        config: TunnelConfig,
        rule: Arc<dyn RoutingRule>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let trigger_action = Arc::new(BrowserOpener::new(Arc::clone(&runner)));
        Self {
            config,
            rule,
            runner,
            trigger_action,
        }
    }

    /// Replace what happens when the login prompt shows up
    pub fn with_trigger_action(mut self, action: Arc<dyn TriggerAction>) -> Self {
        self.trigger_action = action;
        self
    }

    /// Run one session until `shutdown` resolves or the tunnel client exits
    /// by itself.
    ///
    /// Startup failures are returned with the failing step as context. A
    /// tunnel that exits without being asked still gets the full cleanup and
    /// is then reported as [`TunnelError::UnexpectedExit`]. After a requested
    /// shutdown, problems are logged and the tunnel's exit status is returned
    /// if it was seen in time.
    pub async fn run<F>(&self, shutdown: F) -> Result<Option<ExitStatus>>
    where
        F: Future<Output = ()>,
    {
        let mut supervisor = self.start().await?;
        info!("Running. Press Ctrl+C to stop.");

        let mut exit = supervisor.exit_signal();
        let unexpected = tokio::select! {
            _ = shutdown => None,
            status = async {
                match exit.as_mut() {
                    Some(exit) => exit.wait().await,
                    None => std::future::pending().await,
                }
            } => {
                warn!("Tunnel process exited on its own ({})", status);
                Some(status)
            }
        };

        info!("Stopping...");
        let status = self.stop(&mut supervisor).await;
        info!("Stopped.");

        match unexpected {
            Some(status) => Err(TunnelError::UnexpectedExit(status).into()),
            None => Ok(status),
        }
    }

    /// Validate, add the DNS rule and bring the tunnel client up
    pub async fn start(&self) -> Result<ProcessSupervisor> {
        ConfigValidator::validate_config(&self.config).context("validate config")?;

        let trigger = TriggerWatcher::auth_prompt(Arc::clone(&self.trigger_action))
            .context("compile login prompt pattern")?;
        let context = SupervisorContext::new(Arc::clone(&self.runner), Arc::new(trigger))
            .with_startup_grace(self.config.timing.startup_grace)
            .with_stop(self.config.stop_strategy());
        let mut supervisor = ProcessSupervisor::new(context);

        if let Err(e) = self
            .rule
            .install(&self.config.domains, &self.config.nameservers)
            .await
        {
            self.rule.remove().await;
            return Err(e).context("add DNS rule");
        }

        if let Err(e) = supervisor.start(self.config.tunnel_command()).await {
            self.rule.remove().await;
            return Err(e).context("start tunnel process");
        }

        Ok(supervisor)
    }

    /// Terminate, remove the DNS rule, then wait a bounded time for exit
    pub async fn stop(&self, supervisor: &mut ProcessSupervisor) -> Option<ExitStatus> {
        supervisor.terminate().await;
        self.rule.remove().await;

        let status = supervisor
            .wait_exit(self.config.timing.shutdown_timeout)
            .await;
        if supervisor.state() != SupervisorState::Stopped {
            warn!("Tunnel process left in state: {}", supervisor.state());
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::streaming::trigger::tests::RecordingAction;
    use crate::subprocess::TokioProcessRunner;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records install/remove calls in order
    #[derive(Default)]
    struct RecordingRule {
        calls: Mutex<Vec<&'static str>>,
        fail_install: bool,
    }

    impl RecordingRule {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RoutingRule for RecordingRule {
        async fn install(
            &self,
            _domains: &[String],
            _nameservers: &[String],
        ) -> std::result::Result<(), TunnelError> {
            self.calls.lock().unwrap().push("install");
            if self.fail_install {
                return Err(TunnelError::Precondition("exit code 1".to_string()));
            }
            Ok(())
        }

        async fn remove(&self) {
            self.calls.lock().unwrap().push("remove");
        }
    }

    fn sh_config(script: &str, grace: Duration) -> TunnelConfig {
        let mut config = TunnelConfig {
            server: "vpn.example.com".to_string(),
            domains: vec!["corp.example".to_string()],
            nameservers: vec!["10.0.0.53".to_string()],
            ..Default::default()
        };
        config.launcher.program = "sh".to_string();
        config.launcher.args = vec!["-c".to_string(), script.to_string()];
        config.launcher.stop_command = Vec::new();
        config.timing.startup_grace = grace;
        config.timing.shutdown_timeout = Duration::from_secs(5);
        config
    }

    fn service(config: TunnelConfig, rule: Arc<RecordingRule>) -> TunnelService {
        TunnelService::new(config, rule, Arc::new(TokioProcessRunner))
            .with_trigger_action(Arc::new(RecordingAction::default()))
    }

    #[tokio::test]
    async fn test_invalid_config_has_no_side_effects() {
        let rule = Arc::new(RecordingRule::default());
        let mut config = sh_config("sleep 30", Duration::from_millis(100));
        config.nameservers.clear();

        let err = service(config, rule.clone())
            .run(std::future::ready(()))
            .await
            .unwrap_err();

        assert_eq!(
            format!("{err:#}"),
            "validate config: config validation failed: nameservers list is empty"
        );
        assert!(rule.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rule_failure_starts_nothing() {
        let rule = Arc::new(RecordingRule {
            fail_install: true,
            ..Default::default()
        });
        // Would create the marker file if it ever ran
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");
        let script = format!("touch '{}'; sleep 30", marker.display());

        let err = service(sh_config(&script, Duration::from_millis(100)), rule.clone())
            .run(std::future::ready(()))
            .await
            .unwrap_err();

        assert!(format!("{err:#}").starts_with("add DNS rule: failed to add DNS rule"));
        assert!(matches!(
            err.downcast_ref::<TunnelError>(),
            Some(TunnelError::Precondition(_))
        ));
        assert_eq!(rule.calls(), vec!["install", "remove"]);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_premature_exit_rolls_back_rule() {
        let rule = Arc::new(RecordingRule::default());
        let config = sh_config("echo 'err: fatal' >&2; exit 1", Duration::from_secs(5));

        let err = service(config, rule.clone())
            .run(std::future::pending())
            .await
            .unwrap_err();

        match err.downcast_ref::<TunnelError>() {
            Some(TunnelError::PrematureExit {
                status,
                early_output,
            }) => {
                assert_eq!(*status, ExitStatus::Error(1));
                assert!(early_output.contains("err: fatal"));
            }
            other => panic!("Expected premature exit, got {other:?}"),
        }
        assert!(format!("{err:#}").starts_with("start tunnel process: "));
        assert_eq!(rule.calls(), vec!["install", "remove"]);
    }

    #[tokio::test]
    async fn test_shutdown_terminates_and_removes_rule() {
        let rule = Arc::new(RecordingRule::default());
        let config = sh_config("echo connected; exec sleep 30", Duration::from_millis(200));

        let status = service(config, rule.clone())
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(status, Some(ExitStatus::Signal(15)));
        assert_eq!(rule.calls(), vec!["install", "remove"]);
    }

    #[tokio::test]
    async fn test_tunnel_exit_after_startup_is_an_error() {
        let rule = Arc::new(RecordingRule::default());
        let config = sh_config("sleep 0.5; exit 0", Duration::from_millis(100));

        let err = service(config, rule.clone())
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TunnelError>(),
            Some(TunnelError::UnexpectedExit(ExitStatus::Success))
        ));
        assert_eq!(
            err.to_string(),
            "tunnel process exited unexpectedly (exit code 0)"
        );
        // Cleanup still ran before the error was reported
        assert_eq!(rule.calls(), vec!["install", "remove"]);
    }
}
