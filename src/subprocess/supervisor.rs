//! Supervision of the long-running tunnel client
//!
//! The supervisor owns the child process for one run: it wires both output
//! pumps, watches for the process to die during the startup grace period,
//! and handles the terminate/wait half of shutdown.

use super::runner::{ExitStatus, ProcessCommand, ProcessRunner};
use super::streaming::{
    EarlyOutputLog, EarlyOutputProcessor, LoggingProcessor, StreamProcessor, StreamPump,
    StreamSource, TriggerWatcher, EARLY_OUTPUT_CAP,
};
use super::ProcessError;
use crate::error::TunnelError;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(5);

/// How long to let the pumps catch up after the process has died
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    FailedStart,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::NotStarted => "not started",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Stopped => "stopped",
            SupervisorState::FailedStart => "failed to start",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `terminate` asks the tunnel client to go away
#[derive(Debug, Clone)]
pub enum StopStrategy {
    /// Run an external command, e.g. one that shuts down the VM hosting the client
    Command(ProcessCommand),
    /// Signal the child directly: SIGTERM on Unix, a hard kill elsewhere
    Signal,
}

/// Exit notification for the supervised process.
///
/// Set exactly once by the exit watcher; any number of clones may wait on it
/// concurrently.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<Option<ExitStatus>>,
}

impl ExitSignal {
    /// Status if the process has already exited
    pub fn status(&self) -> Option<ExitStatus> {
        self.rx.borrow().clone()
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> ExitStatus {
        match self.rx.wait_for(Option::is_some).await {
            Ok(status) => (*status).clone().unwrap_or(ExitStatus::Unknown),
            // Watcher gone without reporting; the child can no longer be observed
            Err(_) => ExitStatus::Unknown,
        }
    }
}

/// Everything a supervisor needs for one run
pub struct SupervisorContext {
    pub startup_grace: Duration,
    pub stop: StopStrategy,
    /// Runs the stop command
    pub runner: Arc<dyn ProcessRunner>,
    /// Login prompt trigger; fires at most once for this run
    pub trigger: Arc<TriggerWatcher>,
    pub early_output_cap: usize,
}

impl SupervisorContext {
    pub fn new(runner: Arc<dyn ProcessRunner>, trigger: Arc<TriggerWatcher>) -> Self {
        Self {
            startup_grace: DEFAULT_STARTUP_GRACE,
            stop: StopStrategy::Signal,
            runner,
            trigger,
            early_output_cap: EARLY_OUTPUT_CAP,
        }
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn with_stop(mut self, stop: StopStrategy) -> Self {
        self.stop = stop;
        self
    }
}

pub struct ProcessSupervisor {
    context: SupervisorContext,
    state: SupervisorState,
    pid: Option<u32>,
    exit: Option<ExitSignal>,
    kill_tx: Option<oneshot::Sender<()>>,
    pumps: Vec<JoinHandle<usize>>,
}

impl ProcessSupervisor {
    pub fn new(context: SupervisorContext) -> Self {
        Self {
            context,
            state: SupervisorState::NotStarted,
            pid: None,
            exit: None,
            kill_tx: None,
            pumps: Vec::new(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_signal(&self) -> Option<ExitSignal> {
        self.exit.clone()
    }

    pub fn auth_prompt_fired(&self) -> bool {
        self.context.trigger.has_fired()
    }

    /// Spawn the tunnel client and wait out the startup grace period.
    ///
    /// An exit during the grace period is a failed start and carries
    /// whatever the process printed first. The caller is responsible for
    /// rolling back anything it set up beforehand.
    pub async fn start(&mut self, command: ProcessCommand) -> Result<(), TunnelError> {
        if self.state != SupervisorState::NotStarted {
            return Err(TunnelError::InvalidState {
                action: "start",
                state: self.state.as_str(),
            });
        }
        self.state = SupervisorState::Starting;
        info!("Starting tunnel process: {}", command.display());

        let (child, stdout, stderr) = match Self::spawn_child(&command) {
            Ok(spawned) => spawned,
            Err(e) => {
                error!("Failed to start tunnel process: {}", e);
                self.state = SupervisorState::FailedStart;
                return Err(e.into());
            }
        };
        self.pid = child.id();

        let early_output = Arc::new(EarlyOutputLog::new(self.context.early_output_cap));
        let processors: Arc<Vec<Box<dyn StreamProcessor>>> = Arc::new(vec![
            Box::new(LoggingProcessor::new("tunnel")),
            Box::new(EarlyOutputProcessor::new(Arc::clone(&early_output))),
            Box::new(Arc::clone(&self.context.trigger)),
        ]);
        self.pumps = vec![
            StreamPump::new(StreamSource::Stdout, Arc::clone(&processors)).spawn(stdout),
            StreamPump::new(StreamSource::Stderr, processors).spawn(stderr),
        ];

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_exit(child, kill_rx, exit_tx));
        let mut exit = ExitSignal { rx: exit_rx };
        self.exit = Some(exit.clone());
        self.kill_tx = Some(kill_tx);

        tokio::select! {
            status = exit.wait() => {
                self.drain_pumps().await;
                self.state = SupervisorState::FailedStart;
                let early_output = early_output.snapshot();
                error!("Tunnel process exited during startup ({})", status);
                return Err(TunnelError::PrematureExit { status, early_output });
            }
            _ = tokio::time::sleep(self.context.startup_grace) => {}
        }

        early_output.discard();
        self.state = SupervisorState::Running;
        info!(
            "Tunnel process running (pid {})",
            self.pid.map_or_else(|| "unknown".to_string(), |pid| pid.to_string())
        );
        Ok(())
    }

    fn spawn_child(
        command: &ProcessCommand,
    ) -> Result<(Child, ChildStdout, ChildStderr), ProcessError> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::from_spawn(e, &command.program, &command.args))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        match (stdout, stderr) {
            (Some(stdout), Some(stderr)) => Ok((child, stdout, stderr)),
            (None, _) => {
                let _ = child.start_kill();
                Err(ProcessError::StreamCapture("stdout"))
            }
            (_, None) => {
                let _ = child.start_kill();
                Err(ProcessError::StreamCapture("stderr"))
            }
        }
    }

    /// Ask the tunnel client to stop. Advisory: failures are logged only.
    pub async fn terminate(&mut self) {
        match self.state {
            SupervisorState::Running => {}
            SupervisorState::Stopping | SupervisorState::Stopped => {
                debug!("Tunnel process already {}", self.state);
                return;
            }
            state => {
                debug!("Nothing to terminate, supervisor is {}", state);
                return;
            }
        }

        self.state = SupervisorState::Stopping;
        info!("Stopping tunnel process");

        match self.context.stop.clone() {
            StopStrategy::Command(command) => {
                match self.context.runner.run(command.clone()).await {
                    Ok(output) if output.status.success() => {
                        debug!("Stop command succeeded: {}", command.display());
                    }
                    Ok(output) => warn!(
                        "Stop command '{}' finished with {}: {}",
                        command.display(),
                        output.status,
                        output.combined()
                    ),
                    Err(e) => warn!("Stop command '{}' failed: {}", command.display(), e),
                }
            }
            StopStrategy::Signal => self.signal_child(),
        }

        if self.exit.as_ref().and_then(ExitSignal::status).is_some() {
            self.state = SupervisorState::Stopped;
        }
    }

    fn signal_child(&mut self) {
        // A reaped pid may already belong to someone else
        if self.exit.as_ref().and_then(ExitSignal::status).is_some() {
            debug!("Tunnel process already exited, not signalling");
            return;
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) {
                match kill(Pid::from_raw(pid), Signal::SIGTERM) {
                    Ok(()) => {
                        debug!("Sent SIGTERM to tunnel process {}", pid);
                        return;
                    }
                    Err(e) => warn!("Failed to send SIGTERM to tunnel process {}: {}", pid, e),
                }
            }
        }

        if let Some(kill_tx) = self.kill_tx.take() {
            if kill_tx.send(()).is_err() {
                debug!("Tunnel process already reaped, nothing to kill");
            }
        }
    }

    /// Wait for the process to exit, giving up after `timeout`.
    ///
    /// Timing out is logged and reported as `None`; it is never an error.
    pub async fn wait_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let mut exit = self.exit.clone()?;

        match tokio::time::timeout(timeout, exit.wait()).await {
            Ok(status) => {
                if matches!(
                    self.state,
                    SupervisorState::Running | SupervisorState::Stopping
                ) {
                    self.state = SupervisorState::Stopped;
                }
                self.drain_pumps().await;
                info!("Tunnel process exited ({})", status);
                Some(status)
            }
            Err(_) => {
                warn!("{}", TunnelError::ShutdownTimeout(timeout));
                None
            }
        }
    }

    /// Give both pumps a bounded chance to reach end-of-stream
    async fn drain_pumps(&mut self) {
        if self.pumps.is_empty() {
            return;
        }
        let pumps = futures::future::join_all(self.pumps.drain(..));
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, pumps).await.is_err() {
            debug!("Output streams still open {:?} after exit", PUMP_DRAIN_TIMEOUT);
        }
    }
}

/// Reap the child and publish its status exactly once
async fn watch_exit(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitStatus>>,
) {
    let waited = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill tunnel process: {}", e);
            }
            child.wait().await
        }
    };

    let status = match waited {
        Ok(status) => ExitStatus::from_std(status),
        Err(e) => {
            warn!("Failed to wait for tunnel process: {}", e);
            ExitStatus::Unknown
        }
    };
    debug!("Tunnel process reaped: {}", status);
    exit_tx.send_replace(Some(status));
}
