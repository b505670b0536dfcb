use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

/// Scripted stand-in for helper commands: rule scripts, stop requests and
/// URL openers. Every call is recorded; a call nothing was scripted for
/// fails with [`ProcessError::MockExpectationNotMet`].
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    replies: Vec<Reply>,
    calls: Vec<ProcessCommand>,
}

struct Reply {
    program: String,
    arg_prefix: Option<String>,
    status: ExitStatus,
    stderr: String,
}

impl Reply {
    fn matches(&self, command: &ProcessCommand) -> bool {
        if self.program != command.program {
            return false;
        }
        match &self.arg_prefix {
            Some(prefix) => command.args.iter().any(|arg| arg.starts_with(prefix.as_str())),
            None => true,
        }
    }
}

/// Builder for one scripted reply; succeeds silently unless told otherwise
pub struct ReplyBuilder {
    runner: MockProcessRunner,
    reply: Reply,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply for calls to `program`. Replies are tried in the
    /// order they were added.
    pub fn on(&self, program: &str) -> ReplyBuilder {
        ReplyBuilder {
            runner: self.clone(),
            reply: Reply {
                program: program.to_string(),
                arg_prefix: None,
                status: ExitStatus::Success,
                stderr: String::new(),
            },
        }
    }

    /// Every command run so far, in call order
    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, program: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|command| command.program == program)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn respond(&self, command: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let mut state = self.lock();
        state.calls.push(command.clone());

        let reply = state
            .replies
            .iter()
            .find(|reply| reply.matches(command))
            .ok_or_else(|| {
                ProcessError::MockExpectationNotMet(format!(
                    "nothing scripted for: {}",
                    command.display()
                ))
            })?;

        Ok(ProcessOutput {
            status: reply.status.clone(),
            stdout: String::new(),
            stderr: reply.stderr.clone(),
            duration: Duration::from_millis(1),
        })
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.respond(&command)
    }

    async fn spawn_detached(&self, command: ProcessCommand) -> Result<(), ProcessError> {
        self.respond(&command).map(|_| ())
    }
}

impl ReplyBuilder {
    /// Only match calls with an argument starting with `prefix`, e.g. the
    /// cmdlet a PowerShell script begins with
    pub fn when_arg_starts_with(mut self, prefix: &str) -> Self {
        self.reply.arg_prefix = Some(prefix.to_string());
        self
    }

    pub fn fails_with(mut self, code: i32, stderr: &str) -> Self {
        self.reply.status = ExitStatus::Error(code);
        self.reply.stderr = stderr.to_string();
        self
    }

    pub fn add(self) {
        self.runner.lock().replies.push(self.reply);
    }
}
