pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;
pub mod streaming;
pub mod supervisor;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::{MockProcessRunner, ReplyBuilder};
pub use runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use supervisor::{
    ExitSignal, ProcessSupervisor, StopStrategy, SupervisorContext, SupervisorState,
    DEFAULT_STARTUP_GRACE,
};

use std::sync::Arc;

/// Shared handle to the helper-command runner
#[derive(Clone)]
pub struct SubprocessManager {
    runner: Arc<dyn ProcessRunner>,
}

impl SubprocessManager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub fn production() -> Self {
        Self::new(Arc::new(TokioProcessRunner))
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }
}
