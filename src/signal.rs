//! Stop requests from the terminal or the service manager

use std::io;
use tracing::info;

/// Installed stop-signal handlers.
///
/// Handlers are registered on construction, so a signal that arrives while
/// the tunnel is still starting is seen by the next [`ShutdownSignal::recv`].
pub struct ShutdownSignal {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(windows)]
    console: ConsoleEvents,
}

/// Console control events: Ctrl+C and Ctrl+Break from the user, window
/// close, logoff and system shutdown from Windows
#[cfg(windows)]
struct ConsoleEvents {
    ctrl_c: tokio::signal::windows::CtrlC,
    ctrl_break: tokio::signal::windows::CtrlBreak,
    close: tokio::signal::windows::CtrlClose,
    logoff: tokio::signal::windows::CtrlLogoff,
    shutdown: tokio::signal::windows::CtrlShutdown,
}

impl ShutdownSignal {
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(windows)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::windows;

        Ok(Self {
            console: ConsoleEvents {
                ctrl_c: windows::ctrl_c()?,
                ctrl_break: windows::ctrl_break()?,
                close: windows::ctrl_close()?,
                logoff: windows::ctrl_logoff()?,
                shutdown: windows::ctrl_shutdown()?,
            },
        })
    }

    /// Resolve on the next SIGINT or SIGTERM
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigint.recv() => info!("Received SIGINT"),
            _ = self.sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    /// Resolve on the next console control event.
    ///
    /// Windows ends the process shortly after a close, logoff or shutdown
    /// event is delivered, so shutdown has to start right away.
    #[cfg(windows)]
    pub async fn recv(&mut self) {
        let console = &mut self.console;
        tokio::select! {
            _ = console.ctrl_c.recv() => info!("Received Ctrl+C"),
            _ = console.ctrl_break.recv() => info!("Received Ctrl+Break"),
            _ = console.close.recv() => info!("Console window closed"),
            _ = console.logoff.recv() => info!("User logging off"),
            _ = console.shutdown.recv() => info!("System shutting down"),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_resolves_installed_signal() {
        let mut shutdown = ShutdownSignal::install().unwrap();

        kill(Pid::this(), Signal::SIGTERM).unwrap();

        tokio::time::timeout(Duration::from_secs(5), shutdown.recv())
            .await
            .expect("SIGTERM was not delivered");
    }
}
