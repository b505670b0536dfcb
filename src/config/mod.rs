use crate::subprocess::{ProcessCommand, ProcessCommandBuilder, StopStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod loader;
pub mod validator;

pub use loader::ConfigLoader;
pub use validator::ConfigValidator;

/// Display name of the DNS policy rule owned by this tool
pub const DEFAULT_DNS_RULE_NAME: &str = "OpenFortiVPN WSL Proxy";

/// Contents of the YAML config file.
///
/// Only `server`, `domains` and `nameservers` are required. They default to
/// empty so that a missing field is reported by [`ConfigValidator`] with a
/// proper message instead of a parser error.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TunnelConfig {
    /// VPN gateway handed to the tunnel client
    #[serde(default)]
    pub server: String,

    /// Domains resolved through the tunnel's nameservers
    #[serde(default)]
    pub domains: Vec<String>,

    /// Nameservers reachable through the tunnel
    #[serde(default)]
    pub nameservers: Vec<String>,

    #[serde(default)]
    pub launcher: LauncherConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub dns: DnsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LauncherConfig {
    /// Program that runs the tunnel client
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the server address
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Command that shuts the tunnel client down; empty means signal it
    #[serde(default = "default_stop_command")]
    pub stop_command: Vec<String>,
}

fn default_program() -> String {
    "wsl".to_string()
}

fn default_args() -> Vec<String> {
    ["-d", "OpenFortiVPN", "--", "/usr/local/bin/run-vpn"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_stop_command() -> Vec<String> {
    ["wsl", "--terminate", "OpenFortiVPN"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            stop_command: default_stop_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    /// An exit within this window counts as a failed start
    #[serde(with = "humantime_serde", default = "default_startup_grace")]
    pub startup_grace: Duration,

    /// How long shutdown waits for the tunnel client to exit
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

fn default_startup_grace() -> Duration {
    crate::subprocess::DEFAULT_STARTUP_GRACE
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            startup_grace: default_startup_grace(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnsConfig {
    #[serde(default = "default_rule_name")]
    pub display_name: String,
}

fn default_rule_name() -> String {
    DEFAULT_DNS_RULE_NAME.to_string()
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            display_name: default_rule_name(),
        }
    }
}

impl TunnelConfig {
    /// Tunnel client invocation: launcher args, then the server address
    pub fn tunnel_command(&self) -> ProcessCommand {
        ProcessCommandBuilder::new(&self.launcher.program)
            .args(&self.launcher.args)
            .arg(&self.server)
            .build()
    }

    pub fn stop_strategy(&self) -> StopStrategy {
        match self.launcher.stop_command.split_first() {
            Some((program, args)) => StopStrategy::Command(
                ProcessCommandBuilder::new(program)
                    .args(args)
                    .timeout(self.timing.shutdown_timeout)
                    .build(),
            ),
            None => StopStrategy::Signal,
        }
    }
}
