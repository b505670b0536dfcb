//! DNS routing policy for the tunnel's domains
//!
//! While the tunnel is up, lookups for the configured domains have to go to
//! the nameservers on the far side of it. On Windows this is a Name
//! Resolution Policy Table rule managed through PowerShell.

use crate::error::TunnelError;
use crate::subprocess::{ProcessCommand, ProcessCommandBuilder, ProcessRunner};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A host-level routing rule that exists only while the tunnel runs
#[async_trait]
pub trait RoutingRule: Send + Sync {
    /// Apply the rule, replacing any leftover from an earlier run
    async fn install(&self, domains: &[String], nameservers: &[String])
        -> Result<(), TunnelError>;

    /// Remove the rule. Safe to call when nothing was installed; failures
    /// are logged only.
    async fn remove(&self);
}

/// NRPT rule keyed by its display name
pub struct NrptRule {
    runner: Arc<dyn ProcessRunner>,
    display_name: String,
}

impl NrptRule {
    pub fn new(runner: Arc<dyn ProcessRunner>, display_name: impl Into<String>) -> Self {
        Self {
            runner,
            display_name: display_name.into(),
        }
    }

    fn powershell(script: String) -> ProcessCommand {
        ProcessCommandBuilder::new("powershell")
            .args(["-Command".to_string(), script])
            .build()
    }

    fn add_script(&self, domains: &[String], nameservers: &[String]) -> String {
        format!(
            "Add-DnsClientNrptRule -DisplayName '{}' -Namespace {} -NameServers {}",
            self.display_name,
            powershell_array(domains),
            powershell_array(nameservers)
        )
    }

    fn remove_script(&self) -> String {
        format!(
            "Get-DnsClientNrptRule | Where-Object {{ $_.DisplayName -eq '{}' }} | Remove-DnsClientNrptRule -Force",
            self.display_name
        )
    }
}

/// `@("a","b")`
fn powershell_array(items: &[String]) -> String {
    format!("@(\"{}\")", items.join("\",\""))
}

#[async_trait]
impl RoutingRule for NrptRule {
    async fn install(
        &self,
        domains: &[String],
        nameservers: &[String],
    ) -> Result<(), TunnelError> {
        if domains.is_empty() || nameservers.is_empty() {
            return Err(TunnelError::Precondition(
                "domains or nameservers list is empty".to_string(),
            ));
        }

        self.remove().await;

        let output = self
            .runner
            .run(Self::powershell(self.add_script(domains, nameservers)))
            .await
            .map_err(|e| TunnelError::Precondition(e.to_string()))?;

        if !output.status.success() {
            warn!("PowerShell error: {}", output.combined());
            return Err(TunnelError::Precondition(format!(
                "powershell {}: {}",
                output.status,
                output.combined()
            )));
        }

        info!(
            "Added DNS rule '{}' for {} via {}",
            self.display_name,
            domains.join(", "),
            nameservers.join(", ")
        );
        Ok(())
    }

    async fn remove(&self) {
        match self.runner.run(Self::powershell(self.remove_script())).await {
            Ok(output) if output.status.success() => {
                debug!("Removed DNS rule '{}'", self.display_name);
            }
            Ok(output) => warn!(
                "Failed to remove DNS rule '{}': {} (output: {})",
                self.display_name,
                output.status,
                output.combined()
            ),
            Err(e) => warn!("Failed to remove DNS rule '{}': {}", self.display_name, e),
        }
    }
}

/// Leaves DNS alone, for hosts where the tunnel's resolver is set up
/// some other way
#[derive(Debug, Default)]
pub struct NoopRule;

#[async_trait]
impl RoutingRule for NoopRule {
    async fn install(
        &self,
        domains: &[String],
        _nameservers: &[String],
    ) -> Result<(), TunnelError> {
        info!("DNS rule management disabled, not routing {}", domains.join(", "));
        Ok(())
    }

    async fn remove(&self) {}
}
