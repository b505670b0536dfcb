use super::TunnelConfig;
use crate::error::TunnelError;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_config(config: &TunnelConfig) -> Result<(), TunnelError> {
        if config.server.trim().is_empty() {
            return Err(TunnelError::Config("server is empty".to_string()));
        }
        if config.domains.is_empty() {
            return Err(TunnelError::Config("domains list is empty".to_string()));
        }
        if config.nameservers.is_empty() {
            return Err(TunnelError::Config("nameservers list is empty".to_string()));
        }

        Self::validate_entries("domains", &config.domains)?;
        Self::validate_entries("nameservers", &config.nameservers)?;

        if config.launcher.program.trim().is_empty() {
            return Err(TunnelError::Config(
                "launcher.program cannot be empty".to_string(),
            ));
        }
        if config.timing.startup_grace.is_zero() {
            return Err(TunnelError::Config(
                "timing.startup_grace must be greater than 0".to_string(),
            ));
        }
        if config.dns.display_name.contains('\'') {
            return Err(TunnelError::Config(
                "dns.display_name cannot contain quotes".to_string(),
            ));
        }

        Ok(())
    }

    /// Entries end up quoted inside a PowerShell command line
    fn validate_entries(field: &str, entries: &[String]) -> Result<(), TunnelError> {
        for entry in entries {
            if entry.trim().is_empty() {
                return Err(TunnelError::Config(format!(
                    "{field} contains an empty entry"
                )));
            }
            if entry.contains(['"', '\'', '`', '$']) {
                return Err(TunnelError::Config(format!(
                    "{field} entry '{entry}' contains quote or shell characters"
                )));
            }
        }
        Ok(())
    }
}
