//! Opens the tunnel client's login URL in the user's browser

use crate::subprocess::streaming::TriggerAction;
use crate::subprocess::{ProcessCommand, ProcessCommandBuilder, ProcessRunner};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Trigger action that hands the captured URL to the platform's opener.
///
/// The opener is started without waiting for it.
pub struct BrowserOpener {
    runner: Arc<dyn ProcessRunner>,
}

impl BrowserOpener {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn open_command(url: &str) -> ProcessCommand {
        if cfg!(windows) {
            ProcessCommandBuilder::new("rundll32")
                .args(["url.dll,FileProtocolHandler", url])
                .build()
        } else if cfg!(target_os = "macos") {
            ProcessCommandBuilder::new("open").arg(url).build()
        } else {
            ProcessCommandBuilder::new("xdg-open").arg(url).build()
        }
    }
}

#[async_trait]
impl TriggerAction for BrowserOpener {
    async fn fire(&self, captured: &str) -> Result<()> {
        // Validated only; the opener gets the text exactly as printed
        Url::parse(captured)
            .with_context(|| format!("malformed authentication URL '{captured}'"))?;

        self.runner
            .spawn_detached(Self::open_command(captured))
            .await
            .context("failed to launch browser")?;

        info!("Opened authentication URL: {}", captured);
        Ok(())
    }
}
