//! # tunnel-supervisor
//!
//! Runs a VPN tunnel client as a child process and keeps the host in step
//! with it.
//!
//! ## Usage
//!
//! ```bash
//! tunnel-supervisor [-v...] [--no-dns] <config.yaml>
//! ```
//!
//! ## Modules
//!
//! - `config` - YAML configuration, defaults and validation
//! - `subprocess` - Process runner abstraction, output streaming and the tunnel supervisor
//! - `dns` - DNS routing rule applied while the tunnel is up
//! - `browser` - Opens the tunnel client's login URL
//! - `signal` - Stop requests from the terminal or service manager
//! - `lifecycle` - Start-to-stop sequence for one session
//! - `error` - Error types shared across the crate
pub mod browser;
pub mod config;
pub mod dns;
pub mod error;
pub mod lifecycle;
pub mod signal;
pub mod subprocess;

pub use error::TunnelError;
pub use lifecycle::TunnelService;
