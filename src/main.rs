//! socks5d: a single-threaded, non-blocking SOCKS5 proxy with a management
//! channel.
//!
//! - CONNECT over SOCKS5 (RFC 1928), with optional username/password
//!   sub-negotiation (RFC 1929)
//! - An auxiliary TCP management channel for user administration, toggling
//!   the dissector, and reading metrics
//! - Configuration via CLI arguments or an optional TOML file

use socks5d::config::Config;
use socks5d::runtime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("socks5d: {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    info!(
        socks = %config.socks_addr(),
        mgmt = %config.mgmt_addr(),
        users = config.users.len(),
        dissector = config.dissector_enabled,
        "starting socks5d"
    );

    if let Err(e) = runtime::run(config) {
        error!(error = %e, "socks5d exited with an error");
        std::process::exit(2);
    }
}
