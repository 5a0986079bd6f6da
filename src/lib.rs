//! socks5d: a single-threaded, non-blocking SOCKS5 proxy with a management
//! channel.
//!
//! - CONNECT over SOCKS5 (RFC 1928), with optional username/password
//!   sub-negotiation (RFC 1929)
//! - An auxiliary TCP management channel for user administration, toggling
//!   the dissector, and reading metrics
//! - Configuration via CLI arguments or an optional TOML file

pub mod config;
pub mod dissector;
pub mod error;
pub mod logsink;
pub mod management;
pub mod metrics;
pub mod runtime;
pub mod socks;
pub mod userstore;
