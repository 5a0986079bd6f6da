//! Shared error taxonomy for the proxy core.
//!
//! Each variant maps to a point in the propagation policy: protocol-level
//! errors become a SOCKS5 reply before teardown, I/O errors on a control
//! phase are immediately fatal, and `Internal` marks an invariant violation.

use std::fmt;

/// Errors raised while decoding or handling a SOCKS5 connection.
#[derive(Debug)]
pub enum ConnError {
    /// Malformed frame, unsupported version, or unsupported command.
    Protocol(&'static str),
    /// Username/password rejected by the user store.
    Auth(&'static str),
    /// DNS resolution produced no usable address.
    Resolve(String),
    /// Every candidate address failed to connect.
    Connect(std::io::Error),
    /// A read/write syscall failed outside of the relay phase.
    Io(std::io::Error),
    /// Resource exhaustion (fd table, allocation).
    Resource(&'static str),
    /// An invariant the implementation relies on was violated.
    Internal(&'static str),
}

impl ConnError {
    /// Maps this error to the SOCKS5 reply code that should be sent to the
    /// client before tearing the connection down, if any reply applies.
    pub fn reply_code(&self) -> Option<u8> {
        use crate::socks::wire::reply;
        match self {
            ConnError::Protocol(_) => Some(reply::GENERAL_FAILURE),
            ConnError::Auth(_) => None, // AUTH_WRITE already sent STATUS=1
            ConnError::Resolve(_) => Some(reply::HOST_UNREACHABLE),
            ConnError::Connect(e) => Some(connect_error_reply(e)),
            ConnError::Io(_) => None,
            ConnError::Resource(_) => None,
            ConnError::Internal(_) => None,
        }
    }
}

/// Maps a connect(2) failure to the SOCKS5 reply code table in the spec.
pub fn connect_error_reply(e: &std::io::Error) -> u8 {
    use crate::socks::wire::reply;
    match e.raw_os_error() {
        Some(libc::ECONNREFUSED) => reply::CONNECTION_REFUSED,
        Some(libc::ENETUNREACH) => reply::NETWORK_UNREACHABLE,
        Some(libc::EHOSTUNREACH) => reply::HOST_UNREACHABLE,
        Some(libc::ETIMEDOUT) => reply::TTL_EXPIRED,
        _ => reply::GENERAL_FAILURE,
    }
}

impl fmt::Display for ConnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ConnError::Auth(msg) => write!(f, "auth error: {msg}"),
            ConnError::Resolve(msg) => write!(f, "resolve error: {msg}"),
            ConnError::Connect(e) => write!(f, "connect error: {e}"),
            ConnError::Io(e) => write!(f, "io error: {e}"),
            ConnError::Resource(msg) => write!(f, "resource error: {msg}"),
            ConnError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ConnError {}

impl From<std::io::Error> for ConnError {
    fn from(e: std::io::Error) -> Self {
        ConnError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_refused_maps_to_reply_5() {
        let e = std::io::Error::from_raw_os_error(libc::ECONNREFUSED);
        assert_eq!(connect_error_reply(&e), crate::socks::wire::reply::CONNECTION_REFUSED);
    }

    #[test]
    fn unknown_errno_maps_to_general_failure() {
        let e = std::io::Error::from_raw_os_error(libc::EPERM);
        assert_eq!(connect_error_reply(&e), crate::socks::wire::reply::GENERAL_FAILURE);
    }
}
