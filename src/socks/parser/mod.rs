//! Incremental, restartable byte-oriented parsers for the SOCKS5
//! negotiation, authentication, and request frames.
//!
//! Each parser exposes `feed(&[u8]) -> Outcome` and is fed bytes a chunk at a
//! time (as they arrive from a non-blocking read); splitting the same byte
//! stream at different boundaries must always yield the same outcome.

pub mod auth;
pub mod method_select;
pub mod request;

/// Outcome of feeding a chunk of bytes to a parser.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The frame isn't complete yet; the caller should read more bytes.
    NeedMore,
    /// The frame parsed successfully. `consumed` is the number of bytes of
    /// the fed slice actually belonging to the frame.
    Done { value: T, consumed: usize },
    /// The frame is malformed.
    Failed(&'static str),
}
