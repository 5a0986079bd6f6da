//! mio `Token` encoding for the single shared reactor.
//!
//! A connection owns up to two fds (client, origin); both must map back to
//! the same slab entry. Low tokens are split into a slab index and a 2-bit
//! tag; a handful of fixed high tokens are reserved for the listeners and
//! the resolver wakeup.

use mio::Token;

const TAG_BITS: usize = 2;
const TAG_MASK: usize = (1 << TAG_BITS) - 1;

pub const TAG_PROXY_CLIENT: usize = 0;
pub const TAG_PROXY_ORIGIN: usize = 1;
pub const TAG_MGMT_CLIENT: usize = 2;

pub const SOCKS_LISTENER: Token = Token(usize::MAX);
pub const MGMT_LISTENER: Token = Token(usize::MAX - 1);
pub const RESOLVER_WAKER: Token = Token(usize::MAX - 2);

/// Encodes a slab index plus a side tag into an mio `Token`.
pub fn encode(index: usize, tag: usize) -> Token {
    debug_assert!(tag <= TAG_MASK);
    Token((index << TAG_BITS) | tag)
}

/// Decodes a token produced by `encode` back into (index, tag).
///
/// Returns `None` for one of the reserved fixed tokens.
pub fn decode(token: Token) -> Option<(usize, usize)> {
    if token == SOCKS_LISTENER || token == MGMT_LISTENER || token == RESOLVER_WAKER {
        return None;
    }
    Some((token.0 >> TAG_BITS, token.0 & TAG_MASK))
}
