//! Single-threaded readiness multiplexer wrapping `mio::Poll`.
//!
//! Owns the registration bookkeeping (`AlreadyRegistered` detection) and the
//! `notify_block` path used by off-thread workers (the DNS resolver) to wake
//! the reactor and schedule a `block_ready` callback for a connection id.

use mio::{event::Source, Interest, Poll, Token, Waker};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum SelectorError {
    AlreadyRegistered,
    Io(io::Error),
}

impl From<io::Error> for SelectorError {
    fn from(e: io::Error) -> Self {
        SelectorError::Io(e)
    }
}

/// Queue of connection ids whose background work completed, drained on the
/// reactor thread whenever the resolver wakes the poll.
#[derive(Clone)]
pub struct BlockQueue {
    inner: Arc<Mutex<VecDeque<usize>>>,
    waker: Arc<Waker>,
}

impl BlockQueue {
    /// Thread-safe: pushes `id` and wakes the reactor. Used by the resolver
    /// worker to post a completion without touching Connection state.
    pub fn notify_block(&self, id: usize) {
        self.inner.lock().unwrap().push_back(id);
        let _ = self.waker.wake();
    }

    fn drain(&self) -> Vec<usize> {
        let mut guard = self.inner.lock().unwrap();
        guard.drain(..).collect()
    }
}

pub struct Selector {
    poll: Poll,
    registered: HashSet<Token>,
    block_queue: BlockQueue,
}

impl Selector {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), crate::runtime::token::RESOLVER_WAKER)?);
        Ok(Self {
            poll,
            registered: HashSet::new(),
            block_queue: BlockQueue {
                inner: Arc::new(Mutex::new(VecDeque::new())),
                waker,
            },
        })
    }

    pub fn block_queue(&self) -> BlockQueue {
        self.block_queue.clone()
    }

    pub fn register<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), SelectorError> {
        if self.registered.contains(&token) {
            return Err(SelectorError::AlreadyRegistered);
        }
        self.poll.registry().register(source, token, interest)?;
        self.registered.insert(token);
        Ok(())
    }

    pub fn set_interest<S: Source + ?Sized>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), SelectorError> {
        self.poll.registry().reregister(source, token, interest)?;
        Ok(())
    }

    /// Unregisters `token`. Callers must invoke the handler's close callback
    /// themselves before calling this, matching the spec's ordering
    /// requirement ("unregistration invokes the handler's close callback
    /// before releasing the entry").
    pub fn unregister<S: Source + ?Sized>(&mut self, source: &mut S, token: Token) {
        let _ = self.poll.registry().deregister(source);
        self.registered.remove(&token);
    }

    pub fn poll(&mut self) -> &mut Poll {
        &mut self.poll
    }

    /// Drains ids posted via `notify_block` since the last call.
    pub fn take_block_ready(&self) -> Vec<usize> {
        self.block_queue.drain()
    }
}
