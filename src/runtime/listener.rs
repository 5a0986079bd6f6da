//! Accept loop for the SOCKS listener.
//!
//! Allocates a fresh `Connection` per accepted client and seeds it at
//! `NegotiationRead`. An accept failure from fd exhaustion (EMFILE/ENFILE)
//! suspends accept interest for one tick rather than busy-looping.

use super::connection::Connection;
use super::token;
use super::RuntimeCtx;
use mio::net::TcpListener;
use mio::Interest;
use slab::Slab;
use std::io::{self, ErrorKind};
use tracing::{debug, warn};

pub struct ProxyListener {
    listener: TcpListener,
    suspended: bool,
}

impl ProxyListener {
    pub fn bind(addr: std::net::SocketAddr, ctx: &mut RuntimeCtx<'_>) -> io::Result<Self> {
        let mut listener = TcpListener::bind(addr)?;
        ctx.selector
            .register(&mut listener, token::SOCKS_LISTENER, Interest::READABLE)
            .map_err(|_| io::Error::new(ErrorKind::AddrInUse, "socks listener already registered"))?;
        Ok(Self { listener, suspended: false })
    }

    /// Accepts as many pending connections as are ready, allocating a
    /// `Connection` for each into `connections`.
    pub fn accept_all(&mut self, connections: &mut Slab<Connection>, ctx: &mut RuntimeCtx<'_>) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let entry = connections.vacant_entry();
                    let id = entry.key();
                    let mut conn = Connection::new(id, stream);
                    conn.arrive(ctx);
                    entry.insert(conn);
                    ctx.metrics.on_connect();
                    debug!(peer = %peer, conn_id = id, "accepted proxy connection");
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if is_fd_exhaustion(&e) => {
                    warn!(error = %e, "fd table exhausted, suspending accept for one tick");
                    self.suspend(ctx);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn suspend(&mut self, ctx: &mut RuntimeCtx<'_>) {
        if !self.suspended {
            ctx.selector.unregister(&mut self.listener, token::SOCKS_LISTENER);
            self.suspended = true;
        }
    }

    /// Re-registers the listener if a prior accept suspended it. Called once
    /// per reactor tick; a no-op when not suspended.
    pub fn retry_resume(&mut self, ctx: &mut RuntimeCtx<'_>) {
        if self.suspended
            && ctx
                .selector
                .register(&mut self.listener, token::SOCKS_LISTENER, Interest::READABLE)
                .is_ok()
        {
            self.suspended = false;
        }
    }
}

fn is_fd_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}
