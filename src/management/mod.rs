//! Auxiliary management TCP service.
//!
//! Each connection is driven by its own small two-state machine (read a
//! command line, execute it, write the response, close) sharing the same
//! reactor thread as the proxy core. No locking is needed against the user
//! store / dissector toggle because both run on this same thread.

pub mod grammar;

use crate::runtime::buffer::ByteBuffer;
use crate::runtime::state_machine::{Hooks, StateMachine};
use crate::runtime::token;
use crate::runtime::{RuntimeCtx, Side};
use grammar::Collaborators;
use mio::net::TcpListener;
use mio::Interest;
use slab::Slab;
use std::io::{self, ErrorKind, Read, Write};

const LINE_BUF_SIZE: usize = 4 * 1024;
const MAX_LINE_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MgmtState {
    Read,
    Write,
    Done,
}

pub struct MgmtConnection {
    id: usize,
    sm: StateMachine<MgmtState>,
    data: MgmtData,
}

impl MgmtConnection {
    fn new(id: usize, stream: mio::net::TcpStream) -> Self {
        Self {
            id,
            sm: StateMachine::new(MgmtState::Read),
            data: MgmtData::new(id, stream),
        }
    }

    pub fn arrive(&mut self, ctx: &mut RuntimeCtx<'_>) {
        self.sm.arrive(&mut self.data, ctx);
    }

    pub fn handle_read(&mut self, ctx: &mut RuntimeCtx<'_>) {
        self.sm.handle_read(&mut self.data, ctx);
    }

    pub fn handle_write(&mut self, ctx: &mut RuntimeCtx<'_>) {
        self.sm.handle_write(&mut self.data, ctx);
    }

    pub fn is_closed(&self) -> bool {
        self.data.closed
    }

    pub fn force_close(&mut self, ctx: &mut RuntimeCtx<'_>) {
        self.sm.handle_close(&mut self.data, ctx);
        self.data.teardown(ctx);
    }
}

struct MgmtData {
    id: usize,
    stream: mio::net::TcpStream,
    in_buf: ByteBuffer,
    out_buf: ByteBuffer,
    closed: bool,
}

impl MgmtData {
    fn new(id: usize, stream: mio::net::TcpStream) -> Self {
        Self {
            id,
            stream,
            in_buf: ByteBuffer::new(LINE_BUF_SIZE),
            out_buf: ByteBuffer::new(LINE_BUF_SIZE),
            closed: false,
        }
    }

    fn token(&self) -> mio::Token {
        token::encode(self.id, token::TAG_MGMT_CLIENT)
    }

    fn teardown(&mut self, ctx: &mut RuntimeCtx<'_>) {
        if self.closed {
            return;
        }
        self.closed = true;
        ctx.selector.unregister(&mut self.stream, self.token());
    }
}

impl Hooks<MgmtState, RuntimeCtx<'_>> for MgmtData {
    fn on_arrival(&mut self, state: MgmtState, ctx: &mut RuntimeCtx<'_>) {
        match state {
            MgmtState::Read => {
                let _ = ctx.selector.register(&mut self.stream, self.token(), Interest::READABLE);
            }
            MgmtState::Done => self.teardown(ctx),
            MgmtState::Write => {}
        }
    }

    fn on_departure(&mut self, _state: MgmtState, _ctx: &mut RuntimeCtx<'_>) {}

    fn on_read_ready(&mut self, state: MgmtState, ctx: &mut RuntimeCtx<'_>) -> MgmtState {
        if state != MgmtState::Read {
            return state;
        }
        loop {
            if !self.in_buf.can_write() {
                return MgmtState::Done; // line too long, never produced a newline
            }
            let (slice, avail) = self.in_buf.write_ptr();
            match self.stream.read(&mut slice[..avail]) {
                Ok(0) => return MgmtState::Done,
                Ok(n) => self.in_buf.write_advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return MgmtState::Done,
            }
        }

        let (slice, avail) = self.in_buf.read_ptr();
        let Some(newline) = slice[..avail].iter().position(|&b| b == b'\n') else {
            return MgmtState::Read;
        };
        let line_len = newline.min(MAX_LINE_LEN);
        let line = String::from_utf8_lossy(&slice[..line_len]).trim_end_matches('\r').to_string();
        self.in_buf.read_advance(newline + 1);

        let collab = Collaborators {
            users: ctx.user_store.clone(),
            dissector: ctx.dissector.clone(),
            metrics: ctx.metrics.clone(),
        };
        let mut response = grammar::execute(&line, &collab);
        response.push('\n');
        if response.len() > self.out_buf.capacity() {
            response = "-ERR response too large\n".to_string();
        }
        let (slice, avail) = self.out_buf.write_ptr();
        if avail < response.len() {
            return MgmtState::Done;
        }
        slice[..response.len()].copy_from_slice(response.as_bytes());
        self.out_buf.write_advance(response.len());

        if ctx.selector.set_interest(&mut self.stream, self.token(), Interest::WRITABLE).is_err() {
            return MgmtState::Done;
        }
        MgmtState::Write
    }

    fn on_write_ready(&mut self, state: MgmtState, _ctx: &mut RuntimeCtx<'_>) -> MgmtState {
        if state != MgmtState::Write {
            return state;
        }
        loop {
            if !self.out_buf.can_read() {
                return MgmtState::Done;
            }
            let (slice, avail) = self.out_buf.read_ptr();
            match self.stream.write(&slice[..avail]) {
                Ok(0) => return MgmtState::Done,
                Ok(n) => self.out_buf.read_advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return MgmtState::Write,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return MgmtState::Done,
            }
        }
    }

    fn on_block_ready(&mut self, state: MgmtState, _ctx: &mut RuntimeCtx<'_>) -> MgmtState {
        state
    }
}

pub struct MgmtListener {
    listener: TcpListener,
}

impl MgmtListener {
    pub fn bind(addr: std::net::SocketAddr, ctx: &mut RuntimeCtx<'_>) -> io::Result<Self> {
        let mut listener = TcpListener::bind(addr)?;
        ctx.selector
            .register(&mut listener, token::MGMT_LISTENER, Interest::READABLE)
            .map_err(|_| io::Error::new(ErrorKind::AddrInUse, "management listener already registered"))?;
        Ok(Self { listener })
    }

    pub fn accept_all(&mut self, connections: &mut Slab<MgmtConnection>, ctx: &mut RuntimeCtx<'_>) {
        loop {
            match self.listener.accept() {
                Ok((stream, _peer)) => {
                    let entry = connections.vacant_entry();
                    let id = entry.key();
                    let mut conn = MgmtConnection::new(id, stream);
                    ctx.side = Side::Client;
                    conn.arrive(ctx);
                    entry.insert(conn);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(_) => return,
            }
        }
    }
}
