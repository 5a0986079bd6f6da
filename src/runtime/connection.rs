//! The per-connection state machine: SOCKS5 negotiation, optional
//! authentication, request parsing, connect, and the bidirectional relay.
//!
//! `Connection` splits its state-machine index (`sm`) from the struct that
//! implements the hooks (`data`) so that `sm.handle_read(&mut data, ctx)` is
//! a disjoint-field borrow rather than `self` implementing `Hooks` on
//! itself, which would require two simultaneous `&mut self` borrows.

use super::buffer::ByteBuffer;
use super::resolver::ResolveJob;
use super::state_machine::{Hooks, StateMachine};
use super::token;
use super::{RuntimeCtx, Side};
use crate::error::ConnError;
use crate::metrics::Direction;
use crate::socks::parser::{self, Outcome};
use crate::socks::wire::{self, command, method, reply, DestAddr};
use mio::net::TcpStream;
use mio::Interest;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CONTROL_BUF_SIZE: usize = 4 * 1024;
const RELAY_BUF_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    NegotiationRead,
    NegotiationWrite,
    AuthRead,
    AuthWrite,
    RequestRead,
    RequestResolv,
    RequestConnecting,
    RequestWrite,
    Copy,
    Done,
    Error,
}

pub struct Connection {
    pub id: usize,
    sm: StateMachine<ConnState>,
    data: ConnData,
    last_activity: std::time::Instant,
}

impl Connection {
    pub fn new(id: usize, client: TcpStream) -> Self {
        Self {
            id,
            sm: StateMachine::new(ConnState::NegotiationRead),
            data: ConnData::new(id, client),
            last_activity: std::time::Instant::now(),
        }
    }

    /// Fires `on_arrival` for the seed state. Must be called exactly once,
    /// after construction.
    pub fn arrive(&mut self, ctx: &mut RuntimeCtx<'_>) {
        self.sm.arrive(&mut self.data, ctx);
    }

    pub fn handle_read(&mut self, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        self.last_activity = std::time::Instant::now();
        self.sm.handle_read(&mut self.data, ctx)
    }

    pub fn handle_write(&mut self, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        self.last_activity = std::time::Instant::now();
        self.sm.handle_write(&mut self.data, ctx)
    }

    pub fn handle_block(&mut self, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        self.last_activity = std::time::Instant::now();
        self.sm.handle_block(&mut self.data, ctx)
    }

    pub fn is_idle(&self, timeout: std::time::Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.sm.current(), ConnState::Done | ConnState::Error)
    }

    pub fn is_closed(&self) -> bool {
        self.data.closed
    }

    /// Administrative teardown (idle timeout, shutdown). Runs the current
    /// state's departure hook, then unregisters and closes both fds.
    pub fn force_close(&mut self, ctx: &mut RuntimeCtx<'_>) {
        self.sm.handle_close(&mut self.data, ctx);
        self.data.teardown(ctx);
    }
}

struct ConnData {
    id: usize,
    client: TcpStream,
    origin: Option<TcpStream>,
    /// client -> origin bytes: raw negotiation input, then the relay pipe.
    c2o: ByteBuffer,
    /// origin -> client bytes: staged control replies, then the relay pipe.
    o2c: ByteBuffer,
    username: Option<String>,
    chosen_method: u8,
    auth_ok: bool,
    dest: Option<DestAddr>,
    candidates: VecDeque<SocketAddr>,
    last_connect_err: Option<io::Error>,
    resolve_cancel: Option<Arc<AtomicBool>>,
    fail_after_write: bool,
    client_eof: bool,
    origin_eof: bool,
    closed: bool,
}

impl ConnData {
    fn new(id: usize, client: TcpStream) -> Self {
        Self {
            id,
            client,
            origin: None,
            c2o: ByteBuffer::new(RELAY_BUF_SIZE),
            o2c: ByteBuffer::new(RELAY_BUF_SIZE.max(CONTROL_BUF_SIZE)),
            username: None,
            chosen_method: method::NO_ACCEPTABLE,
            auth_ok: false,
            dest: None,
            candidates: VecDeque::new(),
            last_connect_err: None,
            resolve_cancel: None,
            fail_after_write: false,
            client_eof: false,
            origin_eof: false,
            closed: false,
        }
    }

    fn client_token(&self) -> mio::Token {
        token::encode(self.id, token::TAG_PROXY_CLIENT)
    }

    fn origin_token(&self) -> mio::Token {
        token::encode(self.id, token::TAG_PROXY_ORIGIN)
    }

    fn stage(buf: &mut ByteBuffer, bytes: &[u8]) -> Result<(), ConnError> {
        let (slice, avail) = buf.write_ptr();
        if avail < bytes.len() {
            return Err(ConnError::Internal("control buffer too small for frame"));
        }
        slice[..bytes.len()].copy_from_slice(bytes);
        buf.write_advance(bytes.len());
        Ok(())
    }

    /// Stages a failure reply (if one applies) and arranges to land in
    /// `Error` once it drains.
    fn fail_with_reply(&mut self, rep: Option<u8>, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        match rep {
            Some(code) => {
                let frame = wire::encode_failure_reply(code);
                if Self::stage(&mut self.o2c, &frame).is_err() {
                    return ConnState::Error;
                }
                self.fail_after_write = true;
                if ctx
                    .selector
                    .set_interest(&mut self.client, self.client_token(), Interest::WRITABLE)
                    .is_err()
                {
                    return ConnState::Error;
                }
                ConnState::RequestWrite
            }
            None => ConnState::Error,
        }
    }

    fn begin_connect_attempt(&mut self, ctx: &mut RuntimeCtx<'_>) -> Result<(), io::Error> {
        loop {
            let Some(addr) = self.candidates.pop_front() else {
                return Err(self
                    .last_connect_err
                    .take()
                    .unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "no candidate addresses")));
            };
            match TcpStream::connect(addr) {
                Ok(mut stream) => {
                    if ctx
                        .selector
                        .register(&mut stream, self.origin_token(), Interest::WRITABLE)
                        .is_err()
                    {
                        continue;
                    }
                    self.origin = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    self.last_connect_err = Some(e);
                    continue;
                }
            }
        }
    }

    fn retry_or_fail_connect(&mut self, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        if let Some(mut origin) = self.origin.take() {
            ctx.selector.unregister(&mut origin, self.origin_token());
        }
        match self.begin_connect_attempt(ctx) {
            Ok(()) => ConnState::RequestConnecting,
            Err(e) => self.fail_with_reply(Some(crate::error::connect_error_reply(&e)), ctx),
        }
    }

    fn update_copy_interest(&mut self, ctx: &mut RuntimeCtx<'_>) {
        let client_read = self.c2o.can_write() && !self.client_eof;
        let client_write = self.o2c.can_read();
        if let Some(interest) = combine(client_read, client_write) {
            let _ = ctx.selector.set_interest(&mut self.client, self.client_token(), interest);
        }
        if let Some(origin) = self.origin.as_mut() {
            let origin_read = self.o2c.can_write() && !self.origin_eof;
            let origin_write = self.c2o.can_read();
            if let Some(interest) = combine(origin_read, origin_write) {
                let _ = ctx
                    .selector
                    .set_interest(origin, token::encode(self.id, token::TAG_PROXY_ORIGIN), interest);
            }
        }
    }

    fn maybe_done(&self) -> bool {
        self.client_eof && self.origin_eof && self.c2o.is_empty() && self.o2c.is_empty()
    }

    fn teardown(&mut self, ctx: &mut RuntimeCtx<'_>) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(cancel) = self.resolve_cancel.take() {
            cancel.store(true, Ordering::Relaxed);
        }
        ctx.selector.unregister(&mut self.client, self.client_token());
        if let Some(mut origin) = self.origin.take() {
            let tok = token::encode(self.id, token::TAG_PROXY_ORIGIN);
            ctx.selector.unregister(&mut origin, tok);
        }
        ctx.metrics.on_disconnect();
    }
}

fn combine(read: bool, write: bool) -> Option<Interest> {
    match (read, write) {
        (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

/// Reads from `r` into `buf` until `WouldBlock`, EOF, or the buffer fills.
/// Returns `(bytes_read, eof)`.
fn fill_from(buf: &mut ByteBuffer, r: &mut impl Read) -> io::Result<(usize, bool)> {
    let mut total = 0;
    loop {
        if !buf.can_write() {
            return Ok((total, false));
        }
        let (slice, avail) = buf.write_ptr();
        match r.read(&mut slice[..avail]) {
            Ok(0) => return Ok((total, true)),
            Ok(n) => {
                buf.write_advance(n);
                total += n;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok((total, false)),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Drains `buf` into `w` until `WouldBlock` or the buffer empties.
fn drain_to(buf: &mut ByteBuffer, w: &mut impl Write) -> io::Result<()> {
    loop {
        if !buf.can_read() {
            return Ok(());
        }
        let (slice, avail) = buf.read_ptr();
        match w.write(&slice[..avail]) {
            Ok(0) => return Ok(()),
            Ok(n) => buf.read_advance(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn take_socket_error(stream: &TcpStream) -> io::Result<()> {
    let fd = stream.as_raw_fd();
    let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
    let result = sock.take_error();
    let _ = sock.into_raw_fd(); // give the fd back to `stream`, don't close it
    match result {
        Ok(None) => Ok(()),
        Ok(Some(e)) | Err(e) => Err(e),
    }
}

impl Hooks<ConnState, RuntimeCtx<'_>> for ConnData {
    fn on_arrival(&mut self, state: ConnState, ctx: &mut RuntimeCtx<'_>) {
        use ConnState::*;
        match state {
            NegotiationRead => {
                let _ = ctx
                    .selector
                    .register(&mut self.client, self.client_token(), Interest::READABLE);
            }
            AuthRead | RequestRead => {
                let _ = ctx
                    .selector
                    .set_interest(&mut self.client, self.client_token(), Interest::READABLE);
            }
            RequestConnecting => {
                // begin_connect_attempt only fails with an empty candidate
                // list, which REQUEST_READ never hands off empty.
                let _ = self.begin_connect_attempt(ctx);
            }
            Copy => {
                self.update_copy_interest(ctx);
            }
            Done | Error => {
                self.teardown(ctx);
            }
            _ => {}
        }
    }

    fn on_departure(&mut self, _state: ConnState, _ctx: &mut RuntimeCtx<'_>) {}

    fn on_read_ready(&mut self, state: ConnState, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        use ConnState::*;
        match state {
            NegotiationRead => match fill_from(&mut self.c2o, &mut self.client) {
                Ok((0, true)) => Error,
                Ok(_) => self.advance_negotiation(ctx),
                Err(_) => Error,
            },
            AuthRead => match fill_from(&mut self.c2o, &mut self.client) {
                Ok((0, true)) => Error,
                Ok(_) => self.advance_auth(ctx),
                Err(_) => Error,
            },
            RequestRead => match fill_from(&mut self.c2o, &mut self.client) {
                Ok((0, true)) => Error,
                Ok(_) => self.advance_request(ctx),
                Err(_) => Error,
            },
            Copy => {
                let is_client = matches!(ctx.side, Side::Client);
                let (buf, stream): (&mut ByteBuffer, &mut TcpStream) = if is_client {
                    (&mut self.c2o, &mut self.client)
                } else {
                    (&mut self.o2c, self.origin.as_mut().expect("origin present in Copy"))
                };
                match fill_from(buf, stream) {
                    Ok((n, eof)) => {
                        if n > 0 {
                            let dir = if is_client { Direction::Received } else { Direction::Sent };
                            ctx.metrics.on_bytes(dir, n as u64);
                            if ctx.dissector.enabled() {
                                if let Some(username) = self.username.clone() {
                                    let (slice, avail) = buf.read_ptr();
                                    let start = avail.saturating_sub(n);
                                    let mut log = ctx.log.borrow_mut();
                                    ctx.dissector.inspect(&mut log, &username, dir, &slice[start..avail]);
                                }
                            }
                        }
                        if eof {
                            if is_client {
                                self.client_eof = true;
                                if let Some(origin) = self.origin.as_mut() {
                                    let _ = origin.shutdown(std::net::Shutdown::Write);
                                }
                            } else {
                                self.origin_eof = true;
                                let _ = self.client.shutdown(std::net::Shutdown::Write);
                            }
                        }
                        self.update_copy_interest(ctx);
                        if self.maybe_done() {
                            Done
                        } else {
                            Copy
                        }
                    }
                    Err(_) => Error,
                }
            }
            other => other,
        }
    }

    fn on_write_ready(&mut self, state: ConnState, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        use ConnState::*;
        match state {
            NegotiationWrite => {
                if drain_to(&mut self.o2c, &mut self.client).is_err() {
                    return Error;
                }
                if !self.o2c.is_empty() {
                    return NegotiationWrite;
                }
                match self.chosen_method {
                    m if m == method::USER_PASS => AuthRead,
                    m if m == method::NO_AUTH => RequestRead,
                    _ => Error,
                }
            }
            AuthWrite => {
                if drain_to(&mut self.o2c, &mut self.client).is_err() {
                    return Error;
                }
                if !self.o2c.is_empty() {
                    return AuthWrite;
                }
                if self.auth_ok {
                    RequestRead
                } else {
                    Error
                }
            }
            RequestConnecting => match ctx.side {
                Side::Origin => {
                    let origin = self.origin.as_ref().expect("origin present while connecting");
                    match take_socket_error(origin) {
                        Ok(()) => self.finish_connect(ctx),
                        Err(e) => {
                            self.last_connect_err = Some(e);
                            self.retry_or_fail_connect(ctx)
                        }
                    }
                }
                Side::Client => RequestConnecting,
            },
            RequestWrite => {
                if drain_to(&mut self.o2c, &mut self.client).is_err() {
                    return Error;
                }
                if !self.o2c.is_empty() {
                    return RequestWrite;
                }
                if self.fail_after_write {
                    Error
                } else {
                    Copy
                }
            }
            Copy => {
                let is_client = matches!(ctx.side, Side::Client);
                let result = if is_client {
                    drain_to(&mut self.o2c, &mut self.client)
                } else {
                    drain_to(&mut self.c2o, self.origin.as_mut().expect("origin present in Copy"))
                };
                if result.is_err() {
                    return Error;
                }
                self.update_copy_interest(ctx);
                if self.maybe_done() {
                    Done
                } else {
                    Copy
                }
            }
            other => other,
        }
    }

    fn on_block_ready(&mut self, state: ConnState, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        if state != ConnState::RequestResolv {
            return state;
        }
        self.resolve_cancel = None;
        let result = ctx.resolve_results.lock().unwrap().remove(&self.id);
        match result {
            Some(r) => match r.addrs {
                Ok(addrs) if !addrs.is_empty() => {
                    self.candidates = addrs.into();
                    ConnState::RequestConnecting
                }
                Ok(_) | Err(_) => self.fail_with_reply(Some(reply::HOST_UNREACHABLE), ctx),
            },
            None => ConnState::RequestResolv,
        }
    }
}

impl ConnData {
    fn advance_negotiation(&mut self, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        let (slice, avail) = self.c2o.read_ptr();
        match parser::method_select::parse(&slice[..avail]) {
            Outcome::NeedMore => {
                if !self.c2o.can_write() {
                    return ConnState::Error; // frame too large for the control buffer
                }
                ConnState::NegotiationRead
            }
            Outcome::Failed(_) => ConnState::Error,
            Outcome::Done { value, consumed } => {
                self.c2o.read_advance(consumed);
                let has_user_pass = value.methods.contains(&method::USER_PASS);
                let has_no_auth = value.methods.contains(&method::NO_AUTH);
                self.chosen_method = if has_user_pass && ctx.auth_required {
                    method::USER_PASS
                } else if has_no_auth {
                    method::NO_AUTH
                } else {
                    method::NO_ACCEPTABLE
                };
                if Self::stage(&mut self.o2c, &[wire::VERSION, self.chosen_method]).is_err() {
                    return ConnState::Error;
                }
                if ctx
                    .selector
                    .set_interest(&mut self.client, self.client_token(), Interest::WRITABLE)
                    .is_err()
                {
                    return ConnState::Error;
                }
                ConnState::NegotiationWrite
            }
        }
    }

    fn advance_auth(&mut self, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        let (slice, avail) = self.c2o.read_ptr();
        match parser::auth::parse(&slice[..avail]) {
            Outcome::NeedMore => {
                if !self.c2o.can_write() {
                    return ConnState::Error;
                }
                ConnState::AuthRead
            }
            Outcome::Failed(_) => ConnState::Error,
            Outcome::Done { value, consumed } => {
                self.c2o.read_advance(consumed);
                self.auth_ok = ctx.user_store.borrow().verify(&value.username, &value.password);
                if self.auth_ok {
                    self.username = Some(value.username);
                }
                let status: u8 = if self.auth_ok { 0x00 } else { 0x01 };
                if Self::stage(&mut self.o2c, &[wire::AUTH_VERSION, status]).is_err() {
                    return ConnState::Error;
                }
                if ctx
                    .selector
                    .set_interest(&mut self.client, self.client_token(), Interest::WRITABLE)
                    .is_err()
                {
                    return ConnState::Error;
                }
                ConnState::AuthWrite
            }
        }
    }

    fn advance_request(&mut self, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        let (slice, avail) = self.c2o.read_ptr();
        match parser::request::parse(&slice[..avail]) {
            Outcome::NeedMore => {
                if !self.c2o.can_write() {
                    return ConnState::Error;
                }
                ConnState::RequestRead
            }
            Outcome::Failed(_) => self.fail_with_reply(Some(reply::GENERAL_FAILURE), ctx),
            Outcome::Done { value, consumed } => {
                self.c2o.read_advance(consumed);
                if value.cmd != command::CONNECT {
                    return self.fail_with_reply(Some(reply::COMMAND_NOT_SUPPORTED), ctx);
                }
                match value.dest {
                    DestAddr::Socket(addr) => {
                        self.dest = Some(DestAddr::Socket(addr));
                        self.candidates.push_back(addr);
                        ConnState::RequestConnecting
                    }
                    DestAddr::Domain(name, port) => {
                        self.dest = Some(DestAddr::Domain(name.clone(), port));
                        let cancel = Arc::new(AtomicBool::new(false));
                        self.resolve_cancel = Some(Arc::clone(&cancel));
                        ctx.resolver.submit(ResolveJob {
                            id: self.id,
                            host: name,
                            port,
                            cancelled: cancel,
                        });
                        ConnState::RequestResolv
                    }
                }
            }
        }
    }

    fn finish_connect(&mut self, ctx: &mut RuntimeCtx<'_>) -> ConnState {
        let local = match self.origin.as_ref().unwrap().local_addr() {
            Ok(addr) => addr,
            Err(_) => wire::unspecified_v6(),
        };
        let frame = wire::encode_reply(reply::SUCCEEDED, local);
        if Self::stage(&mut self.o2c, &frame).is_err() {
            return ConnState::Error;
        }
        if ctx
            .selector
            .set_interest(&mut self.client, self.client_token(), Interest::WRITABLE)
            .is_err()
        {
            return ConnState::Error;
        }
        ConnState::RequestWrite
    }
}
