//! Single-threaded reactor tying the SOCKS proxy core and the management
//! channel to one `mio::Poll`.
//!
//! Connection state transitions, parser work, relay I/O, and management
//! handling all happen on this one thread. The only off-thread worker is
//! the DNS resolver pool, which communicates results back exclusively
//! through the selector's thread-safe `notify_block`.

pub mod buffer;
mod connection;
mod listener;
mod resolver;
pub mod selector;
pub mod state_machine;
pub mod token;

use crate::config::Config;
use crate::dissector::Dissector;
use crate::logsink::LogSink;
use crate::metrics::Metrics;
use crate::userstore::UserStore;
use connection::Connection;
use listener::ProxyListener;
use mio::Events;
use resolver::{ResultMap, Resolver};
use selector::Selector;
use slab::Slab;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const RESOLVER_WORKERS: usize = 4;
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Which fd of a Connection's pair triggered the current callback. Set by
/// the dispatcher immediately before calling into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Origin,
}

/// Everything a connection's hooks need beyond its own fields. Constructed
/// fresh (as borrows) for each dispatch; the collaborators it points at are
/// shared process-wide state.
pub struct RuntimeCtx<'a> {
    pub selector: &'a mut Selector,
    pub resolver: &'a Resolver,
    pub resolve_results: &'a ResultMap,
    pub user_store: Rc<RefCell<UserStore>>,
    pub dissector: Rc<Dissector>,
    pub metrics: Rc<Metrics>,
    pub log: Rc<RefCell<LogSink>>,
    pub side: Side,
    pub auth_required: bool,
}

/// Builds the collaborators and runs the reactor until a shutdown signal
/// arrives. Returns once the listeners are unregistered and all
/// connections have drained or been closed.
pub fn run(config: Config) -> io::Result<()> {
    let user_store = Rc::new(RefCell::new(UserStore::from_entries(config.users.clone())));
    let dissector = Rc::new(Dissector::new(config.dissector_enabled));
    let metrics = Rc::new(Metrics::new());
    let log = Rc::new(RefCell::new(LogSink::new(config.log_dir.clone())));
    let auth_required = !user_store.borrow().usernames().is_empty();

    let mut selector = Selector::new()?;
    let results: ResultMap = Arc::new(Mutex::new(HashMap::new()));
    let resolver = Resolver::spawn(RESOLVER_WORKERS, selector.block_queue(), Arc::clone(&results));

    let shutdown = Arc::new(AtomicBool::new(false));
    register_signal_handlers(&shutdown)?;

    let mut proxy_connections: Slab<Connection> = Slab::with_capacity(1024);
    let mut mgmt_connections: Slab<crate::management::MgmtConnection> = Slab::with_capacity(16);

    let socks_addr = config.socks_addr();
    let mgmt_addr = config.mgmt_addr();

    let mut ctx = RuntimeCtx {
        selector: &mut selector,
        resolver: &resolver,
        resolve_results: &results,
        user_store: Rc::clone(&user_store),
        dissector: Rc::clone(&dissector),
        metrics: Rc::clone(&metrics),
        log: Rc::clone(&log),
        side: Side::Client,
        auth_required,
    };

    let mut socks_listener = ProxyListener::bind(socks_addr, &mut ctx)?;
    let mut mgmt_listener = crate::management::MgmtListener::bind(mgmt_addr, &mut ctx)?;
    info!(socks = %socks_addr, mgmt = %mgmt_addr, "socks5d listening");
    ctx.log.borrow_mut().emit(&format!("server started, socks={socks_addr} mgmt={mgmt_addr}"));

    let mut events = Events::with_capacity(1024);
    let mut last_sweep = std::time::Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        if let Err(e) = ctx.selector.poll().poll(&mut events, Some(POLL_TIMEOUT)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }

        for id in ctx.selector.take_block_ready() {
            if let Some(conn) = proxy_connections.get_mut(id) {
                let next = conn.handle_block(&mut ctx);
                if matches!(next, connection::ConnState::Done | connection::ConnState::Error) {
                    proxy_connections.remove(id);
                }
            }
        }

        for event in events.iter() {
            let token = event.token();
            if token == token::SOCKS_LISTENER {
                socks_listener.accept_all(&mut proxy_connections, &mut ctx);
                continue;
            }
            if token == token::MGMT_LISTENER {
                mgmt_listener.accept_all(&mut mgmt_connections, &mut ctx);
                continue;
            }
            if token == token::RESOLVER_WAKER {
                continue; // block_ready already drained above
            }

            let Some((index, tag)) = token::decode(token) else { continue };
            match tag {
                token::TAG_PROXY_CLIENT | token::TAG_PROXY_ORIGIN => {
                    ctx.side = if tag == token::TAG_PROXY_CLIENT { Side::Client } else { Side::Origin };
                    dispatch_proxy(index, event, &mut proxy_connections, &mut ctx);
                }
                token::TAG_MGMT_CLIENT => {
                    dispatch_mgmt(index, event, &mut mgmt_connections, &mut ctx);
                }
                _ => {}
            }
        }

        socks_listener.retry_resume(&mut ctx);

        if last_sweep.elapsed() > Duration::from_secs(1) {
            sweep_idle(&mut proxy_connections, &mut ctx);
            last_sweep = std::time::Instant::now();
        }
    }

    info!("shutdown requested, draining connections");
    ctx.log.borrow_mut().emit("shutdown requested");
    for (_, conn) in proxy_connections.iter_mut() {
        conn.force_close(&mut ctx);
    }
    for (_, conn) in mgmt_connections.iter_mut() {
        conn.force_close(&mut ctx);
    }
    Ok(())
}

fn dispatch_proxy(
    index: usize,
    event: &mio::event::Event,
    connections: &mut Slab<Connection>,
    ctx: &mut RuntimeCtx<'_>,
) {
    if !connections.contains(index) {
        return;
    }
    if event.is_readable() {
        let next = connections[index].handle_read(ctx);
        if finalize_if_terminal(next, index, connections) {
            return;
        }
    }
    if event.is_writable() && connections.contains(index) {
        let next = connections[index].handle_write(ctx);
        finalize_if_terminal(next, index, connections);
    }
}

fn finalize_if_terminal(
    state: connection::ConnState,
    index: usize,
    connections: &mut Slab<Connection>,
) -> bool {
    if matches!(state, connection::ConnState::Done | connection::ConnState::Error) {
        connections.remove(index);
        true
    } else {
        false
    }
}

fn dispatch_mgmt(
    index: usize,
    event: &mio::event::Event,
    connections: &mut Slab<crate::management::MgmtConnection>,
    ctx: &mut RuntimeCtx<'_>,
) {
    if !connections.contains(index) {
        return;
    }
    if event.is_readable() {
        connections[index].handle_read(ctx);
    }
    if event.is_writable() && connections.contains(index) {
        connections[index].handle_write(ctx);
    }
    if connections.contains(index) && connections[index].is_closed() {
        connections.remove(index);
    }
}

fn sweep_idle(connections: &mut Slab<Connection>, ctx: &mut RuntimeCtx<'_>) {
    let idle: Vec<usize> = connections
        .iter()
        .filter(|(_, c)| c.is_idle(IDLE_TIMEOUT))
        .map(|(id, _)| id)
        .collect();
    for id in idle {
        if let Some(conn) = connections.get_mut(id) {
            debug!(conn_id = id, "closing idle connection");
            conn.force_close(ctx);
            connections.remove(id);
        }
    }
}

fn register_signal_handlers(shutdown: &Arc<AtomicBool>) -> io::Result<()> {
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(shutdown))?;
    Ok(())
}
