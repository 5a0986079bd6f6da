//! Off-thread DNS resolution.
//!
//! A small fixed pool of worker threads performs blocking `getaddrinfo`
//! calls so the reactor thread never blocks. Results are posted back keyed
//! by connection id through a shared map plus the selector's `notify_block`
//! waker; the reactor reconciles by id, never by fd or pointer, so a
//! recycled slab slot can't receive a stale result.

use crate::runtime::selector::BlockQueue;
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

pub struct ResolveJob {
    pub id: usize,
    pub host: String,
    pub port: u16,
    pub cancelled: Arc<AtomicBool>,
}

pub struct ResolveResult {
    pub addrs: std::io::Result<Vec<SocketAddr>>,
}

pub type ResultMap = Arc<Mutex<HashMap<usize, ResolveResult>>>;

pub struct Resolver {
    job_tx: mpsc::Sender<ResolveJob>,
}

impl Resolver {
    /// Spawns `workers` background threads servicing `job_rx` and posting
    /// completions into `results`, waking the reactor via `block_queue`.
    pub fn spawn(workers: usize, block_queue: BlockQueue, results: ResultMap) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<ResolveJob>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for worker_id in 0..workers.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let block_queue = block_queue.clone();
            let results = Arc::clone(&results);
            thread::Builder::new()
                .name(format!("resolver-{worker_id}"))
                .spawn(move || resolver_loop(job_rx, block_queue, results))
                .expect("failed to spawn resolver worker");
        }

        Self { job_tx }
    }

    /// Enqueues a resolution job. Never blocks the reactor thread.
    pub fn submit(&self, job: ResolveJob) {
        // A closed channel means every worker panicked; drop the job rather
        // than taking down the reactor.
        let _ = self.job_tx.send(job);
    }
}

fn resolver_loop(job_rx: Arc<Mutex<mpsc::Receiver<ResolveJob>>>, block_queue: BlockQueue, results: ResultMap) {
    loop {
        let job = {
            let rx = job_rx.lock().unwrap();
            match rx.recv() {
                Ok(job) => job,
                Err(_) => return, // sender dropped: shutting down
            }
        };

        if job.cancelled.load(Ordering::Relaxed) {
            continue;
        }

        let addrs = (job.host.as_str(), job.port)
            .to_socket_addrs()
            .map(|it| it.collect::<Vec<_>>());

        if job.cancelled.load(Ordering::Relaxed) {
            continue;
        }

        results.lock().unwrap().insert(job.id, ResolveResult { addrs });
        block_queue.notify_block(job.id);
    }
}
