//! # Relay client
//!
//! Posts manual control samples to the relay server, throttled independently of the drive link.
//!
//! Posting happens on a worker thread so a slow or silent relay never holds up the control loop.
//! The worker is fed through a single slot: a record still waiting when a newer one is offered is
//! dropped. Relay failures are logged and never interrupt driving.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, trace, warn};
use thiserror::Error;

use comms_if::{
    net::{NetError, RelayClient},
    relay::ControlRecord,
};

use crate::cmd_channel::RateLimiter;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Somewhere control records can be delivered.
pub trait RelaySink {
    fn post(&mut self, record: &ControlRecord) -> Result<(), RelayError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Posts records to `POST /control` on a relay server.
#[derive(Debug, Clone)]
pub struct HttpRelayClient {
    client: RelayClient,
}

/// A relay sink behind its own rate limiter, driven by a worker thread.
pub struct RelayPath {
    tx: Option<Sender<ControlRecord>>,

    /// Producer side handle on the slot, used to evict a record the worker has not taken yet.
    slot: Receiver<ControlRecord>,

    worker: Option<JoinHandle<()>>,
    limiter: RateLimiter,
    stats: Arc<WorkerStats>,
    num_dropped: u64,
}

#[derive(Debug, Default)]
struct WorkerStats {
    num_posted: AtomicU64,
    num_failed: AtomicU64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error("Could not start the relay worker: {0}")]
    SpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HttpRelayClient {
    /// Create a client for the relay at `endpoint` (`host:port` or an `http://` URL).
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: RelayClient::new(endpoint, timeout),
        }
    }
}

impl RelaySink for HttpRelayClient {
    fn post(&mut self, record: &ControlRecord) -> Result<(), RelayError> {
        self.client.post_control(record)?;
        Ok(())
    }
}

impl RelayPath {
    /// Start the worker posting to `sink`, with at most one unforced post per `min_interval`.
    pub fn new(sink: Box<dyn RelaySink + Send>, min_interval: Duration) -> Result<Self, RelayError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let stats = Arc::new(WorkerStats::default());

        let worker = {
            let rx = rx.clone();
            let stats = stats.clone();
            thread::Builder::new()
                .name("relay".into())
                .spawn(move || run_worker(sink, rx, stats))
                .map_err(RelayError::SpawnError)?
        };

        Ok(Self {
            tx: Some(tx),
            slot: rx,
            worker: Some(worker),
            limiter: RateLimiter::new(min_interval),
            stats,
            num_dropped: 0,
        })
    }

    /// Hand a record to the worker unless throttled. Returns `true` if the record was accepted.
    ///
    /// Never blocks.
    pub fn offer(&mut self, record: &ControlRecord, force: bool, now: Instant) -> bool {
        if !force && !self.limiter.is_ready(now) {
            return false;
        }

        let tx = match self.tx {
            Some(ref tx) => tx,
            None => return false,
        };

        self.limiter.mark(now);

        if let Ok(stale) = self.slot.try_recv() {
            debug!("Dropped stale relay record {:?}", stale);
            self.num_dropped += 1;
        }

        match tx.try_send(*record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Only the worker takes from the slot, so this cannot normally happen
                self.num_dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("The relay worker has stopped");
                false
            }
        }
    }

    /// Stop accepting records and wait for the worker to post what it already holds.
    pub fn close(&mut self) {
        self.tx = None;

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("The relay worker panicked");
            }
        }
    }

    pub fn num_posted(&self) -> u64 {
        self.stats.num_posted.load(Ordering::Relaxed)
    }

    pub fn num_failed(&self) -> u64 {
        self.stats.num_failed.load(Ordering::Relaxed)
    }

    /// Records replaced by a newer one before the worker could post them.
    pub fn num_dropped(&self) -> u64 {
        self.num_dropped
    }
}

impl Drop for RelayPath {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    mut sink: Box<dyn RelaySink + Send>,
    rx: Receiver<ControlRecord>,
    stats: Arc<WorkerStats>,
) {
    // Ends once the path is closed and the slot is empty
    for record in rx.iter() {
        match sink.post(&record) {
            Ok(()) => {
                trace!("Relayed {:?}", record);
                stats.num_posted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Could not relay control: {}", e);
                stats.num_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Arc<Mutex<Vec<ControlRecord>>>);

    impl RelaySink for Recorder {
        fn post(&mut self, record: &ControlRecord) -> Result<(), RelayError> {
            self.0.lock().unwrap().push(*record);
            Ok(())
        }
    }

    struct Failing;

    impl RelaySink for Failing {
        fn post(&mut self, _: &ControlRecord) -> Result<(), RelayError> {
            Err(NetError::Status(500, String::new()).into())
        }
    }

    /// Blocks in each post until the test opens the gate.
    struct Gated {
        started: Sender<ControlRecord>,
        gate: Receiver<()>,
        log: Arc<Mutex<Vec<ControlRecord>>>,
    }

    impl RelaySink for Gated {
        fn post(&mut self, record: &ControlRecord) -> Result<(), RelayError> {
            self.started.send(*record).ok();
            self.gate.recv().ok();
            self.log.lock().unwrap().push(*record);
            Ok(())
        }
    }

    fn wait_until<F: Fn() -> bool>(cond: F) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(2), "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_throttle_and_force() {
        let t0 = Instant::now();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut path =
            RelayPath::new(Box::new(Recorder(log.clone())), Duration::from_millis(200)).unwrap();

        assert!(path.offer(&ControlRecord::new(0.5, 0.5, false), false, t0));
        wait_until(|| path.num_posted() == 1);
        assert!(!path.offer(&ControlRecord::new(0.6, 0.5, false), false, t0 + Duration::from_millis(100)));
        assert!(path.offer(&ControlRecord::new(0.0, 0.0, false), true, t0 + Duration::from_millis(100)));
        wait_until(|| path.num_posted() == 2);
        assert!(path.offer(&ControlRecord::new(0.1, 0.1, false), false, t0 + Duration::from_millis(300)));

        path.close();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert!(log[1].is_neutral());
        assert_eq!(path.num_posted(), 3);
        assert_eq!(path.num_dropped(), 0);
    }

    #[test]
    fn test_failures_are_not_fatal() {
        let mut path = RelayPath::new(Box::new(Failing), Duration::from_millis(200)).unwrap();

        assert!(path.offer(&ControlRecord::new(0.5, 0.5, true), false, Instant::now()));
        path.close();

        assert_eq!(path.num_failed(), 1);
        assert_eq!(path.num_posted(), 0);
    }

    #[test]
    fn test_slow_sink_keeps_only_the_latest() {
        let t0 = Instant::now();
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut path = RelayPath::new(
            Box::new(Gated {
                started: started_tx,
                gate: gate_rx,
                log: log.clone(),
            }),
            Duration::from_millis(200),
        )
        .unwrap();

        let a = ControlRecord::new(0.1, 0.0, false);
        let b = ControlRecord::new(0.2, 0.0, false);
        let c = ControlRecord::new(0.3, 0.0, false);

        assert!(path.offer(&a, true, t0));
        assert_eq!(started_rx.recv_timeout(Duration::from_secs(2)), Ok(a));

        // The worker is stuck on `a`, offering does not wait for it
        let offer_start = Instant::now();
        assert!(path.offer(&b, true, t0));
        assert!(path.offer(&c, true, t0));
        assert!(offer_start.elapsed() < Duration::from_millis(50));
        assert_eq!(path.num_dropped(), 1);

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        path.close();

        assert_eq!(*log.lock().unwrap(), vec![a, c]);
        assert_eq!(path.num_posted(), 2);
    }

    #[test]
    fn test_closed_path_refuses_records() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut path =
            RelayPath::new(Box::new(Recorder(log.clone())), Duration::from_millis(200)).unwrap();

        path.close();

        assert!(!path.offer(&ControlRecord::new(0.5, 0.5, false), true, Instant::now()));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unreachable_relay() {
        let mut client = HttpRelayClient::new("127.0.0.1:1", Duration::from_millis(200));

        assert!(client.post(&ControlRecord::new(0.0, 0.0, false)).is_err());
    }
}
