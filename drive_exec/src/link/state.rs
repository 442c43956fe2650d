//! Implementations for the link manager

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, trace, warn};
use std::time::Instant;

// Internal
use super::{
    CharHandle, LinkError, LinkParams, LinkState, LinkStatus, LinkTransport, ScanFilter,
    TimerKind, TimerSlot, TimerToken, Transition, TransportError, TransportEvent,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum number of transport events handled in one call to `process`.
const MAX_EVENTS_PER_PROCESS: usize = 16;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Owns the transport and drives the link state machine.
pub struct LinkMgr<T: LinkTransport> {
    params: LinkParams,
    transport: T,

    state: LinkState,
    timer: TimerSlot,

    /// A scan is running on the transport. `false` while waiting to retry.
    scan_active: bool,

    /// The transport reported the connection as established.
    connected: bool,

    /// Resolved drive characteristic, only set while `Ready`.
    characteristic: Option<CharHandle>,

    status: LinkStatus,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: LinkTransport> LinkMgr<T> {
    pub fn new(params: LinkParams, transport: T) -> Self {
        Self {
            params,
            transport,
            state: LinkState::Idle,
            timer: TimerSlot::new(),
            scan_active: false,
            connected: false,
            characteristic: None,
            status: LinkStatus::default(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready && self.characteristic.is_some()
    }

    pub fn status(&self) -> &LinkStatus {
        &self.status
    }

    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    pub fn pending_timer(&self) -> Option<TimerToken> {
        self.timer.pending()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Start discovery. Has no effect if the link is already scanning, connecting or ready.
    pub fn start(&mut self, now: Instant) -> Vec<Transition> {
        let mut trans = Vec::new();

        match self.state {
            LinkState::Idle | LinkState::Disconnected => {
                info!(
                    "Starting link to \"{}\" (service {})",
                    self.params.device_name, self.params.service_uuid
                );
                self.begin_scan(now, &mut trans);
            }
            s => debug!("Link start requested while {:?}, ignoring", s),
        }

        trans
    }

    /// Stop the link, cancelling timers and scans and releasing the connection.
    pub fn stop(&mut self) -> Vec<Transition> {
        let mut trans = Vec::new();

        self.timer.cancel();

        if self.scan_active {
            self.transport.stop_scan();
            self.scan_active = false;
        }

        self.transport.disconnect();
        self.transport.release();

        self.connected = false;
        self.characteristic = None;
        self.status.peer = None;

        if self.state != LinkState::Idle {
            info!("Stopping link");
            self.set_state(LinkState::Idle, &mut trans);
        }

        trans
    }

    /// Drain queued transport events then fire any due timer.
    ///
    /// Returns the transitions applied, in order.
    pub fn process(&mut self, now: Instant) -> Vec<Transition> {
        let mut trans = Vec::new();

        let mut budget = MAX_EVENTS_PER_PROCESS;
        while budget > 0 {
            match self.transport.poll_event() {
                Some(event) => trans.extend(self.handle_event(event, now)),
                None => break,
            }
            budget -= 1;
        }

        if budget == 0 {
            debug!("Link event budget used up, remaining events wait for the next cycle");
        }

        trans.extend(self.poll(now));

        trans
    }

    /// Fire the pending timer if it is due.
    pub fn poll(&mut self, now: Instant) -> Vec<Transition> {
        match self.timer.due(now) {
            Some(token) => self.fire_timer(token, now),
            None => Vec::new(),
        }
    }

    /// Fire the timer identified by `token`. A stale token has no effect.
    pub fn fire_timer(&mut self, token: TimerToken, now: Instant) -> Vec<Transition> {
        let mut trans = Vec::new();

        if !self.timer.fire(token) {
            trace!("Ignoring stale {:?} timer", token.kind);
            return trans;
        }

        match (token.kind, self.state) {
            (TimerKind::ScanWindow, LinkState::Scanning) if self.scan_active => {
                info!(
                    "Scan window elapsed without finding \"{}\", retrying in {} ms",
                    self.params.device_name, self.params.retry_delay_ms
                );
                self.transport.stop_scan();
                self.schedule_retry(now);
            }
            (TimerKind::Retry, LinkState::Scanning) if !self.scan_active => {
                self.begin_scan(now, &mut trans);
            }
            (TimerKind::ConnectTimeout, LinkState::Connecting) => {
                warn!(
                    "Connection to {:?} timed out after {} ms",
                    self.status.peer, self.params.connect_timeout_ms
                );
                self.status.last_error = Some(LinkError::ConnectTimeout);
                self.transport.disconnect();
                self.on_link_lost(now, &mut trans);
            }
            (kind, state) => debug!("Ignoring {:?} timer while {:?}", kind, state),
        }

        trans
    }

    /// Handle a single transport event.
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) -> Vec<Transition> {
        let mut trans = Vec::new();

        match (event, self.state) {
            (TransportEvent::PeerDiscovered(adv), LinkState::Scanning) if self.scan_active => {
                if !adv.advertises(&self.params.service_uuid) {
                    trace!("Ignoring peer {} without the drive service", adv.peer);
                    return trans;
                }

                info!(
                    "Found peer {} ({}, rssi {} dBm)",
                    adv.peer,
                    adv.name.as_deref().unwrap_or("unnamed"),
                    adv.rssi
                );

                self.transport.stop_scan();
                self.scan_active = false;
                self.timer.cancel();

                match self.transport.connect(&adv.peer) {
                    Ok(()) => {
                        self.status.peer = Some(adv.peer);
                        self.set_state(LinkState::Connecting, &mut trans);
                        self.timer.schedule(
                            TimerKind::ConnectTimeout,
                            now + self.params.connect_timeout(),
                        );
                    }
                    Err(e) => {
                        warn!("Connection to {} rejected: {}", adv.peer, e);
                        self.status.last_error = Some(LinkError::ConnectRejected(e.to_string()));
                        self.schedule_retry(now);
                    }
                }
            }

            (TransportEvent::ScanFailed(reason), LinkState::Scanning) if self.scan_active => {
                warn!("Scan failed: {}", reason);
                self.transport.stop_scan();
                self.status.last_error = Some(LinkError::ScanRejected(reason));
                self.schedule_retry(now);
            }

            (TransportEvent::Connected(peer), LinkState::Connecting) => {
                debug!("Connected to {}, discovering services", peer);
                self.connected = true;

                if let Err(e) = self.transport.discover_services() {
                    warn!("Service discovery on {} could not start: {}", peer, e);
                    self.status.last_error = Some(LinkError::ConnectRejected(e.to_string()));
                    self.transport.disconnect();
                    self.on_link_lost(now, &mut trans);
                }
            }

            (TransportEvent::ConnectFailed(peer, reason), LinkState::Connecting) => {
                warn!("Connection to {} failed: {}", peer, reason);
                self.status.last_error = Some(LinkError::ConnectRejected(reason));
                self.on_link_lost(now, &mut trans);
            }

            (TransportEvent::ServicesDiscovered(services), LinkState::Connecting)
                if self.connected =>
            {
                let service = services
                    .iter()
                    .find(|s| s.uuid.eq_ignore_ascii_case(&self.params.service_uuid));

                let characteristic = service
                    .and_then(|s| s.writable_characteristic(&self.params.characteristic_uuid));

                match (service, characteristic) {
                    (Some(s), Some(c)) => {
                        self.characteristic = Some(CharHandle {
                            service_uuid: s.uuid.clone(),
                            characteristic_uuid: c.uuid.clone(),
                        });
                        self.timer.cancel();
                        self.status.protocol_mismatch = false;
                        self.status.num_connections += 1;
                        self.set_state(LinkState::Ready, &mut trans);
                    }
                    (s, _) => {
                        let reason = match s {
                            None => format!("service {} not found", self.params.service_uuid),
                            Some(_) => format!(
                                "writable characteristic {} not found",
                                self.params.characteristic_uuid
                            ),
                        };
                        error!("Protocol mismatch with {:?}: {}", self.status.peer, reason);
                        self.status.protocol_mismatch = true;
                        self.status.last_error = Some(LinkError::ProtocolMismatch(reason));

                        // The disconnect event restarts discovery
                        self.transport.disconnect();
                    }
                }
            }

            (TransportEvent::Disconnected(peer), LinkState::Connecting)
            | (TransportEvent::Disconnected(peer), LinkState::Ready) => {
                if self.status.peer.as_ref().map_or(false, |p| p != &peer) {
                    debug!("Ignoring disconnect from stale peer {}", peer);
                    return trans;
                }
                warn!("Link to {} lost", peer);
                self.on_link_lost(now, &mut trans);
            }

            (event, state) => trace!("Ignoring {:?} while {:?}", event, state),
        }

        trans
    }

    /// Write a payload to the drive characteristic.
    pub fn write(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if self.state != LinkState::Ready {
            return Err(LinkError::NotReady);
        }

        let characteristic = match self.characteristic {
            Some(ref c) => c,
            None => return Err(LinkError::NotReady),
        };

        match self.transport.write_without_response(characteristic, data) {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = LinkError::WriteFailure(e.to_string());
                self.status.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    // ---- PRIVATE ----

    fn set_state(&mut self, to: LinkState, trans: &mut Vec<Transition>) {
        let from = self.state;
        self.state = to;
        self.status.state = to;

        if from != to {
            info!("Link {:?} -> {:?}", from, to);
        }

        trans.push(Transition { from, to });
    }

    fn begin_scan(&mut self, now: Instant, trans: &mut Vec<Transition>) {
        self.set_state(LinkState::Scanning, trans);
        self.status.num_scans += 1;

        let filter = ScanFilter {
            service_uuid: self.params.service_uuid.clone(),
        };

        match self.transport.start_scan(&filter) {
            Ok(()) => {
                debug!("Scan started, window {} ms", self.params.scan_window_ms);
                self.scan_active = true;
                self.timer
                    .schedule(TimerKind::ScanWindow, now + self.params.scan_window());
            }
            Err(TransportError::NoAdapter) => {
                error!("No radio adapter available, the link will not retry until restarted");
                self.status.last_error = Some(LinkError::NoAdapter);
                self.scan_active = false;
                self.timer.cancel();
                self.set_state(LinkState::Idle, trans);
            }
            Err(e) => {
                warn!("Scan could not be started: {}", e);
                self.status.last_error = Some(LinkError::ScanRejected(e.to_string()));
                self.schedule_retry(now);
            }
        }
    }

    fn schedule_retry(&mut self, now: Instant) {
        self.scan_active = false;
        self.timer
            .schedule(TimerKind::Retry, now + self.params.retry_delay());
    }

    fn on_link_lost(&mut self, now: Instant, trans: &mut Vec<Transition>) {
        self.timer.cancel();
        self.connected = false;
        self.characteristic = None;
        self.status.peer = None;
        self.status.num_disconnections += 1;

        self.set_state(LinkState::Disconnected, trans);
        self.begin_scan(now, trans);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::sim::{SimPeerConfig, SimTransport};
    use crate::link::GattService;
    use std::time::Duration;

    fn link_with(config: SimPeerConfig) -> LinkMgr<SimTransport> {
        LinkMgr::new(LinkParams::default(), SimTransport::new(config))
    }

    fn reachable_link() -> LinkMgr<SimTransport> {
        link_with(SimPeerConfig::drive_peer(&LinkParams::default()))
    }

    fn ms(t: Instant, ms: u64) -> Instant {
        t + Duration::from_millis(ms)
    }

    #[test]
    fn test_start_to_ready() {
        let t0 = Instant::now();
        let mut link = reachable_link();

        assert_eq!(link.state(), LinkState::Idle);

        let trans = link.start(t0);
        assert_eq!(
            trans,
            vec![Transition {
                from: LinkState::Idle,
                to: LinkState::Scanning
            }]
        );

        let trans = link.process(t0);
        assert_eq!(
            trans.iter().map(|t| t.to).collect::<Vec<_>>(),
            vec![LinkState::Connecting, LinkState::Ready]
        );
        assert!(link.is_ready());
        assert_eq!(link.pending_timer(), None);
        assert_eq!(link.status().num_connections, 1);
    }

    #[test]
    fn test_start_is_noop_when_active() {
        let t0 = Instant::now();
        let mut link = reachable_link();

        link.start(t0);
        assert!(link.start(t0).is_empty());

        link.process(t0);
        assert!(link.is_ready());
        assert!(link.start(t0).is_empty());
        assert_eq!(link.status().num_scans, 1);
    }

    #[test]
    fn test_scan_window_then_retry() {
        let t0 = Instant::now();
        let mut config = SimPeerConfig::drive_peer(&LinkParams::default());
        config.reachable = false;
        let mut link = link_with(config);

        link.start(t0);
        assert!(link.process(t0).is_empty());
        assert_eq!(link.pending_timer().map(|t| t.kind), Some(TimerKind::ScanWindow));

        // Window elapses, scan stops and the retry is pending
        assert!(link.process(ms(t0, 10_000)).is_empty());
        assert_eq!(link.state(), LinkState::Scanning);
        assert!(!link.transport().is_scanning());
        assert_eq!(link.pending_timer().map(|t| t.kind), Some(TimerKind::Retry));

        // Retry starts a new scan
        let trans = link.process(ms(t0, 11_000));
        assert_eq!(
            trans,
            vec![Transition {
                from: LinkState::Scanning,
                to: LinkState::Scanning
            }]
        );
        assert!(link.transport().is_scanning());
        assert_eq!(link.status().num_scans, 2);

        // Peer comes into range while scanning
        link.transport_mut().set_reachable(true);
        link.process(ms(t0, 11_100));
        assert!(link.is_ready());
    }

    #[test]
    fn test_rejected_scan_retries() {
        let t0 = Instant::now();
        let mut config = SimPeerConfig::drive_peer(&LinkParams::default());
        config.failing_scans = 1;
        let mut link = link_with(config);

        link.start(t0);
        assert_eq!(link.state(), LinkState::Scanning);
        assert!(matches!(
            link.status().last_error,
            Some(LinkError::ScanRejected(_))
        ));
        assert_eq!(link.pending_timer().map(|t| t.kind), Some(TimerKind::Retry));

        link.process(ms(t0, 999));
        assert!(!link.is_ready());

        link.process(ms(t0, 1_000));
        link.process(ms(t0, 1_001));
        assert!(link.is_ready());
    }

    #[test]
    fn test_no_adapter_halts() {
        let t0 = Instant::now();
        let mut config = SimPeerConfig::drive_peer(&LinkParams::default());
        config.adapter_present = false;
        let mut link = link_with(config);

        link.start(t0);
        assert_eq!(link.state(), LinkState::Idle);
        assert_eq!(link.status().last_error, Some(LinkError::NoAdapter));
        assert_eq!(link.pending_timer(), None);

        // Nothing happens on its own
        assert!(link.process(ms(t0, 60_000)).is_empty());
        assert_eq!(link.state(), LinkState::Idle);

        // Explicit restart once the adapter is back
        link.transport_mut().set_adapter_present(true);
        link.start(ms(t0, 60_000));
        link.process(ms(t0, 60_000));
        assert!(link.is_ready());
    }

    #[test]
    fn test_disconnect_rescans_and_recovers() {
        let t0 = Instant::now();
        let mut link = reachable_link();

        link.start(t0);
        link.process(t0);
        assert!(link.is_ready());

        link.transport_mut().drop_link();
        let trans = link.process(ms(t0, 100));

        assert_eq!(
            trans.iter().map(|t| t.to).collect::<Vec<_>>(),
            vec![
                LinkState::Disconnected,
                LinkState::Scanning,
                LinkState::Connecting,
                LinkState::Ready
            ]
        );
        assert_eq!(link.status().num_disconnections, 1);
        assert_eq!(link.status().num_connections, 2);
    }

    #[test]
    fn test_connect_timeout() {
        let t0 = Instant::now();
        let mut link = reachable_link();

        // Peer advertises but never answers the connection request
        link.transport_mut().set_silent(true);

        link.start(t0);
        link.process(t0);
        assert_eq!(link.state(), LinkState::Connecting);
        assert_eq!(
            link.pending_timer().map(|t| t.kind),
            Some(TimerKind::ConnectTimeout)
        );

        link.transport_mut().set_silent(false);
        let trans = link.process(ms(t0, 5_000));
        assert_eq!(trans[0].to, LinkState::Disconnected);
        assert_eq!(trans[1].to, LinkState::Scanning);
        assert_eq!(link.status().last_error, Some(LinkError::ConnectTimeout));

        link.process(ms(t0, 5_001));
        assert!(link.is_ready());
    }

    #[test]
    fn test_protocol_mismatch_recovers() {
        let t0 = Instant::now();
        let params = LinkParams::default();
        let mut config = SimPeerConfig::drive_peer(&params);
        let good_gatt = config.gatt.clone();
        config.gatt = vec![GattService {
            uuid: params.service_uuid.clone(),
            characteristics: vec![],
        }];
        let mut link = link_with(config);

        link.start(t0);
        link.process(t0);

        assert!(!link.is_ready());
        assert!(link.status().protocol_mismatch);
        assert!(matches!(
            link.status().last_error,
            Some(LinkError::ProtocolMismatch(_))
        ));
        assert!(link.status().num_disconnections >= 1);

        // Firmware fixed, the normal rescan cycle reaches ready
        link.transport_mut().set_gatt(good_gatt);
        link.process(ms(t0, 10));
        link.process(ms(t0, 20));
        assert!(link.is_ready());
        assert!(!link.status().protocol_mismatch);
    }

    #[test]
    fn test_stop_from_any_state() {
        let t0 = Instant::now();
        let mut link = reachable_link();

        link.start(t0);
        link.process(t0);
        assert!(link.is_ready());

        let trans = link.stop();
        assert_eq!(
            trans,
            vec![Transition {
                from: LinkState::Ready,
                to: LinkState::Idle
            }]
        );
        assert_eq!(link.pending_timer(), None);
        assert!(!link.transport().is_connected());
        assert_eq!(link.write(b"0,0,0,0"), Err(LinkError::NotReady));

        // Nothing restarts on its own
        assert!(link.process(ms(t0, 20_000)).is_empty());
        assert_eq!(link.state(), LinkState::Idle);

        // Stopping while waiting to retry also cancels the timer
        let mut config = SimPeerConfig::drive_peer(&LinkParams::default());
        config.reachable = false;
        let mut link = link_with(config);
        link.start(t0);
        link.process(ms(t0, 10_000));
        assert_eq!(link.pending_timer().map(|t| t.kind), Some(TimerKind::Retry));
        link.stop();
        assert_eq!(link.pending_timer(), None);
        assert!(link.process(ms(t0, 11_000)).is_empty());
    }

    #[test]
    fn test_stale_timer_does_not_act() {
        let t0 = Instant::now();
        let mut config = SimPeerConfig::drive_peer(&LinkParams::default());
        config.reachable = false;
        let mut link = link_with(config);

        link.start(t0);
        let window = link.pending_timer().unwrap();

        link.process(ms(t0, 10_000));
        let retry = link.pending_timer().unwrap();
        assert_ne!(window, retry);

        // The replaced scan window timer cannot fire
        assert!(link.fire_timer(window, ms(t0, 10_500)).is_empty());
        assert_eq!(link.pending_timer(), Some(retry));
    }

    #[test]
    fn test_write_failure_keeps_state() {
        let t0 = Instant::now();
        let mut link = reachable_link();

        link.start(t0);
        link.process(t0);

        link.transport_mut().set_fail_writes(true);
        assert!(matches!(
            link.write(b"1.000,1.000,0,0"),
            Err(LinkError::WriteFailure(_))
        ));
        assert_eq!(link.state(), LinkState::Ready);

        link.transport_mut().set_fail_writes(false);
        assert_eq!(link.write(b"1.000,1.000,0,0"), Ok(()));
        assert_eq!(link.transport().writes().len(), 1);
    }
}
