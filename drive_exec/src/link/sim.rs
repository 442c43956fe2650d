//! # Simulated link
//!
//! A [`LinkTransport`] backed by a simulated drive peer, used by the executable when no radio is
//! available and by the tests. The [`SimPeer`] reproduces the drive firmware: it parses the wheel
//! payloads, keeps the last demand and stops the motors when commands stop arriving.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{info, warn};

use comms_if::eqpt::drive::{DriveDems, PayloadError};

use super::{
    Advertisement, CharHandle, GattCharacteristic, GattService, LinkParams, LinkTransport,
    PeerId, ScanFilter, TransportError, TransportEvent,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// The drive firmware stops the motors if no command arrives within this time.
pub const PEER_WATCHDOG_MS: u64 = 300;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Configuration of the simulated peer as seen by the radio.
#[derive(Debug, Clone)]
pub struct SimPeerConfig {
    pub address: PeerId,
    pub name: String,
    pub advertised_services: Vec<String>,
    pub gatt: Vec<GattService>,
    pub rssi: i16,

    /// The peer is in range.
    pub reachable: bool,

    /// A radio adapter is present on the host.
    pub adapter_present: bool,

    /// Number of scan requests rejected before scans succeed.
    pub failing_scans: u32,
}

/// Simulated radio transport.
#[derive(Debug)]
pub struct SimTransport {
    config: SimPeerConfig,
    events: VecDeque<TransportEvent>,
    scan_filter: Option<ScanFilter>,
    connected: bool,

    /// The peer advertises but ignores connection requests.
    silent: bool,

    fail_writes: bool,
    writes: Vec<Vec<u8>>,
}

/// Simulated drive firmware.
#[derive(Debug)]
pub struct SimPeer {
    dems: DriveDems,
    watchdog: Duration,
    last_rx: Option<Instant>,
    stopped_by_watchdog: bool,
    num_rx: u64,
    num_rejected: u64,
    num_honks: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimPeerConfig {
    /// A reachable peer exposing the drive service and characteristic named in the params.
    pub fn drive_peer(params: &LinkParams) -> Self {
        Self {
            address: "24:0A:C4:00:00:01".into(),
            name: params.device_name.clone(),
            advertised_services: vec![params.service_uuid.clone()],
            gatt: vec![GattService {
                uuid: params.service_uuid.clone(),
                characteristics: vec![GattCharacteristic {
                    uuid: params.characteristic_uuid.clone(),
                    writable: true,
                }],
            }],
            rssi: -60,
            reachable: true,
            adapter_present: true,
            failing_scans: 0,
        }
    }
}

impl SimTransport {
    pub fn new(config: SimPeerConfig) -> Self {
        Self {
            config,
            events: VecDeque::new(),
            scan_filter: None,
            connected: false,
            silent: false,
            fail_writes: false,
            writes: Vec::new(),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_filter.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Payloads written so far.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Take the payloads written since the last call.
    pub fn take_writes(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.writes)
    }

    /// Drop the connection as if the peer went away.
    pub fn drop_link(&mut self) {
        if self.connected {
            self.connected = false;
            self.events
                .push_back(TransportEvent::Disconnected(self.config.address.clone()));
        }
    }

    /// Move the peer in or out of range.
    pub fn set_reachable(&mut self, reachable: bool) {
        self.config.reachable = reachable;

        if reachable {
            self.advertise();
        } else {
            self.drop_link();
        }
    }

    pub fn set_gatt(&mut self, gatt: Vec<GattService>) {
        self.config.gatt = gatt;
    }

    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn set_adapter_present(&mut self, present: bool) {
        self.config.adapter_present = present;
    }

    fn advertise(&mut self) {
        let matches = match self.scan_filter {
            Some(ref f) => self
                .config
                .advertised_services
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&f.service_uuid)),
            None => false,
        };

        if matches && self.config.reachable {
            self.events
                .push_back(TransportEvent::PeerDiscovered(Advertisement {
                    peer: self.config.address.clone(),
                    name: Some(self.config.name.clone()),
                    service_uuids: self.config.advertised_services.clone(),
                    rssi: self.config.rssi,
                }));
        }
    }
}

impl LinkTransport for SimTransport {
    fn start_scan(&mut self, filter: &ScanFilter) -> Result<(), TransportError> {
        if !self.config.adapter_present {
            return Err(TransportError::NoAdapter);
        }

        if self.config.failing_scans > 0 {
            self.config.failing_scans -= 1;
            return Err(TransportError::Rejected("scanner busy".into()));
        }

        self.scan_filter = Some(filter.clone());
        self.advertise();

        Ok(())
    }

    fn stop_scan(&mut self) {
        self.scan_filter = None;
    }

    fn connect(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        if !self.config.adapter_present {
            return Err(TransportError::NoAdapter);
        }

        if peer != &self.config.address {
            return Err(TransportError::Rejected(format!("unknown peer {}", peer)));
        }

        if self.config.reachable && !self.silent {
            self.connected = true;
            self.events.push_back(TransportEvent::Connected(peer.clone()));
        }

        Ok(())
    }

    fn discover_services(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        self.events
            .push_back(TransportEvent::ServicesDiscovered(self.config.gatt.clone()));

        Ok(())
    }

    fn write_without_response(
        &mut self,
        _characteristic: &CharHandle,
        data: &[u8],
    ) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        if self.fail_writes {
            return Err(TransportError::Io("radio busy".into()));
        }

        self.writes.push(data.to_vec());

        Ok(())
    }

    fn disconnect(&mut self) {
        self.drop_link();
    }

    fn release(&mut self) {
        self.scan_filter = None;
        self.connected = false;
        self.events.clear();
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }
}

impl SimPeer {
    pub fn new() -> Self {
        Self::with_watchdog(Duration::from_millis(PEER_WATCHDOG_MS))
    }

    pub fn with_watchdog(watchdog: Duration) -> Self {
        Self {
            dems: DriveDems::stopped(),
            watchdog,
            last_rx: None,
            stopped_by_watchdog: false,
            num_rx: 0,
            num_rejected: 0,
            num_honks: 0,
        }
    }

    /// Handle a payload written to the drive characteristic.
    pub fn receive(&mut self, payload: &[u8], now: Instant) -> Result<DriveDems, PayloadError> {
        let dems = match DriveDems::from_payload(payload) {
            Ok(d) => d,
            Err(e) => {
                warn!("SimPeer rejected payload {:?}: {}", String::from_utf8_lossy(payload), e);
                self.num_rejected += 1;
                return Err(e);
            }
        };

        if dems.signal == 1 {
            info!("SimPeer: honk!");
            self.num_honks += 1;
        }

        self.dems = dems;
        self.last_rx = Some(now);
        self.stopped_by_watchdog = false;
        self.num_rx += 1;

        Ok(dems)
    }

    /// Run the command watchdog. Returns `true` on the tick the motors are stopped.
    pub fn tick(&mut self, now: Instant) -> bool {
        let last_rx = match self.last_rx {
            Some(t) => t,
            None => return false,
        };

        if !self.stopped_by_watchdog && now.saturating_duration_since(last_rx) >= self.watchdog {
            info!(
                "SimPeer: no commands for {} ms, stopping motors",
                now.saturating_duration_since(last_rx).as_millis()
            );
            self.dems = DriveDems::stopped();
            self.stopped_by_watchdog = true;
            return true;
        }

        false
    }

    pub fn dems(&self) -> DriveDems {
        self.dems
    }

    pub fn is_moving(&self) -> bool {
        self.dems.left != 0.0 || self.dems.right != 0.0
    }

    pub fn is_stopped_by_watchdog(&self) -> bool {
        self.stopped_by_watchdog
    }

    pub fn num_rx(&self) -> u64 {
        self.num_rx
    }

    pub fn num_rejected(&self) -> u64 {
        self.num_rejected
    }

    pub fn num_honks(&self) -> u64 {
        self.num_honks
    }
}

impl Default for SimPeer {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
