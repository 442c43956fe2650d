//! Transport abstraction
//!
//! The link talks to the radio through [`LinkTransport`], which mirrors the operations and
//! callbacks of a BLE GATT central. Callbacks are not invoked directly, instead the transport
//! queues them as [`TransportEvent`]s which the link drains with [`LinkTransport::poll_event`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Address of a peer device.
pub type PeerId = String;

/// Restricts a scan to peers advertising a service.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFilter {
    pub service_uuid: String,
}

/// A scan result.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub peer: PeerId,
    pub name: Option<String>,
    pub service_uuids: Vec<String>,
    pub rssi: i16,
}

/// A service in a peer's GATT table.
#[derive(Debug, Clone, PartialEq)]
pub struct GattService {
    pub uuid: String,
    pub characteristics: Vec<GattCharacteristic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GattCharacteristic {
    pub uuid: String,

    /// The characteristic accepts write-without-response.
    pub writable: bool,
}

/// A resolved characteristic handle.
#[derive(Debug, Clone, PartialEq)]
pub struct CharHandle {
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

/// Queued transport callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    PeerDiscovered(Advertisement),
    ScanFailed(String),
    Connected(PeerId),
    ConnectFailed(PeerId, String),
    ServicesDiscovered(Vec<GattService>),
    Disconnected(PeerId),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("No adapter present")]
    NoAdapter,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(String),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A radio transport able to reach the drive peer.
pub trait LinkTransport {
    /// Begin scanning for peers matching the filter.
    fn start_scan(&mut self, filter: &ScanFilter) -> Result<(), TransportError>;

    fn stop_scan(&mut self);

    /// Request a connection. Completion is reported by a `Connected` or `ConnectFailed` event.
    fn connect(&mut self, peer: &PeerId) -> Result<(), TransportError>;

    /// Request service discovery. Completion is reported by a `ServicesDiscovered` event.
    fn discover_services(&mut self) -> Result<(), TransportError>;

    /// Write to a characteristic without waiting for an acknowledgement.
    fn write_without_response(
        &mut self,
        characteristic: &CharHandle,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Request a disconnect. Completion is reported by a `Disconnected` event.
    fn disconnect(&mut self);

    /// Release the connection handle, dropping any pending callbacks.
    fn release(&mut self);

    fn poll_event(&mut self) -> Option<TransportEvent>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Advertisement {
    pub fn advertises(&self, service_uuid: &str) -> bool {
        self.service_uuids
            .iter()
            .any(|s| s.eq_ignore_ascii_case(service_uuid))
    }
}

impl GattService {
    /// Find a writable characteristic within this service.
    pub fn writable_characteristic(&self, uuid: &str) -> Option<&GattCharacteristic> {
        self.characteristics
            .iter()
            .find(|c| c.writable && c.uuid.eq_ignore_ascii_case(uuid))
    }
}
