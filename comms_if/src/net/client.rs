//! # Relay client
//!
//! Blocking HTTP client for the relay server, used by the drive executable's relay worker and by
//! the operator CLI.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use thiserror::Error;

use super::{CONTROL_ROUTE, LOGS_ROUTE};
use crate::relay::{ControlRecord, LogEntry, StatusResponse};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Client for one relay server.
#[derive(Debug, Clone)]
pub struct RelayClient {
    agent: ureq::Agent,
    base_url: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum NetError {
    #[error("Relay replied with status {0}: {1}")]
    Status(u16, String),

    #[error("Could not reach the relay: {0}")]
    Transport(String),

    #[error("Could not decode the reply: {0}")]
    Decode(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RelayClient {
    /// Create a client for the relay at `endpoint`.
    ///
    /// The endpoint is either a `host:port` pair or a full `http://` URL. `timeout` bounds each
    /// whole request, connection included.
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();

        Self {
            agent,
            base_url: base_url(endpoint),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Post a control record.
    pub fn post_control(&self, record: &ControlRecord) -> Result<StatusResponse, NetError> {
        self.agent
            .post(&self.url(CONTROL_ROUTE))
            .send_json(record)
            .map_err(NetError::from)?
            .into_json()
            .map_err(NetError::Decode)
    }

    /// Fetch the most recent entries of the control log, newest first.
    pub fn logs(&self) -> Result<Vec<LogEntry>, NetError> {
        self.agent
            .get(&self.url(LOGS_ROUTE))
            .call()
            .map_err(NetError::from)?
            .into_json()
            .map_err(NetError::Decode)
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

impl From<ureq::Error> for NetError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, res) => {
                // The relay explains rejections in a status body
                let reason = res
                    .into_json::<StatusResponse>()
                    .ok()
                    .and_then(|s| s.error)
                    .unwrap_or_default();
                NetError::Status(code, reason)
            }
            ureq::Error::Transport(t) => NetError::Transport(t.to_string()),
        }
    }
}

fn base_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');

    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
