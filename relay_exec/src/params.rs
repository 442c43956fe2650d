//! # Relay Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest body accepted by default.
pub const DEFAULT_MAX_BODY: usize = 64 * 1024;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RelayExecParams {

    /// Address the HTTP server binds to, e.g. `0.0.0.0:5000`
    pub bind_addr: String,

    /// Maximum number of entries returned by `GET /logs`
    pub logs_limit: usize,

    /// Maximum number of entries kept in memory
    pub max_entries: usize,

    /// Largest request body accepted, in bytes
    pub max_body: usize,

    /// Control store file, relative to the software root. Controls are only kept in memory when
    /// unset.
    #[serde(default)]
    pub store_path: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for RelayExecParams {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".into(),
            logs_limit: 50,
            max_entries: 1000,
            max_body: DEFAULT_MAX_BODY,
            store_path: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
