//! # Relay Server Module
//!
//! This module abstracts over the networking side of the relay executable. The server accepts
//! requests from operator clients, records posted controls in the [`ControlLog`] and serves the log
//! back.
//!
//! Routes:
//! - `POST /control`: body `{"x": f, "y": f, "honk": 0|1}`, replies `{"status": "ok"}`
//! - `GET /logs`: the most recent controls, newest first

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::Read;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use tiny_http::{Header, Method, Server};

use comms_if::{
    net::{CONTROL_ROUTE, LOGS_ROUTE},
    relay::{ControlRecord, StatusResponse},
};

use crate::{control_log::ControlLog, params::RelayExecParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the networking part of the relay executable.
pub struct RelayServer {
    server: Server,
    log: ControlLog,
    params: RelayExecParams,
}

/// Status and JSON body sent back to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`RelayServer`]
#[derive(thiserror::Error, Debug)]
pub enum RelayServerError {
    #[error("Could not bind to {0}: {1}")]
    BindError(String, String),

    #[error("Could not receive a request: {0}")]
    RecvError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RelayServer {
    /// Bind the server to the address given in the parameters.
    pub fn new(params: &RelayExecParams, log: ControlLog) -> Result<Self, RelayServerError> {
        let server = Server::http(&params.bind_addr)
            .map_err(|e| RelayServerError::BindError(params.bind_addr.clone(), e.to_string()))?;

        Ok(Self {
            server,
            log,
            params: params.clone(),
        })
    }

    /// The address actually bound, useful when binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn log(&self) -> &ControlLog {
        &self.log
    }

    /// Wait for one request and serve it.
    ///
    /// Errors from a misbehaving client are logged and do not stop the server, only a failure of
    /// the listener itself is returned.
    pub fn serve_one(&mut self) -> Result<(), RelayServerError> {
        let mut req = self.server.recv().map_err(RelayServerError::RecvError)?;

        debug!("{} {} from {:?}", req.method(), req.url(), req.remote_addr());

        let reply = match read_body(&mut req, self.params.max_body) {
            Ok(body) => {
                let method = req.method().clone();
                let url = req.url().to_string();
                self.handle(&method, &url, &body, Utc::now())
            }
            Err(reply) => reply,
        };

        let mut res = tiny_http::Response::from_string(reply.body).with_status_code(reply.status);
        if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            res = res.with_header(h);
        }

        if let Err(e) = req.respond(res) {
            warn!("Could not reply to the client: {}", e);
        }

        Ok(())
    }

    /// Route a request to its handler.
    pub fn handle(&mut self, method: &Method, url: &str, body: &[u8], now: DateTime<Utc>) -> Reply {
        // Query strings are ignored
        let path = url.split('?').next().unwrap_or(url);

        match (method, path) {
            (Method::Post, CONTROL_ROUTE) => self.handle_control(body, now),
            (Method::Get, LOGS_ROUTE) => Reply::json(200, &self.log.newest(self.params.logs_limit)),
            (m, p) => {
                debug!("No route for {} {}", m, p);
                Reply::json(404, &StatusResponse::error(format!("no route for {}", p)))
            }
        }
    }

    // ---- PRIVATE ----

    fn handle_control(&mut self, body: &[u8], now: DateTime<Utc>) -> Reply {
        let record: ControlRecord = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                warn!("Invalid control body: {}", e);
                return Reply::json(400, &StatusResponse::error("invalid JSON"));
            }
        };

        if let Err(e) = record.validate() {
            warn!("Rejected control {:?}: {}", record, e);
            return Reply::json(422, &StatusResponse::error(e.to_string()));
        }

        if record.honk == 1 {
            info!("Honk!");
        }

        debug!("Control x = {:.2}, y = {:.2}", record.x, record.y);

        match self.log.push(&record, now) {
            Ok(()) => Reply::json(200, &StatusResponse::ok()),
            Err(e) => {
                error!("{}", e);
                Reply::json(500, &StatusResponse::error("could not store the control"))
            }
        }
    }
}

impl Reply {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => Self { status, body },
            Err(e) => {
                warn!("Could not serialise the response: {}", e);
                Self {
                    status: 500,
                    body: String::from("{}"),
                }
            }
        }
    }

    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Read the request body, rejecting it if larger than `max_body`.
fn read_body(req: &mut tiny_http::Request, max_body: usize) -> Result<Vec<u8>, Reply> {
    let too_large = |len: usize| {
        Reply::json(
            413,
            &StatusResponse::error(format!("body of {} bytes exceeds {}", len, max_body)),
        )
    };

    if let Some(len) = req.body_length() {
        if len > max_body {
            return Err(too_large(len));
        }
    }

    // Chunked bodies have no declared length, read one byte past the limit to detect them
    let mut body = Vec::new();
    req.as_reader()
        .take(max_body as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| {
            warn!("Could not read the request body: {}", e);
            Reply::json(400, &StatusResponse::error(e.to_string()))
        })?;

    if body.len() > max_body {
        return Err(too_large(body.len()));
    }

    Ok(body)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
