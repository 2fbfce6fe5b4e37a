//! Shared IPC protocol types for pifan
//!
//! Line-delimited JSON request/response envelopes exchanged over the
//! daemon's Unix domain socket. The web frontend and CLI are clients of
//! this protocol; the daemon is the only server.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum message size for IPC (4KB)
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024;

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    /// Full status snapshot: metrics plus fan fields, read atomically.
    Status,
    /// Set the manual fan preference. A missing or non-boolean
    /// `manual_state` fails deserialization and is rejected before any
    /// state is touched.
    SetFan { manual_state: bool },
}

impl Request {
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::Status => "Status",
            Request::SetFan { .. } => "SetFan",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response data - at most one field is populated per response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<StatusPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan: Option<FanAck>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: String) -> Self { Self { value: Some(v), ..Self::default() } }
    pub fn status(s: StatusPayload) -> Self { Self { system: Some(s), ..Self::default() } }
    pub fn fan_ack(ok: bool) -> Self { Self { fan: Some(FanAck { ok }), ..Self::default() } }
}

/// Full shared-state snapshot on the wire.
///
/// `cpu_temp` serializes as `null` when the sensor is unreadable; every
/// other field is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub cpu_percent: f64,
    pub cpu_temp: Option<f64>,
    pub ram_used_mb: u64,
    pub ram_total_mb: u64,
    pub ram_percent: f64,
    pub disk_used_gb: u64,
    pub disk_total_gb: u64,
    pub disk_percent: f64,
    pub fan_actual_on: bool,
    pub fan_manual_state: bool,
    pub fan_forced_auto: bool,
}

/// Acknowledgement for a SetFan request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanAck {
    pub ok: bool,
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn ok_status(s: StatusPayload) -> Self {
        Response::Ok(ResponseData::status(s))
    }

    pub fn ok_fan_ack(ok: bool) -> Self {
        Response::Ok(ResponseData::fan_ack(ok))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { message: msg.into() }
    }
}
