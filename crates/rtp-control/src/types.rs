//! Engine descriptors and the JSON wire records.

use serde::{Deserialize, Serialize};

/// One external RTP engine, as listed in `rtp.handlers`.
///
/// The set of engines is fixed at startup; `enabled` gates selection
/// without re-ordering the list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RtpEngine {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Request an engine to open a new RX/TX port pair.
#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    #[serde(rename = "Call-ID")]
    pub call_id: String,
    /// Session correlation id, copied from the INVITE when present and
    /// sent as an empty string otherwise.
    #[serde(rename = "X-Genesys-GVP-Session-ID")]
    pub session_id: String,
}

/// The engine's answer to a start request.
///
/// Ports arrive as plain JSON numbers; both must be strictly positive
/// u16 values for the reply to count as success.
#[derive(Debug, Clone, Deserialize)]
pub struct StartReply {
    #[serde(rename = "TxPort")]
    pub tx_port: Option<i64>,
    #[serde(rename = "RxPort")]
    pub rx_port: Option<i64>,
}

impl StartReply {
    /// Validate the reply into a `(tx, rx)` pair.
    pub fn ports(&self) -> Option<(u16, u16)> {
        Some((to_port(self.tx_port?)?, to_port(self.rx_port?)?))
    }
}

fn to_port(raw: i64) -> Option<u16> {
    if raw > 0 {
        u16::try_from(raw).ok()
    } else {
        None
    }
}

/// Ask an engine to release the ports held for a call.
#[derive(Debug, Clone, Serialize)]
pub struct StopRequest {
    #[serde(rename = "Call-ID")]
    pub call_id: String,
}

/// Optional acknowledgement to a stop request; logged, never acted on.
#[derive(Debug, Clone, Deserialize)]
pub struct StopReply {
    #[serde(rename = "ResultCode")]
    pub result_code: Option<i64>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
}
