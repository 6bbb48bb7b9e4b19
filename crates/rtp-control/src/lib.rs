//! # siprec-rtp-control
//!
//! Control-plane client for external RTP recording engines.
//!
//! The daemon never touches media itself; it asks an engine to open a
//! receive/transmit port pair (`start`) and to release them again
//! (`stop`). The wire protocol is small JSON records over UDP: a start
//! request carrying the call identity, a reply carrying `TxPort` and
//! `RxPort`, and a fire-and-forget stop request.
//!
//! On a successful `start` the client rewrites the SIP datagram's SDP so
//! that both call parties aim their media at the engine.

pub mod client;
pub mod types;

pub use client::RtpClient;
pub use types::{RtpEngine, StartReply, StartRequest, StopRequest};
