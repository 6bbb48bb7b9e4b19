//! # siprec-sip-core
//!
//! SIP message codec for the siprec media-anchoring stack.
//!
//! This crate owns the wire-facing half of the daemon: a permissive,
//! line-oriented parser that turns UDP datagrams into [`SipDatagram`]
//! records, a template-driven serializer that renders responses from
//! static [`ResponseTemplate`] tables, and the SIP method set the daemon
//! recognises.
//!
//! The parser is deliberately forgiving. Anything that carries the `SIP`
//! signature on its first line and at least one recognisable method token
//! parses; unknown headers are preserved verbatim, duplicated headers are
//! joined in arrival order, and SDP lines ride along untouched. Messages
//! that fail these checks are dropped by the caller, never answered.

pub mod cache;
pub mod datagram;
pub mod error;
pub mod methods;
pub mod parser;
pub mod samples;
pub mod serializer;
pub mod templates;

pub use cache::ParseCache;
pub use datagram::{HeaderMap, SipDatagram};
pub use error::{Error, Result};
pub use methods::Method;
pub use parser::{is_sip, parse};
pub use serializer::serialize;
pub use templates::ResponseTemplate;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::cache::ParseCache;
    pub use crate::datagram::{HeaderMap, SipDatagram};
    pub use crate::error::{Error, Result};
    pub use crate::methods::Method;
    pub use crate::parser::{is_sip, parse};
    pub use crate::serializer::serialize;
    pub use crate::templates::{
        ResponseTemplate, SIP_BUSY, SIP_OK, SIP_OK_NO_SDP, SIP_OPTIONS, SIP_RINGING,
        SIP_TERMINATE, SIP_TRYING,
    };
}
