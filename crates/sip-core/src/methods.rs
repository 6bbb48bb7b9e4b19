//! The SIP method set recognised by the daemon.
//!
//! The set is intentionally wider than the handlers the daemon implements:
//! any of these tokens is enough for a start-line to parse, and unhandled
//! methods fall through to the default `200 OK` reply. `OK` appears in the
//! set so that status-lines (`SIP/2.0 200 OK`) parse the same way
//! request-lines do.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A SIP method token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Ack,
    Bye,
    Cancel,
    Info,
    Invite,
    Message,
    Notify,
    Ok,
    Options,
    Prack,
    Publish,
    Refer,
    Register,
    Subscribe,
    Update,
}

impl Method {
    /// Every method token the parser accepts, in fixed iteration order.
    pub const ALL: [Method; 15] = [
        Method::Ack,
        Method::Bye,
        Method::Cancel,
        Method::Info,
        Method::Invite,
        Method::Message,
        Method::Notify,
        Method::Ok,
        Method::Options,
        Method::Prack,
        Method::Publish,
        Method::Refer,
        Method::Register,
        Method::Subscribe,
        Method::Update,
    ];

    /// The canonical wire form of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Info => "INFO",
            Method::Invite => "INVITE",
            Method::Message => "MESSAGE",
            Method::Notify => "NOTIFY",
            Method::Ok => "OK",
            Method::Options => "OPTIONS",
            Method::Prack => "PRACK",
            Method::Publish => "PUBLISH",
            Method::Refer => "REFER",
            Method::Register => "REGISTER",
            Method::Subscribe => "SUBSCRIBE",
            Method::Update => "UPDATE",
        }
    }

    /// Match a single token against the method set. Exact match only;
    /// methods are case-sensitive on the wire.
    pub fn from_token(token: &str) -> Option<Method> {
        Method::ALL.iter().copied().find(|m| m.as_str() == token)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::from_token(s).ok_or_else(|| Error::MalformedRequest(s.to_string()))
    }
}
