//! Permissive line-oriented SIP parser.
//!
//! The design goal is to never reject a message the daemon could still
//! anchor media for: any line that does not look like a header or an SDP
//! line is skipped, unknown headers are preserved verbatim, and the only
//! hard failure is a start-line with no recognisable method token.

use tracing::trace;

use crate::datagram::{SipDatagram, METHOD_HEADER};
use crate::error::{Error, Result};
use crate::methods::Method;

/// Signature check: the literal substring `SIP` must appear somewhere in
/// the first line. This admits request-lines (`INVITE ... SIP/2.0`) and
/// status-lines (`SIP/2.0 200 OK`) alike.
pub fn is_sip(message: &str) -> bool {
    message
        .split('\n')
        .next()
        .map(|line| line.contains("SIP"))
        .unwrap_or(false)
}

/// Matches `^[a-z]=.+$`: a single lowercase key, `=`, and a non-empty
/// remainder.
fn is_sdp_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_lowercase() && bytes[1] == b'='
}

/// Pick the method token out of a start-line.
///
/// Tokens are scanned left to right and the first one found in the method
/// set wins, so a pathological line carrying two tokens resolves
/// deterministically.
fn extract_method(start_line: &str) -> Option<Method> {
    start_line.split_whitespace().find_map(Method::from_token)
}

/// Deconstruct a SIP message into a [`SipDatagram`].
///
/// Normalises line endings, pulls the method from the start-line, then
/// files every remaining line as either an SDP line or a header. Repeated
/// headers (`Via`, `Record-Route`, ...) collapse into one comma-joined
/// value in arrival order.
pub fn parse(message: &str) -> Result<SipDatagram> {
    let normalized = message.replace("\r\n", "\n");
    let mut lines = normalized.split('\n').filter(|line| !line.is_empty());

    let start_line = lines
        .next()
        .ok_or_else(|| Error::MalformedRequest("empty message".to_string()))?;
    let method = extract_method(start_line)
        .ok_or_else(|| Error::MalformedRequest(start_line.to_string()))?;

    let mut datagram = SipDatagram::new();
    datagram.sip.insert(METHOD_HEADER, method.as_str());

    for line in lines {
        if is_sdp_line(line) {
            datagram.sdp.push(line.to_string());
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) => datagram.sip.append(name, value.trim()),
            // neither header nor SDP; skip rather than fail the datagram.
            None => trace!("discarding unparseable line: {:?}", line),
        }
    }

    Ok(datagram)
}
