//! Static response templates.
//!
//! Each template is a plain data record: a status line, the header names
//! to emit (in order) when the datagram carries them, and whether the
//! response body is the datagram's SDP block. The serializer does the
//! filtering; templates never change at runtime.

/// A response template consumed by [`crate::serializer::serialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseTemplate {
    /// Emitted verbatim as the status-line.
    pub status_line: &'static str,
    /// Header names to copy from the datagram, in emission order.
    pub sip: &'static [&'static str],
    /// Emit `Content-Type: application/sdp` and the datagram's SDP lines.
    pub sdp: bool,
}

/// 100 Trying.
///
/// Some unspecified action is being taken on behalf of this call, but the
/// user has not yet been located (RFC 3261 section 21.1.1).
pub static SIP_TRYING: ResponseTemplate = ResponseTemplate {
    status_line: "SIP/2.0 100 Trying",
    sip: &["CSeq", "From", "To", "Via", "Call-ID", "Allow", "Contact"],
    sdp: false,
};

/// 180 Ringing.
///
/// The UA receiving the INVITE is trying to alert the user (RFC 3261
/// section 21.1.2).
pub static SIP_RINGING: ResponseTemplate = ResponseTemplate {
    status_line: "SIP/2.0 180 Ringing",
    sip: &["From", "To", "Via", "Call-ID", "Contact", "CSeq", "Allow"],
    sdp: false,
};

/// 200 OK carrying the rewritten SDP answer.
pub static SIP_OK: ResponseTemplate = ResponseTemplate {
    status_line: "SIP/2.0 200 OK",
    sip: &[
        "Via",
        "From",
        "To",
        "CSeq",
        "Max-Forwards",
        "Call-ID",
        "Contact",
        "Supported",
        "Require",
        "Session-Expires",
        "Server",
        "Allow",
        "Min-SE",
    ],
    sdp: true,
};

/// 200 OK without a body. The default answer for anything the daemon has
/// no better reply to.
pub static SIP_OK_NO_SDP: ResponseTemplate = ResponseTemplate {
    status_line: "SIP/2.0 200 OK",
    sip: &[
        "Via",
        "From",
        "To",
        "CSeq",
        "Max-Forwards",
        "Call-ID",
        "Contact",
        "Supported",
        "Require",
        "Session-Expires",
        "Server",
        "Allow",
        "Min-SE",
    ],
    sdp: false,
};

/// 200 OK answering an OPTIONS capability query.
pub static SIP_OPTIONS: ResponseTemplate = ResponseTemplate {
    status_line: "SIP/2.0 200 OK",
    sip: &[
        "Via",
        "From",
        "To",
        "CSeq",
        "Call-ID",
        "Contact",
        "Allow",
        "Supported",
        "Server",
    ],
    sdp: false,
};

/// 486 Busy Here (RFC 3261 section 21.4.24).
pub static SIP_BUSY: ResponseTemplate = ResponseTemplate {
    status_line: "SIP/2.0 486 Busy Here",
    sip: &["Contact"],
    sdp: false,
};

/// 487 Request Terminated.
///
/// The request was terminated by a BYE or CANCEL request (RFC 3261
/// section 21.4.25).
pub static SIP_TERMINATE: ResponseTemplate = ResponseTemplate {
    status_line: "SIP/2.0 487 Request Terminated",
    sip: &["From", "To", "Via", "Call-ID", "Contact"],
    sdp: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ok_carries_sdp() {
        let all = [
            &SIP_TRYING,
            &SIP_RINGING,
            &SIP_OK,
            &SIP_OK_NO_SDP,
            &SIP_OPTIONS,
            &SIP_BUSY,
            &SIP_TERMINATE,
        ];
        let with_sdp: Vec<_> = all.iter().filter(|t| t.sdp).collect();
        assert_eq!(with_sdp.len(), 1);
        assert_eq!(with_sdp[0].status_line, "SIP/2.0 200 OK");
    }

    #[test]
    fn every_template_lists_at_least_one_header() {
        for template in [
            &SIP_TRYING,
            &SIP_RINGING,
            &SIP_OK,
            &SIP_OK_NO_SDP,
            &SIP_OPTIONS,
            &SIP_BUSY,
            &SIP_TERMINATE,
        ] {
            assert!(!template.sip.is_empty(), "{}", template.status_line);
        }
    }
}
