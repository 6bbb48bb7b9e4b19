//! Template-driven response serializer.

use std::fmt::Write;

use crate::datagram::SipDatagram;
use crate::error::{Error, Result};
use crate::templates::ResponseTemplate;

const CRLF: &str = "\r\n";

/// Render a wire-ready response from a template and a datagram.
///
/// Headers listed by the template are emitted in template order, but only
/// when the datagram carries a non-empty value for them. When the
/// template asks for SDP, the datagram's SDP lines become the body and
/// `Content-Length` is computed over them; otherwise `Content-Length: 0`
/// is emitted. The result always ends with CRLF.
pub fn serialize(template: &ResponseTemplate, datagram: &SipDatagram) -> Result<String> {
    let mut packet = String::with_capacity(512);
    render(&mut packet, template, datagram)
        .map_err(|err| Error::SerializationError(err.to_string()))?;
    if !packet.ends_with(CRLF) {
        packet.push_str(CRLF);
    }
    Ok(packet)
}

fn render(
    packet: &mut String,
    template: &ResponseTemplate,
    datagram: &SipDatagram,
) -> std::fmt::Result {
    write!(packet, "{}{}", template.status_line, CRLF)?;

    for name in template.sip {
        match datagram.sip.get(name) {
            Some(value) if !value.is_empty() => write!(packet, "{}: {}{}", name, value, CRLF)?,
            _ => {}
        }
    }

    if template.sdp {
        let body = datagram.sdp.join(CRLF);
        write!(packet, "Content-Type: application/sdp{}", CRLF)?;
        write!(packet, "Content-Length: {}{}", body.len(), CRLF)?;
        write!(packet, "{}{}", CRLF, body)?;
    } else {
        write!(packet, "Content-Length: 0{}", CRLF)?;
        packet.push_str(CRLF);
    }
    Ok(())
}
