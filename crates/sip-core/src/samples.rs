//! Captured SIP messages used as test fixtures across the workspace.

/// An OPTIONS keep-alive as sent by a Genesys GVP media server.
pub const SIP_OPTIONS_SAMPLE: &str = "OPTIONS sip:192.168.1.6:5060 SIP/2.0\r\n\
Via: SIP/2.0/UDP 192.168.1.3:15064;branch=z9hG4bK0x2473c35084b6b1\r\n\
From: <sip:GVP@192.168.1.3:15064>;tag=9E565000-FB73-C996-4E01-0810C8DE0CF4\r\n\
To: sip:192.168.1.6:5060\r\n\
Max-Forwards: 70\r\n\
CSeq: 307103 OPTIONS\r\n\
Call-ID: 9E565000-FB73-F13E-6076-D8822FB9A4E4-15064@192.168.1.3\r\n\
Contact: <sip:GVP@192.168.1.3:15064>\r\n\
Content-Length: 0\r\n\
Allow: INVITE, OPTIONS, BYE, CANCEL, ACK, UPDATE, INFO\r\n\
Supported: timer, uui\r\n";

/// A minimal recording INVITE with no body.
pub const SIP_INVITE_SAMPLE: &str = "INVITE sip:record@192.168.1.6:5060 SIP/2.0\r\n\
Via: SIP/2.0/UDP 192.168.1.4:15060;branch=z9hG4bK0x25b1a5408dd30f\r\n\
From: <sip:Genesys@192.168.1.4:7090>;tag=9E565000-C50B-45BE-9F69-DCFCE02B493D\r\n\
To: <sip:record@192.168.1.6:5060>\r\n\
CSeq: 1 INVITE\r\n\
Max-Forwards: 70\r\n\
Call-ID: abc@host\r\n\
Contact: <sip:Genesys@192.168.1.4:7090>\r\n\
Content-Length: 0\r\n";
