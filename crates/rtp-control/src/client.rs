//! The JSON-over-UDP request/reply client.

use std::net::IpAddr;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use siprec_sip_core::SipDatagram;

use crate::types::{RtpEngine, StartReply, StartRequest, StopRequest};

/// Largest control reply the client will read.
const MAX_REPLY_BYTES: usize = 0xff;

/// Client half of the RTP engine control protocol.
///
/// Stateless apart from configuration; every request runs on a fresh
/// ephemeral socket, so the client can be shared freely between workers
/// and the reaper.
#[derive(Debug, Clone)]
pub struct RtpClient {
    engines: Vec<RtpEngine>,
    /// The daemon's externally reachable address, substituted for
    /// loopback engine hosts when composing SDP.
    advertised_host: String,
    timeout: Duration,
}

impl RtpClient {
    pub fn new(
        engines: Vec<RtpEngine>,
        advertised_host: impl Into<String>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            engines,
            advertised_host: advertised_host.into(),
            timeout: reply_timeout,
        }
    }

    /// Whether any engine is currently selectable.
    pub fn is_available(&self) -> bool {
        self.engines.iter().any(|engine| engine.enabled)
    }

    fn enabled(&self) -> impl Iterator<Item = &RtpEngine> {
        self.engines.iter().filter(|engine| engine.enabled)
    }

    /// Uniform random choice among the enabled engines.
    fn pick_engine(&self) -> Option<&RtpEngine> {
        let enabled: Vec<&RtpEngine> = self.enabled().collect();
        if enabled.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..enabled.len());
        Some(enabled[index])
    }

    /// The address both call parties should send media to. Engines bound
    /// to loopback are advertised under the daemon's external address.
    fn media_host(&self, engine: &RtpEngine) -> String {
        let loopback = engine.host == "localhost"
            || engine
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false);
        if loopback {
            self.advertised_host.clone()
        } else {
            engine.host.clone()
        }
    }

    /// Ask an engine to open a port pair and rewrite the datagram's SDP
    /// around the answer.
    ///
    /// Returns the augmented datagram, or `None` on any failure: no
    /// engine enabled, request timeout, malformed reply, or a reply with
    /// missing or non-positive ports. The caller owns retry policy.
    pub async fn start(&self, context: &str, datagram: &SipDatagram) -> Option<SipDatagram> {
        let engine = match self.pick_engine() {
            Some(engine) => engine,
            None => {
                warn!("<rtp> <<{}>> all engines are currently disabled", context);
                return None;
            }
        };
        let endpoint = (engine.host.as_str(), engine.port);

        let request = StartRequest {
            call_id: datagram.call_id().unwrap_or_default().to_string(),
            session_id: datagram
                .sip
                .get("X-Genesys-GVP-Session-ID")
                .unwrap_or_default()
                .to_string(),
        };
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(err) => {
                error!("<rtp> <<{}>> failed to encode start request: {}", context, err);
                return None;
            }
        };

        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => socket,
            Err(err) => {
                error!("<rtp> <<{}>> failed to allocate control socket: {}", context, err);
                return None;
            }
        };
        if let Err(err) = socket.send_to(&payload, endpoint).await {
            error!(
                "<rtp> <<{}>> failed to reach engine {}:{}: {}",
                context, engine.host, engine.port, err
            );
            return None;
        }
        debug!(
            "<rtp> <<{}>> sent 'start' to engine {}:{}",
            context, engine.host, engine.port
        );

        let mut buffer = [0u8; MAX_REPLY_BYTES];
        let received = match timeout(self.timeout, socket.recv(&mut buffer)).await {
            Ok(Ok(received)) => received,
            Ok(Err(err)) => {
                error!("<rtp> <<{}>> engine receive failed: {}", context, err);
                return None;
            }
            Err(_) => {
                error!(
                    "<rtp> <<{}>> engine {}:{} is DOWN (no reply within {:?})",
                    context, engine.host, engine.port, self.timeout
                );
                return None;
            }
        };

        let reply: StartReply = match serde_json::from_slice(&buffer[..received]) {
            Ok(reply) => reply,
            Err(err) => {
                error!("<rtp> <<{}>> engine reply is not valid JSON: {}", context, err);
                return None;
            }
        };
        let (tx_port, rx_port) = match reply.ports() {
            Some(ports) => ports,
            None => {
                error!(
                    "<rtp> <<{}>> engine reply is missing usable ports: {:?}",
                    context, reply
                );
                return None;
            }
        };
        debug!(
            "<rtp> <<{}>> engine allocated TxPort={} RxPort={}",
            context, tx_port, rx_port
        );

        let mut augmented = datagram.clone();
        let host = self.media_host(engine);
        augmented.sdp.push(format!("o=- 0 0 IN IP4 {}", host));
        augmented.sdp.push("v=0".to_string());
        augmented.sdp.push("s=phone-call".to_string());
        augmented.sdp.push(format!("c=IN IP4 {}", host));
        augmented.sdp.push("t=0 0".to_string());
        for port in [tx_port, rx_port] {
            augmented
                .sdp
                .push(format!("m=audio {} RTP/AVP 0 8 18 96", port));
            augmented.sdp.push("a=rtpmap:0 PCMU/8000".to_string());
            augmented.sdp.push("a=rtpmap:8 PCMA/8000".to_string());
            augmented.sdp.push("a=rtpmap:18 G729/8000".to_string());
            augmented
                .sdp
                .push("a=rtpmap:96 telephone-event/8000".to_string());
            augmented.sdp.push("a=fmtp:96 0-15".to_string());
            augmented.sdp.push("a=recvonly".to_string());
            augmented.sdp.push("a=ptime:20".to_string());
            augmented.sdp.push("a=maxptime:1000".to_string());
        }
        Some(augmented)
    }

    /// Tell every enabled engine to release the ports held for a call.
    ///
    /// Fire-and-forget: replies are not awaited and failures are only
    /// logged. Always succeeds from the caller's perspective.
    pub async fn stop(&self, context: &str, call_id: &str) {
        let request = StopRequest {
            call_id: call_id.to_string(),
        };
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(err) => {
                error!("<rtp> <<{}>> failed to encode stop request: {}", context, err);
                return;
            }
        };
        for engine in self.enabled() {
            let socket = match UdpSocket::bind("0.0.0.0:0").await {
                Ok(socket) => socket,
                Err(err) => {
                    error!("<rtp> <<{}>> failed to allocate control socket: {}", context, err);
                    continue;
                }
            };
            match socket
                .send_to(&payload, (engine.host.as_str(), engine.port))
                .await
            {
                Ok(_) => debug!(
                    "<rtp> <<{}>> sent 'stop' for {} to engine {}:{}",
                    context, call_id, engine.host, engine.port
                ),
                Err(err) => error!(
                    "<rtp> <<{}>> failed to reach engine {}:{}: {}",
                    context, engine.host, engine.port, err
                ),
            }
        }
    }
}
