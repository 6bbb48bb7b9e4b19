//! SIP worker pool: the per-datagram handler pipeline and the method
//! state machine.
//!
//! Workers pull `(endpoint, payload)` items off the shared queue, run
//! the decode pipeline (signature check, parse, identity overlay), and
//! dispatch to a method handler. Anything that fails before dispatch is
//! dropped with a log line and never answered. Replies leave through a
//! per-worker ephemeral socket; a failed send discards the socket and
//! retries once on a fresh one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use siprec_infra_common::context::random_tag;
use siprec_infra_common::net::allocate_ephemeral_socket;
use siprec_rtp_control::RtpClient;
use siprec_sip_core::templates::{
    ResponseTemplate, SIP_OK, SIP_OK_NO_SDP, SIP_OPTIONS, SIP_RINGING, SIP_TERMINATE, SIP_TRYING,
};
use siprec_sip_core::{is_sip, serialize, Method, ParseCache, SipDatagram};

use crate::config::Config;
use crate::error::{DaemonError, Result};
use crate::registry::RegistryHandle;

/// One unit of work from the router: where the datagram came from and
/// its raw bytes.
#[derive(Debug)]
pub struct WorkItem {
    pub endpoint: SocketAddr,
    pub payload: Vec<u8>,
}

/// The queue end shared by the worker pool.
pub type SharedWorkQueue = Arc<Mutex<mpsc::Receiver<WorkItem>>>;

pub struct SipWorker {
    name: String,
    /// Static identity headers overlaid onto every response.
    defaults: IndexMap<String, String>,
    contact: String,
    call_lifetime: Duration,
    max_retry: u32,
    socket: UdpSocket,
    rtp: Arc<RtpClient>,
    registry: RegistryHandle,
    cache: ParseCache,
}

impl SipWorker {
    pub fn new(
        index: usize,
        config: &Config,
        rtp: Arc<RtpClient>,
        registry: RegistryHandle,
    ) -> Result<Self> {
        let socket = reply_socket()
            .map_err(|err| DaemonError::WorkerPool(format!("worker-{}: {}", index, err)))?;
        Ok(Self {
            name: format!("worker-{}", index),
            defaults: config.sip.defaults.clone(),
            contact: format!(
                "<sip:{}:{};transport=udp>",
                config.advertised_host(),
                config.advertised_port()
            ),
            call_lifetime: config.call_lifetime(),
            max_retry: config.max_retry(),
            socket,
            rtp,
            registry,
            cache: ParseCache::default(),
        })
    }

    /// Pull work until the router closes the queue.
    pub async fn run(mut self, queue: SharedWorkQueue) {
        debug!("'{}' initialized", self.name);
        loop {
            let item = {
                let mut receiver = queue.lock().await;
                receiver.recv().await
            };
            match item {
                Some(item) => self.handle(item).await,
                None => break,
            }
        }
        debug!("'{}' terminated", self.name);
    }

    /// The per-datagram pipeline.
    async fn handle(&mut self, item: WorkItem) {
        let tag = random_tag();

        let message = match std::str::from_utf8(&item.payload) {
            Ok(message) => message,
            Err(_) => {
                warn!("'{}' <<{}>> dropping non-utf8 datagram from {}", self.name, tag, item.endpoint);
                return;
            }
        };
        if !is_sip(message) {
            warn!("'{}' <<{}>> dropping message without SIP signature", self.name, tag);
            return;
        }
        let mut datagram = match self.cache.parse(message) {
            Ok(datagram) => datagram,
            Err(err) => {
                error!("'{}' <<{}>> parse failed: {}", self.name, tag, err);
                return;
            }
        };

        let call_id = match datagram.call_id() {
            Some(call_id) => call_id.to_string(),
            None => {
                warn!("'{}' <<{}>> dropping message without Call-ID", self.name, tag);
                return;
            }
        };
        let method = match datagram.method() {
            Some(method) => method,
            None => {
                warn!("'{}' <<{}>> dropping message without method", self.name, tag);
                return;
            }
        };

        // overlay the configured identity headers, then the computed
        // Contact, replacing whatever the peer sent.
        for (name, value) in &self.defaults {
            datagram.sip.insert(name.clone(), value.clone());
        }
        datagram.sip.insert("Contact", self.contact.clone());

        debug!("-->> '{}' <<{}>> <{}>", self.name, tag, method);
        match method {
            Method::Invite => self.handle_invite(&tag, item.endpoint, datagram, &call_id).await,
            Method::Ack => {}
            Method::Bye => self.handle_bye(&tag, item.endpoint, &datagram, &call_id).await,
            Method::Cancel => self.handle_cancel(&tag, item.endpoint, &datagram, &call_id).await,
            Method::Options => self.respond(&tag, item.endpoint, &SIP_OPTIONS, &datagram).await,
            _ => self.respond(&tag, item.endpoint, &SIP_OK_NO_SDP, &datagram).await,
        }
    }

    /// INVITE: anchor the call's media on an RTP engine.
    async fn handle_invite(
        &mut self,
        tag: &str,
        endpoint: SocketAddr,
        mut datagram: SipDatagram,
        call_id: &str,
    ) {
        // retransmission (or HOLD) of a live call; answer without
        // touching the engine again.
        if self.registry.contains(call_id) {
            warn!("'{}' <<{}>> duplicate Call-ID '{}'", self.name, tag, call_id);
            self.respond(tag, endpoint, &SIP_OK_NO_SDP, &datagram).await;
            return;
        }
        if !self.rtp.is_available() {
            error!("'{}' <<{}>> no rtp engine is enabled", self.name, tag);
            self.respond(tag, endpoint, &SIP_OK_NO_SDP, &datagram).await;
            return;
        }

        self.respond(tag, endpoint, &SIP_TRYING, &datagram).await;

        let mut chances = self.max_retry;
        let mut anchored = None;
        while chances > 0 {
            self.respond(tag, endpoint, &SIP_RINGING, &datagram).await;
            chances -= 1;
            if let Some(augmented) = self.rtp.start(tag, &datagram).await {
                anchored = Some(augmented);
                break;
            }
        }

        match anchored {
            Some(augmented) => {
                datagram = augmented;
                self.respond(tag, endpoint, &SIP_OK, &datagram).await;
                self.registry
                    .register(call_id, tag, Instant::now() + self.call_lifetime);
            }
            // the caller must not be left ringing; answer plainly and
            // keep the call unanchored.
            None => self.respond(tag, endpoint, &SIP_OK_NO_SDP, &datagram).await,
        }
    }

    /// BYE: acknowledge, then hand teardown to the registry.
    async fn handle_bye(
        &mut self,
        tag: &str,
        endpoint: SocketAddr,
        datagram: &SipDatagram,
        call_id: &str,
    ) {
        self.respond(tag, endpoint, &SIP_OK_NO_SDP, datagram).await;
        self.registry.revoke(call_id);
        self.respond(tag, endpoint, &SIP_TERMINATE, datagram).await;
    }

    /// CANCEL: acknowledge and release engine ports directly.
    async fn handle_cancel(
        &mut self,
        tag: &str,
        endpoint: SocketAddr,
        datagram: &SipDatagram,
        call_id: &str,
    ) {
        self.respond(tag, endpoint, &SIP_OK_NO_SDP, datagram).await;
        self.rtp.stop(tag, call_id).await;
        self.respond(tag, endpoint, &SIP_TERMINATE, datagram).await;
    }

    async fn respond(
        &mut self,
        tag: &str,
        endpoint: SocketAddr,
        template: &ResponseTemplate,
        datagram: &SipDatagram,
    ) {
        let packet = match serialize(template, datagram) {
            Ok(packet) => packet,
            Err(err) => {
                error!("'{}' <<{}>> {}", self.name, tag, err);
                return;
            }
        };
        debug!("<<-- '{}' <<{}>> {}", self.name, tag, template.status_line);
        self.send(endpoint, packet.as_bytes()).await;
    }

    /// Send through the reused worker socket; on failure, discard it and
    /// retry once on a fresh ephemeral socket.
    async fn send(&mut self, endpoint: SocketAddr, bytes: &[u8]) {
        if self.socket.send_to(bytes, endpoint).await.is_ok() {
            return;
        }
        warn!("'{}' send failed, retrying on a fresh socket", self.name);
        match reply_socket() {
            Ok(fresh) => {
                if let Err(err) = fresh.send_to(bytes, endpoint).await {
                    error!("'{}' resend to {} failed: {}", self.name, endpoint, err);
                }
                self.socket = fresh;
            }
            Err(err) => error!("'{}' could not allocate a reply socket: {}", self.name, err),
        }
    }
}

fn reply_socket() -> std::io::Result<UdpSocket> {
    UdpSocket::from_std(allocate_ephemeral_socket()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use siprec_rtp_control::RtpEngine;
    use siprec_sip_core::samples::{SIP_INVITE_SAMPLE, SIP_OPTIONS_SAMPLE};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.server.port = 0;
        config.sip.server.address = Some("127.0.0.1".to_string());
        config.sip.defaults.insert("Server".into(), "siprecd".into());
        config
    }

    fn test_worker(
        engines: Vec<RtpEngine>,
    ) -> (SipWorker, RegistryHandle, tokio::sync::watch::Sender<bool>) {
        let config = test_config();
        let rtp = Arc::new(RtpClient::new(
            engines,
            "127.0.0.1",
            Duration::from_millis(100),
        ));
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let (registry, _task) = crate::registry::Reaper::spawn(
            rtp.clone(),
            Duration::from_millis(20),
            64,
            shutdown_rx,
        );
        let worker = SipWorker::new(0, &config, rtp, registry.clone()).unwrap();
        (worker, registry, shutdown_tx)
    }

    async fn recv_packet(socket: &UdpSocket) -> String {
        let mut buffer = [0u8; 2048];
        let received = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buffer))
            .await
            .expect("timed out waiting for a response")
            .unwrap();
        String::from_utf8_lossy(&buffer[..received]).to_string()
    }

    #[tokio::test]
    async fn options_gets_a_200_with_identity_headers() {
        let (mut worker, _registry, _shutdown) = test_worker(Vec::new());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = client.local_addr().unwrap();

        worker
            .handle(WorkItem {
                endpoint,
                payload: SIP_OPTIONS_SAMPLE.as_bytes().to_vec(),
            })
            .await;

        let reply = recv_packet(&client).await;
        assert!(reply.starts_with("SIP/2.0 200 OK\r\n"));
        assert!(reply.contains("CSeq: 307103 OPTIONS\r\n"));
        assert!(reply.contains("Server: siprecd\r\n"));
        assert!(reply.contains("Contact: <sip:127.0.0.1:5060;transport=udp>\r\n"));
        assert!(reply.contains("Content-Length: 0\r\n"));
    }

    #[tokio::test]
    async fn invite_without_engines_answers_plainly() {
        let (mut worker, _registry, _shutdown) = test_worker(Vec::new());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = client.local_addr().unwrap();

        worker
            .handle(WorkItem {
                endpoint,
                payload: SIP_INVITE_SAMPLE.as_bytes().to_vec(),
            })
            .await;

        let reply = recv_packet(&client).await;
        assert!(reply.starts_with("SIP/2.0 200 OK\r\n"));
        assert!(reply.contains("Content-Length: 0\r\n"));
    }

    #[tokio::test]
    async fn garbage_is_dropped_without_a_reply() {
        let (mut worker, _registry, _shutdown) = test_worker(Vec::new());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = client.local_addr().unwrap();

        for payload in [
            b"".to_vec(),
            b"GET / HTTP/1.1\r\n\r\n".to_vec(),
            // SIP signature but no method token anywhere.
            b"NOISE noise SIP/2.0\r\n\r\n".to_vec(),
        ] {
            worker.handle(WorkItem { endpoint, payload }).await;
        }

        let mut buffer = [0u8; 64];
        let outcome =
            tokio::time::timeout(Duration::from_millis(200), client.recv(&mut buffer)).await;
        assert!(outcome.is_err(), "expected silence for dropped datagrams");
    }

    #[tokio::test]
    async fn ack_is_ignored() {
        let (mut worker, _registry, _shutdown) = test_worker(Vec::new());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = client.local_addr().unwrap();

        let ack = "ACK sip:record@192.168.1.6:5060 SIP/2.0\r\nCall-ID: abc@host\r\nCSeq: 1 ACK\r\n";
        worker
            .handle(WorkItem {
                endpoint,
                payload: ack.as_bytes().to_vec(),
            })
            .await;

        let mut buffer = [0u8; 64];
        let outcome =
            tokio::time::timeout(Duration::from_millis(200), client.recv(&mut buffer)).await;
        assert!(outcome.is_err(), "ACK must not be answered");
    }

    #[tokio::test]
    async fn bye_answers_ok_then_terminated() {
        let (mut worker, _registry, _shutdown) = test_worker(Vec::new());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = client.local_addr().unwrap();

        let bye = "BYE sip:record@192.168.1.6:5060 SIP/2.0\r\n\
                   From: <sip:a@b>\r\nTo: <sip:record@b>\r\nCall-ID: abc@host\r\nCSeq: 2 BYE\r\n";
        worker
            .handle(WorkItem {
                endpoint,
                payload: bye.as_bytes().to_vec(),
            })
            .await;

        let ok = recv_packet(&client).await;
        assert!(ok.starts_with("SIP/2.0 200 OK\r\n"));
        let terminated = recv_packet(&client).await;
        assert!(terminated.starts_with("SIP/2.0 487 Request Terminated\r\n"));
    }
}
