//! End-to-end scenarios against a running daemon and a stubbed RTP
//! engine: the full OPTIONS / INVITE / BYE / expiry lifecycle over real
//! UDP sockets.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use serial_test::serial;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use siprec_daemon::{Config, SipServer};
use siprec_rtp_control::RtpEngine;
use siprec_sip_core::samples::{SIP_INVITE_SAMPLE, SIP_OPTIONS_SAMPLE};

const SIP_BYE: &str = "BYE sip:record@192.168.1.6:5060 SIP/2.0\r\n\
Via: SIP/2.0/UDP 192.168.1.4:15060;branch=z9hG4bK0x25b1a5408dd30f\r\n\
From: <sip:Genesys@192.168.1.4:7090>;tag=9E565000-C50B-45BE-9F69-DCFCE02B493D\r\n\
To: <sip:record@192.168.1.6:5060>\r\n\
CSeq: 2 BYE\r\n\
Call-ID: abc@host\r\n\
Content-Length: 0\r\n";

/// A fake RTP engine: records every control request and answers starts
/// with a canned reply when one is configured.
struct StubEngine {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl StubEngine {
    async fn spawn(reply: Option<&'static str>) -> StubEngine {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();
        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];
            while let Ok((received, peer)) = socket.recv_from(&mut buffer).await {
                let request: Value = match serde_json::from_slice(&buffer[..received]) {
                    Ok(request) => request,
                    Err(_) => continue,
                };
                let is_start = request.get("X-Genesys-GVP-Session-ID").is_some();
                log.lock().unwrap().push(request);
                if is_start {
                    if let Some(reply) = reply {
                        let _ = socket.send_to(reply.as_bytes(), peer).await;
                    }
                }
            }
        });
        StubEngine { port, requests }
    }

    fn descriptor(&self) -> RtpEngine {
        RtpEngine {
            host: "127.0.0.1".to_string(),
            port: self.port,
            enabled: true,
        }
    }

    /// Start requests seen so far.
    fn starts(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.get("X-Genesys-GVP-Session-ID").is_some())
            .count()
    }

    /// Call-IDs of stop requests seen so far.
    fn stops(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.get("X-Genesys-GVP-Session-ID").is_none())
            .filter_map(|request| request["Call-ID"].as_str().map(str::to_string))
            .collect()
    }
}

struct TestClient {
    socket: UdpSocket,
    server: SocketAddr,
}

impl TestClient {
    async fn connect(server: SocketAddr) -> TestClient {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        TestClient { socket, server }
    }

    async fn send(&self, message: &str) {
        self.socket
            .send_to(message.as_bytes(), self.server)
            .await
            .unwrap();
    }

    async fn recv(&self) -> String {
        let mut buffer = [0u8; 4096];
        let (received, _) = timeout(Duration::from_secs(3), self.socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for a response")
            .unwrap();
        String::from_utf8_lossy(&buffer[..received]).to_string()
    }

    async fn expect_silence(&self) {
        let mut buffer = [0u8; 64];
        let outcome = timeout(
            Duration::from_millis(300),
            self.socket.recv_from(&mut buffer),
        )
        .await;
        assert!(outcome.is_err(), "expected no further responses");
    }
}

fn test_config(engines: Vec<RtpEngine>) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    // one worker keeps the wire sequence deterministic across datagrams.
    config.server.worker = Some(1);
    config.sip.server.address = Some("127.0.0.1".to_string());
    config
        .sip
        .defaults
        .insert("Server".to_string(), "siprecd".to_string());
    config.rtp.handlers = engines;
    config.rtp.timeout = 0.2;
    config.gc.loop_interval = 0.1;
    config
}

/// Poll until `condition` holds or the deadline passes.
async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
#[serial]
async fn options_ping_is_answered_with_identity() {
    let server = SipServer::start(test_config(Vec::new())).await.unwrap();
    let client = TestClient::connect(server.local_addr()).await;

    client.send(SIP_OPTIONS_SAMPLE).await;
    let reply = client.recv().await;

    assert!(reply.starts_with("SIP/2.0 200 OK\r\n"));
    assert!(reply.contains("CSeq: 307103 OPTIONS\r\n"));
    assert!(reply.contains("Call-ID: 9E565000-FB73-F13E-6076-D8822FB9A4E4-15064@192.168.1.3\r\n"));
    assert!(reply.contains("Content-Length: 0\r\n"));

    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn invite_happy_path_anchors_media() {
    let stub = StubEngine::spawn(Some(r#"{"TxPort":6000,"RxPort":6001}"#)).await;
    let server = SipServer::start(test_config(vec![stub.descriptor()]))
        .await
        .unwrap();
    let client = TestClient::connect(server.local_addr()).await;

    client.send(SIP_INVITE_SAMPLE).await;

    let trying = client.recv().await;
    assert!(trying.starts_with("SIP/2.0 100 Trying\r\n"));
    let ringing = client.recv().await;
    assert!(ringing.starts_with("SIP/2.0 180 Ringing\r\n"));
    let ok = client.recv().await;
    assert!(ok.starts_with("SIP/2.0 200 OK\r\n"));
    assert!(ok.contains("Content-Type: application/sdp\r\n"));
    assert!(ok.contains("m=audio 6000 RTP/AVP 0 8 18 96"));
    assert!(ok.contains("m=audio 6001 RTP/AVP 0 8 18 96"));

    let registry = server.registry().clone();
    wait_until(|| registry.contains("abc@host"), "registration").await;
    assert_eq!(registry.total_calls(), 1);

    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn invite_with_silent_engine_falls_back_to_plain_ok() {
    let stub = StubEngine::spawn(None).await;
    let mut config = test_config(vec![stub.descriptor()]);
    config.rtp.max_retry = 2;
    let server = SipServer::start(config).await.unwrap();
    let client = TestClient::connect(server.local_addr()).await;

    client.send(SIP_INVITE_SAMPLE).await;

    let trying = client.recv().await;
    assert!(trying.starts_with("SIP/2.0 100 Trying\r\n"));
    // one 180 per attempt.
    for _ in 0..2 {
        let ringing = client.recv().await;
        assert!(ringing.starts_with("SIP/2.0 180 Ringing\r\n"));
    }
    let ok = client.recv().await;
    assert!(ok.starts_with("SIP/2.0 200 OK\r\n"));
    assert!(ok.contains("Content-Length: 0\r\n"));
    assert!(!ok.contains("application/sdp"));

    // the failed call is never registered.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!server.registry().contains("abc@host"));
    assert_eq!(server.registry().total_calls(), 0);

    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn duplicate_invite_is_suppressed() {
    let stub = StubEngine::spawn(Some(r#"{"TxPort":6000,"RxPort":6001}"#)).await;
    let server = SipServer::start(test_config(vec![stub.descriptor()]))
        .await
        .unwrap();
    let client = TestClient::connect(server.local_addr()).await;

    client.send(SIP_INVITE_SAMPLE).await;
    for _ in 0..3 {
        // 100 / 180 / 200.
        client.recv().await;
    }
    let registry = server.registry().clone();
    wait_until(|| registry.contains("abc@host"), "registration").await;

    client.send(SIP_INVITE_SAMPLE).await;
    let reply = client.recv().await;
    assert!(reply.starts_with("SIP/2.0 200 OK\r\n"));
    assert!(reply.contains("Content-Length: 0\r\n"));
    client.expect_silence().await;

    // the engine was not asked for ports a second time.
    assert_eq!(stub.starts(), 1);
    assert_eq!(server.registry().total_calls(), 1);

    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn bye_tears_the_call_down() {
    let stub = StubEngine::spawn(Some(r#"{"TxPort":6000,"RxPort":6001}"#)).await;
    let server = SipServer::start(test_config(vec![stub.descriptor()]))
        .await
        .unwrap();
    let client = TestClient::connect(server.local_addr()).await;

    client.send(SIP_INVITE_SAMPLE).await;
    for _ in 0..3 {
        client.recv().await;
    }
    let registry = server.registry().clone();
    wait_until(|| registry.contains("abc@host"), "registration").await;

    client.send(SIP_BYE).await;
    let ok = client.recv().await;
    assert!(ok.starts_with("SIP/2.0 200 OK\r\n"));
    let terminated = client.recv().await;
    assert!(terminated.starts_with("SIP/2.0 487 Request Terminated\r\n"));

    let stub_stops = stub.requests.clone();
    wait_until(
        move || {
            stub_stops
                .lock()
                .unwrap()
                .iter()
                .any(|request| {
                    request.get("X-Genesys-GVP-Session-ID").is_none()
                        && request["Call-ID"] == "abc@host"
                })
        },
        "engine stop signal",
    )
    .await;
    assert_eq!(stub.stops(), vec!["abc@host".to_string()]);
    assert!(!server.registry().contains("abc@host"));

    server.shutdown().await;
}

#[tokio::test]
#[serial]
async fn expiry_tears_the_call_down() {
    let stub = StubEngine::spawn(Some(r#"{"TxPort":6000,"RxPort":6001}"#)).await;
    let mut config = test_config(vec![stub.descriptor()]);
    config.gc.call_lifetime = 1;
    let server = SipServer::start(config).await.unwrap();
    let client = TestClient::connect(server.local_addr()).await;

    client.send(SIP_INVITE_SAMPLE).await;
    for _ in 0..3 {
        client.recv().await;
    }
    let registry = server.registry().clone();
    wait_until(|| registry.contains("abc@host"), "registration").await;

    // no BYE: the reaper must expire the call on its own.
    wait_until(|| !registry.contains("abc@host"), "expiry").await;
    let stub_stops = stub.requests.clone();
    wait_until(
        move || {
            stub_stops
                .lock()
                .unwrap()
                .iter()
                .any(|request| request.get("X-Genesys-GVP-Session-ID").is_none())
        },
        "engine stop signal",
    )
    .await;
    assert_eq!(stub.stops(), vec!["abc@host".to_string()]);
    assert_eq!(registry.active_calls(), 0);
    assert_eq!(registry.total_calls(), 1);

    server.shutdown().await;
}
