//! Listener allocation, the single-reader router, and pipeline wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use siprec_infra_common::net::bind_listen_socket;
use siprec_rtp_control::RtpClient;

use crate::config::Config;
use crate::error::{DaemonError, Result};
use crate::registry::{Reaper, RegistryHandle, DEFAULT_HISTORY_CAP};
use crate::worker::{SipWorker, WorkItem};

/// Largest receivable SIP datagram.
const MAX_DATAGRAM: usize = 0xffff;

/// A running daemon instance: the router task, the worker pool, and the
/// registry reaper.
pub struct SipServer {
    local_addr: std::net::SocketAddr,
    registry: RegistryHandle,
    shutdown: watch::Sender<bool>,
    reaper_shutdown: watch::Sender<bool>,
    router: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    reaper: JoinHandle<()>,
}

impl SipServer {
    /// Bind the listener and launch the full pipeline.
    pub async fn start(mut config: Config) -> Result<SipServer> {
        config.validate()?;
        config.resolve_address();

        let bind_addr = config.bind_addr()?;
        let std_socket =
            bind_listen_socket(bind_addr).map_err(|source| DaemonError::Bind {
                addr: bind_addr,
                source,
            })?;
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;
        info!("sip listener bound to {}", local_addr);

        let rtp = Arc::new(RtpClient::new(
            config.rtp.handlers.clone(),
            config.advertised_host(),
            config.rtp_timeout(),
        ));
        if !rtp.is_available() {
            warn!("no rtp engine is enabled; calls will not be anchored");
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (reaper_shutdown, reaper_shutdown_rx) = watch::channel(false);
        let (registry, reaper) = Reaper::spawn(
            rtp.clone(),
            config.loop_interval(),
            DEFAULT_HISTORY_CAP,
            reaper_shutdown_rx,
        );

        let worker_count = config.worker_count();
        let (work_tx, work_rx) = mpsc::channel(worker_count * 2);
        let queue = Arc::new(Mutex::new(work_rx));
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker = SipWorker::new(index, &config, rtp.clone(), registry.clone())?;
            workers.push(tokio::spawn(worker.run(queue.clone())));
        }
        info!("total router workers: {}", worker_count);

        let router = tokio::spawn(router_loop(
            socket,
            work_tx,
            config.loop_interval(),
            shutdown_rx,
        ));

        Ok(SipServer {
            local_addr,
            registry,
            shutdown,
            reaper_shutdown,
            router,
            workers,
            reaper,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Cooperative teardown: stop the reader, let the workers drain the
    /// queue, then run one final reaper sweep.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.router.await;
        for worker in self.workers {
            let _ = worker.await;
        }
        let _ = self.reaper_shutdown.send(true);
        let _ = self.reaper.await;
        info!("server terminated");
    }
}

/// The sole reader of the listening socket. Receives up to 64 KiB per
/// datagram and enqueues `(endpoint, payload)` for the worker pool.
async fn router_loop(
    socket: UdpSocket,
    queue: mpsc::Sender<WorkItem>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buffer) => match result {
                // zero-byte reads carry nothing to parse.
                Ok((0, _)) => continue,
                Ok((received, endpoint)) => {
                    let item = WorkItem {
                        endpoint,
                        payload: buffer[..received].to_vec(),
                    };
                    dispatch(&queue, item, tick).await;
                }
                Err(err) => error!("listener receive failed: {}", err),
            },
            _ = shutdown.changed() => break,
        }
    }
    info!("router terminated");
}

/// Hand an item to the worker pool, throttling the reader for one reaper
/// tick when the queue is at its high-water mark. Only a queue that is
/// still full after the throttle drops the datagram, loudly.
async fn dispatch(queue: &mpsc::Sender<WorkItem>, item: WorkItem, tick: Duration) {
    match queue.try_send(item) {
        Ok(()) => {}
        Err(TrySendError::Full(item)) => {
            warn!("work queue full; throttling reader for {:?}", tick);
            tokio::time::sleep(tick).await;
            match queue.try_send(item) {
                Ok(()) => {}
                Err(TrySendError::Full(item)) => {
                    warn!("work queue still full; dropping datagram from {}", item.endpoint);
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        Err(TrySendError::Closed(_)) => {}
    }
}
