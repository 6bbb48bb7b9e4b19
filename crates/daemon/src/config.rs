//! Daemon configuration.
//!
//! Loaded from a JSON file (`siprec.json`); every key is optional and
//! falls back to the defaults below. The advertised address is resolved
//! once at startup and treated as read-only afterwards.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::info;

use siprec_infra_common::logging::{DiskLogConfig, LoggingConfig};
use siprec_infra_common::net::discover_server_address;
use siprec_rtp_control::RtpEngine;

use crate::error::{DaemonError, Result};

/// The well-known SIP signalling port the daemon may bind without
/// elevated rights even though it is privileged on paper.
pub const DEFAULT_SIP_PORT: u16 = 5060;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sip: SipConfig,
    pub rtp: RtpConfig,
    pub gc: GcConfig,
    pub log: LogConfig,
}

/// `server.*`: the UDP bind and worker sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Target worker count; sized from the host CPU count when absent.
    pub worker: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_SIP_PORT,
            worker: None,
        }
    }
}

/// `sip.*`: identity headers and the advertised address.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    /// Static headers overlaid onto every outgoing response, in file
    /// order (`Allow`, `Server`, `Supported`, `Session-Expires`, ...).
    pub defaults: IndexMap<String, String>,
    pub server: SipServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SipServerConfig {
    /// Advertised IPv4 address; auto-discovered when empty.
    pub address: Option<String>,
}

/// `rtp.*`: the external engine fleet and retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RtpConfig {
    pub handlers: Vec<RtpEngine>,
    pub max_retry: u32,
    /// Seconds to wait for an engine's start reply.
    pub timeout: f64,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            max_retry: 1,
            timeout: 1.0,
        }
    }
}

/// `gc.*`: reaper cadence and call lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Seconds between reaper sweeps.
    pub loop_interval: f64,
    /// Seconds a registered call may live without explicit teardown.
    pub call_lifetime: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            loop_interval: 1.0,
            call_lifetime: 3600,
        }
    }
}

/// `log.*`: level and the optional disk sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub disk: DiskConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            disk: DiskConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    pub enabled: bool,
    pub path: String,
    pub name: String,
    pub total_days_preserved: u32,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/var/log/siprec".to_string(),
            name: "siprecd.log".to_string(),
            total_days_preserved: 7,
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .map_err(|err| DaemonError::Config(format!("{}: {}", path.display(), err)))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|err| DaemonError::Config(format!("{}: {}", path.display(), err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // port 0 asks the kernel for an ephemeral port; the well-known
        // signalling port is the only privileged one the daemon binds.
        if self.server.port != 0
            && self.server.port < 1024
            && self.server.port != DEFAULT_SIP_PORT
        {
            return Err(DaemonError::PrivilegedPort(self.server.port));
        }
        if self.server.worker == Some(0) {
            return Err(DaemonError::Config(
                "server.worker must be at least 1".to_string(),
            ));
        }
        if self.gc.loop_interval <= 0.0 {
            return Err(DaemonError::Config(
                "gc.loop_interval must be positive".to_string(),
            ));
        }
        if self.rtp.timeout <= 0.0 {
            return Err(DaemonError::Config(
                "rtp.timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Fill in `sip.server.address` when the file left it empty.
    pub fn resolve_address(&mut self) {
        let configured = self
            .sip
            .server
            .address
            .as_deref()
            .filter(|address| !address.is_empty());
        if configured.is_none() {
            let discovered = discover_server_address().to_string();
            info!("advertising discovered server address {}", discovered);
            self.sip.server.address = Some(discovered);
        }
    }

    /// The address advertised in Contact headers and rewritten SDP.
    pub fn advertised_host(&self) -> String {
        self.sip
            .server
            .address
            .clone()
            .filter(|address| !address.is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    /// The port advertised alongside [`Config::advertised_host`].
    pub fn advertised_port(&self) -> u16 {
        if self.server.port == 0 {
            DEFAULT_SIP_PORT
        } else {
            self.server.port
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let host: std::net::IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| DaemonError::Config(format!("server.host {:?}", self.server.host)))?;
        Ok(SocketAddr::from((host, self.server.port)))
    }

    /// Resolved worker count, bounded by the host CPU count.
    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        sized_worker_count(self.server.worker, cpus)
    }

    pub fn max_retry(&self) -> u32 {
        self.rtp.max_retry.max(1)
    }

    pub fn rtp_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.rtp.timeout)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs_f64(self.gc.loop_interval)
    }

    pub fn call_lifetime(&self) -> Duration {
        Duration::from_secs(self.gc.call_lifetime)
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log.level.clone(),
            disk: self.log.disk.enabled.then(|| DiskLogConfig {
                path: self.log.disk.path.clone().into(),
                name: self.log.disk.name.clone(),
                total_days_preserved: self.log.disk.total_days_preserved,
            }),
        }
    }
}

/// `min(max(1, configured), cpus)` when configured, else
/// `1 + floor(cpus * 0.32)`.
fn sized_worker_count(configured: Option<usize>, cpus: usize) -> usize {
    match configured {
        Some(count) => count.max(1).min(cpus.max(1)),
        None => 1 + (cpus as f64 * 0.32) as usize,
    }
}
