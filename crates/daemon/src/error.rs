use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use siprec_infra_common::logging::LoggingError;

/// A type alias for handling `Result`s with `DaemonError`
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Process exit codes, mirroring the errno the failure class maps to.
pub mod exit_codes {
    pub const OK: i32 = 0;
    /// Refused to bind a privileged port.
    pub const EPERM: i32 = 1;
    /// Worker pool or listener resources unavailable.
    pub const EAGAIN: i32 = 11;
    /// Missing or invalid configuration.
    pub const EINVAL: i32 = 22;
}

/// Fatal startup errors. Everything that happens after startup is
/// recovered locally and logged; these are the only paths that take the
/// process down.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("configuration: {0}")]
    Config(String),

    #[error("refusing to bind privileged port {0}")]
    PrivilegedPort(u16),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to initialize worker pool: {0}")]
    WorkerPool(String),

    #[error("logging: {0}")]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DaemonError {
    /// The exit code mandated for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::Config(_) => exit_codes::EINVAL,
            DaemonError::PrivilegedPort(_) => exit_codes::EPERM,
            DaemonError::Bind { source, .. }
                if source.kind() == io::ErrorKind::PermissionDenied =>
            {
                exit_codes::EPERM
            }
            DaemonError::Bind { .. } | DaemonError::WorkerPool(_) => exit_codes::EAGAIN,
            DaemonError::Logging(_) => exit_codes::EINVAL,
            DaemonError::Io(_) => exit_codes::EAGAIN,
        }
    }
}
