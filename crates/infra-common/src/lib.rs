//! # siprec-infra-common
//!
//! Ambient infrastructure shared by the siprec crates: tracing setup with
//! an optional rolling disk sink, raw UDP socket allocation helpers, the
//! external-address probe, and request context tags.

pub mod context;
pub mod logging;
pub mod net;

pub use context::random_tag;
pub use logging::{init_logging, DiskLogConfig, LoggingConfig};
pub use net::{
    allocate_ephemeral_socket, bind_listen_socket, discover_server_address,
    random_unprivileged_port,
};
