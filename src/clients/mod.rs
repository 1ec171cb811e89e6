//! Typed clients for the backend services.
//!
//! Each client owns one long-lived gRPC channel, maps wire messages into
//! [`crate::model`] values and translates backend failures into the
//! [`ServiceError`](crate::error::ServiceError) taxonomy. The raw RPCs sit behind a
//! backend trait per service so a client can be driven by an in-process fake.

pub mod account;
pub mod catalog;
pub mod order;

pub use account::{AccountBackend, AccountClient, GrpcAccountBackend};
pub use catalog::{CatalogBackend, CatalogClient, GrpcCatalogBackend};
pub use order::{GrpcOrderBackend, OrderBackend, OrderClient};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tonic::Status;
use tonic::transport::{Channel, Endpoint};
use tracing::Instrument;

use crate::error::{ConnectionError, ServiceError};

#[derive(Debug, Clone)]
pub struct GrpcClientConfig {
    /// Timeout for establishing the initial connection.
    pub connect_timeout: Duration,

    /// Timeout for individual RPC calls (applied at transport level).
    pub rpc_timeout: Duration,
}

impl Default for GrpcClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

fn build_endpoint(
    service: &'static str,
    target: &str,
    cfg: &GrpcClientConfig,
) -> Result<Endpoint, ConnectionError> {
    let endpoint = Endpoint::from_shared(target.to_string())
        .map_err(|source| ConnectionError::InvalidTarget {
            service,
            target: target.to_string(),
            source,
        })?
        .connect_timeout(cfg.connect_timeout)
        .timeout(cfg.rpc_timeout)
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .http2_keep_alive_interval(Duration::from_secs(30))
        .keep_alive_timeout(Duration::from_secs(10))
        .keep_alive_while_idle(true);

    Ok(endpoint)
}

/// Establish a channel to `target`. A single attempt; retrying is up to the caller.
pub(crate) async fn connect_channel(
    service: &'static str,
    target: &str,
    cfg: &GrpcClientConfig,
) -> Result<Channel, ConnectionError> {
    let span = tracing::debug_span!("grpc_connect", service, uri = %target);

    async move {
        let endpoint = build_endpoint(service, target, cfg)?;
        let channel =
            endpoint
                .connect()
                .await
                .map_err(|source| ConnectionError::Unreachable {
                    service,
                    target: target.to_string(),
                    source,
                })?;

        tracing::info!(
            service,
            uri = %target,
            connect_timeout_ms = cfg.connect_timeout.as_millis() as u64,
            rpc_timeout_ms = cfg.rpc_timeout.as_millis() as u64,
            "gRPC client connected"
        );
        Ok(channel)
    }
    .instrument(span)
    .await
}

/// Holds a channel until it is released; a released slot answers `Unavailable`.
#[derive(Debug)]
pub(crate) struct ChannelSlot {
    channel: RwLock<Option<Channel>>,
}

impl ChannelSlot {
    pub(crate) fn new(channel: Channel) -> Self {
        ChannelSlot {
            channel: RwLock::new(Some(channel)),
        }
    }

    pub(crate) fn channel(&self) -> Result<Channel, Status> {
        self.channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Status::unavailable("connection closed"))
    }

    pub(crate) fn release(&self) {
        self.channel
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Close flag shared by all clones of a client.
#[derive(Debug)]
pub(crate) struct CloseGuard {
    service: &'static str,
    closed: AtomicBool,
}

impl CloseGuard {
    pub(crate) fn new(service: &'static str) -> Self {
        CloseGuard {
            service,
            closed: AtomicBool::new(false),
        }
    }

    /// Runs `release` only for the call that actually closed.
    pub(crate) fn close(&self, release: impl FnOnce()) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            release();
            tracing::info!(service = self.service, "client closed");
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::unavailable(format!(
                "{} client is closed",
                self.service
            )));
        }
        Ok(())
    }
}

/// Translate a failed RPC once, at the client boundary.
pub(crate) fn map_status(service: &'static str, rpc: &'static str, status: Status) -> ServiceError {
    tracing::debug!(service, rpc, code = ?status.code(), "backend call failed");
    ServiceError::from(status)
}
