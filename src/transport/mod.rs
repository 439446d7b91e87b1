//! Packet Transport Layer
//!
//! Responsibilities:
//! - Dial the tunnel server and perform the upgrade handshake
//! - Carry discrete frames: binary (packet data) and text (keepalive probe)
//! - NO packet inspection, NO compression, NO lifecycle decisions
//!
//! A dialed connection is handed to the session engine as a [`TransportPair`]:
//! a shared write half and an owned read half. The engine decides when to
//! dial, when to close, and what flows through.

mod websocket;

pub use websocket::{WsDialer, PROBE};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Result;

/// One dialed transport connection, split into its two directions
pub struct TransportPair {
    /// Write half, shared between the uplink pump and the keepalive emitter
    pub sink: Arc<dyn FrameSink>,
    /// Read half, owned by one downlink pump
    pub source: Box<dyn FrameSource>,
}

/// Dialer trait for opening transport connections
#[async_trait]
pub trait TransportDialer: Send + Sync {
    /// Open an authenticated connection to the tunnel server
    async fn dial(&self, config: &Config) -> Result<TransportPair>;
}

/// Write half of a transport connection, safe for concurrent callers
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send one packet payload as a binary frame
    async fn send_packet(&self, payload: &[u8]) -> Result<()>;

    /// Send the text keepalive probe
    async fn send_probe(&self) -> Result<()>;

    /// Close the connection; the source end observes the close
    async fn close(&self) -> Result<()>;
}

/// Read half of a transport connection
#[async_trait]
pub trait FrameSource: Send {
    /// Next binary frame payload, or `None` once the connection is closed.
    /// Non-binary frames from the server are skipped.
    async fn next_packet(&mut self) -> Result<Option<Vec<u8>>>;
}
