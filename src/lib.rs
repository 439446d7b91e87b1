//! tunbridge - A client-side VPN tunnel bridge
//!
//! # Architecture (Layered Bridge)
//!
//! ```text
//! Virtual Interface (TUN)
//! → Bridge (uplink / downlink pumps)
//! → Codec (optional Snappy)
//! → Packet Transport (WebSocket, optional TLS)
//! → Tunnel server
//! ```
//!
//! ## Core Principles
//!
//! - Each layer does ONE thing
//! - Leaf layers (interface, transport) are abstracted via traits
//! - One session object owns all mutable session state
//! - The session engine never blocks on observers
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── tun/             # Virtual interface: TUN device, route reset
//! ├── transport/       # Packet transport: WebSocket dialer, frame halves
//! ├── codec/           # Payload codec: Snappy or pass-through
//! ├── client/          # Session engine: state, reconnect loop, bridge
//! ├── api/             # Allocator registration client
//! └── config, error, stats
//! ```

// Core types
pub mod config;
pub mod error;

// Layered architecture
pub mod tun;
pub mod transport;
pub mod codec;
pub mod client;

// Supporting modules
pub mod api;
pub mod stats;

// Re-exports for convenience
pub use config::{Config, Scheme};
pub use error::{Error, Result};

// Architecture re-exports
pub use client::{ConnectionState, Counters, TunnelClient};
pub use codec::Codec;
pub use transport::{FrameSink, FrameSource, TransportDialer, TransportPair, WsDialer};
pub use tun::{InterfaceOpener, PacketInterface, TunOpener};
