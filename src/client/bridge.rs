//! Bridge — the two packet pumps
//!
//! Uplink (interface → transport) runs once per session: it looks up the
//! currently registered transport sink on every packet and drops packets
//! while no transport is live, so it survives reconnects. A transport write
//! failure is transient and skips the packet; an interface read failure ends
//! the pump for good.
//!
//! Downlink (transport → interface) is scoped to one connection attempt and
//! exits on the first read or write failure; the reconnect loop spawns a
//! fresh one after the next successful dial.
//!
//! Counters measure raw packet bytes: the sent counter before compression,
//! the received counter after decompression.

use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::transport::FrameSource;
use crate::tun::PacketInterface;

use super::TunnelClient;

impl TunnelClient {
    /// Interface → transport. One per session.
    pub(crate) async fn uplink_pump(&self, iface: Arc<dyn PacketInterface>) {
        let mut buf = BytesMut::with_capacity(self.config.buffer_size);
        buf.resize(self.config.buffer_size, 0);

        loop {
            let n = match iface.read_packet(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("interface read failed, stopping uplink pump: {}", e);
                    return;
                }
            };

            let Some(sink) = self.handles.transport() else {
                trace!("no transport registered, dropping {} byte packet", n);
                continue;
            };

            let payload = match self.codec.encode(&buf[..n]) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("encode failed, dropping packet: {}", e);
                    continue;
                }
            };

            match sink.send_packet(&payload).await {
                Ok(()) => self.counters.add_sent(n as u64),
                Err(e) => debug!("transport write failed: {}", e),
            }
        }
    }

    /// Transport → interface. One per connection attempt.
    pub(crate) async fn downlink_pump(
        &self,
        mut source: Box<dyn FrameSource>,
        iface: Arc<dyn PacketInterface>,
    ) {
        loop {
            let frame = match source.next_packet().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("transport closed, stopping downlink pump");
                    return;
                }
                Err(e) => {
                    debug!("transport read failed, stopping downlink pump: {}", e);
                    return;
                }
            };

            let packet = match self.codec.decode(&frame) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("decode failed, stopping downlink pump: {}", e);
                    return;
                }
            };

            if let Err(e) = iface.write_packet(&packet).await {
                warn!("interface write failed, stopping downlink pump: {}", e);
                return;
            }
            self.counters.add_received(packet.len() as u64);
        }
    }
}
