//! Session engine
//!
//! One [`TunnelClient`] owns everything a session needs: the state cell, the
//! suspended flag, the handle slots, the byte counters, the codec and the
//! error sink, plus the injected interface opener and transport dialer. The
//! reconnect loop, the pumps and the keepalive emitter all share it by
//! reference; there is no state outside the object.
//!
//! Lifecycle: `run` opens the virtual interface once, then dials, bridges
//! and retries with a fixed backoff until `stop` sets the suspended flag.
//! The keepalive emitter's write failure is the only signal that ends one
//! connection attempt.

mod bridge;
mod counters;
mod handles;
mod state;

pub use counters::Counters;
pub use handles::SessionHandles;
pub use state::{ConnectionState, StateCell};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::transport::{FrameSink, TransportDialer, TransportPair};
use crate::tun::InterfaceOpener;

/// Fixed delay between failed dial attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Interval between keepalive probes
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);

/// Capacity of the error event channel
const ERROR_CHANNEL_CAPACITY: usize = 16;

/// The session-owning object
pub struct TunnelClient {
    config: Config,
    codec: Codec,
    opener: Arc<dyn InterfaceOpener>,
    dialer: Arc<dyn TransportDialer>,
    state: StateCell,
    suspended: AtomicBool,
    handles: SessionHandles,
    counters: Counters,
    errors: ErrorSink,
}

impl TunnelClient {
    /// Build a session around the given leaf implementations. The returned
    /// receiver carries start/stop-path errors for the presentation layer;
    /// sends are best-effort and never block the engine.
    pub fn new(
        config: Config,
        opener: Arc<dyn InterfaceOpener>,
        dialer: Arc<dyn TransportDialer>,
    ) -> (Arc<Self>, mpsc::Receiver<Error>) {
        let (tx, rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let codec = Codec::new(config.compress);
        let client = Arc::new(Self {
            config,
            codec,
            opener,
            dialer,
            state: StateCell::new(),
            suspended: AtomicBool::new(false),
            handles: SessionHandles::new(),
            counters: Counters::new(),
            errors: ErrorSink { tx },
        });
        (client, rx)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Cumulative bytes received from the transport (after decompression)
    pub fn bytes_received(&self) -> u64 {
        self.counters.received()
    }

    /// Cumulative bytes sent to the transport (before compression)
    pub fn bytes_sent(&self) -> u64 {
        self.counters.sent()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the session: open the interface once, then dial, bridge and retry
    /// until suspended. Returns when the session is stopped or when the
    /// interface cannot be created (reported once, no retry).
    pub async fn run(self: Arc<Self>) {
        info!("starting tunnel client for {}", self.config.server_addr);
        self.suspended.store(false, Ordering::SeqCst);

        let iface = match self.opener.open(&self.config).await {
            Ok(iface) => iface,
            Err(e) => {
                error!("failed to open virtual interface: {}", e);
                self.errors.report(e);
                return;
            }
        };

        self.state.set(ConnectionState::Connecting);
        self.handles.set_interface(iface.clone());

        // The uplink pump outlives individual transport connections; it
        // re-reads the transport slot on every packet.
        tokio::spawn({
            let client = self.clone();
            let iface = iface.clone();
            async move { client.uplink_pump(iface).await }
        });

        loop {
            if self.suspended.load(Ordering::SeqCst) {
                debug!("session suspended, leaving reconnect loop");
                return;
            }

            let TransportPair { sink, source } = match self.dialer.dial(&self.config).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("dial failed: {}", e);
                    self.errors.report(e);
                    self.state.set(ConnectionState::Disconnected);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            self.state.set(ConnectionState::Connected);
            self.handles.set_transport(sink.clone());

            tokio::spawn({
                let client = self.clone();
                let iface = iface.clone();
                async move { client.downlink_pump(source, iface).await }
            });

            // Blocks until a probe write fails; that failure is the sole
            // signal that this connection attempt is over.
            self.keepalive(sink).await;

            self.handles.clear_transport();
            self.state.set(ConnectionState::Disconnected);
        }
    }

    async fn keepalive(&self, sink: Arc<dyn FrameSink>) {
        loop {
            if let Err(e) = sink.send_probe().await {
                debug!("keepalive probe failed: {}", e);
                if let Err(e) = sink.close().await {
                    debug!("transport close after failed probe: {}", e);
                }
                return;
            }
            tokio::time::sleep(KEEPALIVE_INTERVAL).await;
        }
    }

    /// Tear the session down: close both handles, clear the slots, reset
    /// routes, suspend the reconnect loop. The first close error aborts the
    /// remaining steps and is returned; a second call completes them.
    pub async fn stop(&self) -> Result<()> {
        info!("stopping tunnel client");
        self.state.set(ConnectionState::Disconnecting);

        if let Some(sink) = self.handles.transport() {
            sink.close().await?;
        }
        if let Some(iface) = self.handles.interface() {
            iface.close().await?;
        }
        self.handles.clear_transport();
        self.handles.clear_interface();
        self.opener.reset_routes(&self.config);

        self.suspended.store(true, Ordering::SeqCst);
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }
}

/// Best-effort, non-blocking error reporting. A full or absent consumer
/// never stalls the reconnect loop; overflow is logged and dropped.
struct ErrorSink {
    tx: mpsc::Sender<Error>,
}

impl ErrorSink {
    fn report(&self, err: Error) {
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(err)) => {
                warn!("error channel full, dropping: {}", err);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
