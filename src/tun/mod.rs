//! Virtual Interface Layer
//!
//! Responsibilities:
//! - Create the OS TUN device and expose raw packet read/write
//! - Make `close` observable by tasks blocked in packet I/O
//! - Undo OS routing state on teardown
//!
//! The session engine only sees the [`PacketInterface`] and
//! [`InterfaceOpener`] traits; everything OS-specific stays here.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use tun::AsyncDevice;

use crate::config::Config;
use crate::error::{Error, Result};

/// Factory for virtual interfaces, injectable for tests
#[async_trait]
pub trait InterfaceOpener: Send + Sync {
    /// Create and bring up the interface described by the configuration
    async fn open(&self, config: &Config) -> Result<Arc<dyn PacketInterface>>;

    /// Undo OS-level routing changes associated with the interface.
    /// Best effort; failures are logged, not returned.
    fn reset_routes(&self, _config: &Config) {}
}

/// An open virtual interface carrying raw IP packets
#[async_trait]
pub trait PacketInterface: Send + Sync {
    /// Read one packet into `buf`, returning its length
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write one raw packet
    async fn write_packet(&self, packet: &[u8]) -> Result<()>;

    /// Close the interface; pending and future reads/writes fail
    async fn close(&self) -> Result<()>;
}

/// Opener backed by the OS TUN driver
pub struct TunOpener;

impl TunOpener {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TunOpener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterfaceOpener for TunOpener {
    async fn open(&self, config: &Config) -> Result<Arc<dyn PacketInterface>> {
        let address = parse_device_addr(config.device.address.as_deref(), "address")?;
        let netmask = parse_device_addr(Some(&config.device.netmask), "netmask")?;

        let mut tun_config = tun::Configuration::default();
        tun_config
            .address(address)
            .netmask(netmask)
            .mtu(config.mtu as i32)
            .up();

        if let Some(peer) = config.device.peer.as_deref() {
            tun_config.destination(parse_device_addr(Some(peer), "peer")?);
        }
        if let Some(name) = config.device.name.as_deref() {
            tun_config.name(name);
        }

        // Raw IP packets only, no prepended protocol info words
        #[cfg(target_os = "linux")]
        tun_config.platform(|platform| {
            platform.packet_information(false);
        });

        let device = tun::create_as_async(&tun_config)
            .map_err(|e| Error::Interface(format!("failed to create TUN device: {}", e)))?;

        info!("created TUN interface at {} (mtu {})", address, config.mtu);
        Ok(Arc::new(TunInterface::new(device)))
    }

    fn reset_routes(&self, config: &Config) {
        reset_routes(config);
    }
}

fn parse_device_addr(value: Option<&str>, what: &str) -> Result<Ipv4Addr> {
    let value = value.ok_or_else(|| {
        Error::Config(format!(
            "device {} not assigned; register with the allocator first",
            what
        ))
    })?;
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid device {}: {}", what, value)))
}

/// TUN device with concurrent read/write access and a close latch
struct TunInterface {
    reader: Mutex<ReadHalf<AsyncDevice>>,
    writer: Mutex<WriteHalf<AsyncDevice>>,
    shutdown: ShutdownLatch,
}

impl TunInterface {
    fn new(device: AsyncDevice) -> Self {
        let (reader, writer) = tokio::io::split(device);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            shutdown: ShutdownLatch::new(),
        }
    }

    fn closed_error() -> Error {
        Error::Interface("interface closed".into())
    }
}

#[async_trait]
impl PacketInterface for TunInterface {
    async fn read_packet(&self, buf: &mut [u8]) -> Result<usize> {
        if self.shutdown.is_closed() {
            return Err(Self::closed_error());
        }
        let mut reader = self.reader.lock().await;
        tokio::select! {
            result = reader.read(buf) => {
                let n = result?;
                if n == 0 {
                    return Err(Error::Interface("interface returned end of stream".into()));
                }
                Ok(n)
            }
            _ = self.shutdown.wait() => Err(Self::closed_error()),
        }
    }

    async fn write_packet(&self, packet: &[u8]) -> Result<()> {
        if self.shutdown.is_closed() {
            return Err(Self::closed_error());
        }
        let mut writer = self.writer.lock().await;
        tokio::select! {
            result = writer.write_all(packet) => {
                result?;
                Ok(())
            }
            _ = self.shutdown.wait() => Err(Self::closed_error()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.close();
        Ok(())
    }
}

/// One-shot close signal shared by both device halves
struct ShutdownLatch {
    closed: AtomicBool,
    notify: Notify,
}

impl ShutdownLatch {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking so a concurrent close() cannot
            // slip between the check and the await.
            notified.as_mut().enable();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

/// Undo routes the OS attached to the tunnel device
pub fn reset_routes(config: &Config) {
    reset_routes_os(config);
}

#[cfg(target_os = "linux")]
fn reset_routes_os(config: &Config) {
    match config.device.name.as_deref() {
        Some(name) => run_route_command("ip", &["route", "flush", "dev", name]),
        None => debug!("no device name configured, skipping route reset"),
    }
}

#[cfg(target_os = "macos")]
fn reset_routes_os(config: &Config) {
    match config.device.peer.as_deref() {
        Some(peer) => run_route_command("route", &["-n", "delete", "-net", peer]),
        None => debug!("no peer address configured, skipping route reset"),
    }
}

#[cfg(target_os = "windows")]
fn reset_routes_os(config: &Config) {
    match config.device.peer.as_deref() {
        Some(peer) => run_route_command("route", &["delete", peer]),
        None => debug!("no peer address configured, skipping route reset"),
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn reset_routes_os(_config: &Config) {}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn run_route_command(program: &str, args: &[&str]) {
    match std::process::Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            debug!("route reset: {} {}", program, args.join(" "));
        }
        Ok(output) => warn!(
            "route reset failed: {} {}: {}",
            program,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => warn!("failed to run {}: {}", program, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_latch_wait_returns_once_closed() {
        let latch = Arc::new(ShutdownLatch::new());
        assert!(!latch.is_closed());

        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        latch.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not observe close")
            .unwrap();
    }

    #[tokio::test]
    async fn test_latch_wait_after_close_is_immediate() {
        let latch = ShutdownLatch::new();
        latch.close();
        tokio::time::timeout(Duration::from_millis(100), latch.wait())
            .await
            .expect("wait should return immediately");
    }

    #[test]
    fn test_parse_device_addr() {
        assert_eq!(
            parse_device_addr(Some("172.16.0.2"), "address").unwrap(),
            Ipv4Addr::new(172, 16, 0, 2)
        );
        assert!(parse_device_addr(None, "address").is_err());
        assert!(parse_device_addr(Some("not-an-ip"), "address").is_err());
    }
}
