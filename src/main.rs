//! tunbridge - A client-side VPN tunnel bridge

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio_rustls::rustls;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use tunbridge::api::AllocatorClient;
use tunbridge::client::TunnelClient;
use tunbridge::config::Config;
use tunbridge::error::Result;
use tunbridge::stats::{format_bytes, format_speed};
use tunbridge::transport::WsDialer;
use tunbridge::tun::TunOpener;

fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        print_version();
        return Ok(());
    }

    if args.gen_config {
        println!(
            "{}",
            serde_json::to_string_pretty(&Config::default_config()).unwrap()
        );
        return Ok(());
    }

    // Load configuration
    let config = if let Some(path) = &args.config {
        Config::load(path)?
    } else {
        Config::default_config()
    };

    // Initialize logging: RUST_LOG wins over the config file
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| config.log.level.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    if args.config.is_none() {
        info!("No config file specified, using default configuration");
    }

    // Pick the process-wide rustls crypto provider before any TLS use
    rustls::crypto::ring::default_provider().install_default().ok();

    info!("tunbridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    info!("Goodbye!");
    Ok(())
}

async fn run(mut config: Config) -> Result<()> {
    // Register with the allocator when the device has no address yet; the
    // server also dictates buffer size, MTU and compression.
    if config.device.address.is_none() {
        let api = AllocatorClient::new(&config)?;

        let settings = api.fetch_settings().await?;
        info!(
            "server settings: buffer {}, mtu {}, compress {}",
            settings.buffer_size, settings.mtu, settings.compress
        );
        config.buffer_size = settings.buffer_size;
        config.mtu = settings.mtu;
        config.compress = settings.compress;

        let assignment = api.register().await?;
        info!(
            "registered device {} ({} -> {})",
            assignment.device_id, assignment.client, assignment.server
        );
        config.device.id = Some(assignment.device_id);
        config.device.address = Some(assignment.client);
        config.device.peer = Some(assignment.server);
    }

    let (client, mut errors) = TunnelClient::new(
        config,
        Arc::new(TunOpener::new()),
        Arc::new(WsDialer::new()),
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    let session = tokio::spawn(client.clone().run());

    // Surface session errors for the user
    let mut errors_shutdown_rx = shutdown_tx.subscribe();
    let error_drain = tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_err = errors.recv() => match maybe_err {
                    Some(err) => error!("session error: {}", err),
                    None => break,
                },
                _ = errors_shutdown_rx.recv() => break,
            }
        }
    });

    let reporter = tokio::spawn(stats_reporter(client.clone(), shutdown_tx.subscribe()));

    // Wait for shutdown signal (Ctrl+C)
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    client.stop().await?;
    let _ = shutdown_tx.send(());

    let _ = session.await;
    let _ = error_drain.await;
    let _ = reporter.await;

    Ok(())
}

/// Traffic reporter task - logs traffic periodically and on SIGUSR1 signal
#[cfg(unix)]
async fn stats_reporter(client: Arc<TunnelClient>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut sigusr1 =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
            .expect("Failed to setup SIGUSR1 handler");

    let mut last = TrafficSnapshot::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                log_traffic(&client, &mut last);
            }
            _ = sigusr1.recv() => {
                info!("Received SIGUSR1, printing traffic statistics...");
                log_traffic(&client, &mut last);
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}

/// Traffic reporter task - logs traffic periodically (non-Unix)
#[cfg(not(unix))]
async fn stats_reporter(client: Arc<TunnelClient>, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last = TrafficSnapshot::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                log_traffic(&client, &mut last);
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}

struct TrafficSnapshot {
    sent: u64,
    received: u64,
    at: Instant,
}

impl TrafficSnapshot {
    fn new() -> Self {
        Self {
            sent: 0,
            received: 0,
            at: Instant::now(),
        }
    }
}

fn log_traffic(client: &Arc<TunnelClient>, last: &mut TrafficSnapshot) {
    let sent = client.bytes_sent();
    let received = client.bytes_received();
    let elapsed = last.at.elapsed().as_secs_f64().max(f64::EPSILON);
    let up = sent.saturating_sub(last.sent) as f64 / elapsed;
    let down = received.saturating_sub(last.received) as f64 / elapsed;

    info!(
        "[{}] up {} ({}), down {} ({})",
        client.state(),
        format_bytes(sent),
        format_speed(up),
        format_bytes(received),
        format_speed(down)
    );

    last.sent = sent;
    last.received = received;
    last.at = Instant::now();
}

/// Command line arguments
struct Args {
    config: Option<PathBuf>,
    gen_config: bool,
    version: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = None;
        let mut gen_config = false;
        let mut version = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-c" | "--config" => {
                    if i + 1 < args.len() {
                        config = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--gen-config" => gen_config = true,
                "-v" | "--version" => version = true,
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                arg if !arg.starts_with('-') && config.is_none() => {
                    // Positional argument: treat as config file
                    config = Some(PathBuf::from(arg));
                }
                _ => {}
            }
            i += 1;
        }

        Self {
            config,
            gen_config,
            version,
        }
    }
}

fn print_help() {
    println!(
        r#"tunbridge - A client-side VPN tunnel bridge

USAGE:
    tunbridge [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file
    --gen-config            Generate an example config
    -v, --version           Print version information
    -h, --help              Print help information

EXAMPLES:
    tunbridge -c config.json
    tunbridge --gen-config > config.json

SIGNALS:
    SIGUSR1                 Print traffic statistics (Unix only)
"#
    );
}

fn print_version() {
    println!("tunbridge v{}", env!("CARGO_PKG_VERSION"));
    println!("A client-side VPN tunnel bridge");
}
