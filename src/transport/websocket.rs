//! WebSocket transport implementation
//!
//! Dials `ws(s)://<server>/ws` with the shared `key` header and splits the
//! upgraded connection into a lockable sink and an owned source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_rustls::rustls::{self, pki_types::ServerName, ClientConfig, RootCertStore};
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{
        handshake::client::{generate_key, Request},
        protocol::Message,
    },
    Connector, WebSocketStream,
};
use tracing::{debug, trace};

use crate::config::{Config, Scheme};
use crate::error::{Error, Result};

use super::{FrameSink, FrameSource, TransportDialer, TransportPair};

/// Keepalive probe payload, shared with the server
pub const PROBE: &str = "ping";

/// Upgrade handshake timeout
const DIAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Browser-like user agent sent on the upgrade request
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/88.0.4324.182 Safari/537.36";

/// Dialer for the tunnel server's `/ws` endpoint
pub struct WsDialer;

impl WsDialer {
    pub fn new() -> Self {
        Self
    }

    fn build_request(config: &Config) -> Result<Request> {
        let uri = format!("{}://{}/ws", config.protocol, config.server_addr);

        let mut request = Request::builder()
            .uri(&uri)
            .header("Host", &config.server_addr)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .header("User-Agent", USER_AGENT);

        if !config.key.is_empty() {
            request = request.header("key", &config.key);
        }

        request
            .body(())
            .map_err(|e| Error::Transport(format!("Failed to build WebSocket request: {}", e)))
    }

    fn build_connector(config: &Config) -> Connector {
        match config.protocol {
            Scheme::Ws => Connector::Plain,
            Scheme::Wss => {
                let mut root_store = RootCertStore::empty();
                root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

                let mut tls_config = ClientConfig::builder()
                    .with_root_certificates(root_store)
                    .with_no_client_auth();

                if config.insecure_skip_verify {
                    tls_config
                        .dangerous()
                        .set_certificate_verifier(Arc::new(InsecureVerifier));
                }

                Connector::Rustls(Arc::new(tls_config))
            }
        }
    }
}

impl Default for WsDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportDialer for WsDialer {
    async fn dial(&self, config: &Config) -> Result<TransportPair> {
        let request = Self::build_request(config)?;
        let connector = Self::build_connector(config);

        let (ws_stream, _response) = tokio::time::timeout(
            DIAL_TIMEOUT,
            connect_async_tls_with_config(request, None, true, Some(connector)),
        )
        .await
        .map_err(|_| Error::Transport("handshake timed out".into()))?
        .map_err(|e| Error::Transport(format!("WebSocket handshake failed: {}", e)))?;

        debug!(
            "connected to {}://{}/ws",
            config.protocol, config.server_addr
        );

        Ok(split_transport(ws_stream))
    }
}

/// Split an upgraded connection into the engine-facing halves
fn split_transport<S>(ws_stream: WebSocketStream<S>) -> TransportPair
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws_stream.split();
    TransportPair {
        sink: Arc::new(WsSink {
            sink: Mutex::new(sink),
        }),
        source: Box::new(WsSource { stream }),
    }
}

/// Write half: binary packet frames, text probes, close
struct WsSink<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_packet(&self, payload: &[u8]) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(payload.to_vec()))
            .await
            .map_err(|e| Error::Transport(format!("write failed: {}", e)))
    }

    async fn send_probe(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(PROBE.to_string()))
            .await
            .map_err(|e| Error::Transport(format!("probe write failed: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|e| Error::Transport(format!("close failed: {}", e)))
    }
}

/// Read half: binary frames pass through, everything else is skipped
struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn next_packet(&mut self) -> Result<Option<Vec<u8>>> {
        while let Some(message) = self.stream.next().await {
            let message =
                message.map_err(|e| Error::Transport(format!("read failed: {}", e)))?;
            match message {
                Message::Binary(data) => return Ok(Some(data)),
                Message::Text(text) => {
                    trace!("skipping text frame ({} bytes)", text.len());
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(frame) => {
                    debug!("server closed the connection: {:?}", frame);
                    return Ok(None);
                }
                Message::Frame(_) => {
                    return Err(Error::Transport("unexpected raw frame".into()));
                }
            }
        }
        Ok(None)
    }
}

/// Insecure certificate verifier for `insecure_skip_verify`
#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (TransportPair, WebSocketStream<tokio::io::DuplexStream>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (split_transport(client), server)
    }

    #[test]
    fn test_request_carries_key_header() {
        let mut config = Config::default_config();
        config.key = "secret".to_string();
        let request = WsDialer::build_request(&config).unwrap();
        assert_eq!(request.uri().to_string(), "wss://vpn.example.com:443/ws");
        assert_eq!(request.headers()["key"], "secret");
        assert_eq!(request.headers()["Upgrade"], "websocket");
    }

    #[test]
    fn test_request_omits_empty_key() {
        let config = Config::default_config();
        let request = WsDialer::build_request(&config).unwrap();
        assert!(request.headers().get("key").is_none());
    }

    #[tokio::test]
    async fn test_source_skips_non_binary_frames() {
        let (pair, mut server) = ws_pair().await;
        let mut source = pair.source;

        server.send(Message::Text("hello".to_string())).await.unwrap();
        server.send(Message::Ping(vec![1])).await.unwrap();
        server.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

        assert_eq!(source.next_packet().await.unwrap(), Some(vec![1, 2, 3]));

        server.close(None).await.unwrap();
        assert_eq!(source.next_packet().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sink_sends_binary_and_probe_frames() {
        let (pair, mut server) = ws_pair().await;

        pair.sink.send_packet(&[9, 8, 7]).await.unwrap();
        pair.sink.send_probe().await.unwrap();

        match server.next().await.unwrap().unwrap() {
            Message::Binary(data) => assert_eq!(data, vec![9, 8, 7]),
            other => panic!("expected binary frame, got {:?}", other),
        }
        match server.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text, PROBE),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_source_ends_after_sink_close() {
        let (pair, server) = ws_pair().await;
        let mut source = pair.source;

        // Closing our sink makes the peer-facing stream wind down; the peer
        // mirrors the close and our source reports end-of-connection.
        let (mut server_sink, mut server_stream) = server.split();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = server_stream.next().await {
                if let Message::Close(frame) = msg {
                    let _ = server_sink.send(Message::Close(frame)).await;
                    break;
                }
            }
        });

        pair.sink.close().await.unwrap();
        assert_eq!(source.next_packet().await.unwrap(), None);
    }
}
