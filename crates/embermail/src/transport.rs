//! Default [`Transport`]: tokio TCP with an optional rustls layer.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use embermail_core::Transport;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

/// How long a DNS probe may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

enum Stream {
    Plain(TcpStream),
    // Boxed to keep the enum small.
    Tls(Box<TlsStream<TcpStream>>),
}

/// A TCP connection, upgraded to TLS on request.
#[derive(Default)]
pub struct TcpTransport {
    stream: Option<Stream>,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("connected", &self.is_connected())
            .field("secure", &self.is_secure())
            .finish()
    }
}

impl TcpTransport {
    /// A transport with no connection yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { stream: None }
    }

    fn not_connected() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "not connected")
    }
}

impl Transport for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> io::Result<()> {
        self.close().await;
        let tcp = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        tcp.set_nodelay(true)?;
        debug!(host, port, "TCP connected");
        self.stream = Some(Stream::Plain(tcp));
        Ok(())
    }

    async fn connect_secure(&mut self, host: &str, verify: bool) -> io::Result<()> {
        let tcp = match self.stream.take() {
            Some(Stream::Plain(tcp)) => tcp,
            Some(tls @ Stream::Tls(_)) => {
                self.stream = Some(tls);
                return Err(io::Error::other("stream is already TLS"));
            }
            None => return Err(Self::not_connected()),
        };
        let name = ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if !verify {
            warn!(host, "certificate verification disabled");
        }
        let tls = tls_connector(verify).connect(name, tcp).await?;
        debug!(host, "TLS established");
        self.stream = Some(Stream::Tls(Box::new(tls)));
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(Stream::Plain(s)) => {
                s.write_all(data).await?;
                s.flush().await
            }
            Some(Stream::Tls(s)) => {
                s.write_all(data).await?;
                s.flush().await
            }
            None => Err(Self::not_connected()),
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match self.stream.as_mut() {
            Some(Stream::Plain(s)) => s.read(buf).await?,
            Some(Stream::Tls(s)) => s.read(buf).await?,
            None => return Err(Self::not_connected()),
        };
        if n == 0 && !buf.is_empty() {
            debug!("peer closed the connection");
            self.stream = None;
        }
        Ok(n)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn is_secure(&self) -> bool {
        matches!(self.stream, Some(Stream::Tls(_)))
    }

    async fn close(&mut self) {
        let result = match self.stream.take() {
            Some(Stream::Plain(mut s)) => s.shutdown().await,
            Some(Stream::Tls(mut s)) => s.shutdown().await,
            None => return,
        };
        if let Err(e) = result {
            debug!(error = %e, "shutdown failed");
        }
    }

    async fn probe_host(&mut self, host: &str) -> bool {
        match tokio::time::timeout(PROBE_TIMEOUT, tokio::net::lookup_host((host, 0))).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                debug!(host, error = %e, "DNS probe failed");
                false
            }
            Err(_) => false,
        }
    }
}

/// Builds a connector trusting the webpki roots, or anything at all.
fn tls_connector(verify: bool) -> TlsConnector {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    if !verify {
        let provider = Arc::clone(config.crypto_provider());
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)));
    }
    TlsConnector::from(Arc::new(config))
}

/// Accepts any chain but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"* OK ready\r\n").await.unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });

        let mut transport = TcpTransport::new();
        transport
            .connect("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(transport.is_connected());
        assert!(!transport.is_secure());

        let mut buf = [0u8; 64];
        let n = transport.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"* OK ready\r\n");
        transport.write(b"a LOGOUT\r\n").await.unwrap();
        assert_eq!(server.await.unwrap(), b"a LOGOUT\r\n");

        assert_eq!(transport.read(&mut buf).await.unwrap(), 0);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = TcpTransport::new();
        let result = transport
            .connect("127.0.0.1", port, Duration::from_secs(5))
            .await;
        assert!(result.is_err());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_io_without_connection() {
        let mut transport = TcpTransport::new();
        let err = transport.write(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(transport.connect_secure("example.com", true).await.is_err());
        transport.close().await;
    }

    #[tokio::test]
    async fn test_probe_localhost() {
        let mut transport = TcpTransport::new();
        assert!(transport.probe_host("127.0.0.1").await);
    }

    #[test]
    fn test_connectors_build() {
        let _ = tls_connector(true);
        let _ = tls_connector(false);
    }
}
