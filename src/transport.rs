//! Plain and TLS stream connections.
//!
//! Both kinds of connection are exposed through one `Transport` type that
//! implements `AsyncRead` and `AsyncWrite`. The only difference between them
//! is which constructor built it.

use crate::error::ClientError;
use crate::framing::deadline;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Any byte stream a `Transport` can carry.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin> AsyncStream for T {}

/// TLS options beyond the built-in web PKI roots.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// Extra PEM certificates to trust.
    pub ca_file: Option<PathBuf>,
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// `None` for plaintext.
    pub tls: Option<TlsSettings>,
    pub connect_timeout: Option<Duration>,
}

impl Endpoint {
    /// `host:port` as dialed.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// An open connection to the server, owned by exactly one session.
pub struct Transport {
    stream: Option<Box<dyn AsyncStream>>,
    peer: String,
}

impl Transport {
    /// Connect to `endpoint`, performing the TLS handshake if requested.
    pub async fn open(endpoint: &Endpoint) -> Result<Self, ClientError> {
        let address = endpoint.address();
        let connect = async {
            match &endpoint.tls {
                Some(settings) => Self::open_tls(&address, &endpoint.host, settings).await,
                None => Self::open_plain(&address).await,
            }
        };

        match endpoint.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .unwrap_or_else(|_| {
                    Err(ClientError::Connect {
                        address,
                        source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                    })
                }),
            None => connect.await,
        }
    }

    /// Open a plaintext TCP connection.
    pub async fn open_plain(address: &str) -> Result<Self, ClientError> {
        let stream = connect_tcp(address).await?;
        debug!(peer = %address, "TCP connection established");
        Ok(Self::from_stream(stream, address))
    }

    /// Open a TCP connection and complete a TLS handshake over it.
    pub async fn open_tls(
        address: &str,
        server_name: &str,
        settings: &TlsSettings,
    ) -> Result<Self, ClientError> {
        let connect_error = connect_error(address);
        let connector = tls_connector(settings).map_err(&connect_error)?;
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| connect_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let tcp = connect_tcp(address).await?;
        let stream = connector
            .connect(name, tcp)
            .await
            .map_err(&connect_error)?;

        debug!(peer = %address, "TLS handshake complete");
        Ok(Self::from_stream(stream, address))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: impl AsyncStream + 'static, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(Box::new(stream)),
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Shut down and release the stream. Closing twice is a no-op.
    ///
    /// The stream is released even when the shutdown fails or outlives
    /// `limit`; a peer that stops reading cannot hold the connection open.
    pub async fn close(&mut self, limit: Option<Duration>) -> io::Result<()> {
        match self.stream.take() {
            Some(mut stream) => {
                trace!(peer = %self.peer, "Closing connection");
                deadline(limit, stream.shutdown()).await
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}

impl AsyncRead for Transport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// Attributes a failure while establishing the connection to `address`.
fn connect_error(address: &str) -> impl Fn(io::Error) -> ClientError + '_ {
    move |source| ClientError::Connect {
        address: address.to_string(),
        source,
    }
}

async fn connect_tcp(address: &str) -> Result<TcpStream, ClientError> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(connect_error(address))?;
    // Messages are small and strictly alternating.
    stream.set_nodelay(true).map_err(connect_error(address))?;
    Ok(stream)
}

/// Build a connector trusting the web PKI roots plus any configured PEM file.
fn tls_connector(settings: &TlsSettings) -> io::Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = &settings.ca_file {
        let added = add_pem_roots(&mut roots, path)?;
        debug!(path = %path.display(), added, "Loaded extra CA certificates");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

fn add_pem_roots(roots: &mut RootCertStore, path: &Path) -> io::Result<usize> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::new(file);
    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        roots
            .add(cert?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        added += 1;
    }
    if added == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no certificates found in {}", path.display()),
        ));
    }
    Ok(added)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A peer that never delivers data, accepts writes, or finishes a shutdown.
    pub(crate) struct Stalled;

    impl AsyncRead for Stalled {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for Stalled {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_open_plain_and_close_twice() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut transport = Transport::open_plain(&address).await.unwrap();
        assert!(transport.is_open());
        assert_eq!(transport.peer(), address);
        transport.write_all(b"hello\n").await.unwrap();

        transport.close(None).await.unwrap();
        assert!(!transport.is_open());
        transport.close(None).await.unwrap();

        assert_eq!(server.await.unwrap(), b"hello\n");
    }

    #[tokio::test]
    async fn test_io_after_close_fails() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(client, "duplex");
        transport.close(None).await.unwrap();

        let err = transport.write_all(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let mut buf = [0u8; 4];
        let err = transport.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_close_is_bounded_by_deadline() {
        let mut transport = Transport::from_stream(Stalled, "stalled");
        let close = transport.close(Some(Duration::from_millis(20)));
        let result = tokio::time::timeout(Duration::from_secs(5), close)
            .await
            .expect("close ignored its deadline");

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::TimedOut);
        assert!(!transport.is_open());
        transport.close(Some(Duration::from_millis(20))).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            tls: None,
            connect_timeout: Some(Duration::from_secs(5)),
        };
        match Transport::open(&endpoint).await {
            Err(ClientError::Connect { address, .. }) => {
                assert_eq!(address, format!("127.0.0.1:{port}"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tls_rejects_bad_server_name() {
        let settings = TlsSettings::default();
        match Transport::open_tls("127.0.0.1:1", "not a hostname!", &settings).await {
            Err(ClientError::Connect { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tls_missing_ca_file() {
        let settings = TlsSettings {
            ca_file: Some(PathBuf::from("/nonexistent/ca.pem")),
        };
        match Transport::open_tls("127.0.0.1:1", "localhost", &settings).await {
            Err(ClientError::Connect { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_setup_failures_are_connect_errors() {
        let err = connect_error("127.0.0.1:27993")(io::Error::from(io::ErrorKind::InvalidInput));
        assert!(!err.is_protocol_anomaly());
        match err {
            ClientError::Connect { address, source } => {
                assert_eq!(address, "127.0.0.1:27993");
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_tls_connector_default_roots() {
        assert!(tls_connector(&TlsSettings::default()).is_ok());
    }

    #[test]
    fn test_endpoint_address() {
        let endpoint = Endpoint {
            host: "proj1.example.edu".to_string(),
            port: 27994,
            tls: Some(TlsSettings::default()),
            connect_timeout: None,
        };
        assert_eq!(endpoint.address(), "proj1.example.edu:27994");
    }
}
