use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use std::{io, sync::Arc};

/// Once [`Connector::upgrade`] has consumed the plain stream there is no
/// handle left to write unencrypted bytes with.
#[async_trait]
pub trait Connector: Send + Sync {
    type Plain: AsyncRead + AsyncWrite + Unpin + Send;
    type Secure: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Plain>;

    async fn upgrade(&self, stream: Self::Plain, host: &str) -> io::Result<Self::Secure>;
}

#[derive(Clone)]
pub struct StartTlsConnector {
    tls: tokio_rustls::TlsConnector,
}

impl StartTlsConnector {
    /// Trusts the Mozilla root set shipped with `webpki-roots`.
    pub fn new() -> Result<Self, rustls::Error> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_root_certificates(roots)
    }

    pub fn with_root_certificates(roots: RootCertStore) -> Result<Self, rustls::Error> {
        let config =
            ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(roots)
                .with_no_client_auth();

        Ok(Self {
            tls: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl Connector for StartTlsConnector {
    type Plain = TcpStream;
    type Secure = TlsStream<TcpStream>;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn upgrade(&self, stream: TcpStream, host: &str) -> io::Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.tls.connect(server_name, stream).await
    }
}

pub enum Connection<P, S> {
    Plain(BufReader<P>),
    Tls(BufReader<S>),
}

impl<P, S> Connection<P, S>
where
    P: AsyncRead + AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn plain(stream: P) -> Self {
        Self::Plain(BufReader::new(stream))
    }

    pub fn tls(stream: S) -> Self {
        Self::Tls(BufReader::new(stream))
    }

    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads up to and including `\n`, but never more than `limit` bytes.
    pub async fn read_line(&mut self, buf: &mut Vec<u8>, limit: usize) -> io::Result<usize> {
        let limit = u64::try_from(limit).unwrap_or(u64::MAX);
        match self {
            Self::Plain(r) => r.take(limit).read_until(b'\n', buf).await,
            Self::Tls(r) => r.take(limit).read_until(b'\n', buf).await,
        }
    }

    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(r) => {
                r.get_mut().write_all(data).await?;
                r.get_mut().flush().await
            }
            Self::Tls(r) => {
                r.get_mut().write_all(data).await?;
                r.get_mut().flush().await
            }
        }
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(r) => r.get_mut().shutdown().await,
            Self::Tls(r) => r.get_mut().shutdown().await,
        }
    }

    /// Refuses when the server has already sent bytes past the STARTTLS reply.
    pub fn into_plain(self) -> Result<P, Self> {
        match self {
            Self::Plain(reader) if reader.buffer().is_empty() => Ok(reader.into_inner()),
            other => Err(other),
        }
    }
}
