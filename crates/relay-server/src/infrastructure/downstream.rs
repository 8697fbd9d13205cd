//! Connection to the local management endpoint.
//!
//! One [`DownstreamBridge`] belongs to one console session.  The connection
//! is opened lazily on the first authenticated request and kept for the rest
//! of the session.  If the endpoint cannot be reached, or the connection
//! breaks mid-request, the console receives a well-formed error reply and
//! the session stays open; the next request tries to connect again.
//! Requests are never retried.

use async_trait::async_trait;
use relay_core::protocol::messages::{error_reply, LOCAL_ENDPOINT_LOST, NO_LOCAL_ENDPOINT};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::{debug, warn};

use crate::application::Downstream;
use crate::domain::DownstreamEndpoint;
use crate::error::RelayError;
use crate::infrastructure::frame_io::{write_frame, FrameReader};

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

struct Link {
    reader: FrameReader<BoxedRead>,
    writer: BoxedWrite,
}

pub struct DownstreamBridge {
    endpoint: DownstreamEndpoint,
    max_frame_bytes: usize,
    link: Option<Link>,
}

impl DownstreamBridge {
    pub fn new(endpoint: DownstreamEndpoint, max_frame_bytes: usize) -> Self {
        Self {
            endpoint,
            max_frame_bytes,
            link: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    async fn connect(
        endpoint: &DownstreamEndpoint,
        max_frame_bytes: usize,
    ) -> std::io::Result<Link> {
        let (reader, writer): (BoxedRead, BoxedWrite) = match endpoint {
            DownstreamEndpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                let (r, w) = stream.into_split();
                (Box::new(r), Box::new(w))
            }
            #[cfg(unix)]
            DownstreamEndpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                let (r, w) = stream.into_split();
                (Box::new(r), Box::new(w))
            }
        };
        Ok(Link {
            reader: FrameReader::with_limit(reader, max_frame_bytes),
            writer,
        })
    }

    async fn exchange(link: &mut Link, request: &[u8]) -> Result<Vec<u8>, RelayError> {
        write_frame(&mut link.writer, request).await?;
        link.reader
            .read_frame()
            .await?
            .ok_or(RelayError::DownstreamClosed)
    }
}

#[async_trait]
impl Downstream for DownstreamBridge {
    async fn forward(&mut self, request: &[u8]) -> Vec<u8> {
        if self.link.is_none() {
            match Self::connect(&self.endpoint, self.max_frame_bytes).await {
                Ok(link) => {
                    debug!(endpoint = %self.endpoint, "connected to local endpoint");
                    self.link = Some(link);
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, "local endpoint unreachable: {e}");
                    return error_reply(NO_LOCAL_ENDPOINT);
                }
            }
        }
        let Some(link) = self.link.as_mut() else {
            return error_reply(NO_LOCAL_ENDPOINT);
        };

        match Self::exchange(link, request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(endpoint = %self.endpoint, "local endpoint connection lost: {e}");
                self.link = None;
                error_reply(LOCAL_ENDPOINT_LOST)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
