//! # TCP Development Transport
//!
//! Plain TCP `MessageChannel` for running probers against each other on a
//! local network. It is not authenticated or encrypted.
//!
//! ## Framing
//!
//! ```text
//! hello: identity (64 bytes) | version (u32 BE) | listen port (u16 BE, 0 = none)
//! frame: length (u32 BE) | code (u64 BE) | payload (length bytes)
//! ```
//!
//! Both sides write their hello first and then read the other's. The
//! session version is the lower of the two, and must be one the `eth`
//! protocol defines.
//!
//! The remote address of a dialed session is the address dialed. For an
//! accepted session it is the remote host with its advertised listen port,
//! never the ephemeral source port; a remote that does not listen has none.
//!
//! Frames above `PROTOCOL_MAX_MSG_SIZE` are skipped on the socket and
//! surfaced with their declared size and an empty payload, so the protocol
//! layer rejects them. Frames above `MAX_FRAME_SIZE` end the session.

use async_trait::async_trait;
use cp_01_peer_registry::{
    MessageChannel, RawMessage, TransportError, PROTOCOL_MAX_MSG_SIZE, PROTOCOL_VERSIONS,
};
use shared_types::{PeerIdentity, PEER_IDENTITY_LEN};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Hard limit on a declared frame length.
pub const MAX_FRAME_SIZE: u32 = 4 * PROTOCOL_MAX_MSG_SIZE;

/// Deadline for TCP connect and for the hello exchange.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Local side of the hello exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    pub identity: PeerIdentity,
    pub version: u32,
    /// Port this node accepts sessions on, 0 when it does not listen.
    pub listen_port: u16,
}

/// One TCP session with a remote prober.
pub struct TcpChannel {
    remote: PeerIdentity,
    version: u32,
    remote_addr: Option<SocketAddr>,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpChannel {
    /// Dial `addr` and run the hello exchange.
    pub async fn connect(addr: SocketAddr, local: Hello) -> Result<Self, TransportError> {
        let stream = tokio::time::timeout(SESSION_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Session(format!("connect to {} timed out", addr)))?
            .map_err(io_error)?;
        debug!(%addr, "Connected");
        let (mut channel, _) = Self::establish(stream, addr, local).await?;
        channel.remote_addr = Some(addr);
        Ok(channel)
    }

    /// Run the hello exchange on an accepted socket.
    pub async fn accept(
        stream: TcpStream,
        addr: SocketAddr,
        local: Hello,
    ) -> Result<Self, TransportError> {
        let (mut channel, listen_port) = Self::establish(stream, addr, local).await?;
        channel.remote_addr = (listen_port != 0).then(|| SocketAddr::new(addr.ip(), listen_port));
        Ok(channel)
    }

    /// Returns the session and the remote's advertised listen port.
    async fn establish(
        stream: TcpStream,
        addr: SocketAddr,
        local: Hello,
    ) -> Result<(Self, u16), TransportError> {
        stream.set_nodelay(true).map_err(io_error)?;
        let (mut read_half, mut write_half) = stream.into_split();

        let exchange = async {
            write_half.write_all(local.identity.as_bytes()).await?;
            write_half.write_u32(local.version).await?;
            write_half.write_u16(local.listen_port).await?;
            write_half.flush().await?;

            let mut identity = [0u8; PEER_IDENTITY_LEN];
            read_half.read_exact(&mut identity).await?;
            let remote_version = read_half.read_u32().await?;
            let listen_port = read_half.read_u16().await?;
            Ok::<_, std::io::Error>((PeerIdentity::new(identity), remote_version, listen_port))
        };
        let (remote, remote_version, listen_port) = tokio::time::timeout(SESSION_TIMEOUT, exchange)
            .await
            .map_err(|_| TransportError::Session(format!("hello from {} timed out", addr)))?
            .map_err(io_error)?;

        let negotiated = local.version.min(remote_version);
        if !PROTOCOL_VERSIONS.contains(&negotiated) {
            return Err(TransportError::Session(format!(
                "no common protocol version (ours {}, theirs {})",
                local.version, remote_version
            )));
        }

        let channel = Self {
            remote,
            version: negotiated,
            remote_addr: None,
            reader: Mutex::new(read_half),
            writer: Mutex::new(write_half),
        };
        Ok((channel, listen_port))
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe => TransportError::Closed,
        _ => TransportError::Io(e.to_string()),
    }
}

#[async_trait]
impl MessageChannel for TcpChannel {
    async fn send(&self, msg: RawMessage) -> Result<(), TransportError> {
        let len = u32::try_from(msg.payload.len()).map_err(|_| TransportError::FrameTooLarge {
            size: u32::MAX,
            max: MAX_FRAME_SIZE,
        })?;
        let mut writer = self.writer.lock().await;
        writer.write_u32(len).await.map_err(io_error)?;
        writer.write_u64(msg.code).await.map_err(io_error)?;
        writer.write_all(&msg.payload).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)
    }

    async fn recv(&self) -> Result<RawMessage, TransportError> {
        let mut reader = self.reader.lock().await;
        let size = reader.read_u32().await.map_err(io_error)?;
        let code = reader.read_u64().await.map_err(io_error)?;

        if size > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }
        if size > PROTOCOL_MAX_MSG_SIZE {
            let mut skipped = (&mut *reader).take(u64::from(size));
            tokio::io::copy(&mut skipped, &mut tokio::io::sink())
                .await
                .map_err(io_error)?;
            return Ok(RawMessage {
                code,
                size,
                payload: Vec::new(),
            });
        }

        let mut payload = vec![0u8; size as usize];
        reader.read_exact(&mut payload).await.map_err(io_error)?;
        Ok(RawMessage {
            code,
            size,
            payload,
        })
    }

    fn remote_identity(&self) -> PeerIdentity {
        self.remote
    }

    fn protocol_version(&self) -> u32 {
        self.version
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}
