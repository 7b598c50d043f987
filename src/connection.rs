//! TCP connection to a pub/sub SQL server.
//!
//! `Connection` owns the socket for exactly one server conversation: it
//! establishes the transport, runs the preamble exchange under the connect
//! timeout, and layers the [`WireCodec`] on top. Splitting yields the sink
//! the session sends on and the stream the reader task drains; the
//! `Connection` itself is consumed, so only one reader can ever exist per
//! connection.

use std::net::SocketAddr;

use futures::StreamExt;
use futures::stream::{SplitSink, SplitStream};
use log::info;
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::Framed;

use crate::{
    codec::WireCodec,
    config::{ServerAddr, SessionConfig},
    error::ConnectError,
    frame::Frame,
    preamble,
};

/// Send half of a split connection.
pub type FrameSink = SplitSink<Framed<TcpStream, WireCodec>, Frame>;
/// Receive half of a split connection.
pub type FrameStream = SplitStream<Framed<TcpStream, WireCodec>>;

/// One established, handshaken connection.
#[derive(Debug)]
pub struct Connection {
    framed: Framed<TcpStream, WireCodec>,
    peer: SocketAddr,
}

impl Connection {
    /// Connect to `addr`, run the preamble exchange, and frame the stream.
    ///
    /// The configured connect timeout covers both the TCP connect and the
    /// handshake; on any failure the socket is dropped and no frames were
    /// exchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::TimedOut`] when the timeout elapses,
    /// [`ConnectError::Refused`] when the transport cannot be established,
    /// and [`ConnectError::HandshakeFailed`] when the server's preamble echo
    /// is wrong.
    pub async fn connect(addr: &ServerAddr, config: &SessionConfig) -> Result<Self, ConnectError> {
        let attempt = async {
            let mut stream = TcpStream::connect((addr.host(), addr.port()))
                .await
                .map_err(ConnectError::Refused)?;
            stream.set_nodelay(true).map_err(ConnectError::Refused)?;
            preamble::exchange(&mut stream)
                .await
                .map_err(ConnectError::HandshakeFailed)?;
            Ok::<TcpStream, ConnectError>(stream)
        };
        let stream = timeout(config.connect_timeout_value(), attempt)
            .await
            .map_err(|_| ConnectError::TimedOut)??;
        let peer = stream.peer_addr().map_err(ConnectError::Refused)?;
        info!("connection established to {peer}");
        Ok(Self {
            framed: Framed::new(stream, WireCodec::new(config.max_frame_length_value())),
            peer,
        })
    }

    /// Address of the connected server.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr { self.peer }

    /// Split into independent send and receive halves.
    #[must_use]
    pub fn split(self) -> (FrameSink, FrameStream) { self.framed.split() }
}
