//! Connection preamble exchange.
//!
//! Before framed traffic begins, the client writes the protocol magic and the
//! version it speaks; the server echoes the same bytes back. Anything else
//! aborts the connection before a single frame is exchanged.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::HandshakeError;

/// Magic bytes opening every connection.
pub const MAGIC: [u8; 4] = *b"PSQL";
/// Protocol version this client implements.
pub const PROTOCOL_VERSION: u16 = 1;

/// Run the client side of the preamble exchange on `stream`.
///
/// # Errors
///
/// Returns [`HandshakeError`] if the exchange fails at the I/O level, if the
/// server's echo does not carry the protocol magic, or if the server answers
/// with a different version.
pub async fn exchange<S>(stream: &mut S) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut preamble = [0u8; 6];
    preamble[..4].copy_from_slice(&MAGIC);
    preamble[4..].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    stream.write_all(&preamble).await?;
    stream.flush().await?;

    let mut echo = [0u8; 6];
    stream.read_exact(&mut echo).await?;
    if echo[..4] != MAGIC {
        return Err(HandshakeError::BadMagic);
    }
    let server = u16::from_be_bytes([echo[4], echo[5]]);
    if server != PROTOCOL_VERSION {
        return Err(HandshakeError::VersionMismatch {
            server,
            client: PROTOCOL_VERSION,
        });
    }
    Ok(())
}

/// Answer the preamble the way a conforming server does.
///
/// Provided for tests and local mock servers: reads the client preamble,
/// validates the magic, and echoes the bytes back.
///
/// # Errors
///
/// Returns [`HandshakeError`] on I/O failure or when the peer's preamble does
/// not start with the protocol magic.
pub async fn accept<S>(stream: &mut S) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut preamble = [0u8; 6];
    stream.read_exact(&mut preamble).await?;
    if preamble[..4] != MAGIC {
        return Err(HandshakeError::BadMagic);
    }
    stream.write_all(&preamble).await?;
    stream.flush().await?;
    Ok(())
}
