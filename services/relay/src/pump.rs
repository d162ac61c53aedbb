//! Bidirectional pump primitive.
//!
//! A pump copies bytes from one stream to another until the source reaches
//! EOF or either side fails. It never interprets or reframes the bytes and
//! holds at most one chunk in flight.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::PumpError;

/// Size of the single in-flight chunk.
pub const PUMP_BUFFER_SIZE: usize = 8192;

/// Which way a pump moves bytes within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToBackend => f.write_str("client->backend"),
            Direction::BackendToClient => f.write_str("backend->client"),
        }
    }
}

/// Copy `reader` into `writer` until EOF.
///
/// `transferred` is advanced after every chunk written, so the count stays
/// accurate even if the returned future is dropped part way. On clean EOF
/// the writer is shut down so the far side sees the end of stream too.
pub async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    transferred: &mut u64,
) -> Result<(), PumpError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Err(PumpError::from_read(e)),
        };
        writer
            .write_all(&buf[..n])
            .await
            .map_err(PumpError::from_write)?;
        *transferred += n as u64;
    }

    match writer.shutdown().await {
        Ok(()) => Ok(()),
        // Peer already gone; the stream ended cleanly on our side.
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(PumpError::from_write(e)),
    }
}
