//! 4-byte big-endian length-prefix framing over the network connection.
//! This is a fixed external wire contract, not an internal transport
//! detail, so it is framed by hand rather than through
//! `tokio_util::codec::LengthDelimitedCodec`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use dispatch_shared::DispatchError;

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), DispatchError> {
    let len = u32::try_from(payload.len()).map_err(|_| DispatchError::InvalidFrame("frame too large".into()))?;
    writer.write_all(&len.to_be_bytes()).await.map_err(DispatchError::Io)?;
    writer.write_all(payload).await.map_err(DispatchError::Io)?;
    writer.flush().await.map_err(DispatchError::Io)
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, DispatchError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await.map_err(DispatchError::Io)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(DispatchError::Io)?;
    Ok(buf)
}
