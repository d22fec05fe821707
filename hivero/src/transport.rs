//! Length prefixed framing over an async byte stream.
use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Refuse to buffer frames beyond this; a larger announced length means a
/// corrupt stream or a peer speaking another protocol.
const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Framed transport: every message is a 4 byte big endian length followed
/// by that many payload bytes.
pub(crate) struct Framed<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Framed<S> {
    pub(crate) fn new(stream: S) -> Framed<S> {
        Framed { stream }
    }

    pub(crate) async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }

    pub(crate) async fn recv(&mut self) -> io::Result<Bytes> {
        let mut prefix = [0u8; 4];
        self.stream.read_exact(&mut prefix).await?;
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("announced frame length {len} exceeds limit"),
            ));
        }

        let mut payload = BytesMut::zeroed(len);
        self.stream.read_exact(&mut payload).await?;
        Ok(payload.freeze())
    }

    /// Shut down the write half, letting the peer observe EOF.
    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn roundtrips_frames() {
        let (client, server) = tokio::io::duplex(1024);
        let mut tx = Framed::new(client);
        let mut rx = Framed::new(server);

        tx.send(b"hello").await.unwrap();
        tx.send(b"").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().as_ref(), b"hello");
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"");
    }

    #[tokio::test]
    async fn rejects_oversized_announcement() {
        let (client, server) = tokio::io::duplex(64);
        let mut raw = client;
        tokio::io::AsyncWriteExt::write_all(&mut raw, &u32::MAX.to_be_bytes())
            .await
            .unwrap();

        let mut rx = Framed::new(server);
        let err = rx.recv().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
