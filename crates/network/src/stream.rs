use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::io;

use borsh::{BorshDeserialize, BorshSerialize};
use bytes::Bytes;
use futures_util::{Sink as FuturesSink, SinkExt, Stream as FuturesStream, StreamExt};
use libp2p::Stream as P2pStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::compat::FuturesAsyncReadCompatExt;

use crate::error::TransportError;
use crate::stream::codec::FrameCodec;

mod codec;

pub use codec::MAX_FRAME_LEN;

/// Byte pipe a [`Stream`] can be framed over.
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> StreamIo for T {}

/// A bidirectional, length-delimited frame stream to one peer.
pub struct Stream {
    inner: Framed<Box<dyn StreamIo>, FrameCodec>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

impl Stream {
    #[must_use]
    pub fn new(io: impl StreamIo) -> Self {
        let io: Box<dyn StreamIo> = Box::new(io);
        Self {
            inner: Framed::new(io, FrameCodec::new()),
        }
    }

    pub(crate) fn from_p2p(stream: P2pStream) -> Self {
        Self::new(stream.compat())
    }

    pub async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.inner.send(frame).await?;
        Ok(())
    }

    /// Next frame, or `None` once the remote closed its side.
    pub async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.inner.next().await.transpose().map_err(Into::into)
    }

    pub async fn send_message<T>(&mut self, message: &T) -> Result<(), TransportError>
    where
        T: BorshSerialize,
    {
        let frame = borsh::to_vec(message).map_err(TransportError::Codec)?;
        self.send(frame.into()).await
    }

    pub async fn recv_message<T>(&mut self) -> Result<Option<T>, TransportError>
    where
        T: BorshDeserialize,
    {
        let Some(frame) = self.recv().await? else {
            return Ok(None);
        };

        borsh::from_slice(&frame)
            .map(Some)
            .map_err(TransportError::Codec)
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(&mut self.inner).await?;
        Ok(())
    }
}

impl FuturesStream for Stream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = Pin::new(&mut self.get_mut().inner);
        inner.poll_next(cx)
    }
}

impl FuturesSink<Bytes> for Stream {
    type Error = io::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready_unpin(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.inner.start_send_unpin(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_flush_unpin(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_close_unpin(cx)
    }
}
