//! Framed message streams over a TCP connection.
//!
//! Each frame is a length prefix followed by one bincode-encoded message.
//! Receiving loops until the frame is complete, so partial reads on the
//! stream never surface to callers; a clean end-of-stream between frames
//! is reported as [`WireError::PeerClosed`] and ends the session.

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::message::{Request, Response};

/// Terminal session errors produced by the framing layer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The peer closed the connection (zero-byte read at a frame
    /// boundary, or mid-frame end-of-stream).
    #[error("peer closed the connection")]
    PeerClosed,
    /// Transport-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A complete frame arrived but its bytes do not decode.
    #[error("malformed frame: {0}")]
    Malformed(#[from] bincode::Error),
}

/// Framed send half for length-delimited messages.
///
/// Generic over the underlying writer type so it works with either half
/// of a split TCP stream or any other `AsyncWrite`.
#[derive(Debug)]
pub struct SendStream<W = OwnedWriteHalf> {
    framed: tokio_util::codec::FramedWrite<W, tokio_util::codec::LengthDelimitedCodec>,
}

impl<W: AsyncWrite + Unpin> SendStream<W> {
    pub fn new(stream: W) -> Self {
        let framed = tokio_util::codec::FramedWrite::new(
            stream,
            tokio_util::codec::LengthDelimitedCodec::new(),
        );
        Self { framed }
    }

    /// Encode one message and send it as a single frame.
    pub async fn send_message<T: serde::Serialize>(&mut self, obj: &T) -> Result<(), WireError> {
        let bytes = bincode::serialize(obj)?;
        self.framed.send(bytes::Bytes::from(bytes)).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), WireError> {
        self.framed.close().await?;
        Ok(())
    }
}

/// Framed receive half for length-delimited messages.
#[derive(Debug)]
pub struct RecvStream<R = OwnedReadHalf> {
    framed: tokio_util::codec::FramedRead<R, tokio_util::codec::LengthDelimitedCodec>,
}

impl<R: AsyncRead + Unpin> RecvStream<R> {
    pub fn new(stream: R) -> Self {
        let framed = tokio_util::codec::FramedRead::new(
            stream,
            tokio_util::codec::LengthDelimitedCodec::new(),
        );
        Self { framed }
    }

    /// Receive one message, or `None` when the peer closed cleanly
    /// between frames.
    pub async fn recv_message<T: serde::de::DeserializeOwned>(
        &mut self,
    ) -> Result<Option<T>, WireError> {
        match futures::StreamExt::next(&mut self.framed).await {
            Some(frame) => {
                let bytes = frame?;
                let obj = bincode::deserialize(&bytes)?;
                Ok(Some(obj))
            }
            None => Ok(None),
        }
    }
}

/// Bidirectional request/response connection used by the client.
///
/// One request elicits exactly one response; [`Connection::round_trip`]
/// is the whole critical section and the caller is expected to serialize
/// access (the client holds it behind a mutex).
#[derive(Debug)]
pub struct Connection {
    send: SendStream,
    recv: RecvStream,
}

impl Connection {
    /// Wrap an established TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            send: SendStream::new(write_half),
            recv: RecvStream::new(read_half),
        }
    }

    /// Connect to the server; a failure here is fatal for the session.
    pub async fn connect(addr: std::net::SocketAddr) -> Result<Self, WireError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    pub async fn send_request(&mut self, request: &Request) -> Result<(), WireError> {
        self.send.send_message(request).await
    }

    /// Receive the response to the request just sent. The peer vanishing
    /// mid-exchange is terminal, hence `PeerClosed` rather than `None`.
    pub async fn recv_response(&mut self) -> Result<Response, WireError> {
        self.recv
            .recv_message::<Response>()
            .await?
            .ok_or(WireError::PeerClosed)
    }

    pub async fn round_trip(&mut self, request: &Request) -> Result<Response, WireError> {
        self.send_request(request).await?;
        self.recv_response().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Op, OpResult};

    #[tokio::test]
    async fn request_frames_round_trip_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let mut recv = RecvStream::new(read_half);
            let mut send = SendStream::new(write_half);
            let request: Request = recv.recv_message().await.unwrap().unwrap();
            assert_eq!(request.op.name(), "unlink");
            send.send_message(&Response::ok(OpResult::Unlink { ret: 0 }))
                .await
                .unwrap();
            // next receive observes the client going away
            let eof: Option<Request> = recv.recv_message().await.unwrap();
            assert!(eof.is_none());
        });

        let mut conn = Connection::connect(addr).await.unwrap();
        let response = conn
            .round_trip(&Request::new(Op::Unlink {
                path: "/tmp/frame".into(),
            }))
            .await
            .unwrap();
        assert_eq!(response, Response::ok(OpResult::Unlink { ret: 0 }));
        drop(conn);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_silence_then_close_is_peer_closed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        let mut conn = Connection::connect(addr).await.unwrap();
        server.await.unwrap();
        let err = conn
            .round_trip(&Request::new(Op::Close { fd: 0 }))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::PeerClosed | WireError::Io(_)));
    }
}
