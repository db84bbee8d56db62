//! File server daemon for the rfs tools.
//!
//! The server owns one listening socket and spawns an isolated
//! [`session::Session`] task per accepted connection. Workers share no
//! state: each session carries its own descriptor table and its failure
//! ends only that connection, while the accept loop keeps serving the
//! rest.

pub mod fsops;
pub mod session;

use anyhow::Context;

const LISTEN_BACKLOG: i32 = 64;

pub struct Server {
    listener: tokio::net::TcpListener,
}

impl Server {
    /// Bind the listening socket with address reuse enabled. Pass port 0
    /// to let the kernel pick one (used by the test suite).
    pub fn bind(addr: std::net::SocketAddr) -> anyhow::Result<Self> {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )
        .context("failed to create listening socket")?;
        socket
            .set_reuse_address(true)
            .context("failed to set SO_REUSEADDR")?;
        socket
            .bind(&addr.into())
            .with_context(|| format!("failed to bind {addr}"))?;
        socket
            .listen(LISTEN_BACKLOG)
            .context("failed to listen")?;
        socket
            .set_nonblocking(true)
            .context("failed to set non-blocking")?;
        let listener = tokio::net::TcpListener::from_std(socket.into())
            .context("failed to register listener with the runtime")?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to read bound address")
    }

    /// Accept connections forever, one session task each. A session
    /// ending (cleanly or not) never disturbs the accept loop.
    pub async fn serve(self) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await.context("accept failed")?;
            tracing::info!(%peer, "accepted connection");
            tokio::spawn(async move {
                if let Err(err) = session::Session::new(peer).run(stream).await {
                    tracing::warn!(%peer, "session ended with error: {err:#}");
                }
            });
        }
    }
}
