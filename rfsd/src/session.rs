//! Per-connection session worker.
//!
//! Each accepted connection gets one `Session` running on its own task:
//! read one request, execute it against the local file system, send one
//! response, repeat until the peer goes away. Sessions share nothing;
//! descriptors opened on behalf of one client live in that session's
//! table and are invisible to every other connection, so a forged
//! descriptor value from elsewhere earns EBADF rather than a file.

use anyhow::Context;
use nix::errno::Errno;
use proto::message::{MAX_IO_LEN, Op, OpResult, PROTOCOL_VERSION, Request, Response};
use proto::streams::{RecvStream, SendStream, WireError};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

pub struct Session {
    peer: std::net::SocketAddr,
    /// Descriptors this client opened, keyed by their wire-visible raw
    /// value. Dropped descriptors are closed by the table on teardown.
    fds: HashMap<RawFd, OwnedFd>,
}

impl Session {
    pub fn new(peer: std::net::SocketAddr) -> Self {
        Self {
            peer,
            fds: HashMap::new(),
        }
    }

    /// Serve one connection to completion. Returns `Ok` on a clean peer
    /// close; any framing or transport error also ends the session.
    pub async fn run(mut self, stream: tokio::net::TcpStream) -> anyhow::Result<()> {
        let (read_half, write_half) = stream.into_split();
        let mut recv = RecvStream::new(read_half);
        let mut send = SendStream::new(write_half);
        loop {
            let request = match recv.recv_message::<Request>().await {
                Ok(Some(request)) => request,
                Ok(None) | Err(WireError::PeerClosed) => {
                    tracing::debug!(peer = %self.peer, "peer closed, session done");
                    break;
                }
                Err(err) => {
                    tracing::warn!(peer = %self.peer, %err, "terminating session");
                    break;
                }
            };
            if request.version != PROTOCOL_VERSION {
                // carried but not enforced
                tracing::debug!(
                    peer = %self.peer,
                    version = request.version,
                    "request with unexpected protocol version"
                );
            }
            tracing::debug!(peer = %self.peer, op = request.op.name(), "request");
            let response = self.execute(request.op).await;
            send.send_message(&response)
                .await
                .context("failed to send response")?;
        }
        if !self.fds.is_empty() {
            tracing::debug!(
                peer = %self.peer,
                leftover = self.fds.len(),
                "closing descriptors the peer left open"
            );
        }
        Ok(())
    }

    fn owned(&self, fd: RawFd) -> Option<RawFd> {
        self.fds.get(&fd).map(AsRawFd::as_raw_fd)
    }

    async fn execute(&mut self, op: Op) -> Response {
        match op {
            Op::Open { flags, mode, path } => match crate::fsops::open(&path, flags, mode) {
                Ok(owned) => {
                    let fd = owned.as_raw_fd();
                    self.fds.insert(fd, owned);
                    tracing::debug!(fd, ?path, "opened");
                    Response::ok(OpResult::Open { fd })
                }
                Err(errno) => Response::from_errno(errno, OpResult::Open { fd: -1 }),
            },
            Op::Read { fd, nbyte } => match self.owned(fd) {
                Some(raw) => {
                    let nbyte = usize::try_from(nbyte).unwrap_or(MAX_IO_LEN).min(MAX_IO_LEN);
                    match crate::fsops::read(raw, nbyte) {
                        Ok(data) => Response::ok(OpResult::Read {
                            ret: data.len() as i64,
                            data,
                        }),
                        Err(errno) => Response::from_errno(
                            errno,
                            OpResult::Read {
                                ret: -1,
                                data: Vec::new(),
                            },
                        ),
                    }
                }
                None => Response::from_errno(
                    Errno::EBADF,
                    OpResult::Read {
                        ret: -1,
                        data: Vec::new(),
                    },
                ),
            },
            Op::Write { fd, data } => match self.owned(fd) {
                Some(raw) => match crate::fsops::write(raw, &data) {
                    Ok(written) => Response::ok(OpResult::Write {
                        ret: written as i64,
                    }),
                    Err(errno) => Response::from_errno(errno, OpResult::Write { ret: -1 }),
                },
                None => Response::from_errno(Errno::EBADF, OpResult::Write { ret: -1 }),
            },
            Op::Close { fd } => match self.fds.remove(&fd) {
                Some(owned) => match crate::fsops::close(owned) {
                    Ok(()) => Response::ok(OpResult::Close { ret: 0 }),
                    Err(errno) => Response::from_errno(errno, OpResult::Close { ret: -1 }),
                },
                None => Response::from_errno(Errno::EBADF, OpResult::Close { ret: -1 }),
            },
            Op::Lseek { fd, offset, whence } => match self.owned(fd) {
                Some(raw) => match crate::fsops::lseek(raw, offset, whence) {
                    Ok(off) => Response::ok(OpResult::Lseek { off }),
                    Err(errno) => Response::from_errno(errno, OpResult::Lseek { off: -1 }),
                },
                None => Response::from_errno(Errno::EBADF, OpResult::Lseek { off: -1 }),
            },
            Op::Stat { path } => match crate::fsops::stat(&path) {
                Ok(stat) => Response::ok(OpResult::Stat {
                    ret: 0,
                    stat: Some(stat),
                }),
                Err(errno) => {
                    Response::from_errno(errno, OpResult::Stat { ret: -1, stat: None })
                }
            },
            Op::Unlink { path } => match crate::fsops::unlink(&path) {
                Ok(()) => Response::ok(OpResult::Unlink { ret: 0 }),
                Err(errno) => Response::from_errno(errno, OpResult::Unlink { ret: -1 }),
            },
            Op::DirEntries { fd, nbytes } => match self.owned(fd) {
                Some(raw) => {
                    let nbytes = usize::try_from(nbytes).unwrap_or(MAX_IO_LEN).min(MAX_IO_LEN);
                    match crate::fsops::getdirentries(raw, nbytes) {
                        Ok((data, basep)) => Response::ok(OpResult::DirEntries {
                            ret: data.len() as i64,
                            basep,
                            data,
                        }),
                        Err(errno) => Response::from_errno(
                            errno,
                            OpResult::DirEntries {
                                ret: -1,
                                basep: 0,
                                data: Vec::new(),
                            },
                        ),
                    }
                }
                None => Response::from_errno(
                    Errno::EBADF,
                    OpResult::DirEntries {
                        ret: -1,
                        basep: 0,
                        data: Vec::new(),
                    },
                ),
            },
            Op::DirTree { path } => match crate::fsops::dir_tree(&path).await {
                Ok(tree) => Response::ok(OpResult::DirTree {
                    ret: 0,
                    data: tree.to_bytes(),
                }),
                Err(errno) => Response::from_errno(
                    errno,
                    OpResult::DirTree {
                        ret: -1,
                        data: Vec::new(),
                    },
                ),
            },
            Op::FreeDirTree => {
                // client-local operation; answering it at all means the
                // peer is confused
                tracing::warn!(peer = %self.peer, "freedirtree arrived on the wire");
                Response::from_errno(Errno::EINVAL, OpResult::None)
            }
        }
    }
}
