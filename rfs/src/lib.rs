//! Client library for transparent remote file access.
//!
//! A [`Client`] owns one TCP connection to the file server for the life
//! of the process and exposes one async stub per file operation. Stubs
//! mirror the host call they stand in for: errno-style failures come back
//! as [`nix::errno::Errno`] values inside [`ClientError::Os`], short reads
//! and writes are reported faithfully, and paths travel verbatim.
//!
//! # Descriptor routing
//!
//! Descriptors returned by [`Client::open`] live above
//! [`fd_table::REMOTE_FD_BASE`] and are serviced over the wire; any other
//! descriptor passed to a stub is serviced locally with the plain host
//! call and never touches the connection. Operations that take no
//! descriptor (open, stat, unlink, getdirtree) are always remote - the
//! server's file system is the file universe they operate on.
//!
//! # Concurrency
//!
//! The protocol is strictly synchronous request/response. The connection
//! and the descriptor table sit behind one async mutex, so overlapping
//! calls from different tasks serialize at the send-then-receive critical
//! section and request/response pairs can never interleave.
//!
//! # Failure
//!
//! There is no retry and no reconnect. A framing or transport error
//! ([`ClientError::Wire`]) means the session is over; subsequent remote
//! calls will keep failing. This mirrors the process-lifetime connection
//! model of the service.

pub mod fd_table;
mod local;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::Whence;
use std::os::fd::RawFd;
use std::path::Path;

use fd_table::{FdClass, FdTable, FdTableOverflow};
use proto::message::{Op, OpResult, Request};
use proto::streams::{Connection, WireError};
use proto::{DirTree, FileStat, TreeDecodeError};

pub use fd_table::{MAX_REMOTE_FDS, REMOTE_FD_BASE};

/// Errors surfaced by the client stubs.
///
/// `Os` is the ordinary errno channel of the operation itself (local or
/// remote); everything else is terminal for the session.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The operation failed with an errno, reported by the server or by
    /// the local call.
    #[error(transparent)]
    Os(#[from] Errno),
    /// Framing or transport failure; the session is unusable.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The server's reply did not match the request opcode.
    #[error("unexpected response body for {op}")]
    UnexpectedResponse { op: &'static str },
    /// A directory tree payload failed to decode.
    #[error(transparent)]
    Tree(#[from] TreeDecodeError),
    /// The remote descriptor namespace is exhausted.
    #[error(transparent)]
    FdTableOverflow(#[from] FdTableOverflow),
}

pub type Result<T> = std::result::Result<T, ClientError>;

struct Inner {
    conn: Connection,
    fds: FdTable,
}

/// Handle to one client session. Cheap to share by reference; all stubs
/// take `&self`.
pub struct Client {
    inner: tokio::sync::Mutex<Inner>,
}

impl Client {
    /// Connect to the server at `addr`. Failure to connect is fatal for
    /// the would-be session; there is no retry.
    pub async fn connect(addr: std::net::SocketAddr) -> Result<Self> {
        let conn = Connection::connect(addr).await?;
        tracing::debug!("connected to file server at {addr}");
        Ok(Self {
            inner: tokio::sync::Mutex::new(Inner {
                conn,
                fds: FdTable::new(),
            }),
        })
    }

    /// Connect using the `server15440` / `serverport15440` environment
    /// variables, falling back to `127.0.0.1:15440`.
    pub async fn from_env() -> Result<Self> {
        Self::connect(proto::config::client_server_addr()).await
    }

    /// Open `path` on the server. Always remote: the returned descriptor
    /// lives above [`REMOTE_FD_BASE`] and must be handed back to this
    /// client's stubs.
    pub async fn open(&self, path: impl AsRef<Path>, flags: OFlag, mode: Mode) -> Result<RawFd> {
        let path = path.as_ref();
        tracing::trace!(?path, "open");
        let mut inner = self.inner.lock().await;
        let response = inner
            .conn
            .round_trip(&Request::new(Op::Open {
                flags: flags.bits(),
                mode: mode.bits(),
                path: path.to_path_buf(),
            }))
            .await?;
        match response.result {
            OpResult::Open { fd } if fd < 0 => Err(Errno::from_raw(response.errno).into()),
            OpResult::Open { fd } => Ok(inner.fds.externalize(fd)?),
            _ => Err(ClientError::UnexpectedResponse { op: "open" }),
        }
    }

    /// Read up to `buf.len()` bytes from `fd` into `buf`. Short reads are
    /// reported faithfully; zero means end of file.
    pub async fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        if inner.fds.classify(fd) == FdClass::Local {
            drop(inner);
            return Ok(local::read(fd, buf)?);
        }
        let internal = inner.fds.internalize(fd);
        tracing::trace!(fd, internal, nbyte = buf.len(), "remote read");
        let response = inner
            .conn
            .round_trip(&Request::new(Op::Read {
                fd: internal,
                nbyte: buf.len() as u64,
            }))
            .await?;
        match response.result {
            OpResult::Read { ret, .. } if ret < 0 => Err(Errno::from_raw(response.errno).into()),
            OpResult::Read { data, .. } => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            _ => Err(ClientError::UnexpectedResponse { op: "read" }),
        }
    }

    /// Write `buf` to `fd`, returning the number of bytes the server (or
    /// the local call) accepted, which may be short.
    pub async fn write(&self, fd: RawFd, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        if inner.fds.classify(fd) == FdClass::Local {
            drop(inner);
            return Ok(local::write(fd, buf)?);
        }
        let internal = inner.fds.internalize(fd);
        tracing::trace!(fd, internal, count = buf.len(), "remote write");
        let response = inner
            .conn
            .round_trip(&Request::new(Op::Write {
                fd: internal,
                data: buf.to_vec(),
            }))
            .await?;
        match response.result {
            OpResult::Write { ret } if ret < 0 => Err(Errno::from_raw(response.errno).into()),
            OpResult::Write { ret } => Ok(ret as usize),
            _ => Err(ClientError::UnexpectedResponse { op: "write" }),
        }
    }

    /// Close `fd`. A remote descriptor is retired from the table even if
    /// the server reports a failure, matching standard close semantics.
    pub async fn close(&self, fd: RawFd) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.fds.classify(fd) == FdClass::Local {
            drop(inner);
            return Ok(local::close(fd)?);
        }
        let internal = inner.fds.internalize(fd);
        tracing::trace!(fd, internal, "remote close");
        let response = inner
            .conn
            .round_trip(&Request::new(Op::Close { fd: internal }))
            .await;
        // retired regardless of the outcome, including transport failure
        inner.fds.retire(internal);
        let response = response?;
        match response.result {
            OpResult::Close { ret } if ret < 0 => Err(Errno::from_raw(response.errno).into()),
            OpResult::Close { .. } => Ok(()),
            _ => Err(ClientError::UnexpectedResponse { op: "close" }),
        }
    }

    /// Reposition the offset of `fd`, returning the new offset.
    pub async fn lseek(&self, fd: RawFd, offset: i64, whence: Whence) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        if inner.fds.classify(fd) == FdClass::Local {
            drop(inner);
            return Ok(local::lseek(fd, offset, whence as i32)?);
        }
        let internal = inner.fds.internalize(fd);
        tracing::trace!(fd, internal, offset, "remote lseek");
        let response = inner
            .conn
            .round_trip(&Request::new(Op::Lseek {
                fd: internal,
                offset,
                whence: whence as i32,
            }))
            .await?;
        match response.result {
            OpResult::Lseek { off } if off < 0 => Err(Errno::from_raw(response.errno).into()),
            OpResult::Lseek { off } => Ok(off),
            _ => Err(ClientError::UnexpectedResponse { op: "lseek" }),
        }
    }

    /// Status of the file at `path` on the server.
    pub async fn stat(&self, path: impl AsRef<Path>) -> Result<FileStat> {
        let path = path.as_ref();
        tracing::trace!(?path, "stat");
        let mut inner = self.inner.lock().await;
        let response = inner
            .conn
            .round_trip(&Request::new(Op::Stat {
                path: path.to_path_buf(),
            }))
            .await?;
        match response.result {
            OpResult::Stat { ret, .. } if ret < 0 => Err(Errno::from_raw(response.errno).into()),
            OpResult::Stat {
                stat: Some(stat), ..
            } => Ok(stat),
            _ => Err(ClientError::UnexpectedResponse { op: "stat" }),
        }
    }

    /// Remove the file at `path` on the server.
    pub async fn unlink(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tracing::trace!(?path, "unlink");
        let mut inner = self.inner.lock().await;
        let response = inner
            .conn
            .round_trip(&Request::new(Op::Unlink {
                path: path.to_path_buf(),
            }))
            .await?;
        match response.result {
            OpResult::Unlink { ret } if ret < 0 => Err(Errno::from_raw(response.errno).into()),
            OpResult::Unlink { .. } => Ok(()),
            _ => Err(ClientError::UnexpectedResponse { op: "unlink" }),
        }
    }

    /// Read raw directory entries from `fd` into `buf`. On a positive
    /// return the entry bytes are copied out and `basep` receives the
    /// updated directory offset; on zero (end of directory) both are left
    /// untouched.
    pub async fn getdirentries(
        &self,
        fd: RawFd,
        buf: &mut [u8],
        basep: &mut i64,
    ) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        if inner.fds.classify(fd) == FdClass::Local {
            drop(inner);
            return Ok(local::getdirentries(fd, buf, basep)?);
        }
        let internal = inner.fds.internalize(fd);
        tracing::trace!(fd, internal, nbytes = buf.len(), "remote getdirentries");
        let response = inner
            .conn
            .round_trip(&Request::new(Op::DirEntries {
                fd: internal,
                nbytes: buf.len() as u64,
            }))
            .await?;
        match response.result {
            OpResult::DirEntries { ret, .. } if ret < 0 => {
                Err(Errno::from_raw(response.errno).into())
            }
            OpResult::DirEntries { ret, basep: base, data } => {
                if ret > 0 {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    *basep = base;
                    Ok(n)
                } else {
                    Ok(0)
                }
            }
            _ => Err(ClientError::UnexpectedResponse { op: "getdirentries" }),
        }
    }

    /// Fetch the directory tree rooted at `path` from the server. The
    /// returned tree is owned by the caller; release it with
    /// [`free_dir_tree`] (or just drop it).
    pub async fn get_dir_tree(&self, path: impl AsRef<Path>) -> Result<DirTree> {
        let path = path.as_ref();
        tracing::trace!(?path, "getdirtree");
        let mut inner = self.inner.lock().await;
        let response = inner
            .conn
            .round_trip(&Request::new(Op::DirTree {
                path: path.to_path_buf(),
            }))
            .await?;
        match response.result {
            OpResult::DirTree { ret, .. } if ret < 0 => {
                Err(Errno::from_raw(response.errno).into())
            }
            OpResult::DirTree { data, .. } => Ok(DirTree::from_bytes(&data)?),
            _ => Err(ClientError::UnexpectedResponse { op: "getdirtree" }),
        }
    }
}

/// Release a tree returned by [`Client::get_dir_tree`]. Purely local;
/// never sends anything.
pub fn free_dir_tree(tree: DirTree) {
    drop(tree);
}
