//! Wire protocol for the rfs remote file access tools.
//!
//! # Protocol Overview
//!
//! A client process holds exactly one TCP connection to the server and
//! issues strictly synchronous request/response pairs over it. Every frame
//! is length-delimited and carries one bincode-encoded message.
//!
//! ```text
//! Client                                Server
//!   |                                      |
//!   |  ---- Request { Open } ----------->  |  open(2), record descriptor
//!   |  <--- Response { errno, fd } ------  |
//!   |                                      |
//!   |  ---- Request { Write } ---------->  |  write(2)
//!   |  <--- Response { errno, ret } -----  |
//!   |  ---- Request { Read } ----------->  |  read(2)
//!   |  <--- Response { errno, data } ----  |
//!   |                                      |
//!   |  ---- Request { Close } ---------->  |  close(2), drop descriptor
//!   |  <--- Response { errno, ret } -----  |
//!   |  (socket close)                      |  session worker exits
//! ```
//!
//! Requests on one connection are executed in order and answered in order;
//! there is no pipelining, no retry and no reconnect. A closed or broken
//! connection terminates the session on both sides.
//!
//! # Key Components
//!
//! - [`message`] - request/response types, one [`message::Op`] variant per
//!   remote operation, plus the [`message::FileStat`] record that replaces
//!   the host's `struct stat` on the wire.
//! - [`streams`] - framed send/receive halves over a TCP stream and the
//!   [`streams::Connection`] wrapper used by the client.
//! - [`dirtree`] - the serialized directory tree exchanged by the
//!   `GetDirTree` operation.
//! - [`config`] - environment variable handling shared by client and
//!   server.
//!
//! # Wire Format
//!
//! Integers are fixed-width little-endian and variable-length fields are
//! length-prefixed (bincode); frames carry a length prefix via
//! [`tokio_util::codec::LengthDelimitedCodec`]. The directory tree payload
//! uses its own byte-exact layout, see [`dirtree`]. Client and server
//! interoperate across architectures as long as both speak this format;
//! there is no compatibility with memory-image encodings.

pub mod config;
pub mod dirtree;
pub mod message;
pub mod streams;

pub use dirtree::{DirTree, TreeDecodeError};
pub use message::{FileStat, Op, OpResult, Request, Response, MAX_IO_LEN, PROTOCOL_VERSION};
pub use streams::{Connection, RecvStream, SendStream, WireError};
