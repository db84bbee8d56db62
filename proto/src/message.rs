//! Request and response messages exchanged between client and server.
//!
//! Each remote operation is one [`Op`] variant inside a [`Request`] and is
//! answered by exactly one [`Response`] whose [`OpResult`] variant mirrors
//! the operation. The response header carries the raw errno of the
//! server-side call (0 when the call succeeded); success or failure is
//! decided by the return value inside the result, exactly like the host
//! calls being forwarded.

use serde::{Deserialize, Serialize};

/// Current protocol version, carried in every request header.
///
/// The field is reserved for compatibility checking; the server logs a
/// mismatch but does not reject it.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single data payload (read, write, directory entries).
///
/// The server clamps requested byte counts to this value so a response
/// frame always fits the codec's frame limit.
pub const MAX_IO_LEN: usize = 1 << 20;

/// Operation requested by the client, with its opcode-specific body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Op {
    Open {
        flags: i32,
        mode: u32,
        path: std::path::PathBuf,
    },
    Read {
        fd: i32,
        nbyte: u64,
    },
    Write {
        fd: i32,
        data: Vec<u8>,
    },
    Close {
        fd: i32,
    },
    Lseek {
        fd: i32,
        offset: i64,
        whence: i32,
    },
    Stat {
        path: std::path::PathBuf,
    },
    Unlink {
        path: std::path::PathBuf,
    },
    DirEntries {
        fd: i32,
        nbytes: u64,
    },
    DirTree {
        path: std::path::PathBuf,
    },
    /// Listed in the opcode set but serviced on the client; a server
    /// receiving it answers EINVAL.
    FreeDirTree,
}

impl Op {
    /// Operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Open { .. } => "open",
            Op::Read { .. } => "read",
            Op::Write { .. } => "write",
            Op::Close { .. } => "close",
            Op::Lseek { .. } => "lseek",
            Op::Stat { .. } => "stat",
            Op::Unlink { .. } => "unlink",
            Op::DirEntries { .. } => "getdirentries",
            Op::DirTree { .. } => "getdirtree",
            Op::FreeDirTree => "freedirtree",
        }
    }
}

/// Request frame: fixed header fields plus the opcode body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Request {
    pub version: u32,
    /// Reserved, must be 0.
    pub flags: u32,
    pub op: Op,
}

impl Request {
    pub fn new(op: Op) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            flags: 0,
            op,
        }
    }
}

/// Result body of a response, one variant per operation.
///
/// Return values keep the host call's signedness so failures (-1) travel
/// verbatim alongside the errno in the response header.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum OpResult {
    Open {
        fd: i32,
    },
    Read {
        ret: i64,
        data: Vec<u8>,
    },
    Write {
        ret: i64,
    },
    Close {
        ret: i32,
    },
    Lseek {
        off: i64,
    },
    Stat {
        ret: i32,
        stat: Option<FileStat>,
    },
    Unlink {
        ret: i32,
    },
    DirEntries {
        ret: i64,
        basep: i64,
        data: Vec<u8>,
    },
    DirTree {
        ret: i32,
        data: Vec<u8>,
    },
    /// Empty body, used when an operation has nothing to return
    /// (e.g. the EINVAL reply to an unserviceable opcode).
    None,
}

/// Response frame: errno header plus the result body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Response {
    /// Raw errno captured after the server-side call, 0 if none.
    pub errno: i32,
    pub result: OpResult,
}

impl Response {
    pub fn ok(result: OpResult) -> Self {
        Self { errno: 0, result }
    }

    pub fn from_errno(errno: nix::errno::Errno, result: OpResult) -> Self {
        Self {
            errno: errno as i32,
            result,
        }
    }
}

/// File status record carried by the `Stat` response.
///
/// Replaces the host's `struct stat` memory image with explicit
/// fixed-width fields converted at the server boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime: i64,
    pub atime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub ctime: i64,
    pub ctime_nsec: i64,
}

impl From<&libc::stat> for FileStat {
    // field widths differ across architectures, hence the casts
    #[allow(clippy::unnecessary_cast)]
    fn from(st: &libc::stat) -> Self {
        Self {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            mode: st.st_mode as u32,
            nlink: st.st_nlink as u64,
            uid: st.st_uid as u32,
            gid: st.st_gid as u32,
            rdev: st.st_rdev as u64,
            size: st.st_size as i64,
            blksize: st.st_blksize as i64,
            blocks: st.st_blocks as i64,
            atime: st.st_atime as i64,
            atime_nsec: st.st_atime_nsec as i64,
            mtime: st.st_mtime as i64,
            mtime_nsec: st.st_mtime_nsec as i64,
            ctime: st.st_ctime as i64,
            ctime_nsec: st.st_ctime_nsec as i64,
        }
    }
}
