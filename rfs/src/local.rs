//! Local execution of descriptor operations.
//!
//! Descriptors below the namespace split (stdin/stdout/stderr, files the
//! process opened through other means) are serviced here with the plain
//! host calls and their results returned verbatim; nothing in this module
//! touches the wire.

use nix::errno::Errno;
use std::os::fd::RawFd;

pub fn read(fd: RawFd, buf: &mut [u8]) -> nix::Result<usize> {
    // SAFETY: buf is valid for buf.len() writable bytes
    let ret = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    Errno::result(ret).map(|n| n as usize)
}

pub fn write(fd: RawFd, buf: &[u8]) -> nix::Result<usize> {
    // SAFETY: buf is valid for buf.len() readable bytes
    let ret = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
    Errno::result(ret).map(|n| n as usize)
}

pub fn close(fd: RawFd) -> nix::Result<()> {
    // SAFETY: plain close on a caller-supplied descriptor
    let ret = unsafe { libc::close(fd) };
    Errno::result(ret).map(drop)
}

pub fn lseek(fd: RawFd, offset: i64, whence: i32) -> nix::Result<i64> {
    // SAFETY: no pointers involved
    let ret = unsafe { libc::lseek(fd, offset, whence) };
    Errno::result(ret)
}

/// Local counterpart of getdirentries: fill `buf` with raw directory
/// entries and report the updated directory offset through `basep`.
pub fn getdirentries(fd: RawFd, buf: &mut [u8], basep: &mut i64) -> nix::Result<usize> {
    // SAFETY: buf is valid for buf.len() writable bytes
    let ret = unsafe { libc::syscall(libc::SYS_getdents64, fd, buf.as_mut_ptr(), buf.len()) };
    let nread = Errno::result(ret).map(|n| n as usize)?;
    if nread > 0 {
        *basep = lseek(fd, 0, libc::SEEK_CUR)?;
    }
    Ok(nread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::fd::AsRawFd;

    #[test]
    fn read_write_lseek_on_a_local_descriptor() {
        let dir = std::env::temp_dir().join(format!("rfs_local_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scratch");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"abc").unwrap();
        drop(file);

        let file = std::fs::File::open(&path).unwrap();
        let fd = file.as_raw_fd();
        let mut buf = [0u8; 8];
        assert_eq!(read(fd, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(lseek(fd, 1, libc::SEEK_SET).unwrap(), 1);
        assert_eq!(read(fd, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
        drop(file);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bad_descriptor_reports_ebadf() {
        let mut buf = [0u8; 4];
        assert_eq!(read(-1, &mut buf), Err(Errno::EBADF));
        assert_eq!(write(-1, b"x"), Err(Errno::EBADF));
        assert_eq!(close(-1), Err(Errno::EBADF));
    }
}
