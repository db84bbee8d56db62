//! Local file system execution of the remote operations.
//!
//! Wire-supplied arguments arrive as raw integers and are handed to the
//! host calls unchanged; return values and errnos propagate verbatim back
//! to the dispatcher. Descriptor lifetime is the caller's concern - these
//! functions borrow raw descriptors except where documented.

use async_recursion::async_recursion;
use nix::errno::Errno;
use proto::DirTree;
use proto::message::FileStat;
use std::ffi::{CString, OsString};
use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

fn cstring(path: &Path) -> nix::Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno::EINVAL)
}

fn io_errno(err: std::io::Error) -> Errno {
    err.raw_os_error().map_or(Errno::EIO, Errno::from_raw)
}

/// Open `path` with the wire-supplied flags and mode. The returned
/// descriptor is owned by the session that requested it.
pub fn open(path: &Path, flags: i32, mode: u32) -> nix::Result<OwnedFd> {
    let cpath = cstring(path)?;
    // SAFETY: cpath is a valid NUL-terminated string
    let fd = Errno::result(unsafe { libc::open(cpath.as_ptr(), flags, mode) })?;
    // SAFETY: fd was just returned by open and is owned by nobody else
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Read up to `nbyte` bytes from `fd`. A short read is returned as-is.
pub fn read(fd: RawFd, nbyte: usize) -> nix::Result<Vec<u8>> {
    let mut buf = vec![0u8; nbyte];
    // SAFETY: buf is valid for buf.len() writable bytes
    let ret = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    let nread = Errno::result(ret)? as usize;
    buf.truncate(nread);
    Ok(buf)
}

pub fn write(fd: RawFd, data: &[u8]) -> nix::Result<usize> {
    // SAFETY: data is valid for data.len() readable bytes
    let ret = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
    Errno::result(ret).map(|n| n as usize)
}

/// Close a descriptor the session owns, reporting the host call's
/// outcome instead of swallowing it in a drop.
pub fn close(fd: OwnedFd) -> nix::Result<()> {
    let raw = fd.into_raw_fd();
    // SAFETY: ownership was released above; this is the only close
    Errno::result(unsafe { libc::close(raw) }).map(drop)
}

pub fn lseek(fd: RawFd, offset: i64, whence: i32) -> nix::Result<i64> {
    // SAFETY: no pointers involved
    Errno::result(unsafe { libc::lseek(fd, offset, whence) })
}

pub fn stat(path: &Path) -> nix::Result<FileStat> {
    let st = nix::sys::stat::stat(path)?;
    Ok(FileStat::from(&st))
}

pub fn unlink(path: &Path) -> nix::Result<()> {
    nix::unistd::unlink(path)
}

/// Fill a buffer of `nbytes` with raw directory entries from `fd` and
/// report the updated directory offset alongside.
pub fn getdirentries(fd: RawFd, nbytes: usize) -> nix::Result<(Vec<u8>, i64)> {
    let mut buf = vec![0u8; nbytes];
    // SAFETY: buf is valid for buf.len() writable bytes
    let ret = unsafe { libc::syscall(libc::SYS_getdents64, fd, buf.as_mut_ptr(), buf.len()) };
    let nread = Errno::result(ret)? as usize;
    buf.truncate(nread);
    let basep = lseek(fd, 0, libc::SEEK_CUR)?;
    Ok((buf, basep))
}

/// Build the directory tree rooted at `path` by local traversal. The
/// root node is named after the last path component; entries appear in
/// traversal order and only directories recurse.
pub async fn dir_tree(path: &Path) -> nix::Result<DirTree> {
    let name = path
        .file_name()
        .map_or_else(|| path.as_os_str().to_os_string(), OsString::from);
    build_node(path.to_path_buf(), name).await.map_err(io_errno)
}

#[async_recursion]
async fn build_node(path: PathBuf, name: OsString) -> std::io::Result<DirTree> {
    let metadata = tokio::fs::symlink_metadata(&path).await?;
    let mut children = Vec::new();
    if metadata.is_dir() {
        match tokio::fs::read_dir(&path).await {
            Ok(mut entries) => {
                while let Some(entry) = entries.next_entry().await? {
                    children.push(build_node(entry.path(), entry.file_name()).await?);
                }
            }
            Err(err) => {
                // an unreadable directory stays in the tree as a leaf
                tracing::debug!(?path, %err, "skipping unreadable directory");
            }
        }
    }
    Ok(DirTree { name, children })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rfsd_fsops_{tag}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn open_write_read_close_cycle() {
        let dir = scratch_dir("cycle");
        let path = dir.join("x");
        let fd = open(
            &path,
            libc::O_CREAT | libc::O_RDWR,
            0o644,
        )
        .unwrap();
        let raw = fd.as_raw_fd();
        assert_eq!(write(raw, b"hello").unwrap(), 5);
        assert_eq!(lseek(raw, 0, libc::SEEK_SET).unwrap(), 0);
        assert_eq!(read(raw, 1024).unwrap(), b"hello");
        close(fd).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn open_missing_path_reports_enoent() {
        let err = open(Path::new("/does/not/exist"), libc::O_RDONLY, 0).unwrap_err();
        assert_eq!(err, Errno::ENOENT);
    }

    #[test]
    fn path_with_interior_nul_is_invalid() {
        use std::os::unix::ffi::OsStrExt;
        let path = Path::new(std::ffi::OsStr::from_bytes(b"/tmp/a\0b"));
        assert_eq!(open(path, libc::O_RDONLY, 0).unwrap_err(), Errno::EINVAL);
    }

    #[test]
    fn stat_reports_size_and_mode() {
        let dir = scratch_dir("stat");
        let path = dir.join("f");
        std::fs::write(&path, b"abcd").unwrap();
        let st = stat(&path).unwrap();
        assert_eq!(st.size, 4);
        assert_eq!(st.mode & libc::S_IFMT, libc::S_IFREG);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn getdirentries_lists_created_names() {
        let dir = scratch_dir("dents");
        std::fs::write(dir.join("one"), b"1").unwrap();
        std::fs::write(dir.join("two"), b"2").unwrap();
        let fd = open(&dir, libc::O_RDONLY | libc::O_DIRECTORY, 0).unwrap();
        let (data, basep) = getdirentries(fd.as_raw_fd(), 4096).unwrap();
        assert!(basep > 0);
        let blob = String::from_utf8_lossy(&data);
        assert!(blob.contains("one") && blob.contains("two"));
        close(fd).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn dir_tree_mirrors_the_local_layout() {
        let dir = scratch_dir("tree");
        let root = dir.join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a"), b"").unwrap();
        std::fs::create_dir(root.join("b")).unwrap();
        std::fs::write(root.join("b").join("c"), b"").unwrap();

        let tree = dir_tree(&root).await.unwrap();
        assert_eq!(tree.name, "root");
        assert_eq!(tree.children.len(), 2);
        let b = tree
            .children
            .iter()
            .find(|child| child.name == "b")
            .unwrap();
        assert_eq!(b.children.len(), 1);
        assert_eq!(b.children[0].name, "c");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn dir_tree_of_missing_path_reports_enoent() {
        let err = dir_tree(Path::new("/does/not/exist")).await.unwrap_err();
        assert_eq!(err, Errno::ENOENT);
    }
}
