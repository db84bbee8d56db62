//! The client's dual-namespace descriptor table.
//!
//! Descriptors handed to callers live in two namespaces split at
//! [`REMOTE_FD_BASE`]: values below it are ordinary local descriptors and
//! are never sent anywhere; values at or above it refer to files the
//! server opened on our behalf. The table records which internal
//! (server-side) descriptor values are currently open, which is what makes
//! classification sound - a large descriptor that we never externalized is
//! still local.

use std::collections::HashSet;
use std::os::fd::RawFd;

/// Additive offset separating local from remote descriptors in the
/// caller-visible namespace.
pub const REMOTE_FD_BASE: RawFd = 1 << 15;

/// Exclusive upper bound on internal descriptor values the table will
/// track. A server handing out descriptors at or above this has outgrown
/// the namespace and the client cannot continue.
pub const MAX_REMOTE_FDS: RawFd = 1 << 16;

/// Which side of the namespace split a descriptor falls on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FdClass {
    Local,
    Remote,
}

/// Raised when the server returns an internal descriptor outside the
/// representable range. Fatal for the client.
#[derive(Debug, thiserror::Error)]
#[error("remote descriptor {fd} exceeds the descriptor table bound {max}")]
pub struct FdTableOverflow {
    pub fd: RawFd,
    pub max: RawFd,
}

/// Presence set of internal descriptor values currently open on the
/// server for this client.
#[derive(Debug, Default)]
pub struct FdTable {
    open: HashSet<RawFd>,
}

impl FdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A descriptor is remote iff it is above the split and its internal
    /// value is currently open; everything else is local.
    pub fn classify(&self, fd: RawFd) -> FdClass {
        if fd >= REMOTE_FD_BASE && self.open.contains(&(fd - REMOTE_FD_BASE)) {
            FdClass::Remote
        } else {
            FdClass::Local
        }
    }

    /// Record a freshly opened internal descriptor and return the
    /// caller-visible external value.
    pub fn externalize(&mut self, internal: RawFd) -> Result<RawFd, FdTableOverflow> {
        if !(0..MAX_REMOTE_FDS).contains(&internal) {
            return Err(FdTableOverflow {
                fd: internal,
                max: MAX_REMOTE_FDS,
            });
        }
        self.open.insert(internal);
        Ok(internal + REMOTE_FD_BASE)
    }

    /// Internal value of a descriptor already classified as remote.
    pub fn internalize(&self, external: RawFd) -> RawFd {
        external - REMOTE_FD_BASE
    }

    /// Drop an internal descriptor from the table. Called on close even
    /// when the server reported a failure: the descriptor is gone from
    /// the caller's perspective either way.
    pub fn retire(&mut self, internal: RawFd) -> bool {
        self.open.remove(&internal)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_total_and_sound() {
        let mut table = FdTable::new();
        for fd in [-1, 0, 2, 100, REMOTE_FD_BASE - 1] {
            assert_eq!(table.classify(fd), FdClass::Local);
        }
        // above the split but never externalized: still local
        assert_eq!(table.classify(REMOTE_FD_BASE + 3), FdClass::Local);

        let external = table.externalize(3).unwrap();
        assert_eq!(external, REMOTE_FD_BASE + 3);
        assert_eq!(table.classify(external), FdClass::Remote);
        assert_eq!(table.internalize(external), 3);
    }

    #[test]
    fn open_then_close_law() {
        let mut table = FdTable::new();
        let external = table.externalize(5).unwrap();
        assert_eq!(table.classify(external), FdClass::Remote);
        assert!(table.retire(table.internalize(external)));
        assert_eq!(table.classify(external), FdClass::Local);
        assert!(table.is_empty());
    }

    #[test]
    fn externalize_is_idempotent_per_internal_value() {
        let mut table = FdTable::new();
        assert_eq!(table.externalize(7).unwrap(), table.externalize(7).unwrap());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn overflow_is_reported() {
        let mut table = FdTable::new();
        let err = table.externalize(MAX_REMOTE_FDS).unwrap_err();
        assert_eq!(err.fd, MAX_REMOTE_FDS);
        assert!(table.is_empty());
        assert!(table.externalize(-1).is_err());
    }

    #[test]
    fn retire_of_unknown_descriptor_is_a_noop() {
        let mut table = FdTable::new();
        assert!(!table.retire(9));
    }
}
