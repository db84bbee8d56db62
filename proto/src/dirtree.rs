//! Serialized directory trees for the `GetDirTree` operation.
//!
//! The serialized form is byte-exact and self-delimiting: for each node,
//! the entry name (NUL terminated), then the child count as a little-endian
//! `i32`, then each child subtree in order using the same rule. Child order
//! is whatever the server's directory traversal produced; it is not sorted
//! and round-trips unchanged.

use bytes::BufMut;
use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

/// Errors decoding a serialized tree. All of them are fatal for the
/// session that received the payload.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeDecodeError {
    #[error("node name is missing its NUL terminator")]
    MissingNul,
    #[error("buffer ends inside a node")]
    Truncated,
    #[error("negative child count {0}")]
    NegativeCount(i32),
    #[error("{0} bytes left over after the root subtree")]
    TrailingBytes(usize),
}

/// One node of a directory tree: the entry name and its children in
/// traversal order. Directories carry their entries, everything else is
/// a leaf.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirTree {
    pub name: OsString,
    pub children: Vec<DirTree>,
}

impl DirTree {
    pub fn leaf(name: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Serialize the whole tree into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_slice(self.name.as_bytes());
        buf.put_u8(0);
        buf.put_i32_le(self.children.len() as i32);
        for child in &self.children {
            child.encode_into(buf);
        }
    }

    /// Decode a tree from a buffer that contains exactly one serialized
    /// tree and nothing else.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, TreeDecodeError> {
        let (tree, used) = Self::decode_node(buf)?;
        if used != buf.len() {
            return Err(TreeDecodeError::TrailingBytes(buf.len() - used));
        }
        Ok(tree)
    }

    /// Decode one node from the front of `buf`, returning the node and
    /// how many bytes it consumed so the caller can advance.
    fn decode_node(buf: &[u8]) -> Result<(Self, usize), TreeDecodeError> {
        let nul = buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(TreeDecodeError::MissingNul)?;
        let name = OsString::from_vec(buf[..nul].to_vec());
        let mut used = nul + 1;

        let count_end = used
            .checked_add(std::mem::size_of::<i32>())
            .ok_or(TreeDecodeError::Truncated)?;
        let count_bytes = buf
            .get(used..count_end)
            .ok_or(TreeDecodeError::Truncated)?;
        let count = i32::from_le_bytes(
            count_bytes
                .try_into()
                .map_err(|_| TreeDecodeError::Truncated)?,
        );
        if count < 0 {
            return Err(TreeDecodeError::NegativeCount(count));
        }
        used = count_end;

        let mut children = Vec::new();
        for _ in 0..count {
            let (child, child_used) = Self::decode_node(&buf[used..])?;
            used += child_used;
            children.push(child);
        }
        Ok((Self { name, children }, used))
    }
}

/// Releasing a tree must not recurse: trees mirror remote file systems
/// and can be arbitrarily deep, so children are drained onto an explicit
/// stack instead.
impl Drop for DirTree {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> DirTree {
        DirTree {
            name: "dir".into(),
            children: vec![
                DirTree::leaf("a"),
                DirTree {
                    name: "b".into(),
                    children: vec![DirTree::leaf("c")],
                },
            ],
        }
    }

    #[test]
    fn serialized_form_is_byte_exact() {
        let mut expected = Vec::new();
        expected.extend_from_slice(b"dir\0");
        expected.extend_from_slice(&2i32.to_le_bytes());
        expected.extend_from_slice(b"a\0");
        expected.extend_from_slice(&0i32.to_le_bytes());
        expected.extend_from_slice(b"b\0");
        expected.extend_from_slice(&1i32.to_le_bytes());
        expected.extend_from_slice(b"c\0");
        expected.extend_from_slice(&0i32.to_le_bytes());
        assert_eq!(sample_tree().to_bytes(), expected);
    }

    #[test]
    fn serialized_length_matches_the_invariant() {
        // strlen(name)+1 + sizeof(i32), summed over all nodes
        let tree = sample_tree();
        let expected_len = (3 + 1 + 4) + (1 + 1 + 4) * 3;
        assert_eq!(tree.to_bytes().len(), expected_len);
    }

    #[test]
    fn round_trip_preserves_structure_and_child_order() {
        let tree = sample_tree();
        let decoded = DirTree::from_bytes(&tree.to_bytes()).unwrap();
        assert_eq!(decoded, tree);
        assert_eq!(decoded.children[0].name, "a");
        assert_eq!(decoded.children[1].name, "b");
    }

    #[test]
    fn empty_name_round_trips() {
        let tree = DirTree::leaf("");
        assert_eq!(DirTree::from_bytes(&tree.to_bytes()).unwrap(), tree);
    }

    #[test]
    fn missing_nul_is_rejected() {
        assert_eq!(
            DirTree::from_bytes(b"dir"),
            Err(TreeDecodeError::MissingNul)
        );
    }

    #[test]
    fn truncated_count_is_rejected() {
        assert_eq!(
            DirTree::from_bytes(b"dir\0\x02\x00"),
            Err(TreeDecodeError::Truncated)
        );
    }

    #[test]
    fn truncated_subtree_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"dir\0");
        buf.extend_from_slice(&2i32.to_le_bytes());
        buf.extend_from_slice(b"a\0");
        buf.extend_from_slice(&0i32.to_le_bytes());
        // second child missing entirely
        assert_eq!(DirTree::from_bytes(&buf), Err(TreeDecodeError::MissingNul));
    }

    #[test]
    fn negative_child_count_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"dir\0");
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        assert_eq!(
            DirTree::from_bytes(&buf),
            Err(TreeDecodeError::NegativeCount(-1))
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = sample_tree().to_bytes();
        buf.push(7);
        assert_eq!(
            DirTree::from_bytes(&buf),
            Err(TreeDecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn deep_tree_drops_without_recursion() {
        let mut tree = DirTree::leaf("0");
        for i in 1..200_000 {
            tree = DirTree {
                name: i.to_string().into(),
                children: vec![tree],
            };
        }
        drop(tree);
    }
}
