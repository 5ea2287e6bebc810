use crate::common::{Error, Result, DIGITAL_SIGNATURE, DIGITAL_SIGNATURE_EX};
use crate::directory::{Entry, ObjectType};
use crate::ole::File;
use std::cmp::Ordering;
use std::collections::HashSet;

/// An in-memory directory tree node: an entry plus its children, in their
/// canonical on-disk traversal order (not sorted — see [`cmp_tree_order`]
/// and [`cmp_hash_order`] for the two sort orders callers apply on top).
#[derive(Debug, Clone)]
pub struct Dirent {
    pub entry: Entry,
    pub children: Vec<Dirent>,
}

impl Dirent {
    pub fn is_stream(&self) -> bool {
        self.entry.is_stream()
    }

    /// The root's `DigitalSignature` / `MsiDigitalSignatureEx` children, if present.
    pub fn signatures(&self) -> (Option<&Dirent>, Option<&Dirent>) {
        let mut sig = None;
        let mut sig_ex = None;
        for child in &self.children {
            if child.entry.name_prefix_matches(DIGITAL_SIGNATURE) {
                sig = Some(child);
            } else if child.entry.name_prefix_matches(DIGITAL_SIGNATURE_EX) {
                sig_ex = Some(child);
            }
        }
        (sig, sig_ex)
    }

    /// Removes every direct child whose name has `name` as a prefix (by the
    /// reference implementation's `MIN(len_a, len_b)` comparison, not exact
    /// length — see DESIGN.md). Storages cannot be removed this way.
    ///
    /// A match against a storage aborts immediately; any stream matches
    /// already removed earlier in the scan stay removed.
    pub fn delete(&mut self, name: &[u8]) -> Result<()> {
        let mut i = 0;
        while i < self.children.len() {
            if self.children[i].entry.name_prefix_matches(name) {
                if !self.children[i].is_stream() {
                    log::warn!(
                        "refusing to delete storage entry {:?}",
                        self.children[i].entry.name()
                    );
                    return Err(Error::CannotMutateStorage);
                }
                self.children.remove(i);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    /// Replaces (deletes, then re-adds empty) the direct child named `name`.
    pub fn insert(&mut self, name: &[u8]) -> Result<()> {
        self.delete(name)?;
        self.children.push(Dirent {
            entry: Entry::new_stream(name),
            children: Vec::new(),
        });
        Ok(())
    }

    /// Ensures a `DigitalSignature` stream exists, and a `MsiDigitalSignatureEx`
    /// stream exists iff `len_msiex > 0`.
    pub fn signature_insert(&mut self, len_msiex: usize) -> Result<()> {
        if len_msiex > 0 {
            self.insert(DIGITAL_SIGNATURE_EX)?;
        } else {
            self.delete(DIGITAL_SIGNATURE_EX)?;
        }
        self.insert(DIGITAL_SIGNATURE)
    }
}

/// Builds the directory tree rooted at stream ID 0.
///
/// The reference implementation recurses `(entry, parent)` pairs, appending
/// each node to `parent`'s children as soon as it's created and only then
/// descending into its left/right siblings (still under the same parent) and
/// separately into its own child subtree. That produces a pre-order walk of
/// each storage's sibling BST as the children list — not a sorted order —
/// which this mirrors exactly. The root's own siblings (always absent in a
/// well-formed file) are intentionally not attached anywhere, matching the
/// original discarding them.
pub(crate) fn build_tree(file: &File) -> Result<Dirent> {
    let mut visited = HashSet::new();
    visited.insert(0u32);
    let entry = file.get_entry(0)?;
    let mut root = Dirent {
        entry,
        children: Vec::new(),
    };
    if root.entry.object_type != ObjectType::Stream {
        if let Some(child_id) = root.entry.child_id.as_regular() {
            collect_siblings(file, child_id, &mut visited, &mut root.children)?;
        }
    }
    Ok(root)
}

fn collect_siblings(
    file: &File,
    id: u32,
    visited: &mut HashSet<u32>,
    out: &mut Vec<Dirent>,
) -> Result<()> {
    if !visited.insert(id) {
        log::warn!("directory entry {id} revisited, rejecting as corrupt");
        return Err(Error::Corrupt);
    }
    let entry = file.get_entry(id)?;
    let mut node = Dirent {
        entry,
        children: Vec::new(),
    };
    if node.entry.object_type != ObjectType::Stream {
        if let Some(child_id) = node.entry.child_id.as_regular() {
            collect_siblings(file, child_id, visited, &mut node.children)?;
        }
    }
    let left = node.entry.left_sibling_id.as_regular();
    let right = node.entry.right_sibling_id.as_regular();
    out.push(node);
    if let Some(left) = left {
        collect_siblings(file, left, visited, out)?;
    }
    if let Some(right) = right {
        collect_siblings(file, right, visited, out)?;
    }
    Ok(())
}

/// Hash order: raw byte prefix compare over `min(name_len)`, longer name
/// wins ties. Used when traversing the tree for prehash/content-hash.
pub fn cmp_hash_order(a: &Dirent, b: &Dirent) -> Ordering {
    let la = a.entry.name_len as usize;
    let lb = b.entry.name_len as usize;
    let n = la.min(lb);
    match a.entry.name[..n].cmp(&b.entry.name[..n]) {
        Ordering::Equal => lb.cmp(&la),
        other => other,
    }
}

/// Tree order: name length ascending, then UTF-16LE codepoint-wise
/// lexicographic compare. Used when re-serializing the directory tree.
pub fn cmp_tree_order(a: &Dirent, b: &Dirent) -> Ordering {
    let la = a.entry.name_len;
    let lb = b.entry.name_len;
    if la != lb {
        return la.cmp(&lb);
    }
    let n = (la as usize).saturating_sub(2).min(64);
    for i in (0..n).step_by(2) {
        let ca = u16::from_le_bytes([a.entry.name[i], a.entry.name[i + 1]]);
        let cb = u16::from_le_bytes([b.entry.name[i], b.entry.name[i + 1]]);
        if ca != cb {
            return ca.cmp(&cb);
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &[u8]) -> Dirent {
        Dirent {
            entry: Entry::new_stream(name),
            children: Vec::new(),
        }
    }

    #[test]
    fn hash_order_is_prefix_then_longer_first() {
        let a = leaf(&[0x41, 0x00, 0x00, 0x00]); // "A\0"
        let b = leaf(&[0x41, 0x00, 0x42, 0x00, 0x00, 0x00]); // "AB\0"
        assert_eq!(cmp_hash_order(&a, &b), Ordering::Greater);
        assert_eq!(cmp_hash_order(&b, &a), Ordering::Less);
    }

    #[test]
    fn tree_order_is_length_then_codepoint() {
        let short = leaf(&[0x41, 0x00, 0x00, 0x00]); // "A\0"
        let long = leaf(&[0x41, 0x00, 0x42, 0x00, 0x00, 0x00]); // "AB\0"
        assert_eq!(cmp_tree_order(&short, &long), Ordering::Less);

        let a = leaf(&[0x41, 0x00, 0x00, 0x00]);
        let b = leaf(&[0x42, 0x00, 0x00, 0x00]);
        assert_eq!(cmp_tree_order(&a, &b), Ordering::Less);
    }

    #[test]
    fn insert_replaces_existing_child() {
        let mut root = Dirent {
            entry: Entry::new_stream(&[]),
            children: vec![leaf(DIGITAL_SIGNATURE)],
        };
        root.insert(DIGITAL_SIGNATURE).unwrap();
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn delete_refuses_to_remove_storages() {
        let mut storage = Entry::new_stream(b"x");
        storage.object_type = ObjectType::Storage;
        let mut root = Dirent {
            entry: Entry::new_stream(&[]),
            children: vec![Dirent {
                entry: storage,
                children: Vec::new(),
            }],
        };
        let err = root.delete(b"x").unwrap_err();
        assert!(matches!(err, Error::CannotMutateStorage));
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn signature_insert_drops_msiex_when_absent() {
        let mut root = Dirent {
            entry: Entry::new_stream(&[]),
            children: vec![leaf(DIGITAL_SIGNATURE_EX)],
        };
        root.signature_insert(0).unwrap();
        let (sig, sig_ex) = root.signatures();
        assert!(sig.is_some());
        assert!(sig_ex.is_none());
    }
}
