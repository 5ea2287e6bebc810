//! Two-pass digest engine for MSI Authenticode signing: a prehash over
//! directory-entry metadata only, and a content hash over stream bytes plus
//! storage CLSIDs. Both walk the same in-memory tree in hash order and both
//! skip the root's signature streams, mirroring `msi_prehash_dir`/
//! `msi_hash_dir` in the reference implementation.

use crate::common::{Result, DIGITAL_SIGNATURE, DIGITAL_SIGNATURE_EX};
use crate::dirent::{cmp_hash_order, Dirent};
use crate::directory::{Entry, ObjectType};
use crate::ole::File;
use digest::Update;

/// Hashes the raw content-hash metadata for one directory entry: its name
/// (unless `is_root`), its CLSID or low 4 bytes of stream size, its state
/// bits, and (unless `is_root`) its creation/modified timestamps.
fn prehash_metadata(entry: &Entry, is_root: bool, sink: &mut impl Update) {
    if !is_root {
        sink.update(entry.name_bytes());
    }
    if entry.object_type != ObjectType::Stream {
        sink.update(&entry.clsid);
    } else {
        sink.update(&(entry.size as u32).to_le_bytes());
    }
    sink.update(&entry.state_bits.to_le_bytes());
    if !is_root {
        sink.update(&entry.creation_time.to_le_bytes());
        sink.update(&entry.modified_time.to_le_bytes());
    }
}

/// Feeds `sink` the prehash (metadata-only) digest of the tree rooted at `root`.
pub fn prehash(root: &Dirent, sink: &mut impl Update) -> Result<()> {
    prehash_dir(root, sink, true)
}

fn prehash_dir(dirent: &Dirent, sink: &mut impl Update, is_root: bool) -> Result<()> {
    prehash_metadata(&dirent.entry, is_root, sink);
    let mut children: Vec<&Dirent> = dirent.children.iter().collect();
    children.sort_by(|a, b| cmp_hash_order(a, b));
    for child in children {
        if is_root
            && (child.entry.name_prefix_matches(DIGITAL_SIGNATURE)
                || child.entry.name_prefix_matches(DIGITAL_SIGNATURE_EX))
        {
            continue;
        }
        if child.entry.object_type == ObjectType::Stream {
            prehash_metadata(&child.entry, false, sink);
        } else {
            prehash_dir(child, sink, false)?;
        }
    }
    Ok(())
}

/// Feeds `sink` the content-hash digest of the tree rooted at `root`, reading
/// stream bytes through `file`.
pub fn content_hash(file: &File, root: &Dirent, sink: &mut impl Update) -> Result<()> {
    hash_dir(file, root, sink, true)
}

fn hash_dir(file: &File, dirent: &Dirent, sink: &mut impl Update, is_root: bool) -> Result<()> {
    let mut children: Vec<&Dirent> = dirent.children.iter().collect();
    children.sort_by(|a, b| cmp_hash_order(a, b));
    for child in children {
        if is_root
            && (child.entry.name_prefix_matches(DIGITAL_SIGNATURE)
                || child.entry.name_prefix_matches(DIGITAL_SIGNATURE_EX))
        {
            continue;
        }
        if child.entry.object_type == ObjectType::Stream {
            if child.entry.size == 0 {
                continue;
            }
            let data = file.read_stream_to_vec(&child.entry)?;
            sink.update(&data);
        } else {
            hash_dir(file, child, sink, false)?;
        }
    }
    sink.update(&dirent.entry.clsid);
    Ok(())
}

/// Feeds `sink` the entire input buffer verbatim, for callers that want a
/// digest of the raw container rather than the logical MSI content digest.
pub fn whole_file(buffer: &[u8], sink: &mut impl Update) {
    sink.update(buffer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha1::{Digest as _, Sha1};

    fn digest_of(root: &Dirent) -> Vec<u8> {
        let mut sink = Sha1::new();
        prehash(root, &mut sink).unwrap();
        sink.finalize().to_vec()
    }

    #[test]
    fn prehash_ignores_root_signature_streams() {
        let mut with_sig = Dirent {
            entry: Entry::new_stream(&[]),
            children: vec![Dirent {
                entry: Entry::new_stream(DIGITAL_SIGNATURE),
                children: Vec::new(),
            }],
        };
        with_sig.entry.object_type = ObjectType::RootStorage;

        let without_sig = Dirent {
            entry: with_sig.entry.clone(),
            children: Vec::new(),
        };

        assert_eq!(digest_of(&with_sig), digest_of(&without_sig));
    }

    #[test]
    fn prehash_is_sensitive_to_a_renamed_child() {
        let mut a = Dirent {
            entry: Entry::new_stream(&[]),
            children: vec![Dirent {
                entry: Entry::new_stream(b"stream-a"),
                children: Vec::new(),
            }],
        };
        a.entry.object_type = ObjectType::RootStorage;

        let mut b = a.clone();
        b.children[0].entry = Entry::new_stream(b"stream-b");

        assert_ne!(digest_of(&a), digest_of(&b));
    }
}
