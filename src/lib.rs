//! A CFBF (Compound File Binary Format / OLE structured storage) codec
//! tuned for MSI Authenticode signing: reading an existing container's
//! directory tree and stream contents, computing the prehash/content-hash
//! pair osslsigncode-style tooling signs over, and rewriting a container
//! with a `DigitalSignature`/`MsiDigitalSignatureEx` stream embedded.
//!
//! The crate never touches the filesystem or picks a hash algorithm itself:
//! callers hand it byte buffers and a `digest::Update` sink.

pub mod common;
pub mod difat;
pub mod digest;
pub mod dirent;
pub mod directory;
pub mod fat;
pub mod header;
pub mod mini_fat;
pub mod ole;
pub mod writer;

pub use common::{Error, Result};
pub use dirent::Dirent;
pub use directory::{Color, Entry, ObjectType};
pub use ole::File;

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use std::io::Cursor;

    fn synthetic_minimal_cfbf() -> Vec<u8> {
        // One header sector, one FAT sector, one directory sector: a root
        // storage with no children, self-describing FAT.
        let sector_size = 512usize;
        let mut buf = vec![0u8; sector_size * 3];

        // Header (sector -1, i.e. bytes [0, 512)).
        buf[0..8].copy_from_slice(&0xE11AB1A1E011CFD0u64.to_le_bytes());
        buf[24..26].copy_from_slice(&0x003Eu16.to_le_bytes()); // minor version
        buf[26..28].copy_from_slice(&0x0003u16.to_le_bytes()); // major version 3
        buf[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes()); // byte order
        buf[30..32].copy_from_slice(&0x0009u16.to_le_bytes()); // sector shift
        buf[32..34].copy_from_slice(&0x0006u16.to_le_bytes()); // mini sector shift
        buf[44..48].copy_from_slice(&1u32.to_le_bytes()); // number of FAT sectors
        buf[48..52].copy_from_slice(&1u32.to_le_bytes()); // first directory sector (sector 1)
        buf[56..60].copy_from_slice(&0x1000u32.to_le_bytes()); // mini stream cutoff
        buf[60..64].copy_from_slice(&0xFFFFFFFEu32.to_le_bytes()); // first minifat sector = ENDOFCHAIN
        buf[68..72].copy_from_slice(&0xFFFFFFFEu32.to_le_bytes()); // first difat sector = ENDOFCHAIN
        for i in 0..crate::common::DIFAT_IN_HEADER {
            let at = 76 + i * 4;
            buf[at..at + 4].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        }
        buf[76..80].copy_from_slice(&0u32.to_le_bytes()); // header_difat[0] = sector 0 (the FAT sector)

        // FAT sector (sector 0, bytes [512, 1024)): entry 0 = FAT_SECT, entry 1 = ENDOFCHAIN.
        let fat_sector = sector_size;
        buf[fat_sector..fat_sector + 4].copy_from_slice(&0xFFFFFFFDu32.to_le_bytes());
        buf[fat_sector + 4..fat_sector + 8].copy_from_slice(&0xFFFFFFFEu32.to_le_bytes());

        // Directory sector (sector 1, bytes [1024, 1536)): one root entry, rest unused.
        let dir_sector = sector_size * 2;
        let name = [0u8; 64]; // unnamed root for this synthetic fixture
        buf[dir_sector..dir_sector + 64].copy_from_slice(&name);
        buf[dir_sector + 64..dir_sector + 66].copy_from_slice(&0u16.to_le_bytes()); // name_len
        buf[dir_sector + 66] = 0x05; // ObjectType::RootStorage
        buf[dir_sector + 67] = 0x01; // Color::Black
        buf[dir_sector + 68..dir_sector + 72].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // left sibling
        buf[dir_sector + 72..dir_sector + 76].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // right sibling
        buf[dir_sector + 76..dir_sector + 80].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // child
        buf[dir_sector + 116..dir_sector + 120].copy_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // start sector (no mini-stream)
        buf[dir_sector + 120..dir_sector + 128].copy_from_slice(&0u64.to_le_bytes()); // size

        buf
    }

    #[test]
    fn opens_minimal_container_and_reads_root() {
        let buf = synthetic_minimal_cfbf();
        let file = File::open(&buf).unwrap();
        let root = file.root().unwrap();
        assert_eq!(root.object_type, ObjectType::RootStorage);
        assert_eq!(root.size, 0);
    }

    #[test]
    fn build_tree_on_minimal_container_has_no_children() {
        let buf = synthetic_minimal_cfbf();
        let file = File::open(&buf).unwrap();
        let root = file.build_tree().unwrap();
        assert!(root.children.is_empty());
    }

    #[test]
    fn whole_file_digest_is_deterministic() {
        let buf = synthetic_minimal_cfbf();
        let mut sink = Sha256::new();
        digest::whole_file(&buf, &mut sink);
        let first = sink.finalize();

        let mut sink = Sha256::new();
        digest::whole_file(&buf, &mut sink);
        let second = sink.finalize();
        assert_eq!(first, second);
    }

    #[test]
    fn rewrite_minimal_container_round_trips() {
        let buf = synthetic_minimal_cfbf();
        let file = File::open(&buf).unwrap();
        let mut root = file.build_tree().unwrap();

        let mut out = Cursor::new(Vec::new());
        writer::write(&file, &mut root, &[], &[], &mut out).unwrap();

        let rewritten = out.into_inner();
        let reopened = File::open(&rewritten).unwrap();
        let reopened_root = reopened.root().unwrap();
        assert_eq!(reopened_root.object_type, ObjectType::RootStorage);
    }

    #[test]
    fn rewrite_embeds_digital_signature_stream() {
        let buf = synthetic_minimal_cfbf();
        let file = File::open(&buf).unwrap();
        let mut root = file.build_tree().unwrap();

        let signature_payload = b"fake-pkcs7-signature-blob".to_vec();
        let mut out = Cursor::new(Vec::new());
        writer::write(&file, &mut root, &signature_payload, &[], &mut out).unwrap();

        let rewritten = out.into_inner();
        let reopened = File::open(&rewritten).unwrap();
        let tree = reopened.build_tree().unwrap();
        let (sig, sig_ex) = tree.signatures();
        assert!(sig.is_some());
        assert!(sig_ex.is_none());

        let sig_entry = &sig.unwrap().entry;
        assert_eq!(sig_entry.size as usize, signature_payload.len());
        let data = reopened.read_stream_to_vec(sig_entry).unwrap();
        assert_eq!(data, signature_payload);
    }
}
