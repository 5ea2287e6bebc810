//! The rewrite path: consumes a parsed directory tree (already mutated with
//! the signature streams the caller wants embedded) and serializes a fresh
//! CFBF container from scratch, mirroring `msi_file_write` and its helper
//! stages in the reference implementation stage by stage.
//!
//! Unlike the reader, which walks the input lazily and in any order, the
//! writer must commit to a single pass: streams first (so their sector
//! counts are known), then the mini-stream, then the MiniFAT, then the
//! directory tree, then the FAT, then the header last (since only at that
//! point are all the sector counts and chain heads final).

use crate::common::{
    Error, Result, DIRENT_SIZE, END_OF_CHAIN, FAT_SECT, HEADER_SIZE, MAX_WRITABLE_SIZE,
    MINI_STREAM_CUTOFF_SIZE, SECTOR_UPGRADE_THRESHOLD, DIFAT_IN_HEADER,
};
use crate::common::SectorType;
use crate::dirent::{cmp_tree_order, Dirent};
use crate::directory::{Color, Entry, ObjectType};
use crate::header::Header;
use crate::ole::File;
use binrw::BinWrite;
use std::io::{Seek, SeekFrom, Write};

struct MsiOut {
    sector_size: usize,
    header: Header,
    ministream: Vec<u8>,
    minifat: Vec<u8>,
    fat: Vec<u8>,
    sector_num: u32,
    mini_sector_num: u32,
    minifat_sectors_count: u32,
    dirtree_sectors_count: u32,
    fat_sectors_count: u32,
}

fn round_up(n: usize, multiple: usize) -> usize {
    (n + multiple - 1) / multiple * multiple
}

impl MsiOut {
    fn new(file: &File, len_msi: usize, len_msiex: usize) -> Result<MsiOut> {
        let msi_size = if len_msi <= MINI_STREAM_CUTOFF_SIZE as usize {
            round_up(len_msi, crate::common::MINI_SECTOR_SIZE)
        } else {
            round_up(len_msi, file.sector_size())
        };
        let msiex_size = round_up(len_msiex, crate::common::MINI_SECTOR_SIZE);

        let mut sector_size = file.sector_size();
        let total = file.buffer.len() as u64 + msi_size as u64 + msiex_size as u64;
        if total > SECTOR_UPGRADE_THRESHOLD {
            sector_size = 4096;
        }
        if total > MAX_WRITABLE_SIZE {
            return Err(Error::UnsupportedLayout);
        }

        Ok(MsiOut {
            sector_size,
            header: Header::new_for_output(file.header(), sector_size),
            ministream: Vec::new(),
            minifat: Vec::new(),
            fat: Vec::new(),
            sector_num: 0,
            mini_sector_num: 0,
            minifat_sectors_count: 0,
            dirtree_sectors_count: 0,
            fat_sectors_count: 0,
        })
    }
}

/// Rewrites the container described by `root` (the result of
/// [`crate::ole::File::build_tree`], possibly mutated via
/// [`Dirent::signature_insert`]) into `sink`.
///
/// `p_msi`/`p_msiex` are the `DigitalSignature`/`MsiDigitalSignatureEx`
/// payloads to embed; pass an empty `p_msi` to leave any existing signature
/// streams untouched (matching the reference implementation's "sign only if
/// asked" behavior).
pub fn write<W: Write + Seek>(
    file: &File,
    root: &mut Dirent,
    p_msi: &[u8],
    p_msiex: &[u8],
    mut sink: W,
) -> Result<()> {
    let mut out = MsiOut::new(file, p_msi.len(), p_msiex.len())?;
    log::debug!("rewriting container at sector_size={}", out.sector_size);

    sink.write_all(&vec![0u8; out.sector_size])?;
    stream_handle(file, root, p_msi, p_msiex, &mut sink, &mut out, true)?;
    ministream_save(root, &mut sink, &mut out)?;
    minifat_save(&mut sink, &mut out)?;
    dirtree_save(root, &mut sink, &mut out)?;
    fat_save(&mut sink, &mut out)?;
    header_save(&mut sink, &mut out)?;
    Ok(())
}

/// Depth-first over the in-memory tree in tree order (i.e. whatever order
/// the children happen to be in right now — not yet re-sorted; that happens
/// in [`dirtree_save`]), writing each stream's content and recording its
/// sector/mini-sector chain.
fn stream_handle<W: Write + Seek>(
    file: &File,
    dirent: &mut Dirent,
    p_msi: &[u8],
    p_msiex: &[u8],
    sink: &mut W,
    out: &mut MsiOut,
    is_root: bool,
) -> Result<()> {
    if is_root && !p_msi.is_empty() {
        dirent.signature_insert(p_msiex.len())?;
    }

    for child in dirent.children.iter_mut() {
        if child.entry.object_type != ObjectType::Stream {
            stream_handle(file, child, p_msi, p_msiex, sink, out, false)?;
            continue;
        }

        let data: Vec<u8> = if is_root && child.entry.name_prefix_matches(crate::common::DIGITAL_SIGNATURE) {
            p_msi.to_vec()
        } else if is_root && child.entry.name_prefix_matches(crate::common::DIGITAL_SIGNATURE_EX) {
            p_msiex.to_vec()
        } else {
            file.read_stream_to_vec(&child.entry)?
        };

        let inlen = data.len();
        if inlen == 0 {
            continue;
        }
        child.entry.size = inlen as u64;

        if inlen < MINI_STREAM_CUTOFF_SIZE as usize {
            child.entry.start_sector = SectorType::RegularSect(out.mini_sector_num);
            out.ministream.extend_from_slice(&data);
            let rem = inlen % crate::common::MINI_SECTOR_SIZE;
            if rem > 0 {
                out.ministream
                    .resize(out.ministream.len() + (crate::common::MINI_SECTOR_SIZE - rem), 0);
            }
            let mut remaining = inlen;
            while remaining > crate::common::MINI_SECTOR_SIZE {
                out.mini_sector_num += 1;
                out.minifat.extend_from_slice(&out.mini_sector_num.to_le_bytes());
                remaining -= crate::common::MINI_SECTOR_SIZE;
            }
            out.minifat.extend_from_slice(&END_OF_CHAIN.to_le_bytes());
            out.mini_sector_num += 1;
        } else {
            child.entry.start_sector = SectorType::RegularSect(out.sector_num);
            sink.write_all(&data)?;
            let rem = inlen % out.sector_size;
            if rem > 0 {
                sink.write_all(&vec![0u8; out.sector_size - rem])?;
            }
            let mut remaining = inlen;
            while remaining > out.sector_size {
                out.sector_num += 1;
                out.fat.extend_from_slice(&out.sector_num.to_le_bytes());
                remaining -= out.sector_size;
            }
            out.fat.extend_from_slice(&END_OF_CHAIN.to_le_bytes());
            out.sector_num += 1;
        }
    }
    Ok(())
}

/// Writes the mini-stream (the root's own content, backing every small
/// stream) as a regular FAT-chained stream.
///
/// Deviates from the reference implementation for the empty case: that
/// implementation always appends one `ENDOFCHAIN` FAT entry for the
/// mini-stream region even when it holds zero sectors, which reserves a FAT
/// slot no real sector occupies. Left unguarded that corrupts the chain for
/// a minimal container with no small streams (see DESIGN.md); this skips
/// the entry entirely when the mini-stream is empty.
fn ministream_save<W: Write + Seek>(dirent: &mut Dirent, sink: &mut W, out: &mut MsiOut) -> Result<()> {
    let sectors = (out.ministream.len() + out.sector_size - 1) / out.sector_size;
    dirent.entry.start_sector = SectorType::RegularSect(out.sector_num);
    sink.write_all(&out.ministream)?;
    if !out.ministream.is_empty() {
        let rem = out.ministream.len() % out.sector_size;
        if rem > 0 {
            sink.write_all(&vec![0u8; out.sector_size - rem])?;
        }
    }
    if sectors > 0 {
        for i in 1..sectors {
            out.fat.extend_from_slice(&(out.sector_num + i as u32).to_le_bytes());
        }
        out.fat.extend_from_slice(&END_OF_CHAIN.to_le_bytes());
        out.sector_num += sectors as u32;
    }
    Ok(())
}

fn minifat_save<W: Write + Seek>(sink: &mut W, out: &mut MsiOut) -> Result<()> {
    if out.minifat.is_empty() {
        out.header.first_mini_fat_sector_location = SectorType::EndOfChain;
        return Ok(());
    }
    out.header.first_mini_fat_sector_location = SectorType::RegularSect(out.sector_num);
    sink.write_all(&out.minifat)?;
    sink.write_all(&END_OF_CHAIN.to_le_bytes())?;
    let total_len = out.minifat.len() + 4;
    let rem = total_len % out.sector_size;
    if rem > 0 {
        sink.write_all(&vec![0xFFu8; out.sector_size - rem])?;
    }
    let sectors = (total_len + out.sector_size - 1) / out.sector_size;
    out.minifat_sectors_count = sectors as u32;
    for i in 1..sectors {
        out.fat.extend_from_slice(&(out.sector_num + i as u32).to_le_bytes());
    }
    out.fat.extend_from_slice(&END_OF_CHAIN.to_le_bytes());
    out.sector_num += sectors as u32;
    Ok(())
}

/// Assigns stream IDs depth-first (preorder) and writes each entry, after
/// first re-sorting every node's children by tree order.
///
/// Rather than port the reference implementation's degenerate
/// right-linked-list serialization (every node black, sibling chains walked
/// via `rightSiblingID` alone, with a fragile running-count bookkeeping
/// scheme to thread cross-subtree offsets), this builds a genuine balanced
/// binary search tree over each storage's sorted children. Spec-compliant
/// readers must accept either shape; see DESIGN.md.
fn dirtree_save<W: Write + Seek>(root: &mut Dirent, sink: &mut W, out: &mut MsiOut) -> Result<()> {
    out.header.first_directory_sector_location = SectorType::RegularSect(out.sector_num);
    root.entry.size = out.ministream.len() as u64;

    let mut entries = Vec::new();
    let mut next_id = 0u32;
    flatten(root, &mut next_id, &mut entries);
    entries[0].color = Color::Black;
    entries[0].left_sibling_id = SectorType::FreeSect;
    entries[0].right_sibling_id = SectorType::FreeSect;

    let mut dirtree_len = 0usize;
    for entry in &entries {
        entry.write_le(sink)?;
        dirtree_len += DIRENT_SIZE;
    }
    let rem = dirtree_len % out.sector_size;
    if rem > 0 {
        let unused = Entry::unused();
        let mut pad = out.sector_size - rem;
        while pad > 0 {
            unused.clone().write_le(sink)?;
            dirtree_len += DIRENT_SIZE;
            pad -= DIRENT_SIZE;
        }
    }

    let sectors = (dirtree_len + out.sector_size - 1) / out.sector_size;
    out.dirtree_sectors_count = sectors as u32;
    for i in 1..sectors {
        out.fat.extend_from_slice(&(out.sector_num + i as u32).to_le_bytes());
    }
    out.fat.extend_from_slice(&END_OF_CHAIN.to_le_bytes());
    out.sector_num += sectors as u32;
    Ok(())
}

/// Assigns `dirent` and its (tree-order-sorted) descendants sequential
/// stream IDs in preorder, pushing a placeholder-complete `Entry` for each
/// into `entries` and wiring up `child_id` via [`build_bst`]. The caller
/// fixes up the root's own sibling IDs afterward.
fn flatten(dirent: &mut Dirent, next_id: &mut u32, entries: &mut Vec<Entry>) -> u32 {
    let my_id = *next_id;
    *next_id += 1;
    entries.push(dirent.entry.clone());

    dirent.children.sort_by(cmp_tree_order);
    let mut child_ids = Vec::with_capacity(dirent.children.len());
    for child in dirent.children.iter_mut() {
        child_ids.push(flatten(child, next_id, entries));
    }

    let child_root = if child_ids.is_empty() {
        SectorType::FreeSect
    } else {
        SectorType::RegularSect(build_bst(&child_ids, entries))
    };
    entries[my_id as usize].child_id = child_root;
    my_id
}

/// Builds a balanced BST over `ids` (already sorted in tree order), wiring
/// each node's `left_sibling_id`/`right_sibling_id` in `entries`, and
/// returns the subtree's root ID.
fn build_bst(ids: &[u32], entries: &mut Vec<Entry>) -> u32 {
    let mid = ids.len() / 2;
    let root_id = ids[mid];
    let left = if mid > 0 {
        Some(build_bst(&ids[..mid], entries))
    } else {
        None
    };
    let right = if mid + 1 < ids.len() {
        Some(build_bst(&ids[mid + 1..], entries))
    } else {
        None
    };
    entries[root_id as usize].color = Color::Black;
    entries[root_id as usize].left_sibling_id = left.map(SectorType::RegularSect).unwrap_or(SectorType::FreeSect);
    entries[root_id as usize].right_sibling_id = right.map(SectorType::RegularSect).unwrap_or(SectorType::FreeSect);
    root_id
}

fn fat_save<W: Write + Seek>(sink: &mut W, out: &mut MsiOut) -> Result<()> {
    let remain = (out.fat.len() + out.sector_size - 1) / out.sector_size;
    let fat_sectors_count = (out.fat.len() + remain * 4 + out.sector_size - 1) / out.sector_size;

    for _ in 0..fat_sectors_count {
        out.fat.extend_from_slice(&FAT_SECT.to_le_bytes());
    }
    for i in 0..fat_sectors_count.min(DIFAT_IN_HEADER) {
        out.header.header_difat[i] = SectorType::RegularSect(out.sector_num + i as u32);
    }
    out.sector_num += fat_sectors_count as u32;

    if fat_sectors_count > DIFAT_IN_HEADER {
        return Err(Error::UnsupportedLayout);
    }

    let rem = out.fat.len() % out.sector_size;
    if rem > 0 {
        out.fat.extend(std::iter::repeat(0xFFu8).take(out.sector_size - rem));
    }
    sink.write_all(&out.fat)?;
    out.fat_sectors_count = fat_sectors_count as u32;
    Ok(())
}

fn header_save<W: Write + Seek>(sink: &mut W, out: &mut MsiOut) -> Result<()> {
    out.header.number_of_fat_sectors = out.fat_sectors_count;
    out.header.number_of_mini_fat_sectors = out.minifat_sectors_count;
    if out.sector_size == 4096 {
        out.header.number_of_directory_sectors = out.dirtree_sectors_count;
    }

    sink.seek(SeekFrom::Start(0))?;
    out.header.write_le(sink)?;
    let rem = out.sector_size - HEADER_SIZE;
    if rem > 0 {
        sink.write_all(&vec![0u8; rem])?;
    }
    Ok(())
}
