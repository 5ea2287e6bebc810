use crate::common::{get_sector_size, Error, Result, DIRENT_SIZE, HEADER_SIZE};
use crate::dirent::Dirent;
use crate::directory::Entry;
use crate::header::Header;
use binrw::BinRead;
use std::io::Cursor;

use crate::common::SectorType;

/// A parsed CFBF container borrowing its bytes from the caller. Every read
/// (directory entry, stream, sector chain) is computed live against
/// `buffer` rather than cached, treating the input as an immutable
/// memory-mapped file.
///
/// https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/
#[derive(Debug, Clone)]
pub struct File<'a> {
    pub(crate) buffer: &'a [u8],
    pub(crate) header: Header,
    pub(crate) sector_size: usize,
    pub(crate) mini_stream_start_sector: SectorType,
}

impl<'a> File<'a> {
    /// Parses the header and locates the root entry's mini-stream. Does not
    /// walk the directory tree or validate anything beyond the header and
    /// root entry; call [`File::build_tree`] to do that.
    pub fn open(buffer: &'a [u8]) -> Result<File<'a>> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::TooSmall);
        }
        let header = Header::read_le(&mut Cursor::new(&buffer[..HEADER_SIZE])).map_err(|e| match e {
            binrw::Error::BadMagic { .. } => Error::BadSignature,
            other => Error::Parse(other),
        })?;
        let sector_size = get_sector_size(&header.major_version);
        if buffer.len() < sector_size * 3 {
            return Err(Error::TooSmall);
        }

        let mut file = File {
            buffer,
            header,
            sector_size,
            mini_stream_start_sector: SectorType::FreeSect,
        };
        log::debug!("opened CFBF container, sector_size={}", sector_size);
        let root = file.get_entry(0)?;
        file.mini_stream_start_sector = root.start_sector;
        Ok(file)
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The root directory entry (stream ID 0).
    pub fn root(&self) -> Result<Entry> {
        self.get_entry(0)
    }

    /// Reads a single 128-byte directory entry by stream ID.
    ///
    /// A loose sanity bound (`entry_id * 128 < buffer_len`) rejects
    /// obviously-out-of-range IDs before any sector walking happens.
    pub(crate) fn get_entry(&self, entry_id: u32) -> Result<Entry> {
        if (entry_id as usize) * DIRENT_SIZE >= self.buffer.len() {
            return Err(Error::Corrupt);
        }
        let first_dir_sector = self
            .header
            .first_directory_sector_location
            .as_regular()
            .ok_or(Error::Corrupt)?;
        let (sector, offset) = self.locate_final_sector(first_dir_sector, entry_id as usize * DIRENT_SIZE)?;
        let addr = self
            .sector_offset_to_address(sector, offset)
            .ok_or(Error::OutOfBounds)?;
        if addr + DIRENT_SIZE > self.buffer.len() {
            return Err(Error::OutOfBounds);
        }
        Entry::read_le(&mut Cursor::new(&self.buffer[addr..addr + DIRENT_SIZE])).map_err(Error::from)
    }

    /// Builds the in-memory directory tree rooted at stream ID 0, detecting
    /// cycles in sibling/child pointers that the wire format itself cannot
    /// rule out.
    pub fn build_tree(&self) -> Result<Dirent> {
        crate::dirent::build_tree(self)
    }

    /// Reads `out.len()` bytes of `entry`'s content starting at `offset`.
    ///
    /// Which path is used — MiniFAT/mini-stream or FAT/regular sectors — is
    /// decided from `out.len()` against the cutoff size, not from
    /// `entry.size`, including the case where a caller asks for fewer bytes
    /// than the cutoff from an entry whose on-disk size is larger; see
    /// DESIGN.md.
    pub fn read_stream(&self, entry: &Entry, offset: usize, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        let start = entry.start_sector.as_regular().ok_or(Error::Corrupt)?;
        if (out.len() as u32) < self.header.mini_stream_cutoff_size {
            self.read_mini_stream(start, offset, out)
        } else {
            self.read_regular_stream(start, offset, out)
        }
    }

    fn read_regular_stream(&self, start: u32, offset: usize, out: &mut [u8]) -> Result<()> {
        let (mut sector, mut offset) = self.locate_final_sector(start, offset)?;
        let mut pos = 0usize;
        while pos < out.len() {
            let addr = self
                .sector_offset_to_address(sector, offset)
                .ok_or(Error::OutOfBounds)?;
            let copy_len = (out.len() - pos).min(self.sector_size - offset);
            if addr + copy_len > self.buffer.len() {
                return Err(Error::OutOfBounds);
            }
            out[pos..pos + copy_len].copy_from_slice(&self.buffer[addr..addr + copy_len]);
            pos += copy_len;
            sector = self.next_sector(sector)?;
            offset = 0;
        }
        Ok(())
    }

    fn read_mini_stream(&self, start: u32, offset: usize, out: &mut [u8]) -> Result<()> {
        let (mut sector, mut offset) = self.locate_final_mini_sector(start, offset)?;
        let mut pos = 0usize;
        while pos < out.len() {
            let addr = self.mini_sector_offset_to_address(sector, offset)?;
            let copy_len = (out.len() - pos).min(crate::common::MINI_SECTOR_SIZE - offset);
            if addr + copy_len > self.buffer.len() {
                return Err(Error::OutOfBounds);
            }
            out[pos..pos + copy_len].copy_from_slice(&self.buffer[addr..addr + copy_len]);
            pos += copy_len;
            sector = self.next_mini_sector(sector)?;
            offset = 0;
        }
        Ok(())
    }

    /// Reads `entry`'s full content as a fresh buffer; a convenience over
    /// [`File::read_stream`] for callers that don't want to pre-size a slice.
    pub fn read_stream_to_vec(&self, entry: &Entry) -> Result<Vec<u8>> {
        let len = entry.size as usize;
        let mut buf = vec![0u8; len];
        if len > 0 {
            self.read_stream(entry, 0, &mut buf)?;
        }
        Ok(buf)
    }
}

pub(crate) fn read_u32_le(buffer: &[u8], addr: usize) -> Result<u32> {
    if addr + 4 > buffer.len() {
        return Err(Error::OutOfBounds);
    }
    u32::read_le(&mut Cursor::new(&buffer[addr..addr + 4])).map_err(Error::from)
}
