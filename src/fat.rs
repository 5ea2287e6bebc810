use crate::common::{Error, Result, DIFAT_IN_HEADER, MAX_REG_SECT};
use crate::difat::Difat;
use crate::ole::File;
use binrw::BinRead;
use std::io::Cursor;

/// FAT sector navigation: locating the physical sector that backs a given
/// FAT index, and walking next-sector chains through it.
///
/// https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/30e1013a-a0ff-4404-9ccf-d75d835ff404
impl<'a> File<'a> {
    /// Translates (sector, byte offset) into an absolute offset into the
    /// input buffer, or `None` if it would fall outside the buffer.
    pub(crate) fn sector_offset_to_address(&self, sector: u32, offset: usize) -> Option<usize> {
        if sector >= MAX_REG_SECT || offset >= self.sector_size {
            return None;
        }
        let addr = self
            .sector_size
            .checked_mul(sector as usize + 1)?
            .checked_add(offset)?;
        if addr >= self.buffer.len() {
            return None;
        }
        Some(addr)
    }

    /// Finds the physical sector holding FAT index `fat_sector_number`,
    /// consulting the header's 109-entry table directly, or walking the
    /// DIFAT chain for larger indices.
    pub(crate) fn fat_sector_location(&self, fat_sector_number: u32) -> Result<u32> {
        if (fat_sector_number as usize) < DIFAT_IN_HEADER {
            return Ok(self.header.header_difat[fat_sector_number as usize].raw());
        }
        let entries_per_sector = self.sector_size / 4 - 1;
        let mut remaining = fat_sector_number as usize - DIFAT_IN_HEADER;
        let mut difat_loc = self
            .header
            .first_difat_sector_location
            .as_regular()
            .ok_or(Error::Corrupt)?;
        loop {
            let addr = self
                .sector_offset_to_address(difat_loc, 0)
                .ok_or(Error::OutOfBounds)?;
            if addr + self.sector_size > self.buffer.len() {
                return Err(Error::OutOfBounds);
            }
            let sector_bytes = &self.buffer[addr..addr + self.sector_size];
            let difat = Difat::read_le_args(
                &mut Cursor::new(sector_bytes),
                (entries_per_sector as u16,),
            )?;
            if remaining < entries_per_sector {
                return Ok(difat.entries[remaining].raw());
            }
            remaining -= entries_per_sector;
            difat_loc = difat.next.as_regular().ok_or(Error::Corrupt)?;
        }
    }

    /// Reads the FAT's next-sector pointer for `sector`.
    pub(crate) fn next_sector(&self, sector: u32) -> Result<u32> {
        let entries_per_sector = self.sector_size / 4;
        let fat_sector_number = sector as usize / entries_per_sector;
        let fat_sector_location = self.fat_sector_location(fat_sector_number as u32)?;
        let addr = self
            .sector_offset_to_address(
                fat_sector_location,
                (sector as usize % entries_per_sector) * 4,
            )
            .ok_or(Error::OutOfBounds)?;
        crate::ole::read_u32_le(self.buffer, addr)
    }

    /// Walks the FAT chain from `sector` until `offset` lands within a single sector.
    pub(crate) fn locate_final_sector(&self, mut sector: u32, mut offset: usize) -> Result<(u32, usize)> {
        while offset >= self.sector_size {
            offset -= self.sector_size;
            sector = self.next_sector(sector)?;
        }
        Ok((sector, offset))
    }
}
