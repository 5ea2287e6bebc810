use crate::common::{Error, Result, MINI_SECTOR_SIZE};
use crate::ole::File;

/// MiniFAT sector navigation: individual stream mini-sector chains live here,
/// but the mini-stream's own backing bytes are always reached through the
/// regular FAT (see `mini_sector_offset_to_address`).
///
/// https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/c5d235f7-b73c-4ec5-bf8d-5c08306cd023
impl<'a> File<'a> {
    /// Reads the MiniFAT's next-mini-sector pointer for `sector`.
    pub(crate) fn next_mini_sector(&self, sector: u32) -> Result<u32> {
        let first_minifat_sector = self
            .header
            .first_mini_fat_sector_location
            .as_regular()
            .ok_or(Error::Corrupt)?;
        let (sector, offset) = self.locate_final_sector(first_minifat_sector, sector as usize * 4)?;
        let addr = self
            .sector_offset_to_address(sector, offset)
            .ok_or(Error::OutOfBounds)?;
        crate::ole::read_u32_le(self.buffer, addr)
    }

    /// Walks the MiniFAT chain from `sector` until `offset` lands within a single mini-sector.
    pub(crate) fn locate_final_mini_sector(&self, mut sector: u32, mut offset: usize) -> Result<(u32, usize)> {
        while offset >= MINI_SECTOR_SIZE {
            offset -= MINI_SECTOR_SIZE;
            sector = self.next_mini_sector(sector)?;
        }
        Ok((sector, offset))
    }

    /// Translates a (mini-sector, offset) pair to an absolute buffer address
    /// by walking the regular FAT chain of the mini-stream itself.
    pub(crate) fn mini_sector_offset_to_address(&self, sector: u32, offset: usize) -> Result<usize> {
        if offset >= MINI_SECTOR_SIZE {
            return Err(Error::OutOfBounds);
        }
        let mini_stream_start = self
            .mini_stream_start_sector
            .as_regular()
            .ok_or(Error::Corrupt)?;
        let (big_sector, big_offset) =
            self.locate_final_sector(mini_stream_start, sector as usize * MINI_SECTOR_SIZE + offset)?;
        self.sector_offset_to_address(big_sector, big_offset)
            .ok_or(Error::OutOfBounds)
    }
}
