//! The sector device: the only component in this crate that touches raw I/O.
//!
//! Everything above this layer is generic over [`ReadAt`], so the volume,
//! file and directory code can be exercised against an in-memory image
//! (`Cursor<Vec<u8>>`) in tests exactly as it would run against a real disk
//! image file.

use std::fs::File;
use std::path::Path;

use io_at::ReadAt;
use log::error;

use crate::error::Error;

/// Fixed sector size this driver understands. FAT16 volumes with any other
/// `bytes_per_sector` are rejected by [`crate::volume::Volume::open`].
pub const SECTOR_SIZE: u32 = 512;

/// A block source keyed by 32-bit sector index, fixed 512-byte sectors.
///
/// `SectorDevice` owns the backing storage (`S`) and knows only its total
/// sector count; it has no notion of FAT16, clusters, or files.
pub struct SectorDevice<S: ReadAt> {
    inner: S,
    sector_count: u32,
}

impl SectorDevice<File> {
    /// Opens a disk image file, recording its sector count as
    /// `floor(file_len / 512)`. Trailing partial-sector bytes are ignored.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let sector_count = (len / SECTOR_SIZE as u64) as u32;
        Ok(SectorDevice {
            inner: file,
            sector_count,
        })
    }
}

impl<S: ReadAt> SectorDevice<S> {
    /// Wraps an already-open [`ReadAt`] source with an explicit sector
    /// count. Used directly by tests to back a device with an in-memory
    /// image.
    pub fn from_reader(inner: S, sector_count: u32) -> Self {
        SectorDevice {
            inner,
            sector_count,
        }
    }

    /// Total number of 512-byte sectors visible through this device.
    pub fn sector_count(&self) -> u32 {
        self.sector_count
    }

    /// Reads `count` sectors starting at `first` into `dst`, which must be
    /// exactly `count * 512` bytes long.
    ///
    /// Either fully succeeds or returns an error; `dst`'s contents are
    /// unspecified on failure.
    pub fn read(&self, first: u32, count: u32, dst: &mut [u8]) -> Result<(), Error> {
        let want = count as usize * SECTOR_SIZE as usize;
        if dst.len() != want {
            error!(
                "sector read buffer size {} does not match requested {} sectors ({} bytes)",
                dst.len(),
                count,
                want
            );
            return Err(Error::InvalidArgument("buffer size does not match sector count"));
        }

        let last = first
            .checked_add(count)
            .ok_or(Error::OutOfRange("sector range overflows"))?;
        if last > self.sector_count {
            error!(
                "sector read [{}, {}) exceeds device sector count {}",
                first, last, self.sector_count
            );
            return Err(Error::OutOfRange("sector range exceeds device size"));
        }

        let mut offset = first as u64 * SECTOR_SIZE as u64;
        let mut filled = 0;
        while filled < dst.len() {
            let n = self.inner.read_at(&mut dst[filled..], offset)?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "sector device read returned 0 bytes before buffer was filled",
                )));
            }
            filled += n;
            offset += n as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn image(sectors: u32) -> SectorDevice<Cursor<Vec<u8>>> {
        let mut data = vec![0u8; sectors as usize * SECTOR_SIZE as usize];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        SectorDevice::from_reader(Cursor::new(data), sectors)
    }

    #[test]
    fn reads_exact_bytes() {
        let dev = image(4);
        let mut buf = [0u8; 512];
        dev.read(1, 1, &mut buf).unwrap();
        assert_eq!(buf[0], (512usize % 251) as u8);
    }

    #[test]
    fn rejects_out_of_range_reads() {
        let dev = image(4);
        let mut buf = [0u8; 512 * 2];
        assert!(dev.read(3, 2, &mut buf).is_err());
    }

    #[test]
    fn rejects_mismatched_buffer_size() {
        let dev = image(4);
        let mut buf = [0u8; 10];
        assert!(dev.read(0, 1, &mut buf).is_err());
    }

    #[test]
    fn rejects_overflowing_range() {
        let dev = image(4);
        let mut buf = [0u8; 512];
        assert!(dev.read(u32::MAX, 1, &mut buf).is_err());
    }

    #[test]
    fn opens_a_real_file_and_derives_sector_count() {
        use std::io::Write;

        let mut data = vec![0u8; 3 * SECTOR_SIZE as usize];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        // A trailing partial sector must be ignored, not rounded up.
        data.extend_from_slice(&[0u8; 100]);

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&data).unwrap();

        let dev = SectorDevice::open(tmp.path()).unwrap();
        assert_eq!(dev.sector_count(), 3);

        let mut buf = [0u8; 512];
        dev.read(2, 1, &mut buf).unwrap();
        assert_eq!(buf[0], (1024usize % 251) as u8);
    }
}
