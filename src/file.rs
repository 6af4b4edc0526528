//! The file handle: a stateful cursor over one file's cluster chain, with a
//! single-cluster read buffer and POSIX-like seek/read semantics.

use std::io;

use io_at::ReadAt;
use log::error;

use crate::chain::ClusterChain;
use crate::entry::{RawEntry, DIR_ENTRY_SIZE, DIR_EOF, DIR_FREE};
use crate::error::Error;
use crate::name::case_insensitive_equal;
use crate::volume::Volume;

/// An open regular file: cluster chain, single-cluster read buffer, and a
/// logical byte offset.
///
/// Borrows its `Volume` rather than owning it, so the volume (and the
/// device beneath it) cannot be dropped while a `File` is alive.
pub struct File<'a, S: ReadAt> {
    volume: &'a Volume<'a, S>,
    chain: ClusterChain,
    buffer: Vec<u8>,
    /// Index into `buffer` where unread data begins.
    cur: usize,
    /// Index into `buffer` one past the last valid byte in the window.
    end: usize,
    offset: u32,
    size: u32,
}

impl<'a, S: ReadAt> File<'a, S> {
    /// Looks up `name` (case-insensitively) in the root directory and opens
    /// it for reading. Fails with [`Error::IsDirectory`] if the match is a
    /// directory or volume label, [`Error::NotFound`] otherwise.
    pub fn open(volume: &'a Volume<'a, S>, name: &str) -> Result<Self, Error> {
        let root_sectors = volume.root_sectors_count;
        let mut root = vec![0u8; root_sectors as usize * 512];
        volume
            .device()
            .read(volume.root_dir_first_sector(), root_sectors, &mut root)?;

        for i in 0..volume.root_entries_count() as usize {
            let off = i * DIR_ENTRY_SIZE;
            if off + DIR_ENTRY_SIZE > root.len() {
                break;
            }
            let raw: &[u8; DIR_ENTRY_SIZE] = index_fixed!(&root; off, .. (off + DIR_ENTRY_SIZE));
            if raw[0] == DIR_EOF {
                break;
            }
            if raw[0] == DIR_FREE {
                continue;
            }

            let entry = RawEntry::new(raw);
            if !case_insensitive_equal(entry.name().as_str(), name) {
                continue;
            }

            let attrs = entry.attributes();
            if attrs.contains(crate::entry::Attributes::DIRECTORY)
                || attrs.contains(crate::entry::Attributes::VOLUME_ID)
            {
                error!("file_open: {:?} resolves to a directory or volume label", name);
                return Err(Error::IsDirectory);
            }

            let chain = ClusterChain::build(volume, entry.low_order_first_cluster())?;
            let bytes_per_cluster = volume.bytes_per_cluster() as usize;
            return Ok(File {
                volume,
                chain,
                buffer: vec![0u8; bytes_per_cluster],
                cur: bytes_per_cluster,
                end: bytes_per_cluster,
                offset: 0,
                size: entry.size(),
            });
        }

        Err(Error::NotFound)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Core read loop: copies from the cluster window when it has data,
    /// otherwise refills it from the next cluster in the chain. Stops at
    /// `size` or once `buf` is full, whichever comes first.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.offset == self.size {
            return Ok(0);
        }

        let bytes_per_cluster = self.buffer.len();
        let mut written = 0;

        while written < buf.len() && self.offset < self.size {
            let available = self.end - self.cur;
            if available > 0 {
                let n = available.min(buf.len() - written);
                buf[written..written + n].copy_from_slice(&self.buffer[self.cur..self.cur + n]);
                self.cur += n;
                self.offset += n as u32;
                written += n;
                continue;
            }

            let chain_index = self.offset as usize / bytes_per_cluster;
            let cluster = self
                .chain
                .cluster_at(chain_index)
                .ok_or(Error::OutOfRange("offset addresses a cluster past the chain's end"))?;

            let first_sector = (cluster as u32 - 2) * self.volume.sectors_per_cluster as u32
                + self.volume.first_data_sector;
            if first_sector >= self.volume.total_sectors_count {
                error!(
                    "file read: cluster {} maps to sector {}, outside the data region",
                    cluster, first_sector
                );
                return Err(Error::OutOfRange("cluster maps outside the data region"));
            }

            self.volume.device().read(
                first_sector,
                self.volume.sectors_per_cluster as u32,
                &mut self.buffer,
            )?;

            self.cur = self.offset as usize % bytes_per_cluster;
            self.end = if chain_index == self.chain.len() - 1 {
                (self.size - self.offset) as usize + self.cur
            } else {
                bytes_per_cluster
            };
        }

        Ok(written)
    }

    /// Mirrors the C API's `fread(ptr, size, nmemb, stream)`: returns
    /// `nmemb` if every requested byte was read, otherwise the count of
    /// whole `size`-byte elements actually satisfied.
    pub fn read_elements(
        &mut self,
        buf: &mut [u8],
        size_elem: usize,
        nmemb: usize,
    ) -> Result<usize, Error> {
        if size_elem == 0 || nmemb == 0 {
            return Ok(0);
        }
        let requested = size_elem * nmemb;
        let read = self.read_into(&mut buf[..requested])?;
        Ok(if read == requested { nmemb } else { read / size_elem })
    }
}

impl<'a, S: ReadAt> io::Read for File<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl<'a, S: ReadAt> io::Seek for File<'a, S> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_offset = match pos {
            io::SeekFrom::Start(offset) => {
                if offset > self.size as u64 {
                    return Err(seek_out_of_range());
                }
                offset as u32
            }
            io::SeekFrom::Current(delta) => {
                let base = self.offset as i64;
                let candidate = base + delta;
                if candidate < 0 || candidate > self.size as i64 {
                    return Err(seek_out_of_range());
                }
                candidate as u32
            }
            io::SeekFrom::End(delta) => {
                if delta > 0 {
                    return Err(seek_out_of_range());
                }
                let candidate = self.size as i64 + delta;
                if candidate < 0 {
                    return Err(seek_out_of_range());
                }
                candidate as u32
            }
        };

        self.offset = new_offset;
        self.cur = self.end; // invalidate the cluster window
        Ok(self.offset as u64)
    }
}

fn seek_out_of_range() -> io::Error {
    io::Error::new(io::ErrorKind::Other, Error::OutOfRange("seek target outside [0, size]"))
}
