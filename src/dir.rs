//! Enumerating the (fixed-size, root-only) directory region.

use io_at::ReadAt;
use log::error;

use crate::entry::{Attributes, RawEntry, DIR_ENTRY_SIZE};
use crate::error::Error;
use crate::name::ShortName;
use crate::volume::Volume;

const ENTRIES_PER_SECTOR: u32 = 512 / DIR_ENTRY_SIZE as u32;

/// Literal root path this core accepts; subdirectory traversal is out of
/// scope (see the design notes on `Dir::open`).
pub const ROOT_DIR: &str = "\\";

/// One decoded short-name directory entry, as returned by [`Dir`].
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: ShortName,
    pub size: u32,
    pub is_archived: bool,
    pub is_readonly: bool,
    pub is_system: bool,
    pub is_hidden: bool,
    pub is_directory: bool,
}

impl DirEntry {
    fn from_raw(raw: &RawEntry<'_>) -> Self {
        let attrs = raw.attributes();
        DirEntry {
            name: raw.name(),
            size: raw.size(),
            is_archived: attrs.contains(Attributes::ARCHIVE),
            is_readonly: attrs.contains(Attributes::READ_ONLY),
            is_system: attrs.contains(Attributes::SYSTEM),
            is_hidden: attrs.contains(Attributes::HIDDEN),
            is_directory: attrs.contains(Attributes::DIRECTORY),
        }
    }
}

/// A cursor over the root directory region.
///
/// Reads one sector (16 entries) at a time rather than holding the whole
/// region in memory, unlike `File::open`'s one-shot root scan.
pub struct Dir<'a, S: ReadAt> {
    volume: &'a Volume<'a, S>,
    count: u16,
    index: u16,
    done: bool,
}

impl<'a, S: ReadAt> Dir<'a, S> {
    /// Opens the root directory. Any path other than [`ROOT_DIR`] fails:
    /// subdirectory traversal is not implemented by this core.
    pub fn open(volume: &'a Volume<'a, S>, path: &str) -> Result<Self, Error> {
        if path != ROOT_DIR {
            error!("dir_open: only the root path \"\\\\\" is supported, got {:?}", path);
            return Err(Error::InvalidArgument("only the root directory is supported"));
        }
        Ok(Dir {
            volume,
            count: volume.root_entries_count(),
            index: 0,
            done: false,
        })
    }

    /// Returns the next entry, `None` at the end of the directory (whether
    /// by sentinel or by exhausting `root_entries_count`), or an I/O error.
    pub fn read_entry(&mut self) -> Result<Option<DirEntry>, Error> {
        let mut sector = [0u8; 512];
        while self.index < self.count {
            let sector_idx = (self.index as u32) / ENTRIES_PER_SECTOR;
            let entry_idx = (self.index as u32) % ENTRIES_PER_SECTOR;

            self.volume.device().read(
                self.volume.root_dir_first_sector() + sector_idx,
                1,
                &mut sector,
            )?;

            let raw: &[u8; DIR_ENTRY_SIZE] =
                index_fixed!(&sector; (entry_idx as usize * DIR_ENTRY_SIZE), .. (entry_idx as usize * DIR_ENTRY_SIZE + DIR_ENTRY_SIZE));
            let entry = RawEntry::new(raw);

            if entry.is_end_of_directory() {
                self.done = true;
                return Ok(None);
            }
            if entry.is_free() {
                self.index += 1;
                continue;
            }

            let decoded = DirEntry::from_raw(&entry);
            self.index += 1;
            return Ok(Some(decoded));
        }
        self.done = true;
        Ok(None)
    }
}

impl<'a, S: ReadAt> Iterator for Dir<'a, S> {
    type Item = Result<DirEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
