/**
 * FAT16 filesystem, read-only
 *
 * A sector is a fixed 512-byte unit, the granularity of every I/O the
 * device layer performs.
 *
 * A cluster is a fixed number (per-volume, a power of 2) of sectors. The
 * FAT is an array of u16, with each entry in the array corresponding to
 * one cluster.
 *
 * Using FAT entries as "next pointers", clusters are formed into chains;
 * a file's data is the concatenation of the clusters in its chain, in
 * order.
 *
 * The root directory is a fixed-size region directly following the FAT
 * copies, distinct from the cluster heap that holds file and (in a fuller
 * FAT16 implementation) subdirectory data.
 *
 * General layout:
 *
 * .                      |offs                          | size (sectors)
 * boot sector             | 0                             | 1
 * (reserved sectors)      | 1                             | reserved_sectors_count - 1
 * first FAT               | reserved_sectors_count        | fat_size_sectors
 * second FAT (optional)   | + fat_size_sectors             | fat_size_sectors
 * (repeated for number_of_fats)
 * root directory          | + fat_size_sectors * num_fats | root_sectors_count
 * cluster heap            | + root_sectors_count          | data_sectors_count
 */

#[macro_use]
extern crate index_fixed;
extern crate io_at;
extern crate fmt_extra;

mod chain;
mod device;
mod dir;
mod entry;
mod error;
mod name;
mod volume;

pub mod file;

pub use crate::device::{SectorDevice, SECTOR_SIZE};
pub use crate::dir::{Dir, DirEntry, ROOT_DIR};
pub use crate::entry::Attributes;
pub use crate::error::Error;
pub use crate::file::File;
pub use crate::name::{case_insensitive_equal, format_8_3, ShortName};
pub use crate::volume::Volume;
