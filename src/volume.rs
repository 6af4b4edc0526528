//! Boot sector parsing, FAT16 validation, and the derived volume geometry.

use fmt_extra::AsciiStr;
use io_at::ReadAt;
use log::{debug, error, warn};

use crate::device::{SectorDevice, SECTOR_SIZE};
use crate::error::Error;

const BOOT_SIGNATURE: u16 = 0xAA55;
const MAX_SECTORS_PER_CLUSTER: u8 = 64;
const FAT16_MIN_CLUSTERS: u32 = 4085;
const FAT16_MAX_CLUSTERS: u32 = 65525;
const DIR_ENTRY_SIZE: u32 = 32;

/// End-of-chain / defect markers, read directly out of a FAT16 entry.
pub(crate) const FAT_END_OF_CHAIN_MIN: u16 = 0xFFF8;
pub(crate) const FAT_DEFECT_MIN: u16 = 0xFFF0;
pub(crate) const FAT_DEFECT_MAX: u16 = 0xFFF7;

/// A view over the raw 512-byte boot sector, with one accessor per field.
///
/// Every multi-byte field is decoded explicitly as little-endian; there is
/// no struct punning and therefore no host-endianness branch to get wrong
/// (see the design notes on the reference source's byte-swap defect).
struct RawBootSector {
    raw: [u8; SECTOR_SIZE as usize],
}

impl RawBootSector {
    fn bytes_per_sector(&self) -> u16 {
        u16::from_le_bytes(*index_fixed!(&self.raw; 11, .. 13))
    }

    fn sectors_per_cluster(&self) -> u8 {
        self.raw[13]
    }

    fn reserved_sectors_count(&self) -> u16 {
        u16::from_le_bytes(*index_fixed!(&self.raw; 14, .. 16))
    }

    fn number_of_fats(&self) -> u8 {
        self.raw[16]
    }

    fn root_entries_count(&self) -> u16 {
        u16::from_le_bytes(*index_fixed!(&self.raw; 17, .. 19))
    }

    fn total_sectors_count_16(&self) -> u16 {
        u16::from_le_bytes(*index_fixed!(&self.raw; 19, .. 21))
    }

    fn fat_size_sectors(&self) -> u16 {
        u16::from_le_bytes(*index_fixed!(&self.raw; 22, .. 24))
    }

    fn total_sectors_count_32(&self) -> u32 {
        u32::from_le_bytes(*index_fixed!(&self.raw; 32, .. 36))
    }

    fn boot_signature(&self) -> u16 {
        u16::from_le_bytes(*index_fixed!(&self.raw; 510, .. 512))
    }

    fn oem_name(&self) -> AsciiStr<[u8; 8]> {
        AsciiStr(*index_fixed!(&self.raw; 3, .. 11))
    }
}

/// A mounted, read-only FAT16 volume: the derived geometry plus the FAT
/// itself, backed by a [`SectorDevice`].
///
/// `Volume` borrows its device rather than owning it, the same way `File`
/// and `Dir` borrow `&Volume`: the device is not closed when a `Volume` is
/// dropped, and the caller remains free to mount another volume (or read
/// the device directly) afterwards.
pub struct Volume<'a, S: ReadAt> {
    device: &'a SectorDevice<S>,
    pub(crate) bytes_per_sector: u16,
    pub(crate) sectors_per_cluster: u8,
    pub(crate) bytes_per_cluster: u32,
    pub(crate) reserved_sectors_count: u16,
    pub(crate) number_of_fats: u8,
    pub(crate) fat_size_sectors: u16,
    pub(crate) root_entries_count: u16,
    pub(crate) root_sectors_count: u32,
    pub(crate) total_sectors_count: u32,
    pub(crate) data_sectors_count: u32,
    pub(crate) cluster_count: u32,
    pub(crate) first_data_sector: u32,
    fat: Vec<u16>,
}

impl<'a, S: ReadAt> Volume<'a, S> {
    /// Parses the boot sector at `first_sector`, validates FAT16 geometry,
    /// loads and cross-checks every FAT mirror, and returns the mounted
    /// volume.
    pub fn open(device: &'a SectorDevice<S>, first_sector: u32) -> Result<Self, Error> {
        let mut sector = [0u8; SECTOR_SIZE as usize];
        device.read(first_sector, 1, &mut sector)?;
        let boot = RawBootSector { raw: sector };

        if boot.boot_signature() != BOOT_SIGNATURE {
            error!(
                "boot signature {:#06x} is not 0xAA55 (oem name {:?})",
                boot.boot_signature(),
                boot.oem_name()
            );
            return Err(Error::MalformedVolume("bad boot signature".into()));
        }
        if boot.bytes_per_sector() != SECTOR_SIZE as u16 {
            error!("bytes_per_sector {} is not 512", boot.bytes_per_sector());
            return Err(Error::MalformedVolume("unsupported bytes_per_sector".into()));
        }

        let sectors_per_cluster = boot.sectors_per_cluster();
        if !is_power_of_two(sectors_per_cluster) || sectors_per_cluster > MAX_SECTORS_PER_CLUSTER
        {
            error!("sectors_per_cluster {} is invalid", sectors_per_cluster);
            return Err(Error::MalformedVolume(
                "sectors_per_cluster must be a power of two <= 64".into(),
            ));
        }

        let number_of_fats = boot.number_of_fats();
        if number_of_fats == 0 {
            error!("number_of_fats is 0");
            return Err(Error::MalformedVolume("at least one FAT is required".into()));
        }

        let fat_size_sectors = boot.fat_size_sectors();
        if fat_size_sectors == 0 {
            error!("fat_size_sectors is 0");
            return Err(Error::MalformedVolume("FAT size must be non-zero".into()));
        }

        let reserved_sectors_count = boot.reserved_sectors_count();
        if reserved_sectors_count == 0 {
            error!("reserved_sectors_count is 0");
            return Err(Error::MalformedVolume(
                "reserved_sectors_count must be non-zero".into(),
            ));
        }

        let root_entries_count = boot.root_entries_count();
        let root_sectors_count =
            (root_entries_count as u32 * DIR_ENTRY_SIZE).div_ceil(SECTOR_SIZE);

        let total_sectors_count = if boot.total_sectors_count_16() != 0 {
            boot.total_sectors_count_16() as u32
        } else {
            boot.total_sectors_count_32()
        };
        if total_sectors_count == 0 {
            error!("both total_sectors_count fields are zero");
            return Err(Error::MalformedVolume("total sector count must be non-zero".into()));
        }

        let fat_region_sectors = number_of_fats as u32 * fat_size_sectors as u32;
        let reserved_region = reserved_sectors_count as u32 + fat_region_sectors + root_sectors_count;
        let data_sectors_count = total_sectors_count
            .checked_sub(reserved_region)
            .ok_or_else(|| {
                error!(
                    "total_sectors_count {} is smaller than reserved+FAT+root region {}",
                    total_sectors_count, reserved_region
                );
                Error::MalformedVolume("volume too small for its own metadata".into())
            })?;

        let cluster_count = data_sectors_count / sectors_per_cluster as u32;
        if !(FAT16_MIN_CLUSTERS..FAT16_MAX_CLUSTERS).contains(&cluster_count) {
            error!(
                "cluster_count {} is outside the FAT16 window [{}, {})",
                cluster_count, FAT16_MIN_CLUSTERS, FAT16_MAX_CLUSTERS
            );
            return Err(Error::MalformedVolume(
                "cluster count outside the FAT16 range".into(),
            ));
        }

        let first_data_sector = reserved_region;
        let bytes_per_cluster = sectors_per_cluster as u32 * SECTOR_SIZE;

        debug!(
            "fat16 geometry: bytes_per_cluster={bytes_per_cluster} first_data_sector={first_data_sector} \
             cluster_count={cluster_count} root_sectors_count={root_sectors_count}"
        );

        let fat_bytes = fat_size_sectors as usize * SECTOR_SIZE as usize;
        let mut fat_mirrors = vec![0u8; fat_bytes * number_of_fats as usize];
        device.read(
            reserved_sectors_count as u32,
            fat_region_sectors,
            &mut fat_mirrors,
        )?;

        for i in 1..number_of_fats as usize {
            let (first, rest) = fat_mirrors.split_at(fat_bytes * i);
            let this = &first[fat_bytes * (i - 1)..];
            let other = &rest[..fat_bytes];
            if this != other {
                error!("FAT mirror {} disagrees with FAT mirror 0", i);
                return Err(Error::MalformedVolume("FAT mirrors disagree".into()));
            }
        }

        let fat = fat_mirrors[..fat_bytes]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();

        Ok(Volume {
            device,
            bytes_per_sector: SECTOR_SIZE as u16,
            sectors_per_cluster,
            bytes_per_cluster,
            reserved_sectors_count,
            number_of_fats,
            fat_size_sectors,
            root_entries_count,
            root_sectors_count,
            total_sectors_count,
            data_sectors_count,
            cluster_count,
            first_data_sector,
            fat,
        })
    }

    /// Sector at which the root directory region begins: immediately after
    /// the reserved area and all FAT copies.
    pub(crate) fn root_dir_first_sector(&self) -> u32 {
        self.reserved_sectors_count as u32 + self.number_of_fats as u32 * self.fat_size_sectors as u32
    }

    pub(crate) fn device(&self) -> &'a SectorDevice<S> {
        self.device
    }

    /// Looks up a FAT entry by cluster number, bounds-checked against the
    /// loaded table.
    pub(crate) fn fat_entry(&self, cluster: u16) -> Result<u16, Error> {
        self.fat.get(cluster as usize).copied().ok_or_else(|| {
            warn!("FAT entry lookup for cluster {} is out of bounds", cluster);
            Error::OutOfRange("cluster number exceeds FAT size")
        })
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_cluster
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn root_entries_count(&self) -> u16 {
        self.root_entries_count
    }

    pub fn total_sectors_count(&self) -> u32 {
        self.total_sectors_count
    }

    pub fn first_data_sector(&self) -> u32 {
        self.first_data_sector
    }
}

fn is_power_of_two(value: u8) -> bool {
    value != 0 && value & (value - 1) == 0
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::io::Cursor;

    /// Builds a minimal, valid FAT16 image in memory: one sector reserved,
    /// one FAT copy, `root_entries` root directory slots, and `data_sectors`
    /// sectors of cluster heap, all zeroed apart from boot-sector fields.
    pub fn make_image(
        sectors_per_cluster: u8,
        root_entries: u16,
        data_sectors: u32,
    ) -> Vec<u8> {
        let reserved = 1u32;
        let fats = 1u32;
        let root_sectors = (root_entries as u32 * 32).div_ceil(512);
        // enough FAT entries to cover data_sectors / sectors_per_cluster clusters, plus
        // reserved entries 0 and 1.
        let cluster_count = data_sectors / sectors_per_cluster as u32;
        let fat_entries = cluster_count + 2;
        let fat_size_sectors = ((fat_entries * 2) as u32).div_ceil(512).max(1);

        let total_sectors = reserved + fats * fat_size_sectors + root_sectors + data_sectors;

        let mut img = vec![0u8; total_sectors as usize * 512];
        img[11..13].copy_from_slice(&512u16.to_le_bytes());
        img[13] = sectors_per_cluster;
        img[14..16].copy_from_slice(&(reserved as u16).to_le_bytes());
        img[16] = fats as u8;
        img[17..19].copy_from_slice(&root_entries.to_le_bytes());
        img[19..21].copy_from_slice(&(total_sectors as u16).to_le_bytes());
        img[22..24].copy_from_slice(&(fat_size_sectors as u16).to_le_bytes());
        img[510] = 0x55;
        img[511] = 0xAA;
        img
    }

    pub fn device_from_image(img: Vec<u8>) -> SectorDevice<Cursor<Vec<u8>>> {
        let sectors = (img.len() / 512) as u32;
        SectorDevice::from_reader(Cursor::new(img), sectors)
    }
}
