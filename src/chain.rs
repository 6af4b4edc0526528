//! Cluster chains: walking the FAT from a file's starting cluster to its
//! end-of-chain marker.

use io_at::ReadAt;
use log::warn;

use crate::error::Error;
use crate::volume::{Volume, FAT_DEFECT_MAX, FAT_DEFECT_MIN, FAT_END_OF_CHAIN_MIN};

/// The ordered sequence of cluster numbers holding one file's data.
///
/// Built once, at `File::open` time, by walking the FAT starting from the
/// directory entry's first cluster. Bounded by `volume.cluster_count()`.
pub(crate) struct ClusterChain {
    clusters: Vec<u16>,
}

impl ClusterChain {
    pub(crate) fn build<S: ReadAt>(
        volume: &Volume<'_, S>,
        start_cluster: u16,
    ) -> Result<Self, Error> {
        if (FAT_DEFECT_MIN..=FAT_DEFECT_MAX).contains(&start_cluster) {
            warn!(
                "cluster chain starts at a defect marker cluster {}",
                start_cluster
            );
            return Err(Error::MalformedVolume(
                "directory entry references a defective cluster".into(),
            ));
        }
        if start_cluster == 0 {
            warn!("cluster chain starts at a free cluster marker");
            return Err(Error::MalformedVolume(
                "directory entry references a free cluster".into(),
            ));
        }
        if start_cluster < 2 || (start_cluster as u32) >= volume.cluster_count() + 2 {
            warn!(
                "cluster chain starts at out-of-range cluster {}",
                start_cluster
            );
            return Err(Error::MalformedVolume(
                "directory entry references a cluster outside the volume".into(),
            ));
        }

        let mut clusters = vec![start_cluster];
        let mut current = start_cluster;

        loop {
            let next = volume.fat_entry(current)?;

            if (FAT_DEFECT_MIN..=FAT_DEFECT_MAX).contains(&next) {
                warn!("cluster chain hit a defect marker at cluster {}", current);
                return Err(Error::MalformedVolume(
                    "cluster chain references a defective cluster".into(),
                ));
            }
            if next >= FAT_END_OF_CHAIN_MIN {
                break;
            }
            if next == 0 {
                warn!("cluster chain hit a free cluster marker at cluster {}", current);
                return Err(Error::MalformedVolume(
                    "cluster chain references a free cluster".into(),
                ));
            }
            if next < 2 || (next as u32) >= volume.cluster_count() + 2 {
                warn!("cluster chain references out-of-range cluster {}", next);
                return Err(Error::MalformedVolume(
                    "cluster chain references a cluster outside the volume".into(),
                ));
            }

            clusters.push(next);
            current = next;

            if clusters.len() as u32 > volume.cluster_count() {
                warn!("cluster chain exceeded the volume's total cluster count; likely a FAT loop");
                return Err(Error::MalformedVolume("cluster chain does not terminate".into()));
            }
        }

        Ok(ClusterChain { clusters })
    }

    pub(crate) fn len(&self) -> usize {
        self.clusters.len()
    }

    pub(crate) fn cluster_at(&self, index: usize) -> Option<u16> {
        self.clusters.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SectorDevice;
    use crate::volume::Volume;
    use std::io::Cursor;

    /// Builds a FAT16 image with the given FAT entries pre-populated,
    /// returning the backing `SectorDevice` rather than a `Volume` so each
    /// test can own the device the `Volume` it opens will borrow.
    fn device_with_fat(entries: &[u16]) -> SectorDevice<Cursor<Vec<u8>>> {
        let root_entries = 16u16;
        let sectors_per_cluster = 1u8;
        let reserved = 1u32;
        let fats = 1u32;
        let root_sectors = (root_entries as u32 * 32).div_ceil(512);
        let fat_size_sectors = ((entries.len() * 2) as u32).div_ceil(512).max(1);
        let data_sectors = (FAT16_MIN_CLUSTERS_FOR_TEST) * sectors_per_cluster as u32;
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

        let fat_offset = reserved as usize * 512;
        for (i, &e) in entries.iter().enumerate() {
            let off = fat_offset + i * 2;
            img[off..off + 2].copy_from_slice(&e.to_le_bytes());
        }

        let sectors = (img.len() / 512) as u32;
        SectorDevice::from_reader(Cursor::new(img), sectors)
    }

    const FAT16_MIN_CLUSTERS_FOR_TEST: u32 = 4085;

    #[test]
    fn single_cluster_chain() {
        let mut entries = vec![0u16; 4100];
        entries[2] = 0xFFFF; // cluster 2 is the only cluster, end of chain.
        let device = device_with_fat(&entries);
        let volume = Volume::open(&device, 0).unwrap();
        let chain = ClusterChain::build(&volume, 2).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.cluster_at(0), Some(2));
    }

    #[test]
    fn multi_cluster_chain() {
        let mut entries = vec![0u16; 4100];
        entries[2] = 3;
        entries[3] = 4;
        entries[4] = 0xFFF8;
        let device = device_with_fat(&entries);
        let volume = Volume::open(&device, 0).unwrap();
        let chain = ClusterChain::build(&volume, 2).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.cluster_at(2), Some(4));
    }

    #[test]
    fn defect_marker_mid_chain_is_fatal() {
        let mut entries = vec![0u16; 4100];
        entries[2] = 0xFFF0;
        let device = device_with_fat(&entries);
        let volume = Volume::open(&device, 0).unwrap();
        assert!(matches!(
            ClusterChain::build(&volume, 2),
            Err(Error::MalformedVolume(_))
        ));
    }

    #[test]
    fn free_marker_mid_chain_is_fatal() {
        let mut entries = vec![0u16; 4100];
        entries[2] = 0;
        let device = device_with_fat(&entries);
        let volume = Volume::open(&device, 0).unwrap();
        assert!(matches!(
            ClusterChain::build(&volume, 2),
            Err(Error::MalformedVolume(_))
        ));
    }

    #[test]
    fn start_cluster_of_zero_or_one_is_rejected_before_touching_the_fat() {
        let entries = vec![0u16; 4100];
        let device = device_with_fat(&entries);
        let volume = Volume::open(&device, 0).unwrap();

        assert!(matches!(
            ClusterChain::build(&volume, 0),
            Err(Error::MalformedVolume(_))
        ));
        assert!(matches!(
            ClusterChain::build(&volume, 1),
            Err(Error::MalformedVolume(_))
        ));
    }
}
