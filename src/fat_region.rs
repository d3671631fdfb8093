//! First-FAT generator. Only FAT0's first sector carries content:
//! contiguous chains for the allocation bitmap, up-case table, and root
//! directory. Everything else in the FAT region reads as zero, which is
//! correct because every file directory entry this crate emits sets the
//! "no FAT chain" flag — the host never walks the FAT for file content.

use crate::geometry::Geometry;

pub const MEDIA_DESCRIPTOR_ENTRY: u32 = 0xFFFF_FFF8;
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFF;

/// Precomputed FAT0 entries, indexed by cluster number (so `entries[0]` and
/// `entries[1]` are the two reserved entries). Built once at construction
/// from the geometry and held for the volume's lifetime — a few dozen
/// `u32`s at most, since it only spans the fixed regions.
#[derive(Debug, Clone)]
pub struct FirstFat {
    entries: Vec<u32>,
}

impl FirstFat {
    pub fn new(geometry: &Geometry) -> Self {
        let mut entries = vec![MEDIA_DESCRIPTOR_ENTRY, END_OF_CHAIN];

        append_chain(
            &mut entries,
            geometry.allocation_bitmap_start_cluster,
            geometry.allocation_bitmap_cluster_count,
        );
        append_chain(
            &mut entries,
            geometry.upcase_table_start_cluster,
            geometry.upcase_table_cluster_count,
        );
        append_chain(
            &mut entries,
            geometry.root_directory_start_cluster,
            crate::geometry::ROOT_DIRECTORY_CLUSTER_COUNT,
        );

        Self { entries }
    }

    /// Writes one FAT sector's worth of little-endian 32-bit entries.
    /// `sector_index` is relative to the start of FAT0; only sector 0 has
    /// non-zero content.
    pub fn read_sector(&self, sector_index: u32, buf: &mut [u8]) {
        if sector_index != 0 {
            buf.fill(0);
            return;
        }

        let entries_per_sector = buf.len() / 4;
        for (i, chunk) in buf.chunks_exact_mut(4).enumerate().take(entries_per_sector) {
            let entry = self.entries.get(i).copied().unwrap_or(0);
            chunk.copy_from_slice(&entry.to_le_bytes());
        }
    }
}

/// Extends `entries` with a contiguous chain: each cluster in
/// `[start_cluster, start_cluster + cluster_count)` points to the next,
/// the last cluster terminated with [`END_OF_CHAIN`]. A zero-length chain
/// (an unused region, e.g. no up-case table clusters needed) is a no-op.
fn append_chain(entries: &mut Vec<u32>, start_cluster: u32, cluster_count: u32) {
    if cluster_count == 0 {
        return;
    }

    let end = (start_cluster + cluster_count) as usize;
    if entries.len() < end {
        entries.resize(end, 0);
    }

    for i in 0..cluster_count {
        let cluster = start_cluster + i;
        let next = if i + 1 < cluster_count {
            cluster + 1
        } else {
            END_OF_CHAIN
        };
        entries[cluster as usize] = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn geometry() -> Geometry {
        let options = Options {
            dynamic_area_end_cluster: 512,
            ..Options::default()
        };
        Geometry::new(&options, 64)
    }

    #[test]
    fn reserved_entries_are_seeded() {
        let fat = FirstFat::new(&geometry());
        let mut buf = [0u8; 16];
        fat.read_sector(0, &mut buf);
        assert_eq!(&buf[0..4], &MEDIA_DESCRIPTOR_ENTRY.to_le_bytes());
        assert_eq!(&buf[4..8], &END_OF_CHAIN.to_le_bytes());
    }

    #[test]
    fn bitmap_chain_is_contiguous_and_terminated() {
        let geometry = geometry();
        let fat = FirstFat::new(&geometry);
        let mut buf = vec![0u8; 512];
        fat.read_sector(0, &mut buf);

        let entry_at = |cluster: u32| -> u32 {
            let offset = cluster as usize * 4;
            u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
        };

        let start = geometry.allocation_bitmap_start_cluster;
        let count = geometry.allocation_bitmap_cluster_count;
        for i in 0..count.saturating_sub(1) {
            assert_eq!(entry_at(start + i), start + i + 1);
        }
        if count > 0 {
            assert_eq!(entry_at(start + count - 1), END_OF_CHAIN);
        }
    }

    #[test]
    fn sectors_past_the_first_are_zero() {
        let fat = FirstFat::new(&geometry());
        let mut buf = [0xAAu8; 512];
        fat.read_sector(1, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
