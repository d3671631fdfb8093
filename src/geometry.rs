//! Compile-time-shaped volume geometry. Everything here is a pure function
//! of [`crate::options::Options`], computed once in
//! [`crate::VirtualExFat::new`] and never touched again — no read ever
//! recomputes a region boundary.

use crate::options::Options;
use crate::util::{unsigned_align_to, unsigned_rounded_up_div};

pub const BYTES_PER_SECTOR: u32 = 512;
pub const BYTES_PER_SECTOR_SHIFT: u8 = 9;
pub const SECTORS_PER_CLUSTER: u32 = 8;
pub const SECTORS_PER_CLUSTER_SHIFT: u8 = 3;
pub const CLUSTER_SIZE: u32 = BYTES_PER_SECTOR * SECTORS_PER_CLUSTER;

/// Sectors consumed by the Main Boot Region + Backup Boot Region, fixed by
/// the exFAT on-disk format regardless of volume size.
pub const BOOT_REGION_SECTORS: u32 = 24;

pub const ROOT_DIRECTORY_CLUSTER_COUNT: u32 = 3;

/// First valid cluster index in the cluster heap.
pub const FIRST_CLUSTER: u32 = 2;

#[derive(Debug, Clone)]
pub struct Geometry {
    pub volume_length: u64,
    pub fat_offset: u32,
    pub fat_length: u32,
    pub cluster_heap_offset: u32,
    pub cluster_count: u32,

    pub allocation_bitmap_start_cluster: u32,
    pub allocation_bitmap_cluster_count: u32,
    pub allocation_bitmap_size_bytes: u32,

    pub upcase_table_start_cluster: u32,
    pub upcase_table_cluster_count: u32,

    pub root_directory_start_cluster: u32,

    pub dynamic_area_start_cluster: u32,
    pub dynamic_area_end_cluster: u32,
}

impl Geometry {
    pub fn new(options: &Options, upcase_table_size_bytes: u32) -> Self {
        // The bitmap's own size depends on cluster_count, which depends on
        // where the dynamic area starts, which depends on the bitmap's
        // size. Converge by fixed point over a small, bounded number of
        // iterations — each refines cluster_count_guess upward only, and
        // the loop body is monotonic, so it settles in at most a handful
        // of passes for any sane configuration.
        let allocation_bitmap_start_cluster = FIRST_CLUSTER;

        let default_dynamic_end = options
            .dynamic_area_start_cluster
            .saturating_add(1)
            .max(Self::static_files_cluster_span(options) + FIRST_CLUSTER)
            .max(FIRST_CLUSTER + 1);
        let mut cluster_count_guess = options
            .dynamic_area_end_cluster
            .max(default_dynamic_end)
            .saturating_sub(FIRST_CLUSTER)
            .max(Self::static_files_cluster_span(options));

        let (allocation_bitmap_cluster_count, allocation_bitmap_size_bytes) = loop {
            let bitmap_size_bytes =
                unsigned_align_to(unsigned_rounded_up_div(cluster_count_guess.max(1), 8), CLUSTER_SIZE);
            let bitmap_clusters = bitmap_size_bytes / CLUSTER_SIZE;

            let upcase_table_cluster_count =
                unsigned_rounded_up_div(upcase_table_size_bytes, CLUSTER_SIZE).max(1);
            let root_directory_start_cluster = allocation_bitmap_start_cluster
                + bitmap_clusters
                + upcase_table_cluster_count;
            let dynamic_start = if options.dynamic_area_start_cluster != 0 {
                options.dynamic_area_start_cluster
            } else {
                root_directory_start_cluster + ROOT_DIRECTORY_CLUSTER_COUNT
            };
            let dynamic_end = options.dynamic_area_end_cluster.max(dynamic_start);

            let new_guess = dynamic_end
                .saturating_sub(FIRST_CLUSTER)
                .max(Self::static_files_cluster_span(options));

            if new_guess == cluster_count_guess {
                break (bitmap_clusters, bitmap_size_bytes);
            }
            cluster_count_guess = new_guess;
        };

        let upcase_table_cluster_count =
            unsigned_rounded_up_div(upcase_table_size_bytes, CLUSTER_SIZE).max(1);
        let upcase_table_start_cluster =
            allocation_bitmap_start_cluster + allocation_bitmap_cluster_count;
        let root_directory_start_cluster = upcase_table_start_cluster + upcase_table_cluster_count;

        let dynamic_area_start_cluster = if options.dynamic_area_start_cluster != 0 {
            options.dynamic_area_start_cluster
        } else {
            root_directory_start_cluster + ROOT_DIRECTORY_CLUSTER_COUNT
        };
        let dynamic_area_end_cluster = options
            .dynamic_area_end_cluster
            .max(dynamic_area_start_cluster);

        let cluster_count = (dynamic_area_end_cluster - FIRST_CLUSTER)
            .max(Self::static_files_cluster_span(options));

        let fat_offset = BOOT_REGION_SECTORS;
        let fat_length = Self::fat_length_sectors(cluster_count);
        let cluster_heap_offset =
            unsigned_align_to(fat_offset + fat_length, SECTORS_PER_CLUSTER);

        let volume_length =
            u64::from(cluster_heap_offset) + u64::from(cluster_count) * u64::from(SECTORS_PER_CLUSTER);

        let geometry = Self {
            volume_length,
            fat_offset,
            fat_length,
            cluster_heap_offset,
            cluster_count,

            allocation_bitmap_start_cluster,
            allocation_bitmap_cluster_count,
            allocation_bitmap_size_bytes,

            upcase_table_start_cluster,
            upcase_table_cluster_count,

            root_directory_start_cluster,

            dynamic_area_start_cluster,
            dynamic_area_end_cluster,
        };

        geometry.check_invariants();
        geometry
    }

    fn static_files_cluster_span(options: &Options) -> u32 {
        [options.sram, options.bootrom, options.flash, options.changing_file]
            .into_iter()
            .filter(|f| f.enabled)
            .map(|f| {
                let clusters = unsigned_rounded_up_div(f.size_bytes.max(1), CLUSTER_SIZE);
                f.start_cluster + clusters - FIRST_CLUSTER
            })
            .max()
            .unwrap_or(0)
    }

    fn fat_length_sectors(cluster_count: u32) -> u32 {
        let entries_needed = u64::from(cluster_count) + 2;
        let bytes_needed = entries_needed * 4;
        unsigned_rounded_up_div(bytes_needed, u64::from(BYTES_PER_SECTOR)) as u32
    }

    fn check_invariants(&self) {
        debug_assert_eq!(self.cluster_heap_offset % SECTORS_PER_CLUSTER, 0, "CHO must be cluster-aligned");
        debug_assert!(self.fat_offset >= BOOT_REGION_SECTORS);
        debug_assert!(self.cluster_heap_offset >= self.fat_offset + self.fat_length);
        debug_assert!(self.root_directory_start_cluster >= self.upcase_table_start_cluster);
        debug_assert!(self.dynamic_area_start_cluster >= self.root_directory_start_cluster + ROOT_DIRECTORY_CLUSTER_COUNT);
    }

    /// Translate a cluster index (>= 2) to its first LBA in the cluster heap.
    pub fn cluster_to_lba(&self, cluster: u32) -> u32 {
        self.cluster_heap_offset + (cluster - FIRST_CLUSTER) * SECTORS_PER_CLUSTER
    }

    /// Translate an LBA within the cluster heap back to a cluster index.
    pub fn lba_to_cluster(&self, lba: u32) -> u32 {
        FIRST_CLUSTER + (lba - self.cluster_heap_offset) / SECTORS_PER_CLUSTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Options {
        Options {
            dynamic_area_end_cluster: 512,
            ..Options::default()
        }
    }

    #[test]
    fn cluster_heap_offset_is_aligned() {
        let geometry = Geometry::new(&options(), 64);
        assert_eq!(geometry.cluster_heap_offset % SECTORS_PER_CLUSTER, 0);
    }

    #[test]
    fn cluster_roundtrip() {
        let geometry = Geometry::new(&options(), 64);
        let lba = geometry.cluster_to_lba(10);
        assert_eq!(geometry.lba_to_cluster(lba), 10);
    }

    #[test]
    fn regions_are_ordered_and_non_overlapping() {
        let geometry = Geometry::new(&options(), 64);
        assert!(geometry.upcase_table_start_cluster >= geometry.allocation_bitmap_start_cluster + geometry.allocation_bitmap_cluster_count);
        assert!(geometry.root_directory_start_cluster >= geometry.upcase_table_start_cluster);
        assert!(geometry.dynamic_area_start_cluster >= geometry.root_directory_start_cluster + ROOT_DIRECTORY_CLUSTER_COUNT);
    }
}
