//! Allocation Bitmap generator. Every bit reads back set: the host must see
//! every cluster as allocated, which is the read-only volume's entire
//! defense against a host attempting to write.

use arbitrary_int::{u5, u7};
use bitbybit::bitfield;
use bytemuck::{Pod, Zeroable};

use super::EntryType;

/// Size in bytes of a bitmap covering `cluster_count` clusters, rounded up
/// to a whole cluster (the bitmap's own on-disk allocation must be
/// cluster-aligned, same as every other fixed region).
pub fn size_bytes(cluster_count: u32, cluster_size: u32) -> u32 {
    let bits_needed = crate::util::unsigned_rounded_up_div(cluster_count.max(1), 8);
    crate::util::unsigned_align_to(bits_needed, cluster_size)
}

/// Fills `buf` with 0xFF for every bit that falls within the bitmap's
/// `total_size_bytes`, zero beyond it (padding to the cluster boundary).
pub fn read_sector(sector_index: u32, total_size_bytes: u32, buf: &mut [u8]) {
    let sector_start = sector_index as u64 * buf.len() as u64;
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = if sector_start + i as u64 < u64::from(total_size_bytes) {
            0xFF
        } else {
            0
        };
    }
}

#[bitfield(u8)]
#[derive(Zeroable, Pod)]
struct BitmapFlags {
    #[bit(0, rw)]
    is_second_fat: bool,

    #[bits(1..=7, rw)]
    reserved: u7,
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct AllocationBitmapDirectoryEntry {
    entry_type: EntryType,
    bitmap_flags: BitmapFlags,
    reserved: [u8; 18],
    first_cluster: u32,
    data_length: u64,
}

impl AllocationBitmapDirectoryEntry {
    pub fn new(first_cluster: u32, size_bytes: u32) -> Self {
        Self {
            entry_type: EntryType::new_with_raw_value(0)
                .with_type_code(u5::new(1))
                .with_in_use(true), // 0x81
            bitmap_flags: BitmapFlags::new_with_raw_value(0).with_is_second_fat(false),
            reserved: [0; 18],
            first_cluster,
            data_length: u64::from(size_bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_fully_inside_bitmap_is_all_ff() {
        let mut buf = [0u8; 512];
        read_sector(0, 4096, &mut buf);
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn sector_past_bitmap_is_zero() {
        let mut buf = [0xAAu8; 512];
        read_sector(1, 512, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn size_bytes_rounds_up_to_cluster() {
        assert_eq!(size_bytes(1, 4096), 4096);
        assert_eq!(size_bytes(40000, 4096), 8192);
    }
}
