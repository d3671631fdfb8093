//! File directory entries: the primary File entry, its Stream Extension
//! secondary, and the File Name secondaries that follow it. Also hosts the
//! timestamp packing and the set-checksum / name-hash recurrences shared by
//! every directory set this crate emits.

use arbitrary_int::{u10, u4, u5, u6, u7};
use bitbybit::bitfield;
use bytemuck::{Pod, Zeroable};

use super::{EntryType, GeneralPrimaryFlags};
use crate::util::ror16_add;

#[bitfield(u16)]
#[derive(Zeroable, Pod)]
pub struct FileAttributes {
    #[bit(0, rw)]
    read_only: bool,

    #[bit(1, rw)]
    hidden: bool,

    #[bit(2, rw)]
    system: bool,

    #[bit(3, rw)]
    reserved_1: bool,

    #[bit(4, rw)]
    directory: bool,

    #[bit(5, rw)]
    archive: bool,

    #[bits(6..=15, rw)]
    reserved_2: u10,
}

#[bitfield(u32)]
#[derive(Zeroable, Pod)]
struct Timestamp {
    #[bits(0..=4, rw)]
    double_seconds: u5,
    #[bits(5..=10, rw)]
    minute: u6,
    #[bits(11..=15, rw)]
    hour: u5,
    #[bits(16..=20, rw)]
    day: u5,
    #[bits(21..=24, rw)]
    month: u4,
    /// Relative to 1980: 0 represents 1980, 127 represents 2107.
    #[bits(25..=31, rw)]
    year: u7,
}

#[bitfield(u8)]
#[derive(Zeroable, Pod)]
struct UtcOffset {
    #[bits(0..=6, rw)]
    offset_from_utc: u7,
    /// Set to mark the offset fields valid; this crate always sets it and
    /// reports UTC (offset 0).
    #[bit(7, rw)]
    offset_valid: bool,
}

const UTC_VALID: u8 = 0x80;

/// Packs a calendar timestamp into the 32-bit exFAT representation. Years
/// before 1980 clamp to 1980, matching the field's defined range.
pub fn pack_timestamp(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> u32 {
    let year_offset = year.saturating_sub(1980).min(127);
    Timestamp::new_with_raw_value(0)
        .with_year(u7::new(year_offset as u8))
        .with_month(u4::new(month as u8))
        .with_day(u5::new(day as u8))
        .with_hour(u5::new(hour as u8))
        .with_minute(u6::new(minute as u8))
        .with_double_seconds(u5::new((second / 2) as u8))
        .raw_value()
}

/// Splits a Unix epoch-second count into the fields [`pack_timestamp`]
/// wants. This crate has no RTC of its own (§1 scope); callers supply the
/// epoch seconds, this just does the calendar arithmetic.
pub fn epoch_seconds_to_timestamp(epoch_secs: u64) -> u32 {
    const SECS_PER_DAY: u64 = 86_400;
    let days = epoch_secs / SECS_PER_DAY;
    let secs_of_day = epoch_secs % SECS_PER_DAY;
    let (hour, minute, second) = (secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60);

    let (year, month, day) = civil_from_days(days as i64);
    pack_timestamp(year as u32, month as u32, day as u32, hour as u32, minute as u32, second as u32)
}

/// Howard Hinnant's days-from-civil algorithm, inverted: days since the
/// Unix epoch to a proleptic-Gregorian (year, month, day).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct FileDirectoryEntry {
    entry_type: EntryType,
    pub secondary_count: u8,
    pub set_checksum: u16,
    pub file_attributes: FileAttributes,
    reserved_1: u16,
    create_timestamp: u32,
    last_modified_timestamp: u32,
    last_accessed_timestamp: u32,
    create_10ms_increment: u8,
    last_modified_10ms_increment: u8,
    create_utc_offset: u8,
    last_modified_utc_offset: u8,
    last_accessed_utc_offset: u8,
    reserved_2: [u8; 7],
}

impl FileDirectoryEntry {
    pub fn new(secondary_count: u8, created: u32, modified: u32) -> Self {
        Self {
            entry_type: EntryType::new_with_raw_value(0)
                .with_type_code(u5::new(5))
                .with_in_use(true), // 0x85
            secondary_count,
            set_checksum: 0,
            file_attributes: FileAttributes::new_with_raw_value(0).with_read_only(true),
            reserved_1: 0,
            create_timestamp: created,
            last_modified_timestamp: modified,
            last_accessed_timestamp: modified,
            create_10ms_increment: 0,
            last_modified_10ms_increment: 0,
            create_utc_offset: UTC_VALID,
            last_modified_utc_offset: UTC_VALID,
            last_accessed_utc_offset: UTC_VALID,
            reserved_2: [0; 7],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[derive(Debug, Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct StreamExtensionDirectoryEntry {
    entry_type: EntryType,
    pub general_secondary_flags: GeneralPrimaryFlags,
    reserved_1: u8,
    pub name_length: u8,
    pub name_hash: u16,
    reserved_2: u16,
    pub valid_data_length: u64,
    reserved_3: u32,
    pub first_cluster: u32,
    pub data_length: u64,
}

impl StreamExtensionDirectoryEntry {
    pub fn new(name_length: u8, name_hash: u16, first_cluster: u32, data_length: u64) -> Self {
        Self {
            entry_type: EntryType::new_with_raw_value(0)
                .with_type_category(true)
                .with_in_use(true), // 0xC0
            general_secondary_flags: GeneralPrimaryFlags::new_with_raw_value(0)
                .with_allocation_possible(true)
                .with_no_fat_chain(true),
            reserved_1: 0,
            name_length,
            name_hash,
            reserved_2: 0,
            valid_data_length: data_length,
            reserved_3: 0,
            first_cluster,
            data_length,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct FileNameDirectoryEntry {
    entry_type: EntryType,
    general_secondary_flags: GeneralPrimaryFlags,
    pub file_name: [u16; 15],
}

impl FileNameDirectoryEntry {
    pub fn chunks_for(name: &[u16]) -> Vec<Self> {
        name.chunks(15)
            .map(|chunk| {
                let mut entry = Self {
                    entry_type: EntryType::new_with_raw_value(0)
                        .with_type_code(u5::new(1))
                        .with_type_category(true)
                        .with_in_use(true), // 0xC1
                    general_secondary_flags: GeneralPrimaryFlags::new_with_raw_value(0),
                    file_name: [0; 15],
                };
                entry.file_name[..chunk.len()].copy_from_slice(chunk);
                entry
            })
            .collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

pub fn is_illegal_file_name_character(ch: &u16) -> bool {
    matches!(
        *ch,
        0x00..=0x1F | 0x22 | 0x2A | 0x2F | 0x3A | 0x3C | 0x3E | 0x3F | 0x5C | 0x7C
    )
}

/// Name hash over an up-cased UTF-16 name: low byte then high byte of each
/// code unit, folded with [`ror16_add`].
pub fn name_hash(upcased_name: &[u16]) -> u16 {
    let bytes: &[u8] = bytemuck::cast_slice(upcased_name);
    bytes.iter().fold(0u16, |sum, &byte| ror16_add(sum, byte))
}

/// Directory set checksum: folds every byte of the set except bytes 2 and 3
/// of the first (primary) entry, where the checksum itself lives.
pub fn set_checksum(primary: &[u8], secondaries: &[&[u8]]) -> u16 {
    let mut sum = 0u16;
    for (index, &byte) in primary.iter().enumerate() {
        if index == 2 || index == 3 {
            continue;
        }
        sum = ror16_add(sum, byte);
    }
    for secondary in secondaries {
        for &byte in *secondary {
            sum = ror16_add(sum, byte);
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_known_vectors() {
        let name: Vec<u16> = "LOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOOONG"
            .encode_utf16()
            .collect();
        assert_eq!(name_hash(&name), 0x344B);

        let name: Vec<u16> = "LOOOOOOOOOOOOOOOOONG".encode_utf16().collect();
        assert_eq!(name_hash(&name), 0xA585);
    }

    #[test]
    fn timestamp_clamps_pre_1980() {
        let ts = pack_timestamp(1975, 1, 1, 0, 0, 0);
        assert_eq!((ts >> 25) & 0x7F, 0);
    }

    #[test]
    fn timestamp_round_trips_fields() {
        let ts = pack_timestamp(2024, 3, 15, 13, 42, 30);
        assert_eq!((ts >> 25) & 0x7F, 2024 - 1980);
        assert_eq!((ts >> 21) & 0xF, 3);
        assert_eq!((ts >> 16) & 0x1F, 15);
        assert_eq!((ts >> 11) & 0x1F, 13);
        assert_eq!((ts >> 5) & 0x3F, 42);
        assert_eq!(ts & 0x1F, 15);
    }

    #[test]
    fn set_checksum_skips_own_field() {
        let mut primary = [0u8; 32];
        primary[0] = 0x85;
        let a = set_checksum(&primary, &[]);
        primary[2] = 0xAB;
        primary[3] = 0xCD;
        let b = set_checksum(&primary, &[]);
        assert_eq!(a, b);
    }
}
