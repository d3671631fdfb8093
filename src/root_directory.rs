//! Root directory generator (§4.6). Sector 0 of the root holds the fixed
//! label/bitmap/up-case entry set; every sector after that holds exactly
//! one file's directory set, never spanning a sector boundary — which is
//! why every configured file name must fit in 14 name-entries (210 UTF-16
//! units) alongside its primary and stream-extension entries.

use crate::data_region::allocation_bitmap::AllocationBitmapDirectoryEntry;
use crate::data_region::file::{set_checksum, FileDirectoryEntry, FileNameDirectoryEntry, StreamExtensionDirectoryEntry};
use crate::data_region::upcase_table::{upcase_name, UpcaseTableDirectoryEntry};
use crate::data_region::volume_label::VolumeLabelDirectoryEntry;
use crate::geometry::BYTES_PER_SECTOR;

pub const ENTRY_SIZE: usize = 32;

/// An "unused" directory entry marker: type byte 0x01, zero otherwise.
const UNUSED_ENTRY: [u8; ENTRY_SIZE] = {
    let mut entry = [0u8; ENTRY_SIZE];
    entry[0] = 0x01;
    entry
};

/// Renders the root directory's fixed sector 0: volume label, allocation
/// bitmap, and up-case table entries, padded with unused markers.
pub fn render_fixed_sector(
    label: &VolumeLabelDirectoryEntry,
    bitmap: &AllocationBitmapDirectoryEntry,
    upcase: &UpcaseTableDirectoryEntry,
    buf: &mut [u8],
) {
    debug_assert_eq!(buf.len(), BYTES_PER_SECTOR as usize);
    fill_unused(buf);
    buf[0..32].copy_from_slice(label.as_bytes());
    buf[32..64].copy_from_slice(bitmap.as_bytes());
    buf[64..96].copy_from_slice(upcase.as_bytes());
}

/// The minimal view of a file this module needs to render a directory set
/// — shared shape for static and dynamic files alike.
pub struct FileDescriptor<'a> {
    pub name_utf16: &'a [u16],
    pub first_cluster: u32,
    pub size_bytes: u64,
    pub created_timestamp: u32,
    pub modified_timestamp: u32,
}

/// Renders one file's directory set into a whole sector, unused-entry
/// padded. Panics (a programming error, not a runtime one) if the name
/// doesn't fit a single sector's worth of entries — callers are expected
/// to validate name length at registration time.
pub fn render_file_sector(file: &FileDescriptor, buf: &mut [u8]) {
    debug_assert_eq!(buf.len(), BYTES_PER_SECTOR as usize);
    let upcased = upcase_name(file.name_utf16);
    let hash = crate::data_region::file::name_hash(&upcased);

    let name_entries = FileNameDirectoryEntry::chunks_for(file.name_utf16);
    let secondary_count = 1 + name_entries.len() as u8;
    let entries_used = 2 + name_entries.len();
    assert!(
        entries_used * ENTRY_SIZE <= buf.len(),
        "file name too long to fit a single directory sector"
    );

    let stream = StreamExtensionDirectoryEntry::new(
        file.name_utf16.len() as u8,
        hash,
        file.first_cluster,
        file.size_bytes,
    );

    let mut primary = FileDirectoryEntry::new(secondary_count, file.created_timestamp, file.modified_timestamp);
    let name_entry_bytes: Vec<&[u8]> = name_entries.iter().map(|e| e.as_bytes()).collect();
    let mut secondaries = vec![stream.as_bytes()];
    secondaries.extend(name_entry_bytes);
    primary.set_checksum = set_checksum(primary.as_bytes(), &secondaries);

    fill_unused(buf);
    buf[0..32].copy_from_slice(primary.as_bytes());
    buf[32..64].copy_from_slice(stream.as_bytes());
    for (i, entry) in name_entries.iter().enumerate() {
        let start = 64 + i * ENTRY_SIZE;
        buf[start..start + ENTRY_SIZE].copy_from_slice(entry.as_bytes());
    }
}

/// A whole sector of unused-entry markers — every root-directory slot
/// beyond the registered file count.
pub fn render_unused_sector(buf: &mut [u8]) {
    fill_unused(buf);
}

fn fill_unused(buf: &mut [u8]) {
    for chunk in buf.chunks_exact_mut(ENTRY_SIZE) {
        chunk.copy_from_slice(&UNUSED_ENTRY);
    }
}

/// Maximum UTF-16 code units a name can have and still fit one file's
/// directory set into a single 512-byte sector: 16 total entries, minus
/// the primary and stream-extension entries, times 15 units per name entry.
pub const MAX_NAME_UNITS: usize = (BYTES_PER_SECTOR as usize / ENTRY_SIZE - 2) * 15;
