//! Volume label directory entry. Up to 11 UTF-16 code units, configured at
//! construction via [`crate::options::Options::volume_label_utf16`].

use arbitrary_int::u5;
use bytemuck::{Pod, Zeroable};

use super::EntryType;

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct VolumeLabelDirectoryEntry {
    entry_type: EntryType,
    pub character_count: u8,
    pub volume_label: [u16; 11],
    pub reserved: [u8; 8],
}

impl VolumeLabelDirectoryEntry {
    pub fn new(label: &[u16]) -> Self {
        let character_count = label.len().min(11) as u8;
        let mut volume_label = [0u16; 11];
        volume_label[..character_count as usize].copy_from_slice(&label[..character_count as usize]);

        Self {
            entry_type: EntryType::new_with_raw_value(0)
                .with_type_code(u5::new(3))
                .with_in_use(true), // 0x83
            character_count,
            volume_label,
            reserved: [0; 8],
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
    fn label_is_truncated_to_eleven_units() {
        let label: Vec<u16> = "ABCDEFGHIJKLMNOP".encode_utf16().collect();
        let entry = VolumeLabelDirectoryEntry::new(&label);
        assert_eq!(entry.character_count, 11);
    }

    #[test]
    fn empty_label_is_zeroed() {
        let entry = VolumeLabelDirectoryEntry::new(&[]);
        assert_eq!(entry.character_count, 0);
        assert_eq!(entry.volume_label, [0u16; 11]);
    }
}
