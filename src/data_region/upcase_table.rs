//! Up-case table generator. Ships the minimal table the specification
//! describes — identity everywhere except `a`..`z`, which map to `A`..`Z` —
//! rather than a full Unicode case-folding table, to keep the resident
//! table under a few hundred bytes.

use arbitrary_int::u5;
use bytemuck::{Pod, Zeroable};

use super::EntryType;
use crate::util::ror32_add;

/// Identity everywhere except ASCII lowercase, which maps to uppercase.
fn upcase_code_point(code_point: u32) -> u16 {
    match code_point {
        0x61..=0x7A => (code_point - 0x20) as u16,
        _ => code_point as u16,
    }
}

pub fn upcase_char(ch: u16) -> u16 {
    upcase_code_point(u32::from(ch))
}

pub fn upcase_name(name: &[u16]) -> Vec<u16> {
    name.iter().map(|&ch| upcase_char(ch)).collect()
}

/// The compressed on-disk representation: a run of 0xFFFF + run-length
/// introduces a stretch of identity mappings, anything else is an explicit
/// mapping for the next code point. Built once and held for the volume's
/// lifetime — this walks all 65536 code points but only once.
fn compressed_words() -> Vec<u16> {
    let mut words = Vec::new();
    let mut code_point = 0u32;

    while code_point < 0x1_0000 {
        if upcase_code_point(code_point) == code_point as u16 {
            let start = code_point;
            while code_point < 0x1_0000 && upcase_code_point(code_point) == code_point as u16 {
                code_point += 1;
            }
            let run_len = code_point - start;
            debug_assert!(run_len <= u32::from(u16::MAX), "identity run too long to encode");
            words.push(0xFFFF);
            words.push(run_len as u16);
        } else {
            words.push(upcase_code_point(code_point));
            code_point += 1;
        }
    }

    words
}

pub struct UpcaseTable {
    bytes: Vec<u8>,
    checksum: u32,
}

impl UpcaseTable {
    pub fn new() -> Self {
        let words = compressed_words();
        let mut bytes = Vec::with_capacity(words.len() * 2);
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        let checksum = bytes.iter().fold(0u32, |sum, &byte| ror32_add(sum, byte));

        Self { bytes, checksum }
    }

    pub fn size_bytes(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Writes one sector's worth of the compressed table, zero-filling past
    /// its end.
    pub fn read_sector(&self, sector_index: u32, buf: &mut [u8]) {
        let start = sector_index as usize * buf.len();
        buf.fill(0);
        if start >= self.bytes.len() {
            return;
        }
        let end = (start + buf.len()).min(self.bytes.len());
        buf[..end - start].copy_from_slice(&self.bytes[start..end]);
    }
}

impl Default for UpcaseTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct UpcaseTableDirectoryEntry {
    entry_type: EntryType,
    reserved_1: [u8; 3],
    table_checksum: u32,
    reserved_2: [u8; 12],
    first_cluster: u32,
    data_length: u64,
}

impl UpcaseTableDirectoryEntry {
    pub fn new(first_cluster: u32, table_checksum: u32, data_length: u32) -> Self {
        Self {
            entry_type: EntryType::new_with_raw_value(0)
                .with_type_code(u5::new(2))
                .with_in_use(true), // 0x82
            reserved_1: [0; 3],
            table_checksum,
            reserved_2: [0; 12],
            first_cluster,
            data_length: u64::from(data_length),
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
    fn lowercase_ascii_upcases() {
        let name: Vec<u16> = "Hello World".encode_utf16().collect();
        let upcased = upcase_name(&name);
        assert_eq!(String::from_utf16(&upcased).unwrap(), "HELLO WORLD");
    }

    #[test]
    fn non_letters_are_identity() {
        assert_eq!(upcase_char(0x30), 0x30); // '0'
        assert_eq!(upcase_char(0x7B), 0x7B); // '{'
    }

    #[test]
    fn upcase_is_fixed_point() {
        let name: Vec<u16> = "ALREADY-UPPER.TXT".encode_utf16().collect();
        assert_eq!(upcase_name(&name), name);
    }

    #[test]
    fn table_is_read_back_exactly() {
        let table = UpcaseTable::new();
        let mut reconstructed = Vec::new();
        let sector_count = crate::util::unsigned_rounded_up_div(table.size_bytes(), 512);
        for i in 0..sector_count {
            let mut buf = [0u8; 512];
            table.read_sector(i, &mut buf);
            reconstructed.extend_from_slice(&buf);
        }
        assert_eq!(&reconstructed[..table.bytes.len()], &table.bytes[..]);
    }

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(UpcaseTable::new().checksum(), UpcaseTable::new().checksum());
    }
}
