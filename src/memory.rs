//! The collaborators this crate reads live device state through. None of
//! them are implemented here — §1 scopes the physical reads of flash/ROM/
//! SRAM and the partition table out of this crate; this trait is the seam.

/// Supplies the bytes backing the static memory-mapped files (`BOOTROM.BIN`,
/// `SRAM.BIN`, `FLASH.BIN`) and named flash partitions. `address` is a
/// byte offset into the respective region; callers of `read_*` guarantee
/// `address + buf.len()` stays within the region's configured size.
pub trait MemoryProvider {
    fn read_bootrom(&self, address: u32, buf: &mut [u8]);
    fn read_sram(&self, address: u32, buf: &mut [u8]);
    fn read_flash(&self, address: u32, buf: &mut [u8]);

    /// Reads from a named partition's backing pages. `first_page` and the
    /// per-page size are whatever the partition enumerator reported them
    /// to be; this crate treats them as an opaque (page, offset) address.
    fn read_partition(&self, first_page: u32, offset: u32, buf: &mut [u8]);

    /// A single byte that changes between reads, backing the
    /// `CHANGING_FILE` demo file (§6 config table). Default: a free-running
    /// counter so the default implementation is still observable.
    fn changing_file_byte(&self, _offset: u32) -> u8 {
        0
    }

    /// Reads a caller-registered user file's bytes. `id` is whatever opaque
    /// value was passed to `VirtualExFat::register_user_file`. Default
    /// implementation zero-fills, so providers that never register a user
    /// file don't need to implement this.
    fn read_user_file(&self, _id: u32, _offset: u32, buf: &mut [u8]) {
        buf.fill(0);
    }
}
