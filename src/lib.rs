//! Virtual exFAT volume synthesizer for an in-memory microcontroller image.
//! Every sector a host reads is produced on demand from compile-time
//! geometry and live pointers into flash, SRAM, boot ROM, named flash
//! partitions, a growing standard-output log, and caller-registered files —
//! nothing is ever materialized on storage.

pub mod data_region;
pub mod boot_region;
pub mod error;
pub mod fat_region;
pub mod geometry;
pub mod memory;
pub mod notification;
pub mod options;
pub mod registry;
pub mod root_directory;
pub mod stdout;
pub mod util;

use log::{debug, error, trace, warn};

use data_region::allocation_bitmap::{self, AllocationBitmapDirectoryEntry};
use data_region::file::epoch_seconds_to_timestamp;
use data_region::upcase_table::{UpcaseTable, UpcaseTableDirectoryEntry};
use data_region::volume_label::VolumeLabelDirectoryEntry;
use error::{GrowError, ReadError, RegistrationError};
use fat_region::FirstFat;
use geometry::{Geometry, BYTES_PER_SECTOR, CLUSTER_SIZE, ROOT_DIRECTORY_CLUSTER_COUNT, SECTORS_PER_CLUSTER};
use memory::MemoryProvider;
use notification::{NotificationState, SenseCode};
use options::{MemoryFileOptions, Options};
use registry::{DynamicFile, FileContent, FileRegistry};
use stdout::StdoutRing;
use util::unsigned_rounded_up_div;

/// SCSI opcodes §4.10 requires this crate reject with `DATA_PROTECT`.
const WRITE_10: u8 = 0x2A;
const WRITE_12: u8 = 0xAA;
const WRITE_16: u8 = 0x8A;
const MODE_SELECT_6: u8 = 0x15;
const MODE_SELECT_10: u8 = 0x55;
const UNMAP: u8 = 0x42;
const FORMAT_UNIT: u8 = 0x04;

/// The SCSI/USB Mass Storage-facing surface (§6). `VirtualExFat` implements
/// this directly — it *is* the SCSI-facing adapter, per the Design Note on
/// avoiding a callback cycle between the registry and the notification
/// state.
pub trait ScsiTarget {
    fn read10(&self, lba: u32, offset: usize, buf: &mut [u8]);
    fn inquiry(&self, resp: &mut [u8]);
    fn mode_sense10(&self, resp: &mut [u8]);
    fn capacity(&self) -> (u64, u32);
    fn test_unit_ready(&self) -> Result<(), SenseCode>;
    fn prevent_allow_medium_removal(&self) -> bool;
    fn write10(&self) -> Result<(), SenseCode>;
    fn scsi(&self, cmd: &[u8; 16], buf: &mut [u8]) -> Result<Option<usize>, SenseCode>;
    fn is_writable(&self) -> bool;
}

/// Owns every piece of state the synthesizer needs: geometry, the cached
/// boot-region bytes, the registry of dynamic files, and the
/// change-notification state. `M` supplies the bytes this crate does not
/// read itself — flash, SRAM, boot ROM, and named partitions (§1 scope).
pub struct VirtualExFat<M: MemoryProvider> {
    options: Options,
    geometry: Geometry,
    memory: M,
    volume_serial_number: u32,

    boot_sector: [u8; BYTES_PER_SECTOR as usize],
    extended: [u8; BYTES_PER_SECTOR as usize],
    oem: [u8; BYTES_PER_SECTOR as usize],
    checksum_sector: [u8; BYTES_PER_SECTOR as usize],

    first_fat: FirstFat,
    upcase_table: UpcaseTable,

    label_entry: VolumeLabelDirectoryEntry,
    bitmap_entry: AllocationBitmapDirectoryEntry,
    upcase_entry: UpcaseTableDirectoryEntry,

    /// Fixed-placement memory-backed files: SRAM, boot ROM, flash, the
    /// changing-byte demo. A fixed-capacity array, not a `Vec` — there are
    /// at most four of these and the set never grows at runtime.
    static_files: [Option<DynamicFile>; 4],

    registry: FileRegistry,
    notification: NotificationState,
    stdout: StdoutRing,

    /// Tracks consumption against `options.bootrom_partitions` separately
    /// from the dynamic file registry's own capacity — the partition
    /// enumerator (§6) has its own `MAX_FILES`/`NAMES_STORAGE_BYTES` budget.
    partition_count: usize,
    partition_name_bytes_used: usize,
}

impl<M: MemoryProvider> VirtualExFat<M> {
    /// Builds the synthesizer. `volume_serial_number` should be derived from
    /// the board's unique identifier (§6 persisted state) so the same board
    /// always remounts with a stable volume identity; this crate has no RTC
    /// of its own; `now_epoch_secs` stamps the initial file timestamps.
    pub fn new(options: Options, memory: M, volume_serial_number: u32, now_epoch_secs: u64) -> Self {
        let upcase_table = UpcaseTable::new();
        let geometry = Geometry::new(&options, upcase_table.size_bytes());

        let boot_sector = boot_region::boot_sector_bytes(&geometry, volume_serial_number);
        let extended = boot_region::extended_boot_sector_bytes();
        let oem = boot_region::oem_parameter_sector_bytes();
        let vbr_checksum = boot_region::vbr_checksum_direct(&boot_sector, &extended, &oem);
        let checksum_sector = boot_region::checksum_sector_bytes(vbr_checksum);

        let first_fat = FirstFat::new(&geometry);

        let label_entry = VolumeLabelDirectoryEntry::new(&options.volume_label_utf16);
        let bitmap_entry = AllocationBitmapDirectoryEntry::new(
            geometry.allocation_bitmap_start_cluster,
            geometry.allocation_bitmap_size_bytes,
        );
        let upcase_entry = UpcaseTableDirectoryEntry::new(
            geometry.upcase_table_start_cluster,
            upcase_table.checksum(),
            upcase_table.size_bytes(),
        );

        let static_files = Self::build_static_files(&options, now_epoch_secs);
        let registry = FileRegistry::new(&geometry, options.max_dynamic_files);
        let notification = NotificationState::new(options.ua_min_delay_ms);
        let stdout = StdoutRing::new(options.stdout_ring_capacity_bytes);

        let mut synth = Self {
            options,
            geometry,
            memory,
            volume_serial_number,
            boot_sector,
            extended,
            oem,
            checksum_sector,
            first_fat,
            upcase_table,
            label_entry,
            bitmap_entry,
            upcase_entry,
            static_files,
            registry,
            notification,
            stdout,
            partition_count: 0,
            partition_name_bytes_used: 0,
        };
        synth.register_stdout_files(now_epoch_secs);
        synth
    }

    fn build_static_files(options: &Options, now_epoch_secs: u64) -> [Option<DynamicFile>; 4] {
        let make = |file: &MemoryFileOptions, content: FileContent| -> Option<DynamicFile> {
            if !file.enabled {
                return None;
            }
            Some(DynamicFile {
                name_utf16: file.file_name.encode_utf16().collect(),
                first_cluster: file.start_cluster,
                capacity_clusters: unsigned_rounded_up_div(file.size_bytes.max(1), CLUSTER_SIZE),
                size_bytes: u64::from(file.size_bytes),
                content,
                created_epoch_secs: now_epoch_secs,
                modified_epoch_secs: now_epoch_secs,
            })
        };
        [
            make(&options.sram, FileContent::Sram),
            make(&options.bootrom, FileContent::Bootrom),
            make(&options.flash, FileContent::Flash),
            make(&options.changing_file, FileContent::ChangingFile),
        ]
    }

    /// The full growing log and the tail-window view (§4.9) are ordinary
    /// dynamic files, sized to the ring's capacity so they can never need
    /// to grow past their initial allocation.
    fn register_stdout_files(&mut self, now_epoch_secs: u64) {
        let capacity = self.options.stdout_ring_capacity_bytes as u64;
        self.registry
            .add("STDOUT.LOG".encode_utf16().collect(), capacity, FileContent::StdoutFull, now_epoch_secs)
            .expect("dynamic area has no room for the stdout log file — check dynamic_area_end_cluster");
        self.registry
            .add("STDOUT.TAIL".encode_utf16().collect(), capacity, FileContent::StdoutTail, now_epoch_secs)
            .expect("dynamic area has no room for the stdout tail-window file — check dynamic_area_end_cluster");
    }

    /// Registers a named flash partition as a root-directory file (§6
    /// producer boundary: "partition enumerator ... populate dynamic
    /// root-directory slots"). `first_page` is opaque outside this crate and
    /// passed straight to `MemoryProvider::read_partition`.
    pub fn register_partition(
        &mut self,
        name_utf8: &str,
        first_page: u32,
        size_bytes: u64,
        now_epoch_secs: u64,
    ) -> Result<usize, RegistrationError> {
        if !self.options.bootrom_partitions.enabled {
            warn!("rejecting partition {name_utf8:?}: partition enumeration is disabled");
            return Err(RegistrationError::PartitionsDisabled);
        }
        if self.partition_count >= self.options.bootrom_partitions.max_files {
            warn!("rejecting partition {name_utf8:?}: at configured max_files ({})", self.options.bootrom_partitions.max_files);
            return Err(RegistrationError::TooManyPartitions);
        }
        let name_bytes_needed = self.partition_name_bytes_used + name_utf8.len();
        if name_bytes_needed > self.options.bootrom_partitions.names_storage_bytes {
            warn!("rejecting partition {name_utf8:?}: names storage budget exhausted");
            return Err(RegistrationError::PartitionNamesStorageExhausted);
        }

        let index = self.registry.add(
            name_utf8.encode_utf16().collect(),
            size_bytes,
            FileContent::Partition(first_page),
            now_epoch_secs,
        )?;
        self.partition_count += 1;
        self.partition_name_bytes_used = name_bytes_needed;
        debug!("registered partition {name_utf8:?} (page {first_page}) as registry slot {index}");
        Ok(index)
    }

    /// Registers a caller-defined user file (§1: "user-defined files").
    /// `content_id` is an opaque value passed back to
    /// [`MemoryProvider::read_user_file`] to distinguish this file from
    /// other user files.
    pub fn register_user_file(
        &mut self,
        name_utf8: &str,
        max_size: u64,
        content_id: u32,
        now_epoch_secs: u64,
    ) -> Result<usize, RegistrationError> {
        let index = self.registry.add(
            name_utf8.encode_utf16().collect(),
            max_size,
            FileContent::UserFile(content_id),
            now_epoch_secs,
        )?;
        debug!("registered user file {name_utf8:?} (id {content_id}) as registry slot {index}");
        Ok(index)
    }

    /// Resizes a previously registered file (§4.7 `update`). `index` is the
    /// value returned by the `register_*` call. `hard_notify` additionally
    /// asks the transport to bounce the USB connection (§4.10).
    pub fn update_file(
        &mut self,
        index: usize,
        new_size: u64,
        now_epoch_secs: u64,
        hard_notify: bool,
    ) -> Result<(), GrowError> {
        let result = self.registry.update(index, new_size, now_epoch_secs);
        match &result {
            Ok(()) => {
                self.notification.content_changed(hard_notify);
            }
            Err(err) => warn!("refusing to grow registry slot {index}: {err}"),
        }
        result
    }

    /// Producer-boundary entry point (§6): pushes bytes into the stdout
    /// ring and runs the on-write hook (§4.9) synchronously.
    pub fn write_stdout(&self, bytes: &[u8]) {
        let idle_ms = self.stdout.ms_since_last_write();
        let unread = self.stdout.write(bytes);
        let idle_sec = idle_ms / 1000;

        if idle_sec >= self.options.stdout_tail_ua_delay_sec && unread >= self.options.stdout_tail_min_amount as u64 {
            debug!("stdout write: idle {idle_sec}s, {unread}B unread — notifying immediately");
            self.notification.disarm_alarm();
            self.notification.content_changed(false);
        } else {
            trace!("stdout write: idle {idle_sec}s, {unread}B unread — arming fallback alarm");
            self.notification.arm_alarm(self.options.stdout_tail_ua_timeout_sec);
        }
    }

    /// Drives the one-shot change-notification alarm (§5: "there is no
    /// scheduler" — the integrator calls this from its own event loop).
    pub fn poll(&self) {
        self.notification.poll_alarm();
    }

    /// Acknowledges that `bytes` of `STDOUT.TAIL` content have actually
    /// reached the host, shrinking the window by that amount (§4.9:
    /// "Reading advances `total_read` ... as the host consumes it"). Deliberately
    /// not driven by [`Self::read`] itself: a single sector of this file may
    /// be pulled through several sub-sector `read` calls (§4.1), and each of
    /// those must see the same snapshot of the window, not one that shrinks
    /// mid-sector. Call this once per completed read of the file — e.g.
    /// after the transport finishes a READ(10) whose data came from this
    /// file — never from inside the per-chunk dispatch path.
    pub fn ack_stdout_tail_read(&self, bytes: u64) {
        self.stdout.advance_tail_window(bytes);
    }

    /// §4.1 dispatch contract: `0 <= offset`, `offset + buf.len() <= 512`.
    pub fn read(&self, lba: u32, offset: usize, buf: &mut [u8]) -> Result<(), ReadError> {
        if u64::from(lba) >= self.geometry.volume_length {
            error!("lba {lba} is outside the volume (length {} sectors)", self.geometry.volume_length);
            return Err(ReadError::OutOfBounds(lba));
        }
        debug_assert!(offset + buf.len() <= BYTES_PER_SECTOR as usize, "read must not cross a sector boundary");

        let mut sector = [0u8; BYTES_PER_SECTOR as usize];
        self.render_sector(lba, &mut sector);
        util::copy_sector_slice(&sector, offset, buf);
        Ok(())
    }

    fn render_sector(&self, lba: u32, buf: &mut [u8; BYTES_PER_SECTOR as usize]) {
        match lba {
            0 | 12 => buf.copy_from_slice(&self.boot_sector),
            1..=8 | 13..=20 => buf.copy_from_slice(&self.extended),
            9..=10 | 21..=22 => buf.copy_from_slice(&self.oem),
            11 | 23 => buf.copy_from_slice(&self.checksum_sector),
            _ if lba < self.geometry.fat_offset => {
                trace!("lba {lba} is boot-region padding; zero-filling");
                buf.fill(0);
            }
            _ if lba < self.geometry.fat_offset + self.geometry.fat_length => {
                self.first_fat.read_sector(lba - self.geometry.fat_offset, buf);
            }
            _ if lba < self.geometry.cluster_heap_offset => {
                trace!("lba {lba} is FAT-region padding; zero-filling");
                buf.fill(0);
            }
            _ if lba
                < self.geometry.cluster_heap_offset + self.geometry.cluster_count * SECTORS_PER_CLUSTER =>
            {
                self.dispatch_cluster_heap(lba, buf);
            }
            _ => {
                error!("lba {lba} falls past the cluster heap with no handler; zero-filling");
                debug_assert!(false, "region table has a gap at lba {lba}");
                buf.fill(0);
            }
        }
    }

    fn dispatch_cluster_heap(&self, lba: u32, buf: &mut [u8; BYTES_PER_SECTOR as usize]) {
        let geometry = &self.geometry;
        let cluster = geometry.lba_to_cluster(lba);

        if (geometry.allocation_bitmap_start_cluster
            ..geometry.allocation_bitmap_start_cluster + geometry.allocation_bitmap_cluster_count)
            .contains(&cluster)
        {
            let sector_index = lba - geometry.cluster_to_lba(geometry.allocation_bitmap_start_cluster);
            allocation_bitmap::read_sector(sector_index, geometry.allocation_bitmap_size_bytes, buf);
            return;
        }

        if (geometry.upcase_table_start_cluster
            ..geometry.upcase_table_start_cluster + geometry.upcase_table_cluster_count)
            .contains(&cluster)
        {
            let sector_index = lba - geometry.cluster_to_lba(geometry.upcase_table_start_cluster);
            self.upcase_table.read_sector(sector_index, buf);
            return;
        }

        if (geometry.root_directory_start_cluster
            ..geometry.root_directory_start_cluster + ROOT_DIRECTORY_CLUSTER_COUNT)
            .contains(&cluster)
        {
            let root_first_sector = geometry.cluster_to_lba(geometry.root_directory_start_cluster);
            self.render_root_directory_sector(lba - root_first_sector, buf);
            return;
        }

        let sector_in_cluster = (lba - geometry.cluster_heap_offset) % SECTORS_PER_CLUSTER;
        match self.locate_file_for_cluster(cluster) {
            Some(file) => {
                let file_offset = u64::from(cluster - file.first_cluster) * u64::from(CLUSTER_SIZE)
                    + u64::from(sector_in_cluster) * u64::from(BYTES_PER_SECTOR);
                self.read_file_content(file, file_offset, buf);
            }
            None => {
                trace!("lba {lba} (cluster {cluster}) has no registered file; zero-filling");
                buf.fill(0);
            }
        }
    }

    fn render_root_directory_sector(&self, sector_offset: u32, buf: &mut [u8; BYTES_PER_SECTOR as usize]) {
        if sector_offset == 0 {
            root_directory::render_fixed_sector(&self.label_entry, &self.bitmap_entry, &self.upcase_entry, buf);
            return;
        }

        let file_index = (sector_offset - 1) as usize;
        match self.file_at(file_index) {
            Some(file) => {
                let descriptor = root_directory::FileDescriptor {
                    name_utf16: file.name_utf16.as_slice(),
                    first_cluster: file.first_cluster,
                    size_bytes: self.live_size(file),
                    created_timestamp: epoch_seconds_to_timestamp(file.created_epoch_secs),
                    modified_timestamp: epoch_seconds_to_timestamp(file.modified_epoch_secs),
                };
                root_directory::render_file_sector(&descriptor, buf);
            }
            None => root_directory::render_unused_sector(buf),
        }
    }

    fn static_files_iter(&self) -> impl Iterator<Item = &DynamicFile> {
        self.static_files.iter().filter_map(|f| f.as_ref())
    }

    /// File `index` from the concatenation of static files then dynamic
    /// files (§4.6), the order root-directory slots are assigned in.
    fn file_at(&self, index: usize) -> Option<&DynamicFile> {
        let static_count = self.static_files_iter().count();
        if index < static_count {
            self.static_files_iter().nth(index)
        } else {
            self.registry.get(index - static_count)
        }
    }

    fn locate_file_for_cluster(&self, cluster: u32) -> Option<&DynamicFile> {
        self.static_files_iter()
            .find(|f| f.cluster_range().contains(&cluster))
            .or_else(|| self.registry.locate(cluster).map(|(f, _)| f))
    }

    /// The tail-window file's size is live (§4.9), not the value stashed at
    /// registration; every other file's size is whatever was last set.
    fn live_size(&self, file: &DynamicFile) -> u64 {
        match file.content {
            FileContent::StdoutTail => self.stdout.tail_window_size(),
            _ => file.size_bytes,
        }
    }

    fn read_file_content(&self, file: &DynamicFile, file_offset: u64, buf: &mut [u8]) {
        let size = self.live_size(file);
        if file_offset >= size {
            buf.fill(0);
            return;
        }

        let available = ((size - file_offset).min(buf.len() as u64)) as usize;
        let (content, tail) = buf.split_at_mut(available);
        match file.content {
            FileContent::Bootrom => self.memory.read_bootrom(file_offset as u32, content),
            FileContent::Sram => self.memory.read_sram(file_offset as u32, content),
            FileContent::Flash => self.memory.read_flash(file_offset as u32, content),
            FileContent::ChangingFile => {
                for (i, byte) in content.iter_mut().enumerate() {
                    *byte = self.memory.changing_file_byte(file_offset as u32 + i as u32);
                }
            }
            FileContent::StdoutFull => self.stdout.read_full_log(file_offset, content),
            FileContent::StdoutTail => self.stdout.peek_tail_window(file_offset, content),
            FileContent::Partition(first_page) => self.memory.read_partition(first_page, file_offset as u32, content),
            FileContent::UserFile(id) => self.memory.read_user_file(id, file_offset as u32, content),
        }
        tail.fill(0);
    }
}

impl<M: MemoryProvider> ScsiTarget for VirtualExFat<M> {
    fn read10(&self, lba: u32, offset: usize, buf: &mut [u8]) {
        if self.read(lba, offset, buf).is_err() {
            buf.fill(0);
        }
    }

    fn inquiry(&self, resp: &mut [u8]) {
        resp.fill(0);
        if resp.is_empty() {
            return;
        }
        resp[0] = 0x00; // direct-access block device
        if resp.len() > 1 {
            resp[1] = 0x80; // removable medium
        }
        if resp.len() > 4 {
            resp[4] = 31; // additional length (36-byte response minus 5)
        }
        copy_padded(resp, 8, b"VEXFAT  ");
        copy_padded(resp, 16, b"VIRTUAL DISK    ");
        copy_padded(resp, 32, b"1.0 ");
    }

    fn mode_sense10(&self, resp: &mut [u8]) {
        resp.fill(0);
        if resp.len() < 8 {
            return;
        }
        resp[1] = 6; // mode data length, excluding this field
        resp[3] = 0x80; // device-specific parameter: write-protected
    }

    fn capacity(&self) -> (u64, u32) {
        (self.geometry.volume_length, BYTES_PER_SECTOR)
    }

    fn test_unit_ready(&self) -> Result<(), SenseCode> {
        self.notification.test_unit_ready()
    }

    fn prevent_allow_medium_removal(&self) -> bool {
        self.notification.prevent_allow_medium_removal()
    }

    fn write10(&self) -> Result<(), SenseCode> {
        Err(SenseCode::DATA_PROTECT)
    }

    fn scsi(&self, cmd: &[u8; 16], _buf: &mut [u8]) -> Result<Option<usize>, SenseCode> {
        match cmd[0] {
            WRITE_10 | WRITE_12 | WRITE_16 | MODE_SELECT_6 | MODE_SELECT_10 | UNMAP | FORMAT_UNIT => {
                warn!("rejecting write-like SCSI command {:#04x}", cmd[0]);
                Err(SenseCode::DATA_PROTECT)
            }
            _ => Ok(None),
        }
    }

    fn is_writable(&self) -> bool {
        false
    }
}

fn copy_padded(buf: &mut [u8], start: usize, value: &[u8]) {
    if start >= buf.len() {
        return;
    }
    let end = (start + value.len()).min(buf.len());
    buf[start..end].copy_from_slice(&value[..end - start]);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestMemory;

    impl MemoryProvider for TestMemory {
        fn read_bootrom(&self, address: u32, buf: &mut [u8]) {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = (address as usize + i) as u8;
            }
        }
        fn read_sram(&self, _address: u32, buf: &mut [u8]) {
            buf.fill(0xAA);
        }
        fn read_flash(&self, _address: u32, buf: &mut [u8]) {
            buf.fill(0xFF);
        }
        fn read_partition(&self, first_page: u32, offset: u32, buf: &mut [u8]) {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = (first_page as usize + offset as usize + i) as u8;
            }
        }
    }

    fn make_exfat() -> VirtualExFat<TestMemory> {
        let options = Options {
            dynamic_area_end_cluster: 512,
            ..Options::default()
        };
        VirtualExFat::new(options, TestMemory, 0x1234_5678, 1_700_000_000)
    }

    #[test]
    fn boot_sector_matches_concrete_scenario() {
        let exfat = make_exfat();
        let mut buf = [0u8; 512];
        exfat.read(0, 0, &mut buf).unwrap();
        assert_eq!(&buf[0..3], &[0xEB, 0x76, 0x90]);
        assert_eq!(&buf[3..11], b"EXFAT   ");
        assert_eq!(&buf[510..512], &[0x55, 0xAA]);
    }

    #[test]
    fn backup_boot_sector_mirrors_main() {
        let exfat = make_exfat();
        let mut main = [0u8; 512];
        let mut backup = [0u8; 512];
        exfat.read(0, 0, &mut main).unwrap();
        exfat.read(12, 0, &mut backup).unwrap();
        assert_eq!(main, backup);
    }

    #[test]
    fn vbr_checksum_sector_matches_recomputation() {
        let exfat = make_exfat();
        let mut checksum_sector = [0u8; 512];
        exfat.read(11, 0, &mut checksum_sector).unwrap();

        let mut sectors = Vec::new();
        for lba in 0..11 {
            let mut buf = [0u8; 512];
            exfat.read(lba, 0, &mut buf).unwrap();
            sectors.push(buf);
        }
        let direct = boot_region::vbr_checksum_direct(&sectors[0], &sectors[1], &sectors[9]);
        assert_eq!(&checksum_sector[0..4], &direct.to_le_bytes());
        assert_eq!(&checksum_sector[0..4], &checksum_sector[4..8]);

        let mut backup_checksum = [0u8; 512];
        exfat.read(23, 0, &mut backup_checksum).unwrap();
        assert_eq!(checksum_sector, backup_checksum);
    }

    #[test]
    fn fat0_seeds_reserved_entries_and_bitmap_chain() {
        let exfat = make_exfat();
        let fat_lba = exfat.geometry.fat_offset;
        let mut buf = [0u8; 16];
        exfat.read(fat_lba, 0, &mut buf).unwrap();
        assert_eq!(&buf[0..4], &fat_region::MEDIA_DESCRIPTOR_ENTRY.to_le_bytes());
        assert_eq!(&buf[4..8], &fat_region::END_OF_CHAIN.to_le_bytes());
    }

    #[test]
    fn root_directory_fixed_sector_precedes_file_sectors() {
        let exfat = make_exfat();
        let root_lba = exfat.geometry.cluster_to_lba(exfat.geometry.root_directory_start_cluster);

        let mut sector0 = [0u8; 512];
        exfat.read(root_lba, 0, &mut sector0).unwrap();
        assert_eq!(sector0[0], 0x83);
        assert_eq!(sector0[32], 0x81);
        assert_eq!(sector0[64], 0x82);
        assert_eq!(&sector0[96..99], &[0x01, 0x01, 0x01]);

        // Only the two stdout files are registered by default; the third
        // slot must read back as an unused marker, not leftover data.
        let mut third_slot = [0u8; 512];
        exfat.read(root_lba + 3, 0, &mut third_slot).unwrap();
        assert_eq!(third_slot[0], 0x01);
    }

    #[test]
    fn registered_file_directory_set_is_internally_consistent() {
        let mut exfat = make_exfat();
        let index = exfat
            .register_user_file("README.TXT", 256, 7, 1_700_000_000)
            .unwrap();
        let root_lba = exfat.geometry.cluster_to_lba(exfat.geometry.root_directory_start_cluster);

        // Two stdout files occupy slots 0 and 1; README.TXT is slot 2.
        let file_slot = index;
        let mut buf = [0u8; 512];
        exfat.read(root_lba + 1 + file_slot as u32, 0, &mut buf).unwrap();

        assert_eq!(buf[0], 0x85);
        assert_eq!(buf[32], 0xC0);
        assert_eq!(buf[64], 0xC1);

        let stored_checksum = u16::from_le_bytes([buf[2], buf[3]]);
        let secondary_count = buf[1] as usize;
        let secondaries: Vec<&[u8]> = (1..=secondary_count).map(|i| &buf[i * 32..i * 32 + 32]).collect();
        let recomputed = data_region::file::set_checksum(&buf[0..32], &secondaries);
        assert_eq!(stored_checksum, recomputed);
    }

    #[test]
    fn change_notification_fires_once_after_content_changed() {
        let exfat = make_exfat();
        assert_eq!(exfat.test_unit_ready(), Ok(()));
        exfat.notification.content_changed(false);
        assert_eq!(exfat.test_unit_ready(), Err(SenseCode::UNIT_ATTENTION_MEDIA_CHANGED));
        assert_eq!(exfat.test_unit_ready(), Ok(()));
    }

    #[test]
    fn write_like_scsi_commands_are_rejected() {
        let exfat = make_exfat();
        let mut cmd = [0u8; 16];
        cmd[0] = WRITE_10;
        assert_eq!(exfat.scsi(&cmd, &mut []), Err(SenseCode::DATA_PROTECT));

        cmd[0] = 0x12; // INQUIRY, not filtered
        assert_eq!(exfat.scsi(&cmd, &mut []), Ok(None));
    }

    #[test]
    fn is_never_writable() {
        let exfat = make_exfat();
        assert!(!exfat.is_writable());
        assert_eq!(exfat.write10(), Err(SenseCode::DATA_PROTECT));
    }

    #[test]
    fn last_lba_in_volume_reads_without_error() {
        let exfat = make_exfat();
        let last = exfat.geometry.volume_length as u32 - 1;
        let mut buf = [0u8; 512];
        assert!(exfat.read(last, 0, &mut buf).is_ok());
        assert!(exfat.read(last + 1, 0, &mut buf).is_err());
    }

    #[test]
    fn split_reads_agree_with_a_whole_sector_read() {
        let exfat = make_exfat();
        let mut whole = [0u8; 512];
        exfat.read(0, 0, &mut whole).unwrap();

        let mut reassembled = [0u8; 512];
        for chunk_start in (0..512).step_by(64) {
            exfat.read(0, chunk_start, &mut reassembled[chunk_start..chunk_start + 64]).unwrap();
        }
        assert_eq!(whole, reassembled);
    }

    #[test]
    fn stdout_tail_window_split_reads_agree_without_explicit_ack() {
        let exfat = make_exfat();
        exfat.write_stdout(&[0xAB; 200]);

        let tail_file = exfat.registry.get(1).unwrap();
        assert_eq!(tail_file.content, FileContent::StdoutTail);
        let lba = exfat.geometry.cluster_to_lba(tail_file.first_cluster);

        let mut whole = [0u8; 512];
        exfat.read(lba, 0, &mut whole).unwrap();

        // Pulling the same sector through 8 separate 64-byte sub-sector
        // reads (as the transport may, per §4.1) must not shrink the
        // window in between — every chunk should see the same snapshot
        // `whole` did.
        let mut reassembled = [0u8; 512];
        for chunk_start in (0..512).step_by(64) {
            exfat.read(lba, chunk_start, &mut reassembled[chunk_start..chunk_start + 64]).unwrap();
        }
        assert_eq!(whole, reassembled);
    }

    #[test]
    fn stdout_tail_ack_shrinks_window_by_exactly_the_acknowledged_amount() {
        let exfat = make_exfat();
        exfat.write_stdout(&[0xCD; 200]);
        let before = exfat.stdout.tail_window_size();
        assert!(before > 0);

        exfat.ack_stdout_tail_read(64);
        assert_eq!(exfat.stdout.tail_window_size(), before - 64);
    }

    #[test]
    fn allocator_exhaustion_surfaces_as_out_of_space() {
        let options = Options {
            dynamic_area_start_cluster: 100,
            dynamic_area_end_cluster: 101,
            max_dynamic_files: 16,
            ..Options::default()
        };
        // The two stdout files alone may already exhaust a one-cluster
        // dynamic region; either they panic at construction (caught here
        // via catch_unwind) or a subsequent explicit registration fails.
        let result = std::panic::catch_unwind(|| VirtualExFat::new(options, TestMemory, 1, 0));
        if let Ok(mut exfat) = result {
            let err = exfat.register_user_file("A.BIN", 1 << 20, 0, 0);
            assert_eq!(err, Err(RegistrationError::OutOfSpace));
        }
    }

    #[test]
    fn partitions_are_rejected_unless_enabled() {
        let mut exfat = make_exfat();
        assert_eq!(
            exfat.register_partition("FACTORY", 0, 4096, 0),
            Err(RegistrationError::PartitionsDisabled)
        );
    }

    #[test]
    fn partition_registration_respects_configured_limits() {
        let options = Options {
            dynamic_area_end_cluster: 512,
            bootrom_partitions: options::PartitionOptions {
                enabled: true,
                max_files: 1,
                names_storage_bytes: 64,
            },
            ..Options::default()
        };
        let mut exfat = VirtualExFat::new(options, TestMemory, 0xAABB_CCDD, 1_700_000_000);

        assert!(exfat.register_partition("FACTORY", 0, 4096, 0).is_ok());
        assert_eq!(
            exfat.register_partition("USERDATA", 1, 4096, 0),
            Err(RegistrationError::TooManyPartitions)
        );
    }
}
