//! Construction-time configuration. Feature gating is plain `Option`/`bool`
//! fields read once in [`crate::VirtualExFat::new`] rather than preprocessor
//! conditionals — enabling a memory-backed file becomes conditional
//! registration instead of a `#[cfg(feature = ...)]` block.

/// A single memory-backed file: `SRAM.BIN`, `BOOTROM.BIN`, `FLASH.BIN`, or
/// the demo `CHANGING_FILE`. `start_cluster` is chosen by the integrator so
/// that it maps, via the geometry's cluster-to-LBA function, to an LBA whose
/// byte address equals the device memory address.
#[derive(Debug, Clone, Copy)]
pub struct MemoryFileOptions {
    pub enabled: bool,
    pub file_name: &'static str,
    pub size_bytes: u32,
    pub start_cluster: u32,
}

impl MemoryFileOptions {
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            file_name: "",
            size_bytes: 0,
            start_cluster: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PartitionOptions {
    pub enabled: bool,
    pub max_files: usize,
    pub names_storage_bytes: usize,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            max_files: 8,
            names_storage_bytes: 8 * 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    /// Up to 11 UTF-16 code units, shown as the volume label.
    pub volume_label_utf16: Vec<u16>,

    pub sram: MemoryFileOptions,
    pub bootrom: MemoryFileOptions,
    pub flash: MemoryFileOptions,
    pub bootrom_partitions: PartitionOptions,

    pub changing_file: MemoryFileOptions,

    /// Bounds of the bump-allocator region, in cluster indices.
    pub dynamic_area_start_cluster: u32,
    pub dynamic_area_end_cluster: u32,

    /// Registry capacity for dynamically-registered files.
    pub max_dynamic_files: usize,

    pub ua_min_delay_ms: u64,
    pub stdout_tail_min_amount: usize,
    pub stdout_tail_ua_delay_sec: u64,
    pub stdout_tail_ua_timeout_sec: u64,

    /// Backing capacity of the ring buffer feeding the stdout full-log and
    /// tail-window files. Old bytes are overwritten once the producer
    /// outruns this.
    pub stdout_ring_capacity_bytes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            volume_label_utf16: Vec::new(),
            sram: MemoryFileOptions::disabled(),
            bootrom: MemoryFileOptions::disabled(),
            flash: MemoryFileOptions::disabled(),
            bootrom_partitions: PartitionOptions::default(),
            changing_file: MemoryFileOptions::disabled(),
            dynamic_area_start_cluster: 0,
            dynamic_area_end_cluster: 0,
            max_dynamic_files: 16,
            ua_min_delay_ms: 500,
            stdout_tail_min_amount: 64,
            stdout_tail_ua_delay_sec: 1,
            stdout_tail_ua_timeout_sec: 3,
            stdout_ring_capacity_bytes: 4096,
        }
    }
}
