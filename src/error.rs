//! Error types for the fallible boundaries of file registration and growth.
//! The read path itself is total (every LBA in range produces bytes,
//! unreachable slots zero-fill) — these only cover registration, growth,
//! and programming errors surfaced during debug builds.

use thiserror::Error;

/// Returned by [`crate::registry::FileRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("cluster allocator has no room left for a file of the requested size")]
    OutOfSpace,
    #[error("dynamic file registry is at capacity")]
    TooManyFiles,
    #[error("file name does not fit a single root-directory sector")]
    NameTooLong,
    #[error("partition enumeration is disabled in this volume's configuration")]
    PartitionsDisabled,
    #[error("partition registry is at its configured capacity")]
    TooManyPartitions,
    #[error("partition name exceeds the configured names storage budget")]
    PartitionNamesStorageExhausted,
}

/// Returned by [`crate::registry::FileRegistry::update`] when a file tries
/// to grow past its allocated capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GrowError {
    #[error("file is not the most recently allocated entry, so its cluster range cannot be extended")]
    NotTail,
    #[error("cluster allocator has no room left to extend this file")]
    OutOfSpace,
}

/// Surfaced only when [`crate::VirtualExFat::read`] is asked to honor a
/// request the dispatch table has no handler for. In a correctly wired
/// region table this never happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("lba {0} falls outside the volume")]
    OutOfBounds(u32),
}
