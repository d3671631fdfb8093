//! Dynamic file registry and the bump cluster allocator backing it (§4.7).
//! Fixed-capacity arrays, not a `Vec`/`HashMap` — the registry is flat,
//! append-only, and bounded by [`MAX_DYNAMIC_FILES`], so there is no
//! general-purpose container to reach for.

use crate::error::{GrowError, RegistrationError};
use crate::geometry::{Geometry, CLUSTER_SIZE};
use crate::util::unsigned_rounded_up_div;

/// Hard ceiling on dynamic registrations. [`crate::options::Options::max_dynamic_files`]
/// may ask for fewer slots, never more.
pub const MAX_DYNAMIC_FILES: usize = 16;

/// Which live data source backs a dynamic file's bytes. A tagged variant
/// instead of a boxed closure: the full set of sources this crate ever
/// needs is closed (ring buffer, memory provider, changing-byte demo), so
/// there is no call for dynamic dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileContent {
    Bootrom,
    Sram,
    Flash,
    ChangingFile,
    StdoutFull,
    StdoutTail,
    /// The partition's first page, as reported by the partition enumerator.
    Partition(u32),
    /// An opaque id the caller chose when registering the file, passed back
    /// to [`crate::memory::MemoryProvider::read_user_file`] unchanged.
    UserFile(u32),
}

#[derive(Debug, Clone)]
pub struct DynamicFile {
    pub name_utf16: Vec<u16>,
    pub first_cluster: u32,
    pub capacity_clusters: u32,
    pub size_bytes: u64,
    pub content: FileContent,
    pub created_epoch_secs: u64,
    pub modified_epoch_secs: u64,
}

impl DynamicFile {
    pub fn cluster_range(&self) -> std::ops::Range<u32> {
        self.first_cluster..self.first_cluster + self.capacity_clusters
    }
}

/// Strictly-increasing cluster cursor over `[start_cluster, end_cluster)`.
/// Never reclaims: shrinking a file does not move the cursor back, and a
/// file can only grow if its range abuts the cursor.
#[derive(Debug, Clone)]
pub struct Allocator {
    start_cluster: u32,
    end_cluster: u32,
    next_cluster: u32,
}

impl Allocator {
    pub fn new(start_cluster: u32, end_cluster: u32) -> Self {
        Self {
            start_cluster,
            end_cluster,
            next_cluster: start_cluster,
        }
    }

    fn clusters_for(size_bytes: u64) -> u32 {
        unsigned_rounded_up_div(size_bytes.max(1), u64::from(CLUSTER_SIZE)) as u32
    }

    pub fn next_cluster(&self) -> u32 {
        self.next_cluster
    }

    pub fn allocate(&mut self, size_bytes: u64) -> Result<(u32, u32), RegistrationError> {
        let k = Self::clusters_for(size_bytes);
        let fits = matches!(self.next_cluster.checked_add(k), Some(end) if end <= self.end_cluster);
        if !fits {
            return Err(RegistrationError::OutOfSpace);
        }
        let first = self.next_cluster;
        self.next_cluster += k;
        Ok((first, k))
    }

    pub fn grow(&mut self, file: &mut DynamicFile, new_size_bytes: u64) -> Result<(), GrowError> {
        let needed = Self::clusters_for(new_size_bytes);
        if needed <= file.capacity_clusters {
            return Ok(());
        }
        if file.first_cluster + file.capacity_clusters != self.next_cluster {
            return Err(GrowError::NotTail);
        }
        let extra = needed - file.capacity_clusters;
        if self.next_cluster + extra > self.end_cluster {
            return Err(GrowError::OutOfSpace);
        }
        self.next_cluster += extra;
        file.capacity_clusters = needed;
        Ok(())
    }
}

pub struct FileRegistry {
    allocator: Allocator,
    files: [Option<DynamicFile>; MAX_DYNAMIC_FILES],
    len: usize,
    capacity: usize,
}

impl FileRegistry {
    pub fn new(geometry: &Geometry, capacity: usize) -> Self {
        Self {
            allocator: Allocator::new(geometry.dynamic_area_start_cluster, geometry.dynamic_area_end_cluster),
            files: std::array::from_fn(|_| None),
            len: 0,
            capacity: capacity.min(MAX_DYNAMIC_FILES),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynamicFile> {
        self.files[..self.len].iter().map(|f| f.as_ref().unwrap())
    }

    pub fn get(&self, index: usize) -> Option<&DynamicFile> {
        self.files.get(index).and_then(|f| f.as_ref())
    }

    /// Registers a new file, allocating `max_size` worth of clusters up
    /// front. `first_cluster` of the returned entry comes from the bump
    /// allocator — callers never choose it.
    pub fn add(
        &mut self,
        name_utf16: Vec<u16>,
        max_size: u64,
        content: FileContent,
        now_epoch_secs: u64,
    ) -> Result<usize, RegistrationError> {
        if name_utf16.len() > crate::root_directory::MAX_NAME_UNITS {
            return Err(RegistrationError::NameTooLong);
        }
        if self.len >= self.capacity {
            return Err(RegistrationError::TooManyFiles);
        }

        let (first_cluster, capacity_clusters) = self.allocator.allocate(max_size)?;
        let index = self.len;
        self.files[index] = Some(DynamicFile {
            name_utf16,
            first_cluster,
            capacity_clusters,
            size_bytes: max_size,
            content,
            created_epoch_secs: now_epoch_secs,
            modified_epoch_secs: now_epoch_secs,
        });
        self.len += 1;
        Ok(index)
    }

    /// Resizes a registered file in place. Growing past the allocated
    /// capacity only succeeds when the file is the most recently allocated
    /// entry (its range abuts the allocator's cursor).
    pub fn update(&mut self, index: usize, new_size: u64, now_epoch_secs: u64) -> Result<(), GrowError> {
        let file = self.files.get_mut(index).and_then(|f| f.as_mut()).ok_or(GrowError::NotTail)?;
        self.allocator.grow(file, new_size)?;
        file.size_bytes = new_size;
        file.modified_epoch_secs = now_epoch_secs;
        Ok(())
    }

    /// Cluster number `n`'s containing entry and its file-relative byte
    /// offset, per §4.7's dispatch formula.
    pub fn locate(&self, cluster: u32) -> Option<(&DynamicFile, u64)> {
        self.iter().find(|f| f.cluster_range().contains(&cluster)).map(|f| {
            let offset = u64::from(cluster - f.first_cluster) * u64::from(CLUSTER_SIZE);
            (f, offset)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        use crate::options::Options;
        Geometry::new(
            &Options {
                dynamic_area_start_cluster: 100,
                dynamic_area_end_cluster: 110,
                ..Options::default()
            },
            64,
        )
    }

    #[test]
    fn bump_allocation_advances_cursor() {
        let mut alloc = Allocator::new(100, 110);
        let (first, k) = alloc.allocate(4096 * 2).unwrap();
        assert_eq!(first, 100);
        assert_eq!(k, 2);
        assert_eq!(alloc.next_cluster(), 102);
    }

    #[test]
    fn allocator_exhaustion_is_reported() {
        let mut alloc = Allocator::new(100, 101);
        assert!(alloc.allocate(4096 * 2).is_err());
    }

    #[test]
    fn registration_and_lookup_round_trip() {
        let mut registry = FileRegistry::new(&geometry(), 4);
        let index = registry
            .add(b"A".iter().map(|&b| u16::from(b)).collect(), 100, FileContent::StdoutFull, 0)
            .unwrap();
        let file = registry.get(index).unwrap();
        assert_eq!(file.size_bytes, 100);

        let (found, offset) = registry.locate(file.first_cluster).unwrap();
        assert_eq!(found.first_cluster, file.first_cluster);
        assert_eq!(offset, 0);
    }

    #[test]
    fn grow_only_succeeds_at_tail() {
        let mut registry = FileRegistry::new(&geometry(), 4);
        let a = registry.add(vec![], 4096, FileContent::StdoutFull, 0).unwrap();
        let b = registry.add(vec![], 4096, FileContent::StdoutTail, 0).unwrap();

        // `a` is no longer the tail once `b` is registered.
        assert!(registry.update(a, 4096 * 2, 1).is_err());
        // `b` is the tail and can grow.
        assert!(registry.update(b, 4096 * 2, 1).is_ok());
    }

    #[test]
    fn registry_capacity_is_enforced() {
        let mut registry = FileRegistry::new(&geometry(), 1);
        assert!(registry.add(vec![], 4096, FileContent::StdoutFull, 0).is_ok());
        assert_eq!(
            registry.add(vec![], 4096, FileContent::StdoutTail, 0),
            Err(RegistrationError::TooManyFiles)
        );
    }
}
