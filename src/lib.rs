//! A pure-Rust library to work with GPT partition tables.
//!
//! It provides support for manipulating (R/W) GPT headers and partition
//! tables. Raw disk devices as well as disk images are supported.
//!
//! ```
//! use gpt;
//! use std::io::{Read, Seek};
//!
//! fn inspect_disk() {
//!     let diskpath = std::path::Path::new("/dev/sdz");
//!
//!     let disk = gpt::GptConfig::new()
//!         .open(diskpath).expect("failed to open disk");
//!
//!     println!("Disk header: {:#?}", disk.primary_header());
//!     println!("Partition layout: {:#?}", disk.partitions());
//! }
//!
//! fn create_partition() {
//!     let diskpath = std::path::Path::new("/tmp/chris.img");
//!     let mut disk = gpt::GptConfig::new().writable(true)
//!         .create(diskpath).expect("failed to open disk");
//!     let result = disk.add_partition(
//!         "rust_partition",
//!         100,
//!         gpt::partition_types::LINUX_FS,
//!         0,
//!         None
//!     );
//!     disk.write_inplace().unwrap();
//! }
//!
//! /// Demonstrates how to create a new partition table without anything pre-existing.
//! fn create_partition_in_ram() {
//!     const TOTAL_BYTES: usize = 1024 * 64;
//!     let mut mem_device = std::io::Cursor::new(vec![0u8; TOTAL_BYTES]);
//!
//!     let mut gdisk = gpt::GptConfig::default()
//!         .writable(true)
//!         .logical_block_size(gpt::disk::LogicalBlockSize::Lb512)
//!         .create_from_device(mem_device, None)
//!         .expect("failed to create GptDisk");
//!
//!     // At this point, gdisk.primary_header() and gdisk.backup_header() are populated...
//!     gdisk.add_partition("test1", 1024 * 12, gpt::partition_types::BASIC, 0, None)
//!         .expect("failed to add test1 partition");
//!     gdisk.add_partition("test2", 1024 * 18, gpt::partition_types::LINUX_FS, 0, None)
//!         .expect("failed to add test2 partition");
//!
//!     // Persist the partition table and take ownership of
//!     // the underlying memory buffer-backed block device
//!     let mut mem_device = gdisk.write().expect("failed to write partition table");
//!
//!     // Read the written bytes out of the memory buffer device
//!     mem_device.seek(std::io::SeekFrom::Start(0)).expect("failed to seek");
//!     let mut final_bytes = vec![0u8; TOTAL_BYTES];
//!     mem_device.read_exact(&mut final_bytes)
//!         .expect("failed to read contents of memory device");
//! }
//!
//! create_partition_in_ram();
//! ```

#![deny(missing_docs)]

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};
use std::{fmt, fs, path};

#[macro_use]
mod macros;
#[macro_use]
mod logging;
pub mod disk;
pub mod error;
pub mod header;
pub mod partition;
pub mod partition_types;
pub mod resize;

pub use error::GptError;

/// A generic device that we can read/write partitions from/to.
pub trait DiskDevice: Read + Write + Seek + std::fmt::Debug {}
/// Implement the DiskDevice trait for anything that meets the
/// requirements, e.g., `std::fs::File`
impl<T> DiskDevice for T where T: Read + Write + Seek + std::fmt::Debug {}
/// A dynamic trait object that is used by GptDisk for reading/writing/seeking.
pub type DiskDeviceObject<'a> = Box<dyn DiskDevice + 'a>;

/// Configuration options to open a GPT disk.
///
/// ## Default
/// By Default the disk is readonly and only one header needs to be valid.
/// If the disk is writable by default the primary and backup partitions are
/// written to, but changing the partition count will fail.
///
/// ```
/// # use gpt::GptConfig;
/// let _default_config = GptConfig::new()
///     .writable(false)
///     .logical_block_size(gpt::disk::DEFAULT_SECTOR_SIZE)
///     .only_valid_headers(false)
///     .readonly_backup(false)
///     .change_partition_count(false);
/// ```
//
// write_backup, allow_first_usable_last_usable, change
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GptConfig {
    /// Logical block size.
    lb_size: disk::LogicalBlockSize,
    /// Whether to open a GPT partition table in writable mode.
    writable: bool,
    /// Force both the primary and backup header to be valid
    only_valid_headers: bool,
    /// Treat the backup header as readonly
    readonly_backup: bool,
    /// allows to change the partition count
    ///
    /// ## Warning
    /// This might change the first usable and last usable part
    change_partition_count: bool,
}

impl GptConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        GptConfig::default()
    }

    /// Whether to open a GPT partition table in writable mode.
    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Size of logical blocks (sectors) for this disk.
    pub fn logical_block_size(mut self, lb_size: disk::LogicalBlockSize) -> Self {
        self.lb_size = lb_size;
        self
    }

    /// Sets wether both header need to be valid to open a device.
    pub fn only_valid_headers(mut self, only_valid_headers: bool) -> Self {
        self.only_valid_headers = only_valid_headers;
        self
    }

    /// Sets wether the backup header should be treated as readonly.
    pub fn readonly_backup(mut self, readonly_backup: bool) -> Self {
        self.readonly_backup = readonly_backup;
        self
    }

    /// Sets wether the partition count of the current header can be change.
    ///
    /// ## Warning
    /// This might change the first usable and last usable lba.
    pub fn change_partition_count(mut self, change_partition_count: bool) -> Self {
        self.change_partition_count = change_partition_count;
        self
    }

    /// Open the GPT disk at the given path and inspect it according
    /// to configuration options.
    pub fn open(self, diskpath: impl AsRef<path::Path>) -> Result<GptDisk<fs::File>, GptError> {
        let file = fs::OpenOptions::new()
            .write(self.writable)
            .read(true)
            .open(diskpath)?;
        self.open_from_device(file)
    }

    /// Creates the GPT disk at the given path.
    ///
    /// ## Note
    /// This does not touch the fs until `GptDisk::write` get's called.
    pub fn create(self, diskpath: impl AsRef<path::Path>) -> Result<GptDisk<fs::File>, GptError> {
        let file = fs::OpenOptions::new()
            .write(self.writable)
            .read(true)
            .open(diskpath)?;
        self.create_from_device(file, None)
    }

    /// Open the GPT disk from the given DiskDeviceObject and
    /// inspect it according to configuration options.
    pub fn open_from_device<D>(self, mut device: D) -> Result<GptDisk<D>, GptError>
    where
        D: DiskDevice,
    {
        if self.lb_size != disk::LogicalBlockSize::Lb512 {
            return Err(GptError::UnsupportedSectorSize);
        }

        // Proper GPT disk, fully inspect its layout.
        let h1 = header::read_primary_header(&mut device, self.lb_size);
        let h2 = header::read_backup_header(&mut device, self.lb_size);

        let (h1, h2) = if self.only_valid_headers {
            (Some(h1?), Some(h2?))
        } else {
            match (h1, h2) {
                (Err(e), Err(_)) => return Err(e),
                (r1, r2) => (r1.ok(), r2.ok()),
            }
        };

        let header = h1.as_ref().or(h2.as_ref()).expect("at least one header loaded");
        let table = partition::file_read_partitions(&mut device, header, self.lb_size)?;
        let guid = header.disk_guid;

        let disk = GptDisk {
            config: self,
            device,
            guid,
            primary_header: h1,
            backup_header: h2,
            partitions: table,
        };
        debug!("disk: {:?}", disk);
        Ok(disk)
    }

    /// Create a GPTDisk with default headers and an empty partition table.
    /// If guid is None then it will generate a new random guid.
    pub fn create_from_device<D>(
        self,
        device: D,
        guid: Option<uuid::Uuid>,
    ) -> Result<GptDisk<D>, GptError>
    where
        D: DiskDevice,
    {
        if self.lb_size != disk::LogicalBlockSize::Lb512 {
            return Err(GptError::UnsupportedSectorSize);
        }

        let mut disk = GptDisk {
            config: self,
            device,
            guid: guid.unwrap_or_else(uuid::Uuid::new_v4),
            primary_header: None,
            backup_header: None,
            partitions: BTreeMap::new(),
        };
        // setup default headers
        disk.init_headers()?;
        Ok(disk)
    }
}

impl Default for GptConfig {
    fn default() -> Self {
        Self {
            lb_size: disk::DEFAULT_SECTOR_SIZE,
            writable: false,
            only_valid_headers: false,
            readonly_backup: false,
            change_partition_count: false,
        }
    }
}

/// A GPT disk backed by an arbitrary device.
///
/// Holds both headers (if loaded), the partition entry array, and the
/// device; `save` is the one method that commits in-memory state back to
/// `device` in the order mandated by the UEFI spec: entries, primary
/// header, backup header, then a flush.
#[derive(Debug, Clone)]
pub struct GptDisk<D> {
    config: GptConfig,
    device: D,
    guid: uuid::Uuid,
    primary_header: Option<header::Header>,
    backup_header: Option<header::Header>,
    /// partition: 0 does never exist
    partitions: BTreeMap<u32, partition::Partition>,
}

impl<D> GptDisk<D> {
    /// Retrieve the primary header, if loaded.
    pub fn primary_header(&self) -> Result<&header::Header, GptError> {
        self.primary_header.as_ref().ok_or(GptError::InvalidState)
    }

    /// Retrieve the backup header, if loaded.
    pub fn backup_header(&self) -> Result<&header::Header, GptError> {
        self.backup_header.as_ref().ok_or(GptError::InvalidState)
    }

    /// Retrieve the current valid header, preferring the primary one.
    ///
    /// This can only fail while the disk is still being constructed.
    fn try_header(&self) -> Result<&header::Header, GptError> {
        self.primary_header
            .as_ref()
            .or(self.backup_header.as_ref())
            .ok_or(GptError::InvalidState)
    }

    /// Retrieve the current valid header.
    ///
    /// ## Panics
    /// Never panics on a `GptDisk` obtained through `GptConfig`: opening or
    /// creating one always populates at least one header first.
    pub fn header(&self) -> &header::Header {
        self.try_header().expect("no primary and no backup header")
    }

    /// Retrieve partition entries, keyed by their raw 1-based slot number.
    pub fn partitions(&self) -> &BTreeMap<u32, partition::Partition> {
        &self.partitions
    }

    /// Look up a single partition entry by its raw slot number.
    pub fn get_partition(&self, id: u32) -> Result<&partition::Partition, GptError> {
        self.partitions.get(&id).ok_or(GptError::PartitionNotFound)
    }

    /// Look up a single partition entry, mutably, by its raw slot number.
    pub fn get_partition_mut(&mut self, id: u32) -> Result<&mut partition::Partition, GptError> {
        self.partitions
            .get_mut(&id)
            .ok_or(GptError::PartitionNotFound)
    }

    /// Find the first used partition entry whose name matches exactly.
    pub fn find_partition_by_name(
        &self,
        name: &str,
    ) -> Result<(u32, &partition::Partition), GptError> {
        self.partitions
            .iter()
            .find(|(_, p)| p.is_used() && p.name == name)
            .map(|(id, p)| (*id, p))
            .ok_or(GptError::PartitionNotFound)
    }

    /// Retrieve disk UUID.
    pub fn guid(&self) -> &uuid::Uuid {
        &self.guid
    }

    /// Retrieve disk logical block size.
    pub fn logical_block_size(&self) -> &disk::LogicalBlockSize {
        &self.config.lb_size
    }

    /// Change the disk device that we are reading/writing from/to.
    /// Returns the previous disk device.
    pub fn update_disk_device(&mut self, device: D, writable: bool) -> D {
        self.config.writable = writable;
        std::mem::replace(&mut self.device, device)
    }

    /// Updates the disk device that the GptDisk instance is interacting with.
    /// Returns a new GptDisk instance, retaining the previous configuration and GUID,
    /// but with the specified device and writable status.
    pub fn with_disk_device<N>(&self, device: N, writable: bool) -> GptDisk<N> {
        let mut n = GptDisk {
            config: self.config.clone(),
            device,
            guid: self.guid,
            primary_header: self.primary_header.clone(),
            backup_header: self.backup_header.clone(),
            partitions: self.partitions.clone(),
        };
        n.config.writable = writable;

        n
    }

    /// Get a reference to to the underlying device.
    pub fn device_ref(&self) -> &D {
        &self.device
    }

    /// Get a mutable reference to to the underlying device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Take the underlying device object and force
    /// self to drop out of scope.
    ///
    /// Caution: this will abandon any changes that where not written.
    pub fn take_device(self) -> D {
        self.device
    }
}

impl<D> GptDisk<D>
where
    D: DiskDevice,
{
    /// Add another partition to this disk.  This tries to find
    /// the optimum partition location with the lowest block device.
    /// Returns the new partition id if there was sufficient room
    /// to add the partition. Size is specified in bytes.
    ///
    /// ## Panics
    /// If size is empty panics
    pub fn add_partition(
        &mut self,
        name: &str,
        size: u64,
        part_type: partition_types::Type,
        flags: u64,
        part_alignment: Option<u64>,
    ) -> Result<u32, GptError> {
        assert!(size > 0, "size must be greater than zero");

        // Ceiling division which avoids overflow
        let size_lba = (size - 1)
            .checked_div(self.config.lb_size.into())
            .ok_or(GptError::Overflow(
                "invalid logical block size caused bad \
                division when calculating size in blocks",
            ))?
            // we will never divide by 1 so we always have room for one more
            + 1;

        // Find the lowest lba that is larger than size.
        let free_sections = self.find_free_sectors();
        for (starting_lba, length) in free_sections {
            // Get the distance between the starting LBA of this section and the next aligned LBA
            // We don't need to do any checked math here because we guarantee that with `(A % B)`,
            // `A` will always be between 0 and `B-1`.
            let alignment_offset_lba = match part_alignment {
                Some(alignment) => (alignment - (starting_lba % alignment)) % alignment,
                None => 0_u64,
            };

            debug!(
                "starting_lba {}, length {}, alignment_offset_lba {}",
                starting_lba, length, alignment_offset_lba
            );

            if length >= (alignment_offset_lba + size_lba - 1) {
                let starting_lba = starting_lba + alignment_offset_lba;
                // Found our free slice.
                let partition_id = self
                    .find_next_partition_id()
                    .unwrap_or_else(|| self.header().num_parts + 1);
                debug!(
                    "Adding partition id: {} {:?}.  first_lba: {} last_lba: {}",
                    partition_id,
                    part_type,
                    starting_lba,
                    starting_lba + size_lba - 1_u64
                );

                // let's try to increase the num parts
                // because partition_id 0 will never exist the num_parts is without + 1
                let num_parts_changes = self.header().num_parts_would_change(partition_id);
                if num_parts_changes && !self.config.change_partition_count {
                    return Err(GptError::PartitionCountWouldChange);
                }

                let part = partition::Partition {
                    part_type_guid: part_type.uuid()?,
                    part_guid: uuid::Uuid::new_v4(),
                    first_lba: starting_lba,
                    last_lba: starting_lba + size_lba - 1_u64,
                    flags,
                    name: name.to_string(),
                };
                if let Some(p) = self.partitions.insert(partition_id, part.clone()) {
                    debug!("Replacing\n{}\nwith\n{}", p, part);
                }
                if num_parts_changes {
                    // update headers
                    self.init_headers()?;
                }
                return Ok(partition_id);
            }
        }

        Err(GptError::NotEnoughSpace)
    }
    /// Remove partition from this disk.
    pub fn remove_partition(&mut self, id: u32) -> Option<u32> {
        self.partitions.remove(&id).map(|_| {
            debug!("Removing partition number {id}");
            id
        })
    }

    /// Remove partition from this disk. This tries to find the first partition based on its partition guid.
    pub fn remove_partition_by_guid(&mut self, guid: uuid::Uuid) -> Option<u32> {
        let id = self
            .partitions
            .iter()
            .find(|(_, v)| v.part_guid == guid)
            .map(|(k, _)| *k)?;

        debug!("Removing partition number {id}");
        self.partitions.remove(&id);

        Some(id)
    }

    /// Find free space on the disk.
    /// Returns a tuple of (starting_lba, length in lba's).
    pub fn find_free_sectors(&self) -> Vec<(u64, u64)> {
        let header = self.header();

        trace!("first_usable: {}", header.first_usable);
        let mut disk_positions = vec![header.first_usable];
        for part in self.partitions().iter().filter(|p| p.1.is_used()) {
            trace!("partition: ({}, {})", part.1.first_lba, part.1.last_lba);
            disk_positions.push(part.1.first_lba);
            disk_positions.push(part.1.last_lba);
        }
        disk_positions.push(header.last_usable);
        trace!("last_usable: {}", header.last_usable);
        disk_positions.sort_unstable();

        disk_positions
            // Walk through the LBA's in chunks of 2 (ending, starting).
            .chunks(2)
            // Add 1 to the ending and then subtract the starting if NOT the first usable sector
            .map(|p| {
                if p[0] == header.first_usable {
                    (p[0], p[1].saturating_sub(p[0]))
                } else {
                    (p[0] + 1, p[1].saturating_sub(p[0] + 1))
                }
            })
            .collect()
    }

    /// Find next highest partition id.
    /// Will always return > 0
    ///
    /// If this returns None there is not more space to add a partiton
    pub fn find_next_partition_id(&self) -> Option<u32> {
        if self.partitions.is_empty() {
            // Partitions start at 1.
            return Some(1);
        }

        // get the first free partition slot
        for i in 1..=self.header().num_parts {
            // todo should unused ones be included?
            match self.partitions.get(&i) {
                Some(p) if !p.is_used() => return Some(i),
                None => return Some(i),
                _ => {}
            }
        }

        None
    }

    /// Retrieve partition entries, replacing it with an empty partitions list.
    pub fn take_partitions(&mut self) -> BTreeMap<u32, partition::Partition> {
        std::mem::take(&mut self.partitions)
    }

    /// Update disk UUID.
    ///
    /// If no UUID is specified, a new random one is generated.
    /// No changes are recorded to disk until `write()` is called.
    pub fn update_guid(&mut self, uuid: Option<uuid::Uuid>) {
        let guid = match uuid {
            Some(u) => u,
            None => {
                let u = uuid::Uuid::new_v4();
                debug!("Generated random uuid: {}", u);
                u
            }
        };
        self.guid = guid;
    }

    /// Update current partition table.
    ///
    /// No changes are recorded to disk until `write()` is called.
    ///
    /// ## Note
    /// you need to make sure that all values in the partition are set correctly
    ///
    /// ## Panics
    /// If a partition 0 exists
    pub fn update_partitions(
        &mut self,
        pp: BTreeMap<u32, partition::Partition>,
    ) -> Result<(), GptError> {
        assert!(!pp.contains_key(&0));

        // TODO(lucab): validate partitions.
        let num_parts = pp.len() as u32;

        let num_parts_changes = self.header().num_parts_would_change(num_parts);
        if num_parts_changes && !self.config.change_partition_count {
            return Err(GptError::PartitionCountWouldChange);
        }

        self.partitions = pp;

        self.init_headers()
    }

    /// Makes sure there exists a primary header and if allowed also creates the backup
    /// header.
    pub(crate) fn init_headers(&mut self) -> Result<(), GptError> {
        let bak = header::find_backup_lba(&mut self.device, self.config.lb_size)?;
        let num_parts = self.partitions.len() as u32;

        let h1 = header::HeaderBuilder::from_maybe_header(self.try_header().ok())
            .num_parts(num_parts)
            .backup_lba(bak)
            .disk_guid(self.guid)
            .primary(true)
            .build(self.config.lb_size)?;
        let header = self.primary_header.insert(h1).clone();

        if !self.config.readonly_backup {
            let h2 = header::HeaderBuilder::from_header(&header)
                .primary(false)
                .build(self.config.lb_size)?;
            self.backup_header = Some(h2);
        }

        Ok(())
    }

    /// Persist state to disk, consuming this disk object.
    ///
    /// This is a destructive action, as it overwrite headers and
    /// partitions entries on disk. All writes are flushed to disk
    /// before returning the underlying DiskDeviceObject.
    pub fn write(mut self) -> Result<D, GptError> {
        self.write_inplace()?;

        Ok(self.device)
    }

    /// Persist state to disk, leaving this disk object intact.
    ///
    /// This is a destructive action, as it overwrites headers
    /// and partitions entries on disk. All writes are flushed
    /// to disk before returning.
    //
    // Primary header and backup header don't need to match.
    // so both need to be checked
    pub fn write_inplace(&mut self) -> Result<(), GptError> {
        if !self.config.writable {
            return Err(GptError::ReadOnly);
        }
        debug!("Computing new headers");
        trace!("old primary header: {:?}", self.primary_header);
        trace!("old backup header: {:?}", self.backup_header);
        let bak = header::find_backup_lba(&mut self.device, self.config.lb_size)?;
        trace!("old backup lba: {}", bak);

        let new_primary_header = header::HeaderBuilder::from_header(self.header())
            .primary(true)
            .build(self.config.lb_size)?;
        let primary_header = self.primary_header.insert(new_primary_header).clone();

        let backup_header = if !self.config.readonly_backup {
            let new_backup_header = header::HeaderBuilder::from_header(&primary_header)
                .primary(false)
                .build(self.config.lb_size)?;

            Some(self.backup_header.insert(new_backup_header).clone())
        } else {
            None
        };

        // Write the used partitions, packed densely at the start of the
        // partition array, through the primary header's on-disk location.
        //
        // Only the primary copy is written: the backup header's
        // `part_start` still points at its own on-disk location (standard
        // UEFI geometry, reserved for by `first_usable`/`last_usable`),
        // but no second entry-array copy is ever written there. `open`
        // never reads or requires a backup copy.
        partition::write_partition_array(
            &mut self.device,
            &self.partitions,
            &primary_header,
            self.config.lb_size,
        )?;

        // Primary header is written before the backup one: a crash here
        // leaves a fresh primary and a stale-but-individually-valid backup,
        // which is the recoverable state this crate's save ordering is
        // designed to produce (see the resize engine's module docs).
        debug!("Writing primary header");
        primary_header.write_primary(&mut self.device, self.config.lb_size)?;

        if let Some(backup_header) = backup_header {
            debug!("Writing backup header");
            backup_header.write_backup(&mut self.device, self.config.lb_size)?;
        }

        self.device.flush()?;

        Ok(())
    }
}
