//! Partition-related types and helper functions.
//!
//! This module provides access to low-level primitives to work with GPT
//! partition entries.

use bitflags::bitflags;
use crc::Crc;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use simple_bytes::{BytesArray, BytesRead};

use crate::disk;
use crate::error::GptError;
use crate::header::{parse_uuid, Header};
use crate::DiskDevice;
use crate::{debug, trace};

bitflags! {
    /// Partition entry attribute flags, defined by UEFI.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct PartitionAttributes: u64 {
        /// Required platform partition; the firmware must not allow its removal.
        const PLATFORM = 1;
        /// No Block-IO protocol should be attached to this partition.
        const EFI      = 1 << 1;
        /// Legacy-BIOS bootable partition.
        const BOOTABLE = 1 << 2;
    }
}

/// A partition entry in a GPT partition table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Partition {
    /// GUID of the partition type.
    ///
    /// Stored as the raw GUID, not as a `partition_types::Type` lookup:
    /// whether a partition is in use is defined solely by this GUID being
    /// non-nil, regardless of whether it is one of the well-known types
    /// in `partition_types`. See `Partition::is_used`.
    pub part_type_guid: uuid::Uuid,
    /// UUID of this specific partition.
    pub part_guid: uuid::Uuid,
    /// First LBA of the partition (inclusive).
    pub first_lba: u64,
    /// Last LBA of the partition (inclusive).
    pub last_lba: u64,
    /// Partition attribute flags.
    pub flags: u64,
    /// Partition name, up to 36 UTF-16 code units.
    pub name: String,
}

impl Partition {
    /// Create a partition entry of type "unused", whose bytes are all zeros.
    pub fn zero() -> Self {
        Self {
            part_type_guid: uuid::Uuid::nil(),
            part_guid: uuid::Uuid::nil(),
            first_lba: 0,
            last_lba: 0,
            flags: 0,
            name: String::new(),
        }
    }

    /// Serialize this partition entry to its on-disk representation.
    fn as_bytes(&self, entry_size: u32) -> Result<Vec<u8>, GptError> {
        let mut buf: Vec<u8> = Vec::with_capacity(entry_size as usize);

        let tyguid = self.part_type_guid.as_fields();
        buf.extend_from_slice(&tyguid.0.to_le_bytes());
        buf.extend_from_slice(&tyguid.1.to_le_bytes());
        buf.extend_from_slice(&tyguid.2.to_le_bytes());
        buf.extend_from_slice(tyguid.3);

        let pguid = self.part_guid.as_fields();
        buf.extend_from_slice(&pguid.0.to_le_bytes());
        buf.extend_from_slice(&pguid.1.to_le_bytes());
        buf.extend_from_slice(&pguid.2.to_le_bytes());
        buf.extend_from_slice(pguid.3);

        buf.extend_from_slice(&self.first_lba.to_le_bytes());
        buf.extend_from_slice(&self.last_lba.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());

        for unit in self.name.encode_utf16().take(36) {
            buf.extend_from_slice(&unit.to_le_bytes());
        }

        buf.resize(entry_size as usize, 0);
        Ok(buf)
    }

    /// Length of this partition in bytes: `(last_lba + 1 - first_lba) * lb_size`.
    ///
    /// Bounds are inclusive; the `+ 1` accounts for the final logical block.
    pub fn bytes_len(&self, lb_size: disk::LogicalBlockSize) -> Result<u64, GptError> {
        self.last_lba
            .checked_sub(self.first_lba)
            .ok_or(GptError::Overflow("partition length underflow - sectors"))?
            .checked_add(1)
            .ok_or(GptError::Overflow("partition length overflow - sectors"))?
            .checked_mul(lb_size.into())
            .ok_or(GptError::Overflow("partition length overflow - bytes"))
    }

    /// Starting byte offset of this partition.
    pub fn bytes_start(&self, lb_size: disk::LogicalBlockSize) -> Result<u64, GptError> {
        self.first_lba
            .checked_mul(lb_size.into())
            .ok_or(GptError::Overflow("partition start overflow - bytes"))
    }

    /// Whether this entry is in use.
    ///
    /// Defined solely by the type GUID being non-nil — an unrecognized
    /// type GUID (one with no match in `partition_types`) is still used.
    pub fn is_used(&self) -> bool {
        !self.part_type_guid.is_nil()
    }

    /// Number of sectors spanned by this partition (exclusive of the +1).
    pub fn size(&self) -> Result<u64, GptError> {
        self.last_lba
            .checked_sub(self.first_lba)
            .ok_or(GptError::InvalidLbaRange)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Partition:\t\t{}\nPartition GUID:\t\t{}\nPartition Type:\t\t{}\n\
             Span:\t\t\t{} - {}\nFlags:\t\t\t{}",
            self.name, self.part_guid, self.part_type_guid, self.first_lba, self.last_lba, self.flags,
        )
    }
}

fn read_part_name<R: BytesRead>(rdr: &mut R) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(36);
    for _ in 0..36 {
        let unit = rdr.read_le_u16();
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16_lossy(&units)
}

const CRC_32: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Read a GPT partition table from a given path.
///
/// ## Example
///
/// ```rust,no_run
/// use gpt::{header, disk, partition};
/// use std::path::Path;
///
/// let lb_size = disk::DEFAULT_SECTOR_SIZE;
/// let diskpath = Path::new("/dev/sdz");
/// let hdr = header::read_header(diskpath, lb_size).unwrap();
/// let partitions = partition::read_partitions(diskpath, &hdr, lb_size).unwrap();
/// println!("{:#?}", partitions);
/// ```
pub fn read_partitions(
    path: impl AsRef<Path>,
    header: &Header,
    lb_size: disk::LogicalBlockSize,
) -> Result<BTreeMap<u32, Partition>, GptError> {
    debug!("reading partitions from {}", path.as_ref().display());
    let mut file = File::open(path)?;
    file_read_partitions(&mut file, header, lb_size)
}

/// Read a GPT partition table from an open `Read` + `Seek` device.
///
/// Reads the entry array through `disk::read_sector`, one whole logical
/// sector at a time, exactly as `write_partition_array` writes it.
pub fn file_read_partitions<D: Read + Seek>(
    file: &mut D,
    header: &Header,
    lb_size: disk::LogicalBlockSize,
) -> Result<BTreeMap<u32, Partition>, GptError> {
    let entry_size = header.part_size;
    let pt_len = u64::from(header.num_parts)
        .checked_mul(entry_size.into())
        .ok_or(GptError::Overflow("partition table - size"))?;

    let sector_len: u64 = lb_size.into();
    let num_sectors = ceil_div(pt_len, sector_len);
    let padded_len = num_sectors
        .checked_mul(sector_len)
        .ok_or(GptError::Overflow("partition table - padded size"))?;

    trace!(
        "reading {} partition-array sectors from LBA {}",
        num_sectors,
        header.part_start
    );
    let mut table = vec![0u8; padded_len as usize];
    for i in 0..num_sectors {
        let lba = header
            .part_start
            .checked_add(i)
            .ok_or(GptError::Overflow("partition table - lba"))?;
        let start = (i * sector_len) as usize;
        let end = start + sector_len as usize;
        disk::read_sector(file, lba, lb_size, &mut table[start..end])?;
    }

    debug!("checking partition table CRC");
    let mut digest = CRC_32.digest();
    digest.update(&table[..pt_len as usize]);
    if digest.finalize() != header.crc32_parts {
        return Err(GptError::InvalidCrc32);
    }

    let mut parts: BTreeMap<u32, Partition> = BTreeMap::new();
    trace!("scanning {} partition entries", header.num_parts);
    for i in 0..header.num_parts {
        let start = i as usize * entry_size as usize;
        let raw = &table[start..start + entry_size as usize];
        if raw.iter().all(|b| *b == 0) {
            continue;
        }

        let mut bytes = BytesArray::from(raw);
        let part_type_guid = parse_uuid(&mut bytes)?;
        let part_guid = parse_uuid(&mut bytes)?;
        let first_lba = bytes.read_le_u64();
        let last_lba = bytes.read_le_u64();
        let flags = bytes.read_le_u64();
        let name = read_part_name(&mut bytes);

        parts.insert(
            i + 1,
            Partition {
                part_type_guid,
                part_guid,
                first_lba,
                last_lba,
                flags,
                name,
            },
        );
    }

    Ok(parts)
}

/// Writes the in-memory partition table as a single packed entry array
/// starting at `header.part_start`, through `disk::write_sector` one whole
/// logical sector at a time.
///
/// Used partitions are packed densely starting at slot 0; any remaining
/// slots up to `header.num_parts` are written as zeroed (unused) entries.
/// Does not recompute either header's entry-array CRC32; callers must do
/// that as part of a full `save`.
pub(crate) fn write_partition_array<D: DiskDevice>(
    device: &mut D,
    partitions: &BTreeMap<u32, Partition>,
    header: &Header,
    lb_size: disk::LogicalBlockSize,
) -> Result<(), GptError> {
    let entry_size = header.part_size;
    let pt_len = u64::from(header.num_parts)
        .checked_mul(entry_size.into())
        .ok_or(GptError::Overflow("partition table - size"))?;

    let sector_len: u64 = lb_size.into();
    let num_sectors = ceil_div(pt_len, sector_len);
    let padded_len = num_sectors
        .checked_mul(sector_len)
        .ok_or(GptError::Overflow("partition table - padded size"))?;

    let mut table = vec![0u8; padded_len as usize];
    let mut idx: usize = 0;
    for partition in partitions.values().filter(|p| p.is_used()) {
        if idx >= header.num_parts as usize {
            return Err(GptError::OverflowPartitionCount);
        }
        let start = idx * entry_size as usize;
        table[start..start + entry_size as usize].copy_from_slice(&partition.as_bytes(entry_size)?);
        idx += 1;
    }

    trace!(
        "writing {} partition-array sectors at LBA {}",
        num_sectors,
        header.part_start
    );
    for i in 0..num_sectors {
        let lba = header
            .part_start
            .checked_add(i)
            .ok_or(GptError::Overflow("partition table - lba"))?;
        let start = (i * sector_len) as usize;
        let end = start + sector_len as usize;
        disk::write_sector(device, lba, lb_size, &table[start..end])?;
    }

    Ok(())
}

fn ceil_div(lhs: u64, rhs: u64) -> u64 {
    (lhs + (rhs - 1)) / rhs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::LogicalBlockSize;
    use crate::partition_types;

    #[test]
    fn zero_partition_serializes_to_all_zeros() {
        let p0 = Partition::zero();

        let b128 = p0.as_bytes(128).unwrap();
        assert_eq!(b128.len(), 128);
        assert_eq!(b128, vec![0u8; 128]);

        let b256 = p0.as_bytes(256).unwrap();
        assert_eq!(b256.len(), 256);
        assert_eq!(b256, vec![0u8; 256]);
    }

    #[test]
    fn bytes_len_is_inclusive() {
        let p0 = Partition::zero();
        assert_eq!(p0.bytes_len(LogicalBlockSize::Lb512).unwrap(), 512);
        assert_eq!(p0.bytes_len(LogicalBlockSize::Lb4096).unwrap(), 4096);

        let mut p1 = Partition::zero();
        p1.first_lba = p1.last_lba + 1;
        assert!(p1.bytes_len(LogicalBlockSize::Lb512).is_err());

        let mut p2 = Partition::zero();
        p2.last_lba = u64::MAX;
        assert!(p2.bytes_len(LogicalBlockSize::Lb512).is_err());

        let mut p3 = Partition::zero();
        p3.first_lba = 2;
        p3.last_lba = 3;
        assert_eq!(p3.bytes_len(LogicalBlockSize::Lb512).unwrap(), 2 * 512);
    }

    #[test]
    fn bytes_start_scales_with_block_size() {
        let mut p = Partition::zero();
        p.first_lba = 2;
        assert_eq!(p.bytes_start(LogicalBlockSize::Lb512).unwrap(), 2 * 512);
        assert_eq!(p.bytes_start(LogicalBlockSize::Lb4096).unwrap(), 2 * 4096);
    }

    #[test]
    fn is_used_reflects_type() {
        let mut p = Partition::zero();
        assert!(!p.is_used());
        p.part_type_guid = partition_types::LINUX_FS.uuid().unwrap();
        assert!(p.is_used());
    }

    // A partition whose type GUID has no match in `partition_types` is
    // still a used slot; emptiness is defined by the nil GUID alone.
    #[test]
    fn unrecognized_type_guid_is_still_used() {
        let mut p = Partition::zero();
        p.part_type_guid = uuid::Uuid::parse_str("DEADBEEF-0000-0000-0000-000000000000").unwrap();
        assert!(p.is_used());
        assert!(partition_types::Type::lookup(p.part_type_guid).is_none());
    }

    #[test]
    fn name_round_trips_non_ascii() {
        let mut p = Partition::zero();
        p.part_type_guid = partition_types::LINUX_FS.uuid().unwrap();
        p.name = "données".to_string();
        let raw = p.as_bytes(128).unwrap();
        let mut bytes = BytesArray::from(raw.as_slice());
        // type guid (16) + part guid (16) + first_lba (8) + last_lba (8) + flags (8) = 56
        let _ = BytesRead::read(&mut bytes, 56);
        let decoded = read_part_name(&mut bytes);
        assert_eq!(decoded, "données");
    }
}
