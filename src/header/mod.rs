//! GPT-header object and helper functions (codec + CRC discipline, L0/L2).

mod builder;

pub use builder::HeaderBuilder;

use crc::Crc;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::disk;
use crate::error::GptError;
use crate::{debug, trace};

use simple_bytes::{BytesArray, BytesRead, BytesSeek, BytesWrite};

/// Minimum number of partition entries a header is built with, matching
/// the UEFI-recommended default table size.
pub(crate) const MIN_NUM_PARTS: u32 = 128;

/// Size of a partition entry this core understands. Headers advertising
/// any other `sizeof_partition_entry` are rejected (`InvalidHeaderSize`).
pub const PARTITION_ENTRY_SIZE: u32 = 128;

/// Minimum legal `header_size`.
const MIN_HEADER_SIZE: u32 = 92;

/// Header describing a GPT disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// GPT header magic signature, hardcoded to "EFI PART".
    pub signature: String, // Offset  0
    /// Opaque revision field; new headers are written as `0x0001_0000`.
    pub revision: u32, // Offset  8
    /// Number of leading bytes the header CRC-32 covers; must be >= 92.
    pub header_size_le: u32, // Offset 12
    /// CRC32 of the header with this field zeroed during computation.
    pub crc32: u32, // Offset 16
    /// must be 0
    pub reserved: u32, // Offset 20
    /// LBA at which this header resides (1 for primary; last LBA for backup).
    pub current_lba: u64, // Offset 24
    /// LBA of the peer header.
    pub backup_lba: u64, // Offset 32
    /// Lowest LBA available to partition data.
    pub first_usable: u64, // Offset 40
    /// Highest LBA available to partition data.
    pub last_usable: u64, // Offset 48
    /// Stable disk identity.
    pub disk_guid: uuid::Uuid, // Offset 56
    /// LBA where the partition entry array begins.
    pub part_start: u64, // Offset 72
    /// Number of partition entries in the array.
    pub num_parts: u32, // Offset 80
    /// Size in bytes of one partition entry; must equal 128.
    pub part_size: u32, // Offset 84
    /// CRC32 over `num_parts * part_size` bytes of the entry array.
    pub crc32_parts: u32, // Offset 88
}

impl Header {
    /// Returns true if this looks like the primary header (starts before its peer).
    pub fn is_primary(&self) -> bool {
        self.current_lba < self.backup_lba
    }

    /// Whether accommodating `candidate_id` as a raw partition slot number
    /// would require growing this header's partition entry count.
    pub fn num_parts_would_change(&self, candidate_id: u32) -> bool {
        candidate_id > self.num_parts
    }

    /// Write the primary header.
    ///
    /// The on-disk CRC32 is computed and filled in as part of the write.
    pub fn write_primary<D: Read + Write + Seek>(
        &self,
        file: &mut D,
        lb_size: disk::LogicalBlockSize,
    ) -> Result<usize, GptError> {
        if self.current_lba >= self.backup_lba {
            debug!(
                "current lba: {} backup_lba: {}",
                self.current_lba, self.backup_lba
            );
            return Err(GptError::Overflow(
                "primary header does not start before backup one",
            ));
        }
        self.file_write_header(file, self.current_lba, lb_size)
    }

    /// Write the backup header.
    ///
    /// The on-disk CRC32 is computed and filled in as part of the write.
    pub fn write_backup<D: Read + Write + Seek>(
        &self,
        file: &mut D,
        lb_size: disk::LogicalBlockSize,
    ) -> Result<usize, GptError> {
        if self.current_lba <= self.backup_lba {
            debug!(
                "current lba: {} backup_lba: {}",
                self.current_lba, self.backup_lba
            );
            return Err(GptError::Overflow(
                "backup header does not start after primary one",
            ));
        }
        self.file_write_header(file, self.current_lba, lb_size)
    }

    fn file_write_header<D: Read + Write + Seek>(
        &self,
        file: &mut D,
        lba: u64,
        lb_size: disk::LogicalBlockSize,
    ) -> Result<usize, GptError> {
        let parts_checksum = partentry_checksum(file, self, lb_size)?;
        trace!("computed partitions CRC32: {:#x}", parts_checksum);

        let unchecksummed = self.as_bytes(None, Some(parts_checksum));
        if self.header_size_le < MIN_HEADER_SIZE || self.header_size_le as usize > unchecksummed.len() {
            return Err(GptError::InvalidHeaderSize);
        }
        let checksum = calculate_crc32(&unchecksummed[..self.header_size_le as usize]);
        trace!("computed header CRC32: {:#x}", checksum);

        let header_bytes = self.as_bytes(Some(checksum), Some(parts_checksum));
        // The remainder of the logical block must be zeroed.
        let mut bytes = Vec::with_capacity(lb_size.as_usize());
        bytes.extend_from_slice(&header_bytes);
        bytes.resize(lb_size.as_usize(), 0);

        trace!("writing header sector at LBA {}", lba);
        disk::write_sector(file, lba, lb_size, &bytes)?;

        Ok(bytes.len())
    }

    fn as_bytes(&self, header_checksum: Option<u32>, partitions_checksum: Option<u32>) -> [u8; 92] {
        let mut bytes = BytesArray::from([0u8; 92]);
        let disk_guid_fields = self.disk_guid.as_fields();

        BytesWrite::write(&mut bytes, self.signature.as_bytes());
        bytes.write_le_u32(self.revision);
        bytes.write_le_u32(self.header_size_le);
        bytes.write_le_u32(header_checksum.unwrap_or_default());
        bytes.write_le_u32(0);
        bytes.write_le_u64(self.current_lba);
        bytes.write_le_u64(self.backup_lba);
        bytes.write_le_u64(self.first_usable);
        bytes.write_le_u64(self.last_usable);
        bytes.write_le_u32(disk_guid_fields.0);
        bytes.write_le_u16(disk_guid_fields.1);
        bytes.write_le_u16(disk_guid_fields.2);
        BytesWrite::write(&mut bytes, disk_guid_fields.3);
        bytes.write_le_u64(self.part_start);
        bytes.write_le_u32(self.num_parts);
        bytes.write_le_u32(self.part_size);
        bytes.write_le_u32(partitions_checksum.unwrap_or_default());

        bytes.into_array()
    }
}

/// Parses a GUID with its first three fields little-endian, as GPT stores them.
pub fn parse_uuid<R: BytesRead>(rdr: &mut R) -> Result<uuid::Uuid, GptError> {
    if rdr.remaining().len() < 16 {
        return Err(GptError::InvalidUuid);
    }

    let d1 = rdr.read_le_u32();
    let d2 = rdr.read_le_u16();
    let d3 = rdr.read_le_u16();
    let d4: [u8; 8] = rdr.read(8).try_into().map_err(|_| GptError::InvalidUuid)?;

    Ok(uuid::Uuid::from_fields(d1, d2, d3, &d4))
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Disk:\t\t{}\nCRC32:\t\t{:#x}\nTable CRC:\t{:#x}",
            self.disk_guid, self.crc32, self.crc32_parts
        )
    }
}

/// Read the primary GPT header from a given path.
///
/// ## Example
///
/// ```rust,no_run
/// use gpt::header::read_header;
///
/// let lb_size = gpt::disk::DEFAULT_SECTOR_SIZE;
/// let diskpath = std::path::Path::new("/dev/sdz");
///
/// let h = read_header(diskpath, lb_size).unwrap();
/// ```
pub fn read_header(
    path: impl AsRef<Path>,
    sector_size: disk::LogicalBlockSize,
) -> Result<Header, GptError> {
    let mut file = File::open(path)?;
    read_primary_header(&mut file, sector_size)
}

/// Read the primary GPT header from any device capable of reading and seeking.
pub fn read_header_from_arbitrary_device<D: Read + Seek>(
    device: &mut D,
    sector_size: disk::LogicalBlockSize,
) -> Result<Header, GptError> {
    read_primary_header(device, sector_size)
}

pub(crate) fn read_primary_header<D: Read + Seek>(
    file: &mut D,
    sector_size: disk::LogicalBlockSize,
) -> Result<Header, GptError> {
    let cur = file.stream_position().unwrap_or(0);
    let res = file_read_header(file, 1, sector_size);
    let _ = file.seek(SeekFrom::Start(cur));
    let header = res?;
    if header.current_lba != 1 {
        return Err(GptError::InvalidLbaRange);
    }
    Ok(header)
}

pub(crate) fn read_backup_header<D: Read + Seek>(
    file: &mut D,
    sector_size: disk::LogicalBlockSize,
) -> Result<Header, GptError> {
    let cur = file.stream_position().unwrap_or(0);
    let h2sect = find_backup_lba(file, sector_size)?;
    let res = file_read_header(file, h2sect, sector_size);
    let _ = file.seek(SeekFrom::Start(cur));
    let header = res?;
    if header.current_lba != h2sect {
        return Err(GptError::InvalidLbaRange);
    }
    Ok(header)
}

pub(crate) fn file_read_header<D: Read + Seek>(
    file: &mut D,
    lba: u64,
    sector_size: disk::LogicalBlockSize,
) -> Result<Header, GptError> {
    let mut sector = vec![0u8; sector_size.as_usize()];
    disk::read_sector(file, lba, sector_size, &mut sector)?;

    let mut bytes = BytesArray::from([0u8; 92]);
    bytes.as_mut().copy_from_slice(&sector[..92]);

    let sigstr = String::from_utf8_lossy(BytesRead::read(&mut bytes, 8)).into_owned();
    if sigstr != "EFI PART" {
        return Err(GptError::InvalidSignature);
    };

    let h = Header {
        signature: sigstr,
        revision: bytes.read_le_u32(),
        header_size_le: bytes.read_le_u32(),
        crc32: bytes.read_le_u32(),
        reserved: bytes.read_le_u32(),
        current_lba: bytes.read_le_u64(),
        backup_lba: bytes.read_le_u64(),
        first_usable: bytes.read_le_u64(),
        last_usable: bytes.read_le_u64(),
        disk_guid: parse_uuid(&mut bytes)?,
        part_start: bytes.read_le_u64(),
        num_parts: bytes.read_le_u32(),
        part_size: bytes.read_le_u32(),
        crc32_parts: bytes.read_le_u32(),
    };
    trace!("header disk guid: {}", h.disk_guid.as_hyphenated());

    if h.header_size_le < MIN_HEADER_SIZE
        || h.header_size_le as usize > bytes.as_slice().len()
        || h.part_size != PARTITION_ENTRY_SIZE
    {
        return Err(GptError::InvalidHeaderSize);
    }

    // Recompute the CRC32 with the stored crc32 field zeroed.
    BytesSeek::seek(&mut bytes, 16);
    bytes.write_u32(0);

    let c = calculate_crc32(&bytes.as_slice()[..h.header_size_le as usize]);
    trace!("header CRC32: {:#x} - computed CRC32: {:#x}", h.crc32, c);
    if c == h.crc32 {
        Ok(h)
    } else {
        Err(GptError::InvalidCrc32)
    }
}

pub(crate) fn find_backup_lba<D: Seek>(
    f: &mut D,
    sector_size: disk::LogicalBlockSize,
) -> Result<u64, GptError> {
    trace!("querying device size to find backup header location");
    let lb_size: u64 = sector_size.into();
    let len = disk::device_len(f)?;
    // lba0: protective MBR, lba1: primary header, ..., lba(-1): backup header.
    if len < lb_size * 3 {
        return Err(GptError::InvalidLbaRange);
    }
    let bak_offset = len.saturating_sub(lb_size);
    let bak_lba = bak_offset / lb_size;
    trace!("backup header: LBA={}, byte offset={}", bak_lba, bak_offset);

    Ok(bak_lba)
}

const CRC_32: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

fn calculate_crc32(b: &[u8]) -> u32 {
    let mut digest = CRC_32.digest();
    digest.update(b);
    digest.finalize()
}

pub(crate) fn partentry_checksum<D: Read + Seek>(
    file: &mut D,
    hdr: &Header,
    lb_size: disk::LogicalBlockSize,
) -> Result<u32, GptError> {
    trace!("computing partition entry array checksum");
    let pt_len = u64::from(hdr.num_parts)
        .checked_mul(hdr.part_size.into())
        .ok_or(GptError::Overflow("partition table - size"))?;

    let sector_len: u64 = lb_size.into();
    let num_sectors = (pt_len + (sector_len - 1)) / sector_len;
    let padded_len = num_sectors
        .checked_mul(sector_len)
        .ok_or(GptError::Overflow("partition table - padded size"))?;

    let mut buf = vec![0u8; padded_len as usize];
    for i in 0..num_sectors {
        let lba = hdr
            .part_start
            .checked_add(i)
            .ok_or(GptError::Overflow("header overflow - partition table start"))?;
        let start = (i * sector_len) as usize;
        let end = start + sector_len as usize;
        disk::read_sector(file, lba, lb_size, &mut buf[start..end])?;
    }

    Ok(calculate_crc32(&buf[..pt_len as usize]))
}

/// Creates a new, blank header and writes it to the primary location.
///
/// If `uuid` is `None`, a random disk GUID is generated. Use alongside
/// `partition::write_partition_array` to finish initializing a disk.
pub fn write_header(
    p: impl AsRef<Path>,
    uuid: Option<uuid::Uuid>,
    sector_size: disk::LogicalBlockSize,
) -> Result<uuid::Uuid, GptError> {
    debug!("opening {} for writing", p.as_ref().display());
    let mut file = OpenOptions::new().write(true).read(true).open(p)?;
    let bak = find_backup_lba(&mut file, sector_size)?;

    let mut builder = HeaderBuilder::new();
    if let Some(uuid) = uuid {
        builder.disk_guid(uuid);
    }

    let header = builder.backup_lba(bak).build(sector_size)?;
    debug!("new header: {:#?}", header);
    header.write_primary(&mut file, sector_size)?;

    Ok(header.disk_guid)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::disk::LogicalBlockSize;
    use std::io::Cursor;

    #[test]
    fn builder_roundtrip() {
        let header_1 = HeaderBuilder::new()
            .disk_guid("1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap())
            .backup_lba(71)
            .build(LogicalBlockSize::Lb512)
            .unwrap();

        let backup_header = HeaderBuilder::new()
            .disk_guid("1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap())
            .backup_lba(71)
            .primary(false)
            .build(LogicalBlockSize::Lb512)
            .unwrap();

        assert_eq!(header_1.current_lba, 1);
        assert_eq!(header_1.backup_lba, 71);
        assert!(header_1.is_primary());
        assert!(!backup_header.is_primary());
        assert_eq!(backup_header.current_lba, 71);
    }

    #[test]
    fn write_then_read_round_trips() {
        let lb_size = LogicalBlockSize::Lb512;

        let primary = HeaderBuilder::new()
            .disk_guid("1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap())
            .backup_lba(71)
            .build(lb_size)
            .unwrap();

        let backup = HeaderBuilder::new()
            .disk_guid("1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap())
            .backup_lba(71)
            .primary(false)
            .build(lb_size)
            .unwrap();

        let mut mem = Cursor::new(vec![0u8; 72 * 512]);
        primary.write_primary(&mut mem, lb_size).unwrap();
        backup.write_backup(&mut mem, lb_size).unwrap();

        let read_primary = read_primary_header(&mut mem, lb_size).unwrap();
        let read_backup = read_backup_header(&mut mem, lb_size).unwrap();

        assert_eq!(read_primary.disk_guid, primary.disk_guid);
        assert_eq!(read_primary.current_lba, 1);
        assert_eq!(read_backup.current_lba, 71);
    }

    #[test]
    fn rejects_bad_signature() {
        let lb_size = LogicalBlockSize::Lb512;
        let mut mem = Cursor::new(vec![0u8; 72 * 512]);
        let err = file_read_header(&mut mem, 1, lb_size);
        assert!(matches!(err, Err(GptError::InvalidSignature)));
    }

    #[test]
    fn rejects_bad_crc() {
        let lb_size = LogicalBlockSize::Lb512;
        let primary = HeaderBuilder::new()
            .disk_guid("1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap())
            .backup_lba(71)
            .build(lb_size)
            .unwrap();

        let mut mem = Cursor::new(vec![0u8; 72 * 512]);
        primary.write_primary(&mut mem, lb_size).unwrap();

        // Flip a byte inside the header body, outside the CRC field itself.
        mem.get_mut()[512 + 24] ^= 0xFF;

        let err = read_primary_header(&mut mem, lb_size);
        assert!(matches!(err, Err(GptError::InvalidCrc32)));
    }

    #[test]
    fn rejects_undersized_entry() {
        let lb_size = LogicalBlockSize::Lb512;
        let mut header = HeaderBuilder::new()
            .disk_guid("1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap())
            .backup_lba(71)
            .build(lb_size)
            .unwrap();
        header.part_size = 96;

        let mut mem = Cursor::new(vec![0u8; 72 * 512]);
        header.write_primary(&mut mem, lb_size).unwrap();

        let err = read_primary_header(&mut mem, lb_size);
        assert!(matches!(err, Err(GptError::InvalidHeaderSize)));
    }

    #[test]
    fn write_rejects_oversized_header_size() {
        let lb_size = LogicalBlockSize::Lb512;
        let mut header = HeaderBuilder::new()
            .disk_guid("1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap())
            .backup_lba(71)
            .build(lb_size)
            .unwrap();
        header.header_size_le = 200;

        let mut mem = Cursor::new(vec![0u8; 72 * 512]);
        let err = header.write_primary(&mut mem, lb_size);
        assert!(matches!(err, Err(GptError::InvalidHeaderSize)));
    }

    // A corrupted on-disk `header_size_le` past the fixed 92-byte header
    // must not panic via an out-of-bounds slice; it is rejected instead.
    #[test]
    fn read_rejects_corrupted_oversized_header_size() {
        let lb_size = LogicalBlockSize::Lb512;
        let header = HeaderBuilder::new()
            .disk_guid("1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap())
            .backup_lba(71)
            .build(lb_size)
            .unwrap();

        let mut mem = Cursor::new(vec![0u8; 72 * 512]);
        header.write_primary(&mut mem, lb_size).unwrap();

        // header_size_le is a little-endian u32 at offset 12 within the header.
        mem.get_mut()[512 + 12..512 + 16].copy_from_slice(&5000u32.to_le_bytes());

        let err = read_primary_header(&mut mem, lb_size);
        assert!(matches!(err, Err(GptError::InvalidHeaderSize)));
    }
}
