//! Error taxonomy shared by every layer of this crate.

use std::{fmt, io};

/// Errors returned when interacting with a GPT disk, header, or partition entry.
///
/// Every failure in the crate maps to exactly one of these kinds; none are
/// logged or swallowed internally.
#[non_exhaustive]
#[derive(Debug)]
pub enum GptError {
    /// Header signature field is not `EFI PART`.
    InvalidSignature,
    /// Header or entry-array CRC-32 mismatched the computed value.
    InvalidCrc32,
    /// `header_size < 92`, or `sizeof_partition_entry != 128`.
    InvalidHeaderSize,
    /// First/last usable LBA contradicts the device length. Reserved: not
    /// currently raised by the resize engine, kept for API completeness.
    InvalidLbaRange,
    /// Malformed GUID string.
    InvalidUuid,
    /// An I/O buffer was not exactly one sector in size.
    InvalidBufferSize,
    /// An operation was attempted before a required load.
    InvalidState,
    /// The referenced partition slot is empty or out of range.
    PartitionNotFound,
    /// No partition slot was available. Reserved: not currently raised by
    /// the resize engine.
    PartitionTableFull,
    /// The resulting size would be smaller than `min_size_sectors`, or zero.
    InvalidSize,
    /// The resulting size would be smaller than the current size, and
    /// shrinking was not allowed.
    WouldShrink,
    /// The resulting range exceeds a sibling partition's start, or the
    /// header's `last_usable_lba`.
    NotEnoughSpace,
    /// The resulting range intersects another non-empty entry.
    OverlapDetected,
    /// The resulting end LBA is not aligned as required.
    AlignmentError,
    /// Disk was opened with a logical block size this core does not
    /// support for Context operations (only 512 bytes is handled).
    UnsupportedSectorSize,
    /// Disk not opened in writable mode.
    ReadOnly,
    /// We expected to read an existing partition table but are instead
    /// building a new, blank one.
    CreatingInitializedDisk,
    /// Arithmetic overflowed or underflowed computing a disk offset or size.
    /// This never occurs with sane geometry.
    Overflow(&'static str),
    /// Changing the partition count was attempted without opting in.
    PartitionCountWouldChange,
    /// Too many partition slots would be required for the header's capacity.
    OverflowPartitionCount,
    /// Permission was denied opening or accessing the device.
    PermissionDenied,
    /// The device path does not exist.
    NoDevice,
    /// The device is busy (e.g. held open exclusively elsewhere).
    DeviceBusy,
    /// The device or filesystem backing it is out of space.
    NoSpaceLeft,
    /// The device does not support seeking.
    Unseekable,
    /// Any other I/O error, passed through verbatim.
    Io(io::Error),
}

impl From<io::Error> for GptError {
    fn from(e: io::Error) -> Self {
        use io::ErrorKind::*;
        match e.kind() {
            PermissionDenied => GptError::PermissionDenied,
            NotFound => GptError::NoDevice,
            WouldBlock => GptError::DeviceBusy,
            StorageFull => GptError::NoSpaceLeft,
            _ => GptError::Io(e),
        }
    }
}

impl std::error::Error for GptError {}

impl fmt::Display for GptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use GptError::*;
        match self {
            InvalidSignature => write!(f, "invalid GPT header signature"),
            InvalidCrc32 => write!(f, "invalid CRC-32 checksum"),
            InvalidHeaderSize => write!(f, "invalid header size or partition entry size"),
            InvalidLbaRange => write!(f, "first/last usable LBA inconsistent with device length"),
            InvalidUuid => write!(f, "invalid UUID string"),
            InvalidBufferSize => write!(f, "I/O buffer is not exactly one sector"),
            InvalidState => write!(f, "operation attempted before required load"),
            PartitionNotFound => write!(f, "partition slot is empty or out of range"),
            PartitionTableFull => write!(f, "no partition slot available"),
            InvalidSize => write!(f, "resulting size is below the minimum, or zero"),
            WouldShrink => write!(f, "resulting size would shrink the partition"),
            NotEnoughSpace => write!(f, "not enough contiguous space for the requested size"),
            OverlapDetected => write!(f, "resulting range overlaps another partition"),
            AlignmentError => write!(f, "resulting end LBA does not satisfy the alignment"),
            UnsupportedSectorSize => write!(f, "unsupported logical block size (must be 512)"),
            ReadOnly => write!(f, "disk not opened in writable mode"),
            CreatingInitializedDisk => write!(
                f,
                "expected to read an existing partition table, but building a new one"
            ),
            Overflow(what) => write!(f, "arithmetic overflow: {what}"),
            PartitionCountWouldChange => {
                write!(f, "partition count would change but is not allowed")
            }
            OverflowPartitionCount => write!(f, "not enough partition slots"),
            PermissionDenied => write!(f, "permission denied"),
            NoDevice => write!(f, "no such device"),
            DeviceBusy => write!(f, "device busy"),
            NoSpaceLeft => write!(f, "no space left on device"),
            Unseekable => write!(f, "device does not support seeking"),
            Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}
