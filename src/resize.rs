//! Validated growth or shrink of a single partition entry (L3).
//!
//! A [`ResizeOperation`] names the target end of a partition's span; a
//! [`ResizeConstraints`] set governs what results are acceptable. Both are
//! checked in full against sibling entries and the header's usable range
//! before anything is written back through [`GptDisk::write_inplace`] — a
//! validation failure never reaches the disk.

use crate::error::GptError;
use crate::{DiskDevice, GptDisk};

/// What a resize should change the target partition's span to.
///
/// Modeled as a tagged variant rather than an optional-fields record: a
/// resize is always in terms of exactly one target, never a combination.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResizeOperation {
    /// Resize so the partition spans exactly this many sectors, counted
    /// from its existing (unchanged) starting LBA.
    BySectors(u64),
    /// Resize so the partition's last LBA becomes exactly this value.
    ToEndSector(u64),
}

impl ResizeOperation {
    /// Resize to a size given in whole megabytes (1 MB = 2048 sectors at
    /// 512 bytes/sector), expressed as a [`ResizeOperation::BySectors`].
    pub fn from_megabytes(mb: u64) -> Self {
        ResizeOperation::BySectors(mb.saturating_mul(2048))
    }

    /// Resize to a size given in whole gigabytes, expressed as a
    /// [`ResizeOperation::BySectors`].
    pub fn from_gigabytes(gb: u64) -> Self {
        ResizeOperation::BySectors(gb.saturating_mul(2048 * 1024))
    }
}

/// Constraints a resize result must satisfy, beyond the structural checks
/// (usable range, sibling overlap) that always apply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResizeConstraints {
    allow_shrinking: bool,
    allow_moving: bool,
    min_size_sectors: u64,
    alignment_sectors: u64,
}

impl ResizeConstraints {
    /// Constraints requiring the resize to grow (or hold) the partition,
    /// with no minimum size beyond one sector and no alignment requirement.
    pub fn new() -> Self {
        Self::default()
    }

    /// If `false` (the default), a result smaller than the current size
    /// fails with [`GptError::WouldShrink`].
    pub fn allow_shrinking(mut self, allow_shrinking: bool) -> Self {
        self.allow_shrinking = allow_shrinking;
        self
    }

    /// Reserved for future use: this engine never moves `lba_start`.
    pub fn allow_moving(mut self, allow_moving: bool) -> Self {
        self.allow_moving = allow_moving;
        self
    }

    /// Any resulting size below this many sectors fails with
    /// [`GptError::InvalidSize`].
    pub fn min_size_sectors(mut self, min_size_sectors: u64) -> Self {
        self.min_size_sectors = min_size_sectors.max(1);
        self
    }

    /// `new_end + 1` must be a multiple of this value, else
    /// [`GptError::AlignmentError`].
    pub fn alignment_sectors(mut self, alignment_sectors: u64) -> Self {
        self.alignment_sectors = alignment_sectors.max(1);
        self
    }
}

impl Default for ResizeConstraints {
    fn default() -> Self {
        Self {
            allow_shrinking: false,
            allow_moving: false,
            min_size_sectors: 1,
            alignment_sectors: 1,
        }
    }
}

/// A read-only summary of one in-use partition slot, as returned by
/// [`list_partitions`] and [`get_partition_info`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionInfo {
    /// Raw slot index (the same numbering `get_partition` uses; slot 0
    /// never exists).
    pub index: u32,
    /// First LBA of the partition (inclusive).
    pub first_lba: u64,
    /// Last LBA of the partition (inclusive).
    pub last_lba: u64,
    /// Size of the partition in sectors.
    pub size_sectors: u64,
    /// Size of the partition in bytes (`size_sectors * 512`).
    pub size_bytes: u64,
    /// Partition type GUID.
    pub type_guid: uuid::Uuid,
    /// Decoded partition name.
    pub name: String,
}

/// Validate and apply a resize of the partition at raw slot `index`,
/// committing the result through [`GptDisk::write_inplace`].
///
/// Resolves the target, computes the new end LBA, checks
/// size/shrink/alignment/usable-range/overlap in that order, then commits.
/// Any failure before the final commit leaves the disk and in-memory table
/// untouched.
pub fn resize_partition<D: DiskDevice>(
    disk: &mut GptDisk<D>,
    index: u32,
    op: ResizeOperation,
    constraints: ResizeConstraints,
) -> Result<(), GptError> {
    let header = disk.header().clone();

    let entry = disk.get_partition(index)?;
    if !entry.is_used() {
        return Err(GptError::PartitionNotFound);
    }
    let start = entry.first_lba;
    let cur_end = entry.last_lba;
    let cur_size = cur_end
        .checked_sub(start)
        .and_then(|s| s.checked_add(1))
        .ok_or(GptError::Overflow("current partition size"))?;

    let new_end = match op {
        ResizeOperation::BySectors(sectors) => start
            .checked_add(sectors)
            .and_then(|v| v.checked_sub(1))
            .ok_or(GptError::Overflow("resize - new end from sector count"))?,
        ResizeOperation::ToEndSector(end) => end,
    };

    let new_size = new_end
        .checked_sub(start)
        .and_then(|s| s.checked_add(1))
        .ok_or(GptError::InvalidSize)?;

    if new_size < constraints.min_size_sectors {
        return Err(GptError::InvalidSize);
    }

    if !constraints.allow_shrinking && new_size < cur_size {
        return Err(GptError::WouldShrink);
    }

    if (new_end + 1) % constraints.alignment_sectors != 0 {
        return Err(GptError::AlignmentError);
    }

    if new_end > header.last_usable {
        return Err(GptError::NotEnoughSpace);
    }

    for (other_index, other) in disk.partitions() {
        if *other_index == index || !other.is_used() {
            continue;
        }
        let intersects = !(new_end < other.first_lba || start > other.last_lba);
        if intersects {
            return Err(GptError::OverlapDetected);
        }
    }

    disk.get_partition_mut(index)?.last_lba = new_end;
    disk.write_inplace()
}

/// The largest size (in sectors) the partition at raw slot `index` could
/// grow to without overlapping the next in-use partition (or the header's
/// `last_usable_lba`, if there is none after it).
///
/// Only entries starting strictly after the target's current end are
/// considered: by the no-overlap invariant, nothing else can legally sit
/// between the target's start and its current end.
pub fn max_size<D: DiskDevice>(disk: &GptDisk<D>, index: u32) -> Result<u64, GptError> {
    let header = disk.header();
    let entry = disk.get_partition(index)?;
    if !entry.is_used() {
        return Err(GptError::PartitionNotFound);
    }
    let start = entry.first_lba;
    let cur_end = entry.last_lba;

    let next_start = disk
        .partitions()
        .iter()
        .filter(|(other_index, other)| **other_index != index && other.is_used())
        .map(|(_, other)| other.first_lba)
        .filter(|&first_lba| first_lba > cur_end)
        .min()
        .unwrap_or(header.last_usable + 1);

    next_start
        .checked_sub(start)
        .ok_or(GptError::Overflow("max size - next start before current start"))
}

/// Resize the partition at raw slot `index` to the maximum contiguous
/// size available, per [`max_size`], using default constraints.
///
/// Fails with [`GptError::NotEnoughSpace`] when `max_size(index) == 0`.
pub fn resize_to_max<D: DiskDevice>(disk: &mut GptDisk<D>, index: u32) -> Result<(), GptError> {
    let max = max_size(disk, index)?;
    if max == 0 {
        return Err(GptError::NotEnoughSpace);
    }
    resize_partition(
        disk,
        index,
        ResizeOperation::BySectors(max),
        ResizeConstraints::default(),
    )
}

/// One [`PartitionInfo`] record per non-empty partition slot, in raw slot
/// order.
pub fn list_partitions<D: DiskDevice>(disk: &GptDisk<D>) -> Vec<PartitionInfo> {
    disk.partitions()
        .iter()
        .filter(|(_, p)| p.is_used())
        .map(|(index, p)| partition_info(*index, p))
        .collect()
}

/// The [`PartitionInfo`] record for a single slot, or `None` if the slot
/// is empty or out of range.
pub fn get_partition_info<D: DiskDevice>(disk: &GptDisk<D>, index: u32) -> Option<PartitionInfo> {
    let p = disk.get_partition(index).ok()?;
    if !p.is_used() {
        return None;
    }
    Some(partition_info(index, p))
}

fn partition_info(index: u32, p: &crate::partition::Partition) -> PartitionInfo {
    let size_sectors = p.last_lba.saturating_sub(p.first_lba).saturating_add(1);
    PartitionInfo {
        index,
        first_lba: p.first_lba,
        last_lba: p.last_lba,
        size_sectors,
        size_bytes: size_sectors.saturating_mul(512),
        type_guid: p.part_type_guid,
        name: p.name.clone(),
    }
}
