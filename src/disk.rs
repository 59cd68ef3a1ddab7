//! Disk-related types and helper functions: the block-device adapter (L1).

use super::{GptConfig, GptDisk, GptError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::{fmt, fs, io, path};

/// Default size of a logical sector (bytes).
pub const DEFAULT_SECTOR_SIZE: LogicalBlockSize = LogicalBlockSize::Lb512;

/// Logical block/sector size of a GPT disk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogicalBlockSize {
    /// 512 bytes.
    Lb512,
    /// 4096 bytes.
    Lb4096,
}

impl LogicalBlockSize {
    /// Returns the logical block size as a `usize`.
    pub const fn as_usize(&self) -> usize {
        match self {
            LogicalBlockSize::Lb512 => 512,
            LogicalBlockSize::Lb4096 => 4096,
        }
    }

    /// Returns the logical block size as a `u64`.
    pub const fn as_u64(&self) -> u64 {
        match self {
            LogicalBlockSize::Lb512 => 512,
            LogicalBlockSize::Lb4096 => 4096,
        }
    }
}

impl From<LogicalBlockSize> for u64 {
    fn from(lb: LogicalBlockSize) -> u64 {
        lb.as_u64()
    }
}

impl From<LogicalBlockSize> for usize {
    fn from(lb: LogicalBlockSize) -> usize {
        lb.as_usize()
    }
}

impl TryFrom<u64> for LogicalBlockSize {
    type Error = io::Error;
    fn try_from(v: u64) -> Result<Self, Self::Error> {
        match v {
            512 => Ok(LogicalBlockSize::Lb512),
            4096 => Ok(LogicalBlockSize::Lb4096),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "unsupported logical block size (must be 512 or 4096)",
            )),
        }
    }
}

impl fmt::Display for LogicalBlockSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogicalBlockSize::Lb512 => write!(f, "512"),
            LogicalBlockSize::Lb4096 => write!(f, "4096"),
        }
    }
}

/// Open and read a GPT disk, using default configuration options.
///
/// ## Example
///
/// ```rust,no_run
/// let gpt_disk = gpt::disk::read_disk("/dev/sdz").unwrap();
/// println!("{:#?}", gpt_disk);
/// ```
pub fn read_disk(diskpath: impl AsRef<path::Path>) -> Result<GptDisk<fs::File>, GptError> {
    let cfg = GptConfig::new();
    cfg.open(diskpath)
}

/// Read exactly one logical sector's worth of bytes at the given LBA.
///
/// This is the sector-granular primitive the Context layer builds on: all
/// device I/O in this crate goes through whole sectors. Fails with
/// `InvalidBufferSize` if `buf.len()` does not exactly match `lb_size`.
pub fn read_sector<D: Read + Seek>(
    device: &mut D,
    lba: u64,
    lb_size: LogicalBlockSize,
    buf: &mut [u8],
) -> Result<(), GptError> {
    if buf.len() != lb_size.as_usize() {
        return Err(GptError::InvalidBufferSize);
    }
    let offset = lba
        .checked_mul(lb_size.into())
        .ok_or(GptError::Overflow("sector offset"))?;
    device.seek(SeekFrom::Start(offset))?;
    device.read_exact(buf)?;
    Ok(())
}

/// Write exactly one logical sector's worth of bytes at the given LBA.
///
/// Fails with `InvalidBufferSize` if `buf.len()` does not exactly match
/// `lb_size`.
pub fn write_sector<D: Write + Seek>(
    device: &mut D,
    lba: u64,
    lb_size: LogicalBlockSize,
    buf: &[u8],
) -> Result<(), GptError> {
    if buf.len() != lb_size.as_usize() {
        return Err(GptError::InvalidBufferSize);
    }
    let offset = lba
        .checked_mul(lb_size.into())
        .ok_or(GptError::Overflow("sector offset"))?;
    device.seek(SeekFrom::Start(offset))?;
    device.write_all(buf)?;
    Ok(())
}

/// Determine a device's byte length: file length for regular files, or a
/// platform-specific probe for block devices (left to the caller to supply
/// via `Seek::seek(SeekFrom::End(0))`, which works uniformly for both).
pub fn device_len<D: Seek>(device: &mut D) -> Result<u64, GptError> {
    let cur = device.stream_position()?;
    let len = device.seek(SeekFrom::End(0))?;
    device.seek(SeekFrom::Start(cur))?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_sector_rejects_mismatched_buffer() {
        let mut dev = Cursor::new(vec![0u8; 4096]);
        let mut buf = vec![0u8; 256];
        let err = read_sector(&mut dev, 0, LogicalBlockSize::Lb512, &mut buf).unwrap_err();
        assert!(matches!(err, GptError::InvalidBufferSize));
    }

    #[test]
    fn write_sector_rejects_mismatched_buffer() {
        let mut dev = Cursor::new(vec![0u8; 4096]);
        let buf = vec![0u8; 4096];
        let err = write_sector(&mut dev, 0, LogicalBlockSize::Lb512, &buf).unwrap_err();
        assert!(matches!(err, GptError::InvalidBufferSize));
    }

    #[test]
    fn read_then_write_sector_round_trips() {
        let mut dev = Cursor::new(vec![0u8; 4096]);
        let mut written = vec![0xAB; 512];
        write_sector(&mut dev, 2, LogicalBlockSize::Lb512, &written).unwrap();

        let mut read_back = vec![0u8; 512];
        read_sector(&mut dev, 2, LogicalBlockSize::Lb512, &mut read_back).unwrap();
        assert_eq!(read_back, written.as_slice());

        written[0] = 0xCD;
        write_sector(&mut dev, 2, LogicalBlockSize::Lb512, &written).unwrap();
        read_sector(&mut dev, 2, LogicalBlockSize::Lb512, &mut read_back).unwrap();
        assert_eq!(read_back[0], 0xCD);
    }

    #[test]
    fn device_len_reports_size_and_preserves_position() {
        let mut dev = Cursor::new(vec![0u8; 1536]);
        dev.seek(SeekFrom::Start(100)).unwrap();
        assert_eq!(device_len(&mut dev).unwrap(), 1536);
        assert_eq!(dev.stream_position().unwrap(), 100);
    }
}
