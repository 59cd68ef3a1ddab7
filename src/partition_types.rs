//! Well-known GPT partition type GUIDs.
//!
//! Partition type GUIDs are treated as opaque identifiers everywhere else in
//! this crate; this table exists purely so callers and the CLI can print a
//! human-readable name instead of a bare GUID.

use std::str::FromStr;

use crate::error::GptError;

/// A GPT partition type: its GUID plus a short OS/platform label.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Type {
    /// Canonical uppercase GUID string for this partition type.
    pub guid: &'static str,
    /// Short OS/platform label, e.g. "Linux", "Windows", "None".
    pub os: &'static str,
}

partition_types! {
    /// Unused entry (all-zero type GUID).
    (UNUSED, "00000000-0000-0000-0000-000000000000", "None"),
    /// EFI System Partition.
    (EFI_SYSTEM, "C12A7328-F81F-11D2-BA4B-00A0C93EC93B", "None"),
    /// BIOS boot partition (GRUB2 core.img on GPT/BIOS systems).
    (BIOS_BOOT, "21686148-6449-6E6F-744E-656564454649", "None"),
    /// Microsoft reserved partition.
    (MICROSOFT_RESERVED, "E3C9E316-0B5C-4DB8-817D-F92DF00215AE", "Windows"),
    /// Basic data partition (Windows).
    (BASIC, "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7", "Windows"),
    /// Windows recovery environment.
    (WINDOWS_RECOVERY, "DE94BBA4-06D1-4D40-A16A-BFD50179D6AC", "Windows"),
    /// Linux filesystem data.
    (LINUX_FS, "0FC63DAF-8483-4772-8E79-3D69D8477DE4", "Linux"),
    /// Linux RAID partition.
    (LINUX_RAID, "A19D880F-05FC-4D3B-A006-743F0F84911E", "Linux"),
    /// Linux swap partition.
    (LINUX_SWAP, "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F", "Linux"),
    /// Linux LVM physical volume.
    (LINUX_LVM, "E6D6D379-F507-44C2-A23C-238F2A3DF928", "Linux"),
    /// FreeBSD data partition.
    (FREEBSD_DATA, "516E7CB4-6ECF-11D6-8FF8-00022D09712B", "FreeBSD"),
    /// Apple HFS+ partition.
    (APPLE_HFS, "48465300-0000-11AA-AA11-00306543ECAC", "MacOS"),
    /// Apple APFS container.
    (APPLE_APFS, "7C3457EF-0000-11AA-AA11-00306543ECAC", "MacOS"),
}

impl Type {
    /// Returns true for the all-zero "unused slot" type.
    pub fn is_unused(&self) -> bool {
        *self == UNUSED
    }

    /// Parses this type's canonical GUID string.
    ///
    /// Infallible for every constant declared in this module; the `Result`
    /// exists only because the underlying GUID is stored as a string.
    pub fn uuid(&self) -> Result<uuid::Uuid, GptError> {
        uuid::Uuid::from_str(self.guid).map_err(|_| GptError::InvalidUuid)
    }

    /// Looks up the well-known `Type` matching a raw partition type GUID,
    /// for display purposes only.
    ///
    /// Returns `None` for any GUID not in this table, including the
    /// all-zero "unused slot" GUID — this never decides whether a
    /// partition entry is in use; see `Partition::is_used`.
    pub fn lookup(guid: uuid::Uuid) -> Option<Type> {
        Type::from_str(&guid.to_string().to_uppercase()).ok()
    }
}

impl Default for Type {
    fn default() -> Self {
        UNUSED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_known() {
        assert_eq!(Type::from_str(LINUX_FS.guid).unwrap(), LINUX_FS);
    }

    #[test]
    fn from_str_unknown() {
        assert!(Type::from_str("not-a-guid").is_err());
    }

    #[test]
    fn unused_default() {
        assert!(Type::default().is_unused());
    }
}
