use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroup {
    pub name: String,
    pub uuid: String,
    pub size: u64,
    pub free_size: u64,
    /// Size and usage figures may be stale (pvmove, thin pools, snapshots)
    /// and should be refreshed periodically while displayed.
    pub needs_polling: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalVolume {
    /// Underlying block device, e.g. `/dev/sdb1`.
    pub path: String,
    pub vgroup: Option<String>,
    pub size: u64,
    pub free_size: u64,
}

impl PhysicalVolume {
    pub fn used_size(&self) -> u64 {
        self.size.saturating_sub(self.free_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolume {
    pub name: String,
    pub vgroup: String,
    pub path: String,
    pub dm_path: String,
    pub size: u64,
    /// `lv_attr` as printed by `lvs`, e.g. `-wi-ao----`.
    pub attr: String,
}

impl LogicalVolume {
    pub fn is_active(&self) -> bool {
        self.attr.chars().nth(4) == Some('a')
    }

    /// Volume kinds whose allocation changes without any user action.
    pub fn needs_polling(&self) -> bool {
        matches!(
            self.attr.chars().next(),
            Some('p' | 't' | 's' | 'S' | 'r' | 'R' | 'm')
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvolRef {
    pub vgroup: String,
    pub name: String,
}

/// An unused block device or partition that can become a physical volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSpace {
    pub block: String,
    pub size: u64,
    pub description: String,
    /// Logical volume backing the block itself or the disk its partition
    /// table lives on.
    pub backing_lvol: Option<LvolRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageKind {
    Mounted { mount_point: String },
    Swap,
    PhysicalVolume { vgroup: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub block: String,
    pub kind: UsageKind,
    /// In use and cannot be stopped automatically.
    pub blocking: bool,
}

/// Everything that currently uses the storage below an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUsage {
    pub entries: Vec<UsageEntry>,
}

impl ActiveUsage {
    pub fn blocking(&self) -> bool {
        self.entries.iter().any(|entry| entry.blocking)
    }

    pub fn teardown_entries(&self) -> impl Iterator<Item = &UsageEntry> {
        self.entries.iter().filter(|entry| !entry.blocking)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Storage management backend. All operations are remote requests that
/// resolve to success or failure.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn list_volume_groups(&self) -> Result<Vec<VolumeGroup>>;
    async fn volume_group(&self, name: &str) -> Result<VolumeGroup>;
    async fn physical_volumes(&self, vgroup: &str) -> Result<Vec<PhysicalVolume>>;
    async fn logical_volumes(&self, vgroup: &str) -> Result<Vec<LogicalVolume>>;

    /// Ask the backend to re-read size and usage figures of a group.
    async fn poll(&self, vgroup: &str) -> Result<()>;

    async fn available_spaces(&self) -> Result<Vec<AvailableSpace>>;
    /// Make the spaces ready to be attached; returns the block paths to use.
    async fn prepare_spaces(&self, spaces: &[AvailableSpace]) -> Result<Vec<String>>;

    async fn add_device(&self, vgroup: &str, block: &str) -> Result<()>;
    async fn remove_device(&self, vgroup: &str, block: &str, wipe: bool) -> Result<()>;
    /// Move all allocated extents off a physical volume.
    async fn empty_device(&self, vgroup: &str, block: &str) -> Result<()>;

    async fn rename(&self, vgroup: &str, new_name: &str) -> Result<()>;
    async fn delete(&self, vgroup: &str, wipe: bool, tear_down: bool) -> Result<()>;

    async fn active_usage(&self, vgroup: &str) -> Result<ActiveUsage>;
    async fn teardown_active_usage(&self, usage: &ActiveUsage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lvol(attr: &str) -> LogicalVolume {
        LogicalVolume {
            name: "lv".into(),
            vgroup: "vg".into(),
            path: "/dev/vg/lv".into(),
            dm_path: "/dev/mapper/vg-lv".into(),
            size: 1,
            attr: attr.into(),
        }
    }

    #[test]
    fn lv_attr_flags() {
        assert!(lvol("-wi-ao----").is_active());
        assert!(!lvol("-wi-------").is_active());
        assert!(!lvol("-wi-ao----").needs_polling());
        assert!(lvol("twi-aotz--").needs_polling());
        assert!(lvol("pC-a-----").needs_polling());
    }

    #[test]
    fn used_size_never_underflows() {
        let pvol = PhysicalVolume {
            path: "/dev/sdb".into(),
            vgroup: None,
            size: 10,
            free_size: 12,
        };
        assert_eq!(pvol.used_size(), 0);
    }
}
