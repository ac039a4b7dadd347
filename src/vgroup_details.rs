//! Volume group details: header facts, the physical volume sidebar and the
//! group-level actions.

use crate::dialog::{
    Location, blocking_message, teardown_message, validate_disk_selection, validate_lvm2_name,
};
use crate::format::{fmt_size, fmt_size_long};
use crate::poller::{PollingController, VolumeGroupPoll};
use crate::storage::{
    ActiveUsage, AvailableSpace, LogicalVolume, PhysicalVolume, StorageClient, VolumeGroup,
};
use crate::{HostdeckError, Result, log_info, log_warn};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub const LAST_PVOL_EXCUSE: &str =
    "The last physical volume of a volume group cannot be removed.";
pub const DELETE_DANGER: &str = "Deleting a volume group will erase all data on it.";

/// What the remove button of a physical volume does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveDecision {
    /// Removal is not possible; the excuse explains why.
    Disallowed(String),
    /// Move the data elsewhere in the group, then detach.
    EmptyThenRemove,
    /// Nothing allocated; detach directly.
    Remove,
}

impl RemoveDecision {
    pub fn excuse(&self) -> Option<&str> {
        match self {
            RemoveDecision::Disallowed(excuse) => Some(excuse),
            _ => None,
        }
    }
}

pub fn remove_decision(pvol_count: usize, pvol: &PhysicalVolume, vgroup_free: u64) -> RemoveDecision {
    if pvol_count == 1 {
        RemoveDecision::Disallowed(LAST_PVOL_EXCUSE.to_string())
    } else if pvol.free_size < pvol.size {
        if pvol.size <= vgroup_free {
            RemoveDecision::EmptyThenRemove
        } else {
            RemoveDecision::Disallowed(format!(
                "There is not enough free space elsewhere to remove this physical volume. \
                 At least {} more free space is needed.",
                fmt_size(pvol.size - vgroup_free)
            ))
        }
    } else {
        RemoveDecision::Remove
    }
}

/// Drop spaces that live on a logical volume of `vgroup` itself.
pub fn filter_inside_vgroup(spaces: Vec<AvailableSpace>, vgroup: &str) -> Vec<AvailableSpace> {
    spaces
        .into_iter()
        .filter(|space| {
            space
                .backing_lvol
                .as_ref()
                .is_none_or(|lvol| lvol.vgroup != vgroup)
        })
        .collect()
}

/// First step of a delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePrompt {
    /// Something in use cannot be stopped; only an informational dialog.
    Blocked { title: String, message: Vec<String> },
    /// Dangerous confirmation listing what will be torn down first.
    Confirm {
        title: String,
        danger: &'static str,
        teardown: Vec<String>,
        usage: ActiveUsage,
    },
}

pub struct VGroupDetails {
    client: Arc<dyn StorageClient>,
    vgroup: VolumeGroup,
    pvols: Vec<PhysicalVolume>,
    lvols: Vec<LogicalVolume>,
    poller: PollingController,
    last_refreshed: DateTime<Utc>,
}

impl VGroupDetails {
    /// Mount the view for `name`. Starts polling right away if the group
    /// asks for it.
    pub async fn load(
        client: Arc<dyn StorageClient>,
        name: &str,
        runtime: Handle,
        poll_interval: Duration,
    ) -> Result<Self> {
        let vgroup = client.volume_group(name).await?;
        let pvols = client.physical_volumes(name).await?;
        let lvols = client.logical_volumes(name).await?;
        let target = Arc::new(VolumeGroupPoll::new(Arc::clone(&client), name));
        let poller = PollingController::new(runtime, poll_interval, target);

        let mut details = Self {
            client,
            vgroup,
            pvols,
            lvols,
            poller,
            last_refreshed: Utc::now(),
        };
        details.sync_polling();
        Ok(details)
    }

    pub fn vgroup(&self) -> &VolumeGroup {
        &self.vgroup
    }

    pub fn pvols(&self) -> &[PhysicalVolume] {
        &self.pvols
    }

    pub fn lvols(&self) -> &[LogicalVolume] {
        &self.lvols
    }

    pub fn last_refreshed(&self) -> DateTime<Utc> {
        self.last_refreshed
    }

    pub fn title(&self) -> String {
        format!("Volume Group {}", self.vgroup.name)
    }

    pub fn capacity(&self) -> String {
        fmt_size_long(self.vgroup.size)
    }

    pub fn pvol_detail(pvol: &PhysicalVolume) -> String {
        format!("{}, {} free", fmt_size(pvol.size), fmt_size(pvol.free_size))
    }

    /// Re-read the group from the backend and re-evaluate polling.
    pub async fn refresh(&mut self) -> Result<()> {
        let name = self.vgroup.name.clone();
        self.vgroup = self.client.volume_group(&name).await?;
        self.pvols = self.client.physical_volumes(&name).await?;
        self.lvols = self.client.logical_volumes(&name).await?;
        self.last_refreshed = Utc::now();
        self.sync_polling();
        Ok(())
    }

    /// Replace the displayed group with a fresh snapshot pushed by a caller.
    pub fn apply_snapshot(
        &mut self,
        vgroup: VolumeGroup,
        pvols: Vec<PhysicalVolume>,
        lvols: Vec<LogicalVolume>,
    ) {
        if vgroup.name != self.vgroup.name {
            return;
        }
        self.vgroup = vgroup;
        self.pvols = pvols;
        self.lvols = lvols;
        self.last_refreshed = Utc::now();
        self.sync_polling();
    }

    /// Called on every render with the group's live flag.
    pub fn sync_polling(&mut self) {
        self.poller.ensure_polling(self.vgroup.needs_polling);
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_polling()
    }

    /// View teardown. Dropping the view has the same effect.
    pub fn unmount(&mut self) {
        self.poller.stop();
    }

    pub fn remove_decision(&self, pvol: &PhysicalVolume) -> RemoveDecision {
        remove_decision(self.pvols.len(), pvol, self.vgroup.free_size)
    }

    /// Snapshot of what the actions need, detached from the view so it can
    /// run on a background task.
    pub fn actions(&self) -> VGroupActions {
        VGroupActions {
            client: Arc::clone(&self.client),
            vgroup: self.vgroup.clone(),
            pvols: self.pvols.clone(),
        }
    }
}

/// Group-level operations, evaluated against the snapshot they were taken
/// from.
#[derive(Clone)]
pub struct VGroupActions {
    client: Arc<dyn StorageClient>,
    vgroup: VolumeGroup,
    pvols: Vec<PhysicalVolume>,
}

impl VGroupActions {
    pub fn vgroup_name(&self) -> &str {
        &self.vgroup.name
    }

    pub async fn remove_pvol(&self, path: &str) -> Result<()> {
        let pvol = self
            .pvols
            .iter()
            .find(|pv| pv.path == path)
            .ok_or_else(|| HostdeckError::PhysicalVolumeNotFound(path.to_string()))?;
        let vgroup = &self.vgroup.name;

        match remove_decision(self.pvols.len(), pvol, self.vgroup.free_size) {
            RemoveDecision::Disallowed(excuse) => Err(HostdeckError::Validation(excuse)),
            RemoveDecision::Remove => self.client.remove_device(vgroup, path, true).await,
            RemoveDecision::EmptyThenRemove => {
                log_info!("Emptying {} before removing it from {}", path, vgroup);
                self.client.empty_device(vgroup, path).await?;
                self.client.remove_device(vgroup, path, true).await
            }
        }
    }

    pub async fn add_disk_candidates(&self) -> Result<Vec<AvailableSpace>> {
        let spaces = self.client.available_spaces().await?;
        Ok(filter_inside_vgroup(spaces, &self.vgroup.name))
    }

    /// Prepare the selected spaces, then attach all of them independently.
    /// Attaches that succeeded are kept when another one fails.
    pub async fn add_disks(&self, selected: &[AvailableSpace]) -> Result<()> {
        validate_disk_selection(selected).map_err(HostdeckError::Validation)?;

        let vgroup = self.vgroup.name.as_str();
        let paths = self.client.prepare_spaces(selected).await?;
        let results = join_all(
            paths
                .iter()
                .map(|path| self.client.add_device(vgroup, path)),
        )
        .await;

        let mut first_error = None;
        for (path, result) in paths.iter().zip(results) {
            if let Err(err) = result {
                log_warn!("Adding {} to {} failed: {}", path, vgroup, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn rename(&self, new_name: &str) -> Result<Location> {
        validate_lvm2_name(new_name).map_err(HostdeckError::Validation)?;
        self.client.rename(&self.vgroup.name, new_name).await?;
        Ok(Location::VolumeGroup(new_name.to_string()))
    }

    pub async fn prepare_delete(&self) -> Result<DeletePrompt> {
        let usage = self.client.active_usage(&self.vgroup.name).await?;
        if usage.blocking() {
            return Ok(DeletePrompt::Blocked {
                title: format!("{} is in active use", self.vgroup.name),
                message: blocking_message(&usage),
            });
        }
        Ok(DeletePrompt::Confirm {
            title: format!("Please confirm deletion of {}", self.vgroup.name),
            danger: DELETE_DANGER,
            teardown: teardown_message(&usage),
            usage,
        })
    }

    /// Tear down `usage`, delete the group, then go to the top level. Stops
    /// at the first failing step.
    pub async fn confirm_delete(&self, usage: &ActiveUsage) -> Result<Location> {
        self.client.teardown_active_usage(usage).await?;
        self.client.delete(&self.vgroup.name, true, true).await?;
        log_info!("Deleted volume group {}", self.vgroup.name);
        Ok(Location::Top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LvolRef;

    fn pvol(size: u64, free_size: u64) -> PhysicalVolume {
        PhysicalVolume {
            path: "/dev/sdb".into(),
            vgroup: Some("vg0".into()),
            size,
            free_size,
        }
    }

    #[test]
    fn used_pvol_with_room_elsewhere_is_emptied_first() {
        assert_eq!(
            remove_decision(2, &pvol(10, 2), 20),
            RemoveDecision::EmptyThenRemove
        );
    }

    #[test]
    fn used_pvol_without_room_reports_missing_space() {
        let decision = remove_decision(2, &pvol(10, 2), 5);
        let excuse = decision.excuse().unwrap();
        assert!(excuse.contains("At least 5 B more free space is needed."), "{excuse}");
    }

    #[test]
    fn last_pvol_is_never_removable() {
        for (size, free, vg_free) in [(10, 10, 0), (10, 2, 100), (10, 2, 0)] {
            assert_eq!(
                remove_decision(1, &pvol(size, free), vg_free),
                RemoveDecision::Disallowed(LAST_PVOL_EXCUSE.to_string())
            );
        }
    }

    #[test]
    fn empty_pvol_is_removed_directly() {
        assert_eq!(remove_decision(3, &pvol(10, 10), 0), RemoveDecision::Remove);
    }

    #[test]
    fn candidates_skip_own_logical_volumes() {
        let space = |block: &str, vgroup: Option<&str>| AvailableSpace {
            block: block.into(),
            size: 1 << 30,
            description: String::new(),
            backing_lvol: vgroup.map(|vg| LvolRef {
                vgroup: vg.into(),
                name: "lv".into(),
            }),
        };
        let kept = filter_inside_vgroup(
            vec![
                space("/dev/sdc", None),
                space("/dev/mapper/vg0-lv", Some("vg0")),
                space("/dev/mapper/vg1-lv", Some("vg1")),
            ],
            "vg0",
        );
        let blocks: Vec<&str> = kept.iter().map(|s| s.block.as_str()).collect();
        assert_eq!(blocks, ["/dev/sdc", "/dev/mapper/vg1-lv"]);
    }
}
