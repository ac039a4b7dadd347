//! `StorageClient` backed by the LVM2 and util-linux command line tools.

use crate::command::run;
use crate::config::StorageConfig;
use crate::storage::{
    ActiveUsage, AvailableSpace, LogicalVolume, LvolRef, PhysicalVolume, StorageClient,
    UsageEntry, UsageKind, VolumeGroup,
};
use crate::{HostdeckError, Result, log_debug, log_info, log_warn};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

const REPORT_ARGS: &[&str] = &["--reportformat", "json", "--units", "b", "--nosuffix"];

#[derive(Debug, Deserialize)]
struct Report<S> {
    report: Vec<S>,
}

#[derive(Debug, Deserialize)]
struct VgSection {
    #[serde(default)]
    vg: Vec<VgRow>,
}

#[derive(Debug, Deserialize)]
struct PvSection {
    #[serde(default)]
    pv: Vec<PvRow>,
}

#[derive(Debug, Deserialize)]
struct LvSection {
    #[serde(default)]
    lv: Vec<LvRow>,
}

#[derive(Debug, Deserialize)]
struct VgRow {
    vg_name: String,
    vg_uuid: String,
    vg_size: String,
    vg_free: String,
}

#[derive(Debug, Deserialize)]
struct PvRow {
    pv_name: String,
    #[serde(default)]
    vg_name: String,
    pv_size: String,
    pv_free: String,
}

#[derive(Debug, Deserialize)]
struct LvRow {
    lv_name: String,
    vg_name: String,
    #[serde(default)]
    lv_path: String,
    #[serde(default)]
    lv_dm_path: String,
    lv_size: String,
    lv_attr: String,
}

#[derive(Debug, Deserialize)]
struct LsblkReport {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    size: Option<serde_json::Value>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

fn parse_bytes(field: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| HostdeckError::parse(field, err))
}

/// Parse a `vgs --reportformat json` report. `needs_polling` is left false;
/// it depends on the group's logical volumes.
pub fn parse_vgs(json: &str) -> Result<Vec<VolumeGroup>> {
    let report: Report<VgSection> = serde_json::from_str(json)?;
    report
        .report
        .into_iter()
        .flat_map(|section| section.vg)
        .map(|row| {
            Ok(VolumeGroup {
                size: parse_bytes("vg_size", &row.vg_size)?,
                free_size: parse_bytes("vg_free", &row.vg_free)?,
                name: row.vg_name,
                uuid: row.vg_uuid,
                needs_polling: false,
            })
        })
        .collect()
}

pub fn parse_pvs(json: &str) -> Result<Vec<PhysicalVolume>> {
    let report: Report<PvSection> = serde_json::from_str(json)?;
    report
        .report
        .into_iter()
        .flat_map(|section| section.pv)
        .map(|row| {
            Ok(PhysicalVolume {
                size: parse_bytes("pv_size", &row.pv_size)?,
                free_size: parse_bytes("pv_free", &row.pv_free)?,
                vgroup: (!row.vg_name.is_empty()).then_some(row.vg_name),
                path: row.pv_name,
            })
        })
        .collect()
}

pub fn parse_lvs(json: &str) -> Result<Vec<LogicalVolume>> {
    let report: Report<LvSection> = serde_json::from_str(json)?;
    report
        .report
        .into_iter()
        .flat_map(|section| section.lv)
        .map(|row| {
            Ok(LogicalVolume {
                size: parse_bytes("lv_size", &row.lv_size)?,
                name: row.lv_name,
                vgroup: row.vg_name,
                path: row.lv_path,
                dm_path: row.lv_dm_path,
                attr: row.lv_attr,
            })
        })
        .collect()
}

/// Unused disks and partitions from `lsblk --json --bytes --paths`.
pub fn parse_available_spaces(json: &str, lvols: &[LogicalVolume]) -> Result<Vec<AvailableSpace>> {
    let report: LsblkReport = serde_json::from_str(json)?;
    let mut spaces = Vec::new();
    for device in &report.blockdevices {
        collect_spaces(device, None, lvols, &mut spaces);
    }
    Ok(spaces)
}

fn collect_spaces(
    device: &LsblkDevice,
    parent_lvol: Option<&LvolRef>,
    lvols: &[LogicalVolume],
    spaces: &mut Vec<AvailableSpace>,
) {
    let own_lvol = if device.kind == "lvm" {
        lvols
            .iter()
            .find(|lv| lv.dm_path == device.name || lv.path == device.name)
            .map(|lv| LvolRef {
                vgroup: lv.vgroup.clone(),
                name: lv.name.clone(),
            })
    } else {
        None
    };
    let backing = own_lvol.as_ref().or(parent_lvol);

    let usable_kind = matches!(device.kind.as_str(), "disk" | "part" | "lvm" | "crypt");
    let unused = device.fstype.as_deref().unwrap_or("").is_empty()
        && device.mountpoint.is_none()
        && device.children.is_empty();

    if usable_kind && unused {
        let size = device.size.as_ref().map(value_as_bytes).unwrap_or(0);
        let description = match (&device.model, backing) {
            (Some(model), _) if !model.trim().is_empty() => model.trim().to_string(),
            (_, Some(lvol)) => format!("Logical volume {} of {}", lvol.name, lvol.vgroup),
            _ => device.kind.clone(),
        };
        if size > 0 {
            spaces.push(AvailableSpace {
                block: device.name.clone(),
                size,
                description,
                backing_lvol: backing.cloned(),
            });
        }
    }

    for child in &device.children {
        collect_spaces(child, backing, lvols, spaces);
    }
}

/// Older lsblk prints sizes as strings even with `--bytes`.
fn value_as_bytes(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// `(source, mount point)` pairs of `/proc/mounts`.
pub fn parse_mounts(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            Some((unescape_mount_field(source), unescape_mount_field(target)))
        })
        .collect()
}

/// Active swap devices of `/proc/swaps`.
pub fn parse_swaps(contents: &str) -> Vec<String> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(unescape_mount_field)
        .collect()
}

fn unescape_mount_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let digits: String = chars.clone().take(3).collect();
            if digits.len() == 3 {
                if let Ok(code) = u8::from_str_radix(&digits, 8) {
                    out.push(code as char);
                    for _ in 0..3 {
                        chars.next();
                    }
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

pub struct LvmCli {
    protected_mounts: Vec<String>,
    proc_root: PathBuf,
    lvm_dir: Option<PathBuf>,
}

impl LvmCli {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            protected_mounts: config.protected_mounts.clone(),
            proc_root: PathBuf::from("/proc"),
            lvm_dir: config.lvm_dir.clone(),
        }
    }

    fn lvm(&self, tool: &str) -> String {
        match &self.lvm_dir {
            Some(dir) => dir.join(tool).to_string_lossy().into_owned(),
            None => tool.to_string(),
        }
    }

    async fn query_volume_group(&self, name: &str) -> Result<VolumeGroup> {
        let mut args = vec!["-o", "vg_name,vg_uuid,vg_size,vg_free"];
        args.extend_from_slice(REPORT_ARGS);
        args.push(name);
        let json = run(&self.lvm("vgs"), &args).await.map_err(|err| {
            log_warn!("vgs {} failed: {}", name, err);
            HostdeckError::VolumeGroupNotFound(name.to_string())
        })?;

        let mut vgroup = parse_vgs(&json)?
            .into_iter()
            .find(|vg| vg.name == name)
            .ok_or_else(|| HostdeckError::VolumeGroupNotFound(name.to_string()))?;
        vgroup.needs_polling = self
            .logical_volumes(name)
            .await?
            .iter()
            .any(LogicalVolume::needs_polling);
        Ok(vgroup)
    }

    async fn all_logical_volumes(&self) -> Result<Vec<LogicalVolume>> {
        let mut args = vec!["-o", "lv_name,vg_name,lv_path,lv_dm_path,lv_size,lv_attr"];
        args.extend_from_slice(REPORT_ARGS);
        let json = run(&self.lvm("lvs"), &args).await?;
        parse_lvs(&json)
    }

    async fn all_physical_volumes(&self) -> Result<Vec<PhysicalVolume>> {
        let mut args = vec!["-o", "pv_name,vg_name,pv_size,pv_free"];
        args.extend_from_slice(REPORT_ARGS);
        let json = run(&self.lvm("pvs"), &args).await?;
        parse_pvs(&json)
    }

    fn is_protected(&self, mount_point: &str) -> bool {
        self.protected_mounts.iter().any(|m| m == mount_point)
    }
}

#[async_trait]
impl StorageClient for LvmCli {
    async fn list_volume_groups(&self) -> Result<Vec<VolumeGroup>> {
        let mut args = vec!["-o", "vg_name,vg_uuid,vg_size,vg_free"];
        args.extend_from_slice(REPORT_ARGS);
        let json = run(&self.lvm("vgs"), &args).await?;
        let lvols = self.all_logical_volumes().await?;

        let mut vgroups = parse_vgs(&json)?;
        for vgroup in &mut vgroups {
            vgroup.needs_polling = lvols
                .iter()
                .any(|lv| lv.vgroup == vgroup.name && lv.needs_polling());
        }
        vgroups.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(vgroups)
    }

    async fn volume_group(&self, name: &str) -> Result<VolumeGroup> {
        self.query_volume_group(name).await
    }

    async fn physical_volumes(&self, vgroup: &str) -> Result<Vec<PhysicalVolume>> {
        let mut pvols: Vec<PhysicalVolume> = self
            .all_physical_volumes()
            .await?
            .into_iter()
            .filter(|pv| pv.vgroup.as_deref() == Some(vgroup))
            .collect();
        pvols.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(pvols)
    }

    async fn logical_volumes(&self, vgroup: &str) -> Result<Vec<LogicalVolume>> {
        let mut args = vec!["-o", "lv_name,vg_name,lv_path,lv_dm_path,lv_size,lv_attr"];
        args.extend_from_slice(REPORT_ARGS);
        args.push(vgroup);
        let json = run(&self.lvm("lvs"), &args).await?;
        parse_lvs(&json)
    }

    async fn poll(&self, vgroup: &str) -> Result<()> {
        log_debug!("Polling volume group {}", vgroup);
        self.query_volume_group(vgroup).await.map(|_| ())
    }

    async fn available_spaces(&self) -> Result<Vec<AvailableSpace>> {
        let json = run(
            "lsblk",
            &[
                "--json",
                "--bytes",
                "--paths",
                "-o",
                "NAME,SIZE,TYPE,FSTYPE,MOUNTPOINT,MODEL",
            ],
        )
        .await?;
        let lvols = self.all_logical_volumes().await?;
        let pv_paths: Vec<String> = self
            .all_physical_volumes()
            .await?
            .into_iter()
            .map(|pv| pv.path)
            .collect();

        // Blank PVs carry no fstype in some lsblk builds.
        Ok(parse_available_spaces(&json, &lvols)?
            .into_iter()
            .filter(|space| !pv_paths.contains(&space.block))
            .collect())
    }

    async fn prepare_spaces(&self, spaces: &[AvailableSpace]) -> Result<Vec<String>> {
        let mut paths = Vec::with_capacity(spaces.len());
        for space in spaces {
            log_info!("Wiping signatures on {}", space.block);
            run("wipefs", &["--all", space.block.as_str()]).await?;
            paths.push(space.block.clone());
        }
        Ok(paths)
    }

    async fn add_device(&self, vgroup: &str, block: &str) -> Result<()> {
        log_info!("Adding {} to volume group {}", block, vgroup);
        run(&self.lvm("vgextend"), &[vgroup, block]).await?;
        Ok(())
    }

    async fn remove_device(&self, vgroup: &str, block: &str, wipe: bool) -> Result<()> {
        log_info!("Removing {} from volume group {}", block, vgroup);
        run(&self.lvm("vgreduce"), &[vgroup, block]).await?;
        if wipe {
            run(&self.lvm("pvremove"), &[block]).await?;
        }
        Ok(())
    }

    async fn empty_device(&self, vgroup: &str, block: &str) -> Result<()> {
        log_info!("Moving extents off {} in volume group {}", block, vgroup);
        run(&self.lvm("pvmove"), &[block]).await?;
        Ok(())
    }

    async fn rename(&self, vgroup: &str, new_name: &str) -> Result<()> {
        log_info!("Renaming volume group {} to {}", vgroup, new_name);
        run(&self.lvm("vgrename"), &[vgroup, new_name]).await?;
        Ok(())
    }

    async fn delete(&self, vgroup: &str, wipe: bool, tear_down: bool) -> Result<()> {
        log_info!("Deleting volume group {}", vgroup);
        let pvols = self.physical_volumes(vgroup).await?;
        if tear_down {
            run(&self.lvm("vgchange"), &["--activate", "n", vgroup]).await?;
        }
        run(&self.lvm("vgremove"), &["--force", vgroup]).await?;

        if wipe {
            for pvol in &pvols {
                run(&self.lvm("pvremove"), &[pvol.path.as_str()]).await?;
            }
        }
        Ok(())
    }

    async fn active_usage(&self, vgroup: &str) -> Result<ActiveUsage> {
        let lvols = self.logical_volumes(vgroup).await?;
        let mounts = parse_mounts(&tokio::fs::read_to_string(self.proc_root.join("mounts")).await?);
        let swaps = match tokio::fs::read_to_string(self.proc_root.join("swaps")).await {
            Ok(contents) => parse_swaps(&contents),
            Err(_) => Vec::new(),
        };
        let foreign_pvols: Vec<PhysicalVolume> = self
            .all_physical_volumes()
            .await?
            .into_iter()
            .filter(|pv| pv.vgroup.as_deref().is_some_and(|vg| vg != vgroup))
            .collect();

        let mut usage = ActiveUsage::default();
        for lvol in &lvols {
            // /proc/swaps names the dm node, e.g. /dev/dm-3.
            let real_path = tokio::fs::canonicalize(&lvol.path)
                .await
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or_default();
            let is_lvol = |device: &str| {
                device == lvol.path || device == lvol.dm_path || device == real_path
            };

            for (source, mount_point) in mounts.iter().filter(|(source, _)| is_lvol(source.as_str())) {
                usage.entries.push(UsageEntry {
                    block: lvol.path.clone(),
                    kind: UsageKind::Mounted {
                        mount_point: mount_point.clone(),
                    },
                    blocking: self.is_protected(mount_point),
                });
                log_debug!("{} mounted at {}", source, mount_point);
            }
            if swaps.iter().any(|device| is_lvol(device.as_str())) {
                usage.entries.push(UsageEntry {
                    block: lvol.path.clone(),
                    kind: UsageKind::Swap,
                    blocking: false,
                });
            }
            for pvol in foreign_pvols.iter().filter(|pv| is_lvol(pv.path.as_str())) {
                usage.entries.push(UsageEntry {
                    block: lvol.path.clone(),
                    kind: UsageKind::PhysicalVolume {
                        vgroup: pvol.vgroup.clone().unwrap_or_default(),
                    },
                    blocking: true,
                });
            }
        }

        Ok(usage)
    }

    async fn teardown_active_usage(&self, usage: &ActiveUsage) -> Result<()> {
        for entry in usage.teardown_entries() {
            match &entry.kind {
                UsageKind::Mounted { mount_point } => {
                    log_info!("Unmounting {}", mount_point);
                    run("umount", &[mount_point.as_str()]).await?;
                }
                UsageKind::Swap => {
                    log_info!("Stopping swap on {}", entry.block);
                    run("swapoff", &[entry.block.as_str()]).await?;
                }
                UsageKind::PhysicalVolume { vgroup } => {
                    log_info!("Removing {} from {}", entry.block, vgroup);
                    run(&self.lvm("vgreduce"), &[vgroup.as_str(), entry.block.as_str()]).await?;
                }
            }
        }
        Ok(())
    }
}
