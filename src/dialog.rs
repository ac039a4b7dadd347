//! Pieces shared by the console's dialogs: inline errors, field validators,
//! usage messages and navigation targets.

use crate::storage::{ActiveUsage, AvailableSpace, UsageKind};
use std::fmt;

/// Inline notice shown at the bottom of a dialog after a failed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogError {
    pub text: String,
    pub detail: String,
}

impl DialogError {
    pub fn new(text: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            text: text.into(),
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for DialogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            f.write_str(&self.text)
        } else {
            write!(f, "{}: {}", self.text, self.detail)
        }
    }
}

/// Where the console should show next after an action completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Top,
    VolumeGroup(String),
}

impl Location {
    pub fn path(&self) -> String {
        match self {
            Location::Top => "/".to_string(),
            Location::VolumeGroup(name) => format!("/vg/{}", name),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

pub const LVM2_NAME_MAX: usize = 127;

/// Volume group and logical volume naming rules.
pub fn validate_lvm2_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty.".to_string());
    }
    if name.chars().count() > LVM2_NAME_MAX {
        return Err(format!(
            "Name cannot be longer than {} characters.",
            LVM2_NAME_MAX
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '_' | '-')))
    {
        if bad.is_whitespace() {
            return Err("Name cannot contain whitespace.".to_string());
        }
        return Err(format!("Name cannot contain the character '{}'.", bad));
    }
    if name == "." || name == ".." {
        return Err(format!("Name cannot be \"{}\".", name));
    }
    if name.starts_with('-') {
        return Err("Name cannot start with a hyphen.".to_string());
    }
    Ok(())
}

pub fn validate_disk_selection(disks: &[AvailableSpace]) -> Result<(), String> {
    if disks.is_empty() {
        return Err("At least one disk is needed.".to_string());
    }
    Ok(())
}

pub const NO_DISKS_AVAILABLE: &str = "No disks are available.";

/// Body of the "in active use" dialog: one line per blocking use.
pub fn blocking_message(usage: &ActiveUsage) -> Vec<String> {
    usage
        .entries
        .iter()
        .filter(|entry| entry.blocking)
        .map(|entry| format!("{}: {}", entry.block, describe_usage(&entry.kind)))
        .collect()
}

/// Footer of a destructive confirmation: what will be stopped first.
pub fn teardown_message(usage: &ActiveUsage) -> Vec<String> {
    usage
        .teardown_entries()
        .map(|entry| match &entry.kind {
            UsageKind::Mounted { mount_point } => {
                format!("{} will be unmounted from {}", entry.block, mount_point)
            }
            UsageKind::Swap => format!("Swap on {} will be stopped", entry.block),
            UsageKind::PhysicalVolume { vgroup } => {
                format!("{} will be removed from {}", entry.block, vgroup)
            }
        })
        .collect()
}

fn describe_usage(kind: &UsageKind) -> String {
    match kind {
        UsageKind::Mounted { mount_point } => format!("mounted at {}", mount_point),
        UsageKind::Swap => "active swap space".to_string(),
        UsageKind::PhysicalVolume { vgroup } => {
            format!("physical volume of volume group {}", vgroup)
        }
    }
}
