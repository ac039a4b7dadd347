use crate::nic::{NetworkInterface, element_tag, extract_attribute, parse_interfaces};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmState {
    Running,
    Paused,
    ShutOff,
    Crashed,
    Other,
}

impl VmState {
    /// Map the `State:` field of `virsh dominfo` / `virsh list`.
    pub fn from_virsh(state: &str) -> Self {
        match state.trim() {
            "running" | "idle" | "in shutdown" => VmState::Running,
            "paused" | "pmsuspended" => VmState::Paused,
            "shut off" => VmState::ShutOff,
            "crashed" => VmState::Crashed,
            _ => VmState::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VmState::Running => "Running",
            VmState::Paused => "Paused",
            VmState::ShutOff => "Shut off",
            VmState::Crashed => "Crashed",
            VmState::Other => "Unknown",
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm {
    pub id: Option<Uuid>,
    pub name: String,
    pub state: VmState,
    pub arch: Option<String>,
    pub emulated_machine: Option<String>,
    pub interfaces: Vec<NetworkInterface>,
    pub last_updated: DateTime<Utc>,
}

impl Vm {
    pub fn new(name: impl Into<String>, state: VmState) -> Self {
        Self {
            id: None,
            name: name.into(),
            state,
            arch: None,
            emulated_machine: None,
            interfaces: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Build a VM from its domain XML and the state reported by `dominfo`.
    pub fn from_domain_xml(name: &str, state: VmState, xml: &str) -> Self {
        let id = text_between(xml, "<uuid>", "</uuid>").and_then(|s| Uuid::parse_str(s).ok());
        let os_type = element_tag(xml, "type");
        let mut vm = Vm::new(name, state);
        vm.id = id;
        vm.arch = os_type.and_then(|tag| extract_attribute(tag, "arch"));
        vm.emulated_machine = os_type.and_then(|tag| extract_attribute(tag, "machine"));
        vm.interfaces = parse_interfaces(xml);
        vm
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, VmState::Running)
    }

    pub fn interface(&self, mac: &str) -> Option<&NetworkInterface> {
        self.interfaces
            .iter()
            .find(|nic| nic.mac.eq_ignore_ascii_case(mac))
    }

    pub fn update_state(&mut self, state: VmState) {
        self.state = state;
        self.last_updated = Utc::now();
    }
}

fn text_between<'a>(xml: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = xml.find(open)? + open.len();
    let end = xml[start..].find(close)?;
    Some(xml[start..start + end].trim())
}
