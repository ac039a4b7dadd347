//! `VirtProvider` backed by `virsh`.

use crate::command::{run, run_with_input};
use crate::config::LibvirtConfig;
use crate::nic::{AvailableSources, NicType, element_tag, extract_attribute, interface_blocks};
use crate::provider::{NetworkSettingsChange, VirtProvider};
use crate::vm::{Vm, VmState};
use crate::{HostdeckError, Result, log_debug, log_info, log_warn};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct LibvirtProvider {
    uri: String,
    sys_class_net: PathBuf,
    updates: broadcast::Sender<Vm>,
}

impl LibvirtProvider {
    pub fn new(config: &LibvirtConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            uri: config.uri.clone(),
            sys_class_net: PathBuf::from("/sys/class/net"),
            updates,
        }
    }

    /// Receive VMs re-fetched by [`VirtProvider::request_vm_refresh`].
    pub fn subscribe(&self) -> broadcast::Receiver<Vm> {
        self.updates.subscribe()
    }

    async fn virsh(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["--connect", self.uri.as_str()];
        full.extend_from_slice(args);
        run("virsh", &full).await
    }

    async fn domain_state(&self, name: &str) -> Result<VmState> {
        let state = self
            .virsh(&["domstate", name])
            .await
            .map_err(|_| HostdeckError::VmNotFound(name.to_string()))?;
        Ok(VmState::from_virsh(&state))
    }

    async fn host_devices(&self) -> Result<Vec<String>> {
        let mut devices = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.sys_class_net).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != "lo" {
                devices.push(name);
            }
        }
        devices.sort();
        Ok(devices)
    }
}

#[async_trait]
impl VirtProvider for LibvirtProvider {
    async fn list_vms(&self) -> Result<Vec<Vm>> {
        let names = self.virsh(&["list", "--all", "--name"]).await?;
        let mut vms = Vec::new();
        for name in names.lines().map(str::trim).filter(|n| !n.is_empty()) {
            match self.get_vm(name).await {
                Ok(vm) => vms.push(vm),
                Err(err) => log_warn!("Skipping VM {}: {}", name, err),
            }
        }
        Ok(vms)
    }

    async fn get_vm(&self, name: &str) -> Result<Vm> {
        log_debug!("Fetching VM {}", name);
        let state = self.domain_state(name).await?;
        let xml = self.virsh(&["dumpxml", name]).await?;
        Ok(Vm::from_domain_xml(name, state, &xml))
    }

    async fn available_sources(&self) -> Result<AvailableSources> {
        let networks = self.virsh(&["net-list", "--all", "--name"]).await?;
        let mut network: Vec<String> = networks
            .lines()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        network.sort();

        let device = match self.host_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                log_warn!("Could not list host network devices: {}", err);
                Vec::new()
            }
        };

        Ok(AvailableSources { network, device })
    }

    async fn change_network_settings(&self, change: &NetworkSettingsChange) -> Result<()> {
        log_info!(
            "Changing interface {} of {} to {} {:?} ({})",
            change.mac,
            change.vm_name,
            change.network_type,
            change.network_source,
            change.network_model
        );
        let xml = self
            .virsh(&["dumpxml", "--inactive", &change.vm_name])
            .await
            .map_err(|_| HostdeckError::VmNotFound(change.vm_name.clone()))?;
        let updated = rewrite_interface(&xml, change)?;
        run_with_input(
            "virsh",
            &["--connect", self.uri.as_str(), "define", "/dev/stdin"],
            Some(&updated),
        )
        .await?;
        Ok(())
    }

    fn request_vm_refresh(&self, name: &str) {
        let provider = self.clone();
        let name = name.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match provider.get_vm(&name).await {
                        Ok(vm) => {
                            let _ = provider.updates.send(vm);
                        }
                        Err(err) => log_warn!("Refreshing VM {} failed: {}", name, err),
                    }
                });
            }
            Err(_) => log_warn!("No runtime available to refresh VM {}", name),
        }
    }
}

/// Apply `change` to the `<interface>` with the matching MAC in a domain
/// definition. Other children of the interface are kept.
pub fn rewrite_interface(domain_xml: &str, change: &NetworkSettingsChange) -> Result<String> {
    let source = change.network_source.as_deref().ok_or_else(|| {
        HostdeckError::Validation("No network source selected".to_string())
    })?;
    let source_element = match change.network_type {
        NicType::Network => format!("<source network='{}'/>", escape_attribute(source)),
        NicType::Direct => format!("<source dev='{}' mode='bridge'/>", escape_attribute(source)),
        NicType::Bridge => format!("<source bridge='{}'/>", escape_attribute(source)),
        NicType::Other => {
            return Err(HostdeckError::Validation(
                "Interfaces of type 'other' cannot be reconfigured".to_string(),
            ));
        }
    };

    let (start, end) = interface_blocks(domain_xml)
        .into_iter()
        .find(|&(start, end)| {
            element_tag(&domain_xml[start..end], "mac")
                .and_then(|tag| extract_attribute(tag, "address"))
                .is_some_and(|mac| mac.eq_ignore_ascii_case(&change.mac))
        })
        .ok_or_else(|| HostdeckError::InterfaceNotFound(change.mac.clone()))?;

    let block = remove_element(&domain_xml[start..end], "source");
    let block = remove_element(&block, "model");

    let open_end = block
        .find('>')
        .ok_or_else(|| HostdeckError::parse("interface element", "unterminated tag"))?;
    let open_tag = set_attribute(&block[..open_end], "type", change.network_type.as_str());
    let mut block = format!("{}{}", open_tag, &block[open_end..]);

    let mac_start = block
        .find("<mac ")
        .ok_or_else(|| HostdeckError::parse("interface element", "missing <mac>"))?;
    let mac_end = block[mac_start..]
        .find("/>")
        .map(|offset| mac_start + offset + 2)
        .ok_or_else(|| HostdeckError::parse("interface element", "unterminated <mac>"))?;
    let indent = line_indent(&block, mac_start);

    let mut inserted = format!("\n{}{}", indent, source_element);
    if !change.network_model.is_empty() {
        inserted.push_str(&format!(
            "\n{}<model type='{}'/>",
            indent,
            escape_attribute(&change.network_model)
        ));
    }
    block.insert_str(mac_end, &inserted);

    Ok(format!(
        "{}{}{}",
        &domain_xml[..start],
        block,
        &domain_xml[end..]
    ))
}

/// Drop the first `<name ...>` element (self-closing or not) together with
/// the indentation in front of it.
fn remove_element(xml: &str, name: &str) -> String {
    let needle = format!("<{} ", name);
    let Some(start) = xml.find(&needle) else {
        return xml.to_string();
    };
    let Some(tag_len) = xml[start..].find('>') else {
        return xml.to_string();
    };
    let tag_end = start + tag_len;
    let end = if xml[..tag_end].ends_with('/') {
        tag_end + 1
    } else {
        let close = format!("</{}>", name);
        match xml[tag_end..].find(&close) {
            Some(offset) => tag_end + offset + close.len(),
            None => return xml.to_string(),
        }
    };

    let line_start = xml[..start].rfind('\n').unwrap_or(start);
    let cut_from = if xml[line_start..start].trim().is_empty() {
        line_start
    } else {
        start
    };
    format!("{}{}", &xml[..cut_from], &xml[end..])
}

fn set_attribute(tag: &str, name: &str, value: &str) -> String {
    for quote in ['\'', '"'] {
        let needle = format!(" {}={}", name, quote);
        if let Some(pos) = tag.find(&needle) {
            let value_start = pos + needle.len();
            if let Some(len) = tag[value_start..].find(quote) {
                return format!(
                    "{}{}{}",
                    &tag[..value_start],
                    escape_attribute(value),
                    &tag[value_start + len..]
                );
            }
        }
    }
    format!("{} {}='{}'", tag, name, escape_attribute(value))
}

fn line_indent(xml: &str, pos: usize) -> &str {
    let line_start = xml[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &xml[line_start..pos];
    if prefix.trim().is_empty() { prefix } else { "" }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
}
