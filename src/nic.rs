//! Virtual machine network interfaces as described by libvirt domain XML.

use crate::{HostdeckError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// NIC models offered by the edit dialog.
pub const NIC_MODELS: &[&str] = &["virtio", "e1000e", "e1000", "rtl8139"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NicType {
    Network,
    Direct,
    Bridge,
    Other,
}

impl NicType {
    /// Types whose source can be picked from the available-sources lists.
    pub const EDITABLE: [NicType; 3] = [NicType::Network, NicType::Direct, NicType::Bridge];

    pub fn as_str(&self) -> &'static str {
        match self {
            NicType::Network => "network",
            NicType::Direct => "direct",
            NicType::Bridge => "bridge",
            NicType::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NicType::Network => "Virtual network",
            NicType::Direct => "Direct attachment",
            NicType::Bridge => "Bridge to LAN",
            NicType::Other => "Other",
        }
    }

    pub fn is_editable(&self) -> bool {
        !matches!(self, NicType::Other)
    }

    /// Name of the `<source>` attribute carrying the identifier for this type.
    fn source_attribute(&self) -> Option<&'static str> {
        match self {
            NicType::Network => Some("network"),
            NicType::Direct => Some("dev"),
            NicType::Bridge => Some("bridge"),
            NicType::Other => None,
        }
    }
}

impl fmt::Display for NicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NicType {
    type Err = HostdeckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" => Ok(NicType::Network),
            "direct" => Ok(NicType::Direct),
            "bridge" => Ok(NicType::Bridge),
            "other" => Ok(NicType::Other),
            other => Err(HostdeckError::Validation(format!(
                "Unknown network interface type '{}'",
                other
            ))),
        }
    }
}

/// Where an interface is plugged in. Each variant carries the identifier
/// libvirt uses for that interface type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NicSource {
    Network { network: String },
    Direct { dev: String },
    Bridge { bridge: String },
    /// user, vhostuser, hostdev, ... which this console does not edit.
    Other { kind: String },
}

impl NicSource {
    pub fn nic_type(&self) -> NicType {
        match self {
            NicSource::Network { .. } => NicType::Network,
            NicSource::Direct { .. } => NicType::Direct,
            NicSource::Bridge { .. } => NicType::Bridge,
            NicSource::Other { .. } => NicType::Other,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            NicSource::Network { network } => Some(network),
            NicSource::Direct { dev } => Some(dev),
            NicSource::Bridge { bridge } => Some(bridge),
            NicSource::Other { .. } => None,
        }
    }

    /// Build a source for an editable type. `Other` is rejected since it has
    /// no source identifier to set.
    pub fn from_parts(nic_type: NicType, identifier: String) -> Result<Self> {
        match nic_type {
            NicType::Network => Ok(NicSource::Network {
                network: identifier,
            }),
            NicType::Direct => Ok(NicSource::Direct { dev: identifier }),
            NicType::Bridge => Ok(NicSource::Bridge { bridge: identifier }),
            NicType::Other => Err(HostdeckError::Validation(
                "Interfaces of type 'other' cannot be reconfigured".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub source: NicSource,
    pub model: String,
    pub mac: String,
}

impl NetworkInterface {
    pub fn nic_type(&self) -> NicType {
        self.source.nic_type()
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.identifier()
    }
}

/// Valid choices for a NIC source, split the way libvirt consumes them:
/// virtual network names for `network`, host device names for `direct` and
/// `bridge`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSources {
    pub network: Vec<String>,
    pub device: Vec<String>,
}

impl AvailableSources {
    pub fn for_type(&self, nic_type: NicType) -> &[String] {
        match nic_type {
            NicType::Network => &self.network,
            NicType::Direct | NicType::Bridge => &self.device,
            NicType::Other => &[],
        }
    }
}

/// Extract every `<interface>` of a domain definition.
pub fn parse_interfaces(domain_xml: &str) -> Vec<NetworkInterface> {
    interface_blocks(domain_xml)
        .into_iter()
        .filter_map(|(start, end)| parse_interface_block(&domain_xml[start..end]))
        .collect()
}

fn parse_interface_block(block: &str) -> Option<NetworkInterface> {
    let open_tag = element_tag(block, "interface")?;
    let kind = extract_attribute(open_tag, "type").unwrap_or_default();
    let mac = element_tag(block, "mac").and_then(|tag| extract_attribute(tag, "address"))?;
    let model = element_tag(block, "model")
        .and_then(|tag| extract_attribute(tag, "type"))
        .unwrap_or_default();
    let source_tag = element_tag(block, "source");

    let source = match kind.parse::<NicType>() {
        Ok(nic_type @ (NicType::Network | NicType::Direct | NicType::Bridge)) => {
            let attribute = nic_type.source_attribute()?;
            let identifier = source_tag
                .and_then(|tag| extract_attribute(tag, attribute))
                .unwrap_or_default();
            NicSource::from_parts(nic_type, identifier).ok()?
        }
        _ => NicSource::Other { kind },
    };

    Some(NetworkInterface {
        source,
        model,
        mac: mac.to_ascii_lowercase(),
    })
}

/// Byte ranges of each `<interface ...>...</interface>` element.
pub(crate) fn interface_blocks(xml: &str) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = xml[cursor..].find("<interface ") {
        let start = cursor + offset;
        let Some(close) = xml[start..].find("</interface>") else {
            break;
        };
        let end = start + close + "</interface>".len();
        blocks.push((start, end));
        cursor = end;
    }
    blocks
}

/// The opening tag of the first `<name ...>` element in `xml`, without the
/// closing `>`.
pub(crate) fn element_tag<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("<{} ", name);
    let start = xml.find(&needle)?;
    let end = xml[start..].find('>')?;
    Some(&xml[start..start + end])
}

pub(crate) fn extract_attribute(tag: &str, name: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        let needle = format!(" {}={}", name, quote);
        if let Some(pos) = tag.find(&needle) {
            let value_start = pos + needle.len();
            let value_end = tag[value_start..].find(quote)?;
            return Some(tag[value_start..value_start + value_end].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN_XML: &str = r#"<domain type='kvm'>
  <name>fedora</name>
  <devices>
    <interface type='network'>
      <mac address='52:54:00:AA:BB:01'/>
      <source network='default' portid='1'/>
      <model type='virtio'/>
      <address type='pci' domain='0x0000' bus='0x01' slot='0x00' function='0x0'/>
    </interface>
    <interface type="direct">
      <mac address="52:54:00:aa:bb:02"/>
      <source dev="enp3s0" mode="bridge"/>
      <model type="e1000e"/>
    </interface>
    <interface type='bridge'>
      <mac address='52:54:00:aa:bb:03'/>
      <source bridge='br0'/>
    </interface>
    <interface type='user'>
      <mac address='52:54:00:aa:bb:04'/>
      <model type='rtl8139'/>
    </interface>
  </devices>
</domain>"#;

    #[test]
    fn parses_each_interface_kind() {
        let nics = parse_interfaces(DOMAIN_XML);
        assert_eq!(nics.len(), 4);

        assert_eq!(
            nics[0].source,
            NicSource::Network {
                network: "default".to_string()
            }
        );
        assert_eq!(nics[0].model, "virtio");
        assert_eq!(nics[0].mac, "52:54:00:aa:bb:01");

        assert_eq!(
            nics[1].source,
            NicSource::Direct {
                dev: "enp3s0".to_string()
            }
        );
        assert_eq!(nics[1].model, "e1000e");

        assert_eq!(nics[2].source_name(), Some("br0"));
        assert_eq!(nics[2].model, "");

        assert_eq!(nics[3].nic_type(), NicType::Other);
        assert_eq!(nics[3].source_name(), None);
    }

    #[test]
    fn device_list_serves_direct_and_bridge() {
        let sources = AvailableSources {
            network: vec!["default".into()],
            device: vec!["eth0".into(), "br0".into()],
        };
        assert_eq!(sources.for_type(NicType::Network), ["default".to_string()]);
        assert_eq!(sources.for_type(NicType::Direct).len(), 2);
        assert_eq!(sources.for_type(NicType::Bridge).len(), 2);
        assert!(sources.for_type(NicType::Other).is_empty());
    }

    #[test]
    fn other_type_has_no_source() {
        assert!(NicSource::from_parts(NicType::Other, "x".into()).is_err());
        assert!("Bridge".parse::<NicType>().is_ok());
        assert!("vhostuser".parse::<NicType>().is_err());
    }
}
