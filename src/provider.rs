use crate::Result;
use crate::nic::{AvailableSources, NicType};
use crate::vm::Vm;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// New settings for one interface, keyed by its MAC address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettingsChange {
    pub vm_name: String,
    pub mac: String,
    pub network_type: NicType,
    pub network_source: Option<String>,
    pub network_model: String,
}

/// Virtualization management backend.
#[async_trait]
pub trait VirtProvider: Send + Sync {
    async fn list_vms(&self) -> Result<Vec<Vm>>;
    async fn get_vm(&self, name: &str) -> Result<Vm>;
    async fn available_sources(&self) -> Result<AvailableSources>;
    async fn change_network_settings(&self, change: &NetworkSettingsChange) -> Result<()>;

    /// Start re-fetching a VM in the background. Returns immediately; the
    /// refreshed VM is delivered to whoever listens for updates.
    fn request_vm_refresh(&self, name: &str);
}
