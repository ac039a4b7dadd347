//! Edit dialog for a VM network interface.

use crate::dialog::DialogError;
use crate::nic::{AvailableSources, NIC_MODELS, NetworkInterface, NicType};
use crate::provider::{NetworkSettingsChange, VirtProvider};
use crate::vm::Vm;
use crate::{Result, log_info, log_warn};

pub const SAVE_FAILED: &str = "Network interface settings could not be saved";
pub const RESTART_WARNING: &str = "Changes will take effect after shutting down the VM";

/// A single user edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicField {
    NetworkType(NicType),
    NetworkSource(Option<String>),
    NetworkModel(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicEditState {
    pub network_type: NicType,
    pub network_source: Option<String>,
    pub network_model: String,
    pub save_disabled: bool,
    pub dialog_error: Option<DialogError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Saved; a refresh was requested and the dialog closed.
    Closed,
    /// The backend rejected the change; the dialog shows the error.
    Failed,
    /// Save is disabled for the current edit state.
    NotAllowed,
}

pub struct EditNicDialog {
    vm_name: String,
    vm_running: bool,
    nic: NetworkInterface,
    sources: AvailableSources,
    state: NicEditState,
    open: bool,
}

/// The interface's current source if it is still offered, otherwise the
/// first offered one, otherwise none.
pub fn initial_source(nic: &NetworkInterface, sources: &AvailableSources) -> Option<String> {
    let offered = sources.for_type(nic.nic_type());
    match nic.source_name() {
        Some(current) if offered.iter().any(|s| s == current) => Some(current.to_string()),
        _ => offered.first().cloned(),
    }
}

impl EditNicDialog {
    pub fn new(vm: &Vm, nic: &NetworkInterface, sources: AvailableSources) -> Self {
        let network_source = initial_source(nic, &sources);
        // An editable type with nothing to select cannot be saved.
        let save_disabled = nic.nic_type().is_editable() && network_source.is_none();
        let state = NicEditState {
            network_type: nic.nic_type(),
            network_source,
            network_model: nic.model.clone(),
            save_disabled,
            dialog_error: None,
        };

        Self {
            vm_name: vm.name.clone(),
            vm_running: vm.is_running(),
            nic: nic.clone(),
            sources,
            state,
            open: true,
        }
    }

    pub fn state(&self) -> &NicEditState {
        &self.state
    }

    pub fn interface(&self) -> &NetworkInterface {
        &self.nic
    }

    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn title(&self) -> String {
        format!("{} virtual network interface settings", self.nic.mac)
    }

    /// Sources offered for the currently selected type.
    pub fn source_choices(&self) -> &[String] {
        self.sources.for_type(self.state.network_type)
    }

    pub fn model_choices(&self) -> Vec<String> {
        let mut models: Vec<String> = NIC_MODELS.iter().map(|m| m.to_string()).collect();
        if !self.nic.model.is_empty() && !models.contains(&self.nic.model) {
            models.push(self.nic.model.clone());
        }
        models
    }

    /// Pick up the VM's latest state while the dialog is open.
    pub fn update_vm(&mut self, vm: &Vm) {
        if vm.name != self.vm_name {
            return;
        }
        self.vm_running = vm.is_running();
        if let Some(nic) = vm.interface(&self.nic.mac) {
            self.nic = nic.clone();
        }
    }

    pub fn on_value_changed(&mut self, field: NicField) {
        match field {
            NicField::NetworkType(network_type) => {
                self.state.network_type = network_type;
                if network_type.is_editable() {
                    match self.sources.for_type(network_type).first() {
                        Some(first) => {
                            self.state.network_source = Some(first.clone());
                            self.state.save_disabled = false;
                        }
                        None => {
                            self.state.network_source = None;
                            self.state.save_disabled = true;
                        }
                    }
                }
            }
            NicField::NetworkSource(source) => self.state.network_source = source,
            NicField::NetworkModel(model) => self.state.network_model = model,
        }
    }

    /// Advisory shown while the VM runs and the edit differs from what is
    /// committed.
    pub fn restart_warning(&self) -> Option<&'static str> {
        let changed = self.state.network_type != self.nic.nic_type()
            || self.state.network_source.as_deref() != self.nic.source_name()
            || self.state.network_model != self.nic.model;
        (self.vm_running && changed).then_some(RESTART_WARNING)
    }

    pub fn save_request(&self) -> Option<NetworkSettingsChange> {
        if self.state.save_disabled {
            return None;
        }
        Some(NetworkSettingsChange {
            vm_name: self.vm_name.clone(),
            mac: self.nic.mac.clone(),
            network_type: self.state.network_type,
            network_source: self.state.network_source.clone(),
            network_model: self.state.network_model.clone(),
        })
    }

    /// Apply the result of a save request. On success the VM refresh is
    /// requested before the dialog closes; the refresh is not awaited.
    pub fn finish_save(&mut self, result: Result<()>, provider: &dyn VirtProvider) -> SaveOutcome {
        match result {
            Ok(()) => {
                log_info!(
                    "Saved interface {} of {}",
                    self.nic.mac,
                    self.vm_name
                );
                provider.request_vm_refresh(&self.vm_name);
                self.close();
                SaveOutcome::Closed
            }
            Err(err) => {
                log_warn!(
                    "Saving interface {} of {} failed: {}",
                    self.nic.mac,
                    self.vm_name,
                    err
                );
                self.state.dialog_error = Some(DialogError::new(SAVE_FAILED, err));
                SaveOutcome::Failed
            }
        }
    }

    pub async fn save(&mut self, provider: &dyn VirtProvider) -> SaveOutcome {
        let Some(change) = self.save_request() else {
            return SaveOutcome::NotAllowed;
        };
        let result = provider.change_network_settings(&change).await;
        self.finish_save(result, provider)
    }

    pub fn dismiss_error(&mut self) {
        self.state.dialog_error = None;
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}
