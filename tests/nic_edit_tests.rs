// Integration tests for the network interface edit dialog
use async_trait::async_trait;
use hostdeck::nic::{AvailableSources, NetworkInterface, NicSource, NicType};
use hostdeck::nic_edit::{EditNicDialog, NicField, SAVE_FAILED, SaveOutcome};
use hostdeck::provider::{NetworkSettingsChange, VirtProvider};
use hostdeck::vm::{Vm, VmState};
use hostdeck::{HostdeckError, Result};
use std::sync::Mutex;

#[derive(Default)]
struct MockVirt {
    fail_with: Option<String>,
    changes: Mutex<Vec<NetworkSettingsChange>>,
    refreshes: Mutex<Vec<String>>,
}

#[async_trait]
impl VirtProvider for MockVirt {
    async fn list_vms(&self) -> Result<Vec<Vm>> {
        Ok(Vec::new())
    }

    async fn get_vm(&self, name: &str) -> Result<Vm> {
        Err(HostdeckError::VmNotFound(name.to_string()))
    }

    async fn available_sources(&self) -> Result<AvailableSources> {
        Ok(sources())
    }

    async fn change_network_settings(&self, change: &NetworkSettingsChange) -> Result<()> {
        self.changes.lock().unwrap().push(change.clone());
        match &self.fail_with {
            Some(stderr) => Err(HostdeckError::command_failed("virsh define", stderr.clone())),
            None => Ok(()),
        }
    }

    fn request_vm_refresh(&self, name: &str) {
        self.refreshes.lock().unwrap().push(name.to_string());
    }
}

fn sources() -> AvailableSources {
    AvailableSources {
        network: vec!["default".into(), "isolated".into()],
        device: vec!["enp3s0".into()],
    }
}

fn guest(state: VmState) -> (Vm, NetworkInterface) {
    let nic = NetworkInterface {
        source: NicSource::Network {
            network: "default".into(),
        },
        model: "virtio".into(),
        mac: "52:54:00:aa:bb:cc".into(),
    };
    let mut vm = Vm::new("guest", state);
    vm.interfaces.push(nic.clone());
    (vm, nic)
}

#[tokio::test]
async fn test_save_success_requests_one_refresh_and_closes() {
    let provider = MockVirt::default();
    let (vm, nic) = guest(VmState::Running);
    let mut dialog = EditNicDialog::new(&vm, &nic, sources());

    dialog.on_value_changed(NicField::NetworkType(NicType::Direct));
    assert_eq!(dialog.state().network_source.as_deref(), Some("enp3s0"));

    let outcome = dialog.save(&provider).await;
    assert_eq!(outcome, SaveOutcome::Closed);
    assert!(!dialog.is_open());
    assert_eq!(*provider.refreshes.lock().unwrap(), vec!["guest".to_string()]);

    let changes = provider.changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].mac, "52:54:00:aa:bb:cc");
    assert_eq!(changes[0].network_type, NicType::Direct);
    assert_eq!(changes[0].network_source.as_deref(), Some("enp3s0"));
    assert_eq!(changes[0].network_model, "virtio");
}

#[tokio::test]
async fn test_save_failure_keeps_dialog_open_with_error() {
    let provider = MockVirt {
        fail_with: Some("domain is locked".into()),
        ..Default::default()
    };
    let (vm, nic) = guest(VmState::ShutOff);
    let mut dialog = EditNicDialog::new(&vm, &nic, sources());
    dialog.on_value_changed(NicField::NetworkSource(Some("isolated".into())));

    let outcome = dialog.save(&provider).await;
    assert_eq!(outcome, SaveOutcome::Failed);
    assert!(dialog.is_open());
    assert!(provider.refreshes.lock().unwrap().is_empty());

    let error = dialog.state().dialog_error.clone().expect("dialog error");
    assert_eq!(error.text, SAVE_FAILED);
    assert!(error.detail.contains("domain is locked"), "{}", error.detail);

    // The edit survives the failure and can be retried.
    assert_eq!(dialog.state().network_source.as_deref(), Some("isolated"));
    dialog.dismiss_error();
    assert!(dialog.state().dialog_error.is_none());
}

#[tokio::test]
async fn test_save_is_refused_without_a_source() {
    let provider = MockVirt::default();
    let (vm, nic) = guest(VmState::ShutOff);
    // No host devices, so nothing to bridge to.
    let networks_only = AvailableSources {
        network: vec!["default".into()],
        device: Vec::new(),
    };
    let mut dialog = EditNicDialog::new(&vm, &nic, networks_only);
    assert!(!dialog.state().save_disabled);

    dialog.on_value_changed(NicField::NetworkType(NicType::Bridge));
    assert_eq!(dialog.state().network_source, None);
    assert!(dialog.state().save_disabled);

    assert_eq!(dialog.save(&provider).await, SaveOutcome::NotAllowed);
    assert!(dialog.is_open());
    assert!(provider.changes.lock().unwrap().is_empty());
    assert!(provider.refreshes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stale_source_without_alternatives_is_never_submitted() {
    let provider = MockVirt::default();
    let (vm, nic) = guest(VmState::ShutOff);
    let no_networks = AvailableSources {
        network: Vec::new(),
        device: vec!["enp3s0".into()],
    };
    let mut dialog = EditNicDialog::new(&vm, &nic, no_networks);
    assert_eq!(dialog.state().network_source, None);
    assert!(dialog.state().save_disabled);

    assert_eq!(dialog.save(&provider).await, SaveOutcome::NotAllowed);
    assert!(provider.changes.lock().unwrap().is_empty());

    // Picking a type that has sources makes the dialog savable again.
    dialog.on_value_changed(NicField::NetworkType(NicType::Direct));
    assert!(!dialog.state().save_disabled);
    assert_eq!(dialog.save(&provider).await, SaveOutcome::Closed);
    assert_eq!(provider.changes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_vm_update_moves_warning() {
    let (vm, nic) = guest(VmState::ShutOff);
    let mut dialog = EditNicDialog::new(&vm, &nic, sources());
    dialog.on_value_changed(NicField::NetworkModel("e1000e".into()));
    assert_eq!(dialog.restart_warning(), None);

    let (mut running, _) = guest(VmState::Running);
    running.name = "guest".into();
    dialog.update_vm(&running);
    assert!(dialog.restart_warning().is_some());

    // Updates for other VMs are ignored.
    let (mut stranger, _) = guest(VmState::ShutOff);
    stranger.name = "other".into();
    dialog.update_vm(&stranger);
    assert!(dialog.restart_warning().is_some());
}
