pub mod logger;

pub mod command;
pub mod config;
pub mod dialog;
pub mod error;
pub mod format;
pub mod gui_nic;
pub mod gui_storage;
pub mod libvirt;
pub mod lvm;
pub mod nic;
pub mod nic_edit;
pub mod poller;
pub mod provider;
pub mod storage;
pub mod theme;
pub mod vgroup_details;
pub mod vm;

pub use error::HostdeckError;

pub type Result<T> = std::result::Result<T, HostdeckError>;

// Convenience re-exports for the two views
pub use config::HostdeckConfig;
pub use libvirt::LibvirtProvider;
pub use lvm::LvmCli;
pub use nic_edit::{EditNicDialog, NicField, SaveOutcome};
pub use provider::{NetworkSettingsChange, VirtProvider};
pub use storage::StorageClient;
pub use vgroup_details::{DeletePrompt, RemoveDecision, VGroupActions, VGroupDetails};
