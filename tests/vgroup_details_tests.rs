// Integration tests for the volume group details view
use async_trait::async_trait;
use hostdeck::dialog::Location;
use hostdeck::storage::{
    ActiveUsage, AvailableSpace, LogicalVolume, LvolRef, PhysicalVolume, StorageClient,
    UsageEntry, UsageKind, VolumeGroup,
};
use hostdeck::vgroup_details::{DELETE_DANGER, DeletePrompt, RemoveDecision, VGroupDetails};
use hostdeck::{HostdeckError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;

const INTERVAL: Duration = Duration::from_millis(2000);

struct MockStorage {
    vgroup: VolumeGroup,
    pvols: Vec<PhysicalVolume>,
    spaces: Vec<AvailableSpace>,
    usage: ActiveUsage,
    failing: Vec<&'static str>,
    calls: Mutex<Vec<String>>,
    polls: AtomicUsize,
}

impl MockStorage {
    fn new(needs_polling: bool) -> Self {
        Self {
            vgroup: VolumeGroup {
                name: "vg0".into(),
                uuid: "Xk3d-9Qz1".into(),
                size: 30,
                free_size: 20,
                needs_polling,
            },
            pvols: vec![pvol("/dev/sdb", 10, 2), pvol("/dev/sdc", 20, 18)],
            spaces: Vec::new(),
            usage: ActiveUsage::default(),
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
        }
    }

    fn failing(mut self, operation: &'static str) -> Self {
        self.failing.push(operation);
        self
    }

    fn record(&self, operation: &'static str, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing.contains(&operation) {
            Err(HostdeckError::command_failed(operation, "simulated failure"))
        } else {
            Ok(())
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that change something, leaving out the reads.
    fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("active_usage") && !call.starts_with("available"))
            .collect()
    }
}

fn pvol(path: &str, size: u64, free_size: u64) -> PhysicalVolume {
    PhysicalVolume {
        path: path.into(),
        vgroup: Some("vg0".into()),
        size,
        free_size,
    }
}

fn space(block: &str, backing_vgroup: Option<&str>) -> AvailableSpace {
    AvailableSpace {
        block: block.into(),
        size: 1 << 30,
        description: "Disk".into(),
        backing_lvol: backing_vgroup.map(|vgroup| LvolRef {
            vgroup: vgroup.into(),
            name: "lv".into(),
        }),
    }
}

#[async_trait]
impl StorageClient for MockStorage {
    async fn list_volume_groups(&self) -> Result<Vec<VolumeGroup>> {
        Ok(vec![self.vgroup.clone()])
    }

    async fn volume_group(&self, name: &str) -> Result<VolumeGroup> {
        if name == self.vgroup.name {
            Ok(self.vgroup.clone())
        } else {
            Err(HostdeckError::VolumeGroupNotFound(name.to_string()))
        }
    }

    async fn physical_volumes(&self, _vgroup: &str) -> Result<Vec<PhysicalVolume>> {
        Ok(self.pvols.clone())
    }

    async fn logical_volumes(&self, _vgroup: &str) -> Result<Vec<LogicalVolume>> {
        Ok(Vec::new())
    }

    async fn poll(&self, _vgroup: &str) -> Result<()> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn available_spaces(&self) -> Result<Vec<AvailableSpace>> {
        self.calls.lock().unwrap().push("available_spaces".into());
        Ok(self.spaces.clone())
    }

    async fn prepare_spaces(&self, spaces: &[AvailableSpace]) -> Result<Vec<String>> {
        let blocks: Vec<String> = spaces.iter().map(|s| s.block.clone()).collect();
        self.record("prepare", format!("prepare {}", blocks.join(",")))?;
        Ok(blocks)
    }

    async fn add_device(&self, vgroup: &str, block: &str) -> Result<()> {
        let operation = if block == "/dev/bad" { "add_bad" } else { "add" };
        self.record(operation, format!("add {} {}", vgroup, block))
    }

    async fn remove_device(&self, vgroup: &str, block: &str, wipe: bool) -> Result<()> {
        self.record("remove", format!("remove {} {} wipe={}", vgroup, block, wipe))
    }

    async fn empty_device(&self, vgroup: &str, block: &str) -> Result<()> {
        self.record("empty", format!("empty {} {}", vgroup, block))
    }

    async fn rename(&self, vgroup: &str, new_name: &str) -> Result<()> {
        self.record("rename", format!("rename {} {}", vgroup, new_name))
    }

    async fn delete(&self, vgroup: &str, wipe: bool, tear_down: bool) -> Result<()> {
        self.record(
            "delete",
            format!("delete {} wipe={} tear_down={}", vgroup, wipe, tear_down),
        )
    }

    async fn active_usage(&self, vgroup: &str) -> Result<ActiveUsage> {
        self.calls.lock().unwrap().push(format!("active_usage {}", vgroup));
        Ok(self.usage.clone())
    }

    async fn teardown_active_usage(&self, usage: &ActiveUsage) -> Result<()> {
        self.record("teardown", format!("teardown {}", usage.entries.len()))
    }
}

async fn open(storage: &Arc<MockStorage>) -> VGroupDetails {
    let client: Arc<dyn StorageClient> = storage.clone();
    VGroupDetails::load(client, "vg0", Handle::current(), INTERVAL)
        .await
        .expect("load vg0")
}

#[tokio::test(start_paused = true)]
async fn test_polls_only_while_the_group_needs_it() {
    let storage = Arc::new(MockStorage::new(true));
    let mut details = open(&storage).await;
    assert!(details.is_polling());

    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(storage.polls.load(Ordering::SeqCst), 2);

    let mut settled = details.vgroup().clone();
    settled.needs_polling = false;
    details.apply_snapshot(settled, details.pvols().to_vec(), Vec::new());
    assert!(!details.is_polling());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(storage.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_group_never_polls() {
    let storage = Arc::new(MockStorage::new(false));
    let details = open(&storage).await;
    assert!(!details.is_polling());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(storage.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_and_drop_stop_the_timer() {
    let storage = Arc::new(MockStorage::new(true));

    let mut details = open(&storage).await;
    details.unmount();
    assert!(!details.is_polling());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(storage.polls.load(Ordering::SeqCst), 0);

    let details = open(&storage).await;
    drop(details);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(storage.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_used_pvol_is_emptied_then_removed() {
    let storage = Arc::new(MockStorage::new(false));
    let details = open(&storage).await;
    let sdb = details.pvols()[0].clone();
    assert_eq!(details.remove_decision(&sdb), RemoveDecision::EmptyThenRemove);

    details.actions().remove_pvol("/dev/sdb").await.unwrap();
    assert_eq!(
        storage.mutations(),
        vec![
            "empty vg0 /dev/sdb".to_string(),
            "remove vg0 /dev/sdb wipe=true".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_failed_empty_aborts_the_removal() {
    let storage = Arc::new(MockStorage::new(false).failing("empty"));
    let details = open(&storage).await;

    let result = details.actions().remove_pvol("/dev/sdb").await;
    assert!(matches!(result, Err(HostdeckError::CommandFailed { .. })));
    assert_eq!(storage.mutations(), vec!["empty vg0 /dev/sdb".to_string()]);
}

#[tokio::test]
async fn test_unused_pvol_is_removed_directly() {
    let mut mock = MockStorage::new(false);
    mock.pvols[1] = pvol("/dev/sdc", 20, 20);
    let storage = Arc::new(mock);
    let details = open(&storage).await;

    details.actions().remove_pvol("/dev/sdc").await.unwrap();
    assert_eq!(
        storage.mutations(),
        vec!["remove vg0 /dev/sdc wipe=true".to_string()]
    );
}

#[tokio::test]
async fn test_last_pvol_cannot_be_removed() {
    let mut mock = MockStorage::new(false);
    mock.pvols.truncate(1);
    let storage = Arc::new(mock);
    let details = open(&storage).await;

    let decision = details.remove_decision(&details.pvols()[0]);
    assert!(decision.excuse().is_some());
    let result = details.actions().remove_pvol("/dev/sdb").await;
    assert!(matches!(result, Err(HostdeckError::Validation(_))));
    assert!(storage.mutations().is_empty());
}

#[tokio::test]
async fn test_pvol_detail_and_header() {
    let storage = Arc::new(MockStorage::new(false));
    let details = open(&storage).await;
    assert_eq!(details.title(), "Volume Group vg0");
    assert_eq!(details.capacity(), "30 B (30 bytes)");
    assert_eq!(VGroupDetails::pvol_detail(&details.pvols()[0]), "10 B, 2 B free");
}

#[tokio::test]
async fn test_add_disks_prepares_then_attaches_each() {
    let mut mock = MockStorage::new(false);
    mock.spaces = vec![
        space("/dev/sdd", None),
        space("/dev/mapper/vg0-lv", Some("vg0")),
        space("/dev/sde", None),
    ];
    let storage = Arc::new(mock);
    let details = open(&storage).await;
    let actions = details.actions();

    let candidates = actions.add_disk_candidates().await.unwrap();
    let blocks: Vec<&str> = candidates.iter().map(|s| s.block.as_str()).collect();
    assert_eq!(blocks, ["/dev/sdd", "/dev/sde"]);

    actions.add_disks(&candidates).await.unwrap();
    let mutations = storage.mutations();
    assert_eq!(mutations[0], "prepare /dev/sdd,/dev/sde");
    assert_eq!(mutations.len(), 3);
    assert!(mutations.contains(&"add vg0 /dev/sdd".to_string()));
    assert!(mutations.contains(&"add vg0 /dev/sde".to_string()));
}

#[tokio::test]
async fn test_add_disks_keeps_successful_attaches() {
    let storage = Arc::new(MockStorage::new(false).failing("add_bad"));
    let details = open(&storage).await;

    let result = details
        .actions()
        .add_disks(&[space("/dev/bad", None), space("/dev/sdd", None)])
        .await;
    assert!(matches!(result, Err(HostdeckError::CommandFailed { .. })));
    assert!(storage.mutations().contains(&"add vg0 /dev/sdd".to_string()));
}

#[tokio::test]
async fn test_add_disks_requires_a_selection() {
    let storage = Arc::new(MockStorage::new(false));
    let details = open(&storage).await;

    match details.actions().add_disks(&[]).await {
        Err(HostdeckError::Validation(message)) => {
            assert_eq!(message, "At least one disk is needed.")
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert!(storage.mutations().is_empty());
}

#[tokio::test]
async fn test_rename_navigates_to_the_new_name() {
    let storage = Arc::new(MockStorage::new(false));
    let details = open(&storage).await;

    let location = details.actions().rename("data").await.unwrap();
    assert_eq!(location, Location::VolumeGroup("data".into()));
    assert_eq!(location.path(), "/vg/data");
    assert_eq!(storage.mutations(), vec!["rename vg0 data".to_string()]);

    assert!(details.actions().rename("bad name").await.is_err());
    assert_eq!(storage.mutations().len(), 1);
}

#[tokio::test]
async fn test_blocking_usage_only_informs() {
    let mut mock = MockStorage::new(false);
    mock.usage = ActiveUsage {
        entries: vec![UsageEntry {
            block: "/dev/vg0/root".into(),
            kind: UsageKind::Mounted {
                mount_point: "/".into(),
            },
            blocking: true,
        }],
    };
    let storage = Arc::new(mock);
    let details = open(&storage).await;

    match details.actions().prepare_delete().await.unwrap() {
        DeletePrompt::Blocked { title, message } => {
            assert_eq!(title, "vg0 is in active use");
            assert_eq!(message.len(), 1);
            assert!(message[0].contains("mounted at /"));
        }
        other => panic!("expected the blocking dialog, got {:?}", other),
    }
    assert!(storage.mutations().is_empty());
}

#[tokio::test]
async fn test_confirmed_delete_tears_down_then_deletes() {
    let mut mock = MockStorage::new(false);
    mock.usage = ActiveUsage {
        entries: vec![UsageEntry {
            block: "/dev/vg0/scratch".into(),
            kind: UsageKind::Mounted {
                mount_point: "/mnt/scratch".into(),
            },
            blocking: false,
        }],
    };
    let storage = Arc::new(mock);
    let details = open(&storage).await;
    let actions = details.actions();

    let DeletePrompt::Confirm {
        title,
        danger,
        teardown,
        usage,
    } = actions.prepare_delete().await.unwrap()
    else {
        panic!("expected a confirmation");
    };
    assert_eq!(title, "Please confirm deletion of vg0");
    assert_eq!(danger, DELETE_DANGER);
    assert_eq!(
        teardown,
        vec!["/dev/vg0/scratch will be unmounted from /mnt/scratch".to_string()]
    );

    let location = actions.confirm_delete(&usage).await.unwrap();
    assert_eq!(location, Location::Top);
    assert_eq!(
        storage.mutations(),
        vec![
            "teardown 1".to_string(),
            "delete vg0 wipe=true tear_down=true".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_failed_teardown_aborts_delete() {
    let storage = Arc::new(MockStorage::new(false).failing("teardown"));
    let details = open(&storage).await;

    let result = details
        .actions()
        .confirm_delete(&ActiveUsage::default())
        .await;
    assert!(result.is_err());
    assert_eq!(storage.mutations(), vec!["teardown 0".to_string()]);
}
