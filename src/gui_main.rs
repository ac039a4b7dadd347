use eframe::egui;
use hostdeck::{
    HostdeckError,
    config::HostdeckConfig,
    dialog::{DialogError, Location},
    gui_nic::{NicDialogAction, show_edit_nic_dialog},
    gui_storage::{VGroupAction, VGroupPanel},
    libvirt::LibvirtProvider,
    logger,
    lvm::LvmCli,
    nic::AvailableSources,
    nic_edit::{EditNicDialog, SaveOutcome},
    provider::VirtProvider,
    storage::{AvailableSpace, LogicalVolume, PhysicalVolume, StorageClient, VolumeGroup},
    theme,
    vgroup_details::{DeletePrompt, VGroupDetails},
    vm::Vm,
};

use chrono::Local;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const MAX_CONSOLE_LINES: usize = 200;

fn main() -> Result<(), eframe::Error> {
    logger::init_logger();

    let config = match HostdeckConfig::load_or_default(HostdeckConfig::default_path()) {
        Ok(config) => config,
        Err(err) => {
            warn!("Ignoring invalid config: {}", err);
            HostdeckConfig::default()
        }
    };
    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start the async runtime: {}", err);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([760.0, 520.0])
            .with_title("Hostdeck"),
        ..Default::default()
    };

    info!("Starting Hostdeck");
    eframe::run_native(
        "Hostdeck",
        options,
        Box::new(move |cc| Box::new(HostdeckApp::new(cc, config, runtime))),
    )
}

/// Results of background work, drained once per frame.
enum AppEvent {
    Vms(Vec<Vm>),
    VolumeGroups(Vec<VolumeGroup>),
    OpenNicEditor {
        vm_name: String,
        mac: String,
        sources: AvailableSources,
    },
    NicSaved(hostdeck::Result<()>),
    VGroupLoaded(VGroupDetails),
    VGroupSnapshot {
        vgroup: VolumeGroup,
        pvols: Vec<PhysicalVolume>,
        lvols: Vec<LogicalVolume>,
    },
    AddDiskCandidates(Vec<AvailableSpace>),
    DeletePrompt(DeletePrompt),
    Navigate(Location),
    Done(String),
    Failed {
        context: String,
        error: HostdeckError,
        in_dialog: bool,
    },
}

struct HostdeckApp {
    ctx: egui::Context,
    runtime: Runtime,
    config: HostdeckConfig,
    virt: Arc<LibvirtProvider>,
    storage: Arc<LvmCli>,
    events: Arc<Mutex<Vec<AppEvent>>>,
    vm_updates: broadcast::Receiver<Vm>,

    vms: Vec<Vm>,
    vgroups: Vec<VolumeGroup>,
    location: Location,
    vgroup_panel: Option<VGroupPanel>,
    nic_dialog: Option<EditNicDialog>,
    nic_saving: bool,

    console_output: Vec<String>,
    last_refresh: Option<Instant>,
    last_vgroup_refresh: Option<Instant>,
    refresh_interval: Duration,
}

impl HostdeckApp {
    fn new(cc: &eframe::CreationContext<'_>, config: HostdeckConfig, runtime: Runtime) -> Self {
        theme::apply(&cc.egui_ctx, &config.ui.theme);

        let virt = Arc::new(LibvirtProvider::new(&config.libvirt));
        let storage = Arc::new(LvmCli::new(&config.storage));
        let vm_updates = virt.subscribe();
        let refresh_interval = Duration::from_secs(config.ui.refresh_interval_seconds);

        let mut app = Self {
            ctx: cc.egui_ctx.clone(),
            runtime,
            config,
            virt,
            storage,
            events: Arc::new(Mutex::new(Vec::new())),
            vm_updates,
            vms: Vec::new(),
            vgroups: Vec::new(),
            location: Location::Top,
            vgroup_panel: None,
            nic_dialog: None,
            nic_saving: false,
            console_output: Vec::new(),
            last_refresh: None,
            last_vgroup_refresh: None,
            refresh_interval,
        };
        app.refresh_lists(true);
        app
    }

    /// Run `work` on the runtime and queue its event for the next frame.
    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let events = Arc::clone(&self.events);
        let ctx = self.ctx.clone();
        self.runtime.spawn(async move {
            let event = work.await;
            if let Ok(mut queue) = events.lock() {
                queue.push(event);
            }
            ctx.request_repaint();
        });
    }

    fn log_console(&mut self, message: impl Into<String>) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.into());
        self.console_output.push(line);
        if self.console_output.len() > MAX_CONSOLE_LINES {
            let excess = self.console_output.len() - MAX_CONSOLE_LINES;
            self.console_output.drain(..excess);
        }
    }

    fn refresh_lists(&mut self, force: bool) {
        if !force
            && self
                .last_refresh
                .is_some_and(|last| last.elapsed() < self.refresh_interval)
        {
            return;
        }
        self.last_refresh = Some(Instant::now());

        let virt = Arc::clone(&self.virt);
        self.spawn(async move {
            match virt.list_vms().await {
                Ok(vms) => AppEvent::Vms(vms),
                Err(error) => AppEvent::Failed {
                    context: "Listing VMs failed".into(),
                    error,
                    in_dialog: false,
                },
            }
        });

        let storage = Arc::clone(&self.storage);
        self.spawn(async move {
            match storage.list_volume_groups().await {
                Ok(vgroups) => AppEvent::VolumeGroups(vgroups),
                Err(error) => AppEvent::Failed {
                    context: "Listing volume groups failed".into(),
                    error,
                    in_dialog: false,
                },
            }
        });
    }

    /// Re-read the open volume group. Runs more often while it polls.
    fn refresh_vgroup(&mut self, force: bool) {
        let Some(panel) = self.vgroup_panel.as_ref() else {
            return;
        };
        let period = if panel.details.is_polling() {
            self.config.storage.poll_interval()
        } else {
            self.refresh_interval
        };
        if !force
            && self
                .last_vgroup_refresh
                .is_some_and(|last| last.elapsed() < period)
        {
            return;
        }
        self.last_vgroup_refresh = Some(Instant::now());

        let storage = Arc::clone(&self.storage);
        let name = panel.details.vgroup().name.clone();
        self.spawn(async move {
            let snapshot = async {
                let vgroup = storage.volume_group(&name).await?;
                let pvols = storage.physical_volumes(&name).await?;
                let lvols = storage.logical_volumes(&name).await?;
                Ok::<_, HostdeckError>(AppEvent::VGroupSnapshot {
                    vgroup,
                    pvols,
                    lvols,
                })
            };
            snapshot.await.unwrap_or_else(|error| AppEvent::Failed {
                context: format!("Refreshing volume group {} failed", name),
                error,
                in_dialog: false,
            })
        });
    }

    fn navigate(&mut self, location: Location) {
        info!("Navigating to {}", location);
        // Dropping the panel stops its poll timer.
        self.vgroup_panel = None;
        self.last_vgroup_refresh = None;
        self.location = location.clone();

        if let Location::VolumeGroup(name) = location {
            let storage: Arc<dyn StorageClient> = self.storage.clone();
            let handle = self.runtime.handle().clone();
            let interval = self.config.storage.poll_interval();
            self.spawn(async move {
                match VGroupDetails::load(storage, &name, handle, interval).await {
                    Ok(details) => AppEvent::VGroupLoaded(details),
                    Err(error) => AppEvent::Failed {
                        context: format!("Opening volume group {} failed", name),
                        error,
                        in_dialog: false,
                    },
                }
            });
        }
    }

    fn open_nic_editor(&mut self, vm_name: String, mac: String) {
        let virt = Arc::clone(&self.virt);
        self.spawn(async move {
            match virt.available_sources().await {
                Ok(sources) => AppEvent::OpenNicEditor {
                    vm_name,
                    mac,
                    sources,
                },
                Err(error) => AppEvent::Failed {
                    context: "Listing network sources failed".into(),
                    error,
                    in_dialog: false,
                },
            }
        });
    }

    fn drain_events(&mut self) {
        let drained: Vec<AppEvent> = match self.events.lock() {
            Ok(mut queue) if !queue.is_empty() => queue.drain(..).collect(),
            _ => Vec::new(),
        };

        for event in drained {
            match event {
                AppEvent::Vms(vms) => self.vms = vms,
                AppEvent::VolumeGroups(vgroups) => self.vgroups = vgroups,
                AppEvent::OpenNicEditor {
                    vm_name,
                    mac,
                    sources,
                } => {
                    let Some(vm) = self.vms.iter().find(|vm| vm.name == vm_name) else {
                        continue;
                    };
                    if let Some(nic) = vm.interface(&mac) {
                        self.nic_dialog = Some(EditNicDialog::new(vm, nic, sources));
                        self.nic_saving = false;
                    }
                }
                AppEvent::NicSaved(result) => {
                    self.nic_saving = false;
                    let Some(dialog) = self.nic_dialog.as_mut() else {
                        continue;
                    };
                    let outcome = {
                        // The refresh request spawns onto the runtime.
                        let _guard = self.runtime.enter();
                        dialog.finish_save(result, self.virt.as_ref())
                    };
                    match outcome {
                        SaveOutcome::Closed => {
                            let message = format!(
                                "Saved interface {} of {}",
                                dialog.interface().mac,
                                dialog.vm_name()
                            );
                            self.nic_dialog = None;
                            self.log_console(message);
                        }
                        SaveOutcome::Failed | SaveOutcome::NotAllowed => {}
                    }
                }
                AppEvent::VGroupLoaded(details) => {
                    if self.location == Location::VolumeGroup(details.vgroup().name.clone()) {
                        self.last_vgroup_refresh = Some(Instant::now());
                        self.vgroup_panel = Some(VGroupPanel::new(details));
                    }
                }
                AppEvent::VGroupSnapshot {
                    vgroup,
                    pvols,
                    lvols,
                } => {
                    if let Some(panel) = self.vgroup_panel.as_mut() {
                        panel.details.apply_snapshot(vgroup, pvols, lvols);
                    }
                }
                AppEvent::AddDiskCandidates(candidates) => {
                    if let Some(panel) = self.vgroup_panel.as_mut() {
                        panel.busy = false;
                        panel.open_add_disks(candidates);
                    }
                }
                AppEvent::DeletePrompt(prompt) => {
                    if let Some(panel) = self.vgroup_panel.as_mut() {
                        panel.busy = false;
                        panel.open_delete(prompt);
                    }
                }
                AppEvent::Navigate(location) => {
                    self.refresh_lists(true);
                    self.navigate(location);
                }
                AppEvent::Done(message) => {
                    if let Some(panel) = self.vgroup_panel.as_mut() {
                        panel.busy = false;
                        panel.close_dialog();
                    }
                    self.log_console(message);
                    self.refresh_lists(true);
                    self.refresh_vgroup(true);
                }
                AppEvent::Failed {
                    context,
                    error,
                    in_dialog,
                } => {
                    warn!("{}: {}", context, error);
                    if let Some(panel) = self.vgroup_panel.as_mut() {
                        panel.busy = false;
                        if in_dialog && panel.dialog.is_some() {
                            panel.dialog_error = Some(DialogError::new(context.clone(), &error));
                        }
                    }
                    self.log_console(format!("{}: {}", context, error));
                }
            }
        }

        while let Ok(vm) = self.vm_updates.try_recv() {
            if let Some(dialog) = self.nic_dialog.as_mut() {
                dialog.update_vm(&vm);
            }
            match self.vms.iter_mut().find(|known| known.name == vm.name) {
                Some(known) => *known = vm,
                None => self.vms.push(vm),
            }
        }
    }

    fn run_vgroup_action(&mut self, action: VGroupAction) {
        let Some(panel) = self.vgroup_panel.as_mut() else {
            return;
        };
        let actions = panel.details.actions();
        let name = actions.vgroup_name().to_string();

        match action {
            VGroupAction::None => {}
            VGroupAction::Refresh => self.refresh_vgroup(true),
            VGroupAction::OpenRename => panel.open_rename(),
            VGroupAction::OpenAddDisks => {
                panel.busy = true;
                self.spawn(async move {
                    match actions.add_disk_candidates().await {
                        Ok(candidates) => AppEvent::AddDiskCandidates(candidates),
                        Err(error) => AppEvent::Failed {
                            context: "Listing available disks failed".into(),
                            error,
                            in_dialog: false,
                        },
                    }
                });
            }
            VGroupAction::AddDisks(selected) => {
                panel.busy = true;
                panel.dialog_error = None;
                self.spawn(async move {
                    match actions.add_disks(&selected).await {
                        Ok(()) => AppEvent::Done(format!("Added disks to {}", name)),
                        Err(error) => AppEvent::Failed {
                            context: "Disks could not be added".into(),
                            error,
                            in_dialog: true,
                        },
                    }
                });
            }
            VGroupAction::RemovePvol(path) => {
                panel.busy = true;
                self.spawn(async move {
                    match actions.remove_pvol(&path).await {
                        Ok(()) => AppEvent::Done(format!("Removed {} from {}", path, name)),
                        Err(error) => AppEvent::Failed {
                            context: format!("{} could not be removed", path),
                            error,
                            in_dialog: false,
                        },
                    }
                });
            }
            VGroupAction::Rename(new_name) => {
                panel.busy = true;
                panel.dialog_error = None;
                self.spawn(async move {
                    match actions.rename(&new_name).await {
                        Ok(location) => AppEvent::Navigate(location),
                        Err(error) => AppEvent::Failed {
                            context: "Volume group could not be renamed".into(),
                            error,
                            in_dialog: true,
                        },
                    }
                });
            }
            VGroupAction::RequestDelete => {
                panel.busy = true;
                self.spawn(async move {
                    match actions.prepare_delete().await {
                        Ok(prompt) => AppEvent::DeletePrompt(prompt),
                        Err(error) => AppEvent::Failed {
                            context: "Active usage could not be determined".into(),
                            error,
                            in_dialog: false,
                        },
                    }
                });
            }
            VGroupAction::ConfirmDelete(usage) => {
                panel.busy = true;
                panel.dialog_error = None;
                self.spawn(async move {
                    match actions.confirm_delete(&usage).await {
                        Ok(location) => AppEvent::Navigate(location),
                        Err(error) => AppEvent::Failed {
                            context: "Volume group could not be deleted".into(),
                            error,
                            in_dialog: true,
                        },
                    }
                });
            }
        }
    }

    fn draw_navigation(&mut self, ctx: &egui::Context) {
        let mut edit_request = None;
        let mut target = None;

        egui::SidePanel::left("hostdeck.navigation")
            .default_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.heading("Virtual Machines");
                    ui.separator();
                    if self.vms.is_empty() {
                        ui.colored_label(theme::STATUS_UNKNOWN, "No VMs found");
                    }
                    for vm in &self.vms {
                        egui::CollapsingHeader::new(
                            egui::RichText::new(format!(
                                "{} {}",
                                theme::vm_state_icon(vm.state),
                                vm.name
                            ))
                            .color(theme::vm_state_color(vm.state)),
                        )
                        .id_source(("hostdeck.vm", vm.name.as_str()))
                        .show(ui, |ui| {
                            ui.small(vm.state.label());
                            for nic in &vm.interfaces {
                                ui.horizontal(|ui| {
                                    ui.monospace(nic.mac.as_str());
                                    ui.small(nic.source_name().unwrap_or(nic.nic_type().as_str()));
                                    if ui.small_button("Edit").clicked() {
                                        edit_request = Some((vm.name.clone(), nic.mac.clone()));
                                    }
                                });
                            }
                        });
                    }

                    ui.add_space(12.0);
                    ui.heading("Volume Groups");
                    ui.separator();
                    if self.vgroups.is_empty() {
                        ui.colored_label(theme::STATUS_UNKNOWN, "No volume groups found");
                    }
                    for vgroup in &self.vgroups {
                        let here = Location::VolumeGroup(vgroup.name.clone());
                        let selected = self.location == here;
                        if ui
                            .selectable_label(selected, vgroup.name.as_str())
                            .clicked()
                            && !selected
                        {
                            target = Some(here);
                        }
                    }
                });
            });

        if let Some((vm_name, mac)) = edit_request {
            self.open_nic_editor(vm_name, mac);
        }
        if let Some(location) = target {
            self.navigate(location);
        }
    }

    fn draw_event_log(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("hostdeck.event_log")
            .default_height(140.0)
            .min_height(100.0)
            .show(ctx, |ui| {
                ui.heading("Event log");
                ui.separator();
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for line in &self.console_output {
                            ui.monospace(line.as_str());
                        }
                    });
            });
    }
}

impl eframe::App for HostdeckApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        self.refresh_lists(false);
        self.refresh_vgroup(false);

        if let Some(panel) = self.vgroup_panel.as_mut() {
            panel.details.sync_polling();
        }

        self.draw_event_log(ctx);
        self.draw_navigation(ctx);

        let mut vgroup_action = VGroupAction::None;
        egui::CentralPanel::default().show(ctx, |ui| match (&self.location, self.vgroup_panel.as_mut()) {
            (Location::Top, _) => {
                ui.heading("Hostdeck");
                ui.label("Select a VM interface or a volume group on the left.");
            }
            (Location::VolumeGroup(_), Some(panel)) => vgroup_action = panel.show(ui),
            (Location::VolumeGroup(name), None) => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Loading {}", name));
                });
            }
        });
        if vgroup_action == VGroupAction::None {
            if let Some(panel) = self.vgroup_panel.as_mut() {
                vgroup_action = panel.show_dialogs(ctx);
            }
        }
        self.run_vgroup_action(vgroup_action);

        if let Some(dialog) = self.nic_dialog.as_mut() {
            match show_edit_nic_dialog(ctx, dialog, self.nic_saving) {
                NicDialogAction::Save(change) => {
                    self.nic_saving = true;
                    let virt = Arc::clone(&self.virt);
                    self.spawn(async move {
                        AppEvent::NicSaved(virt.change_network_settings(&change).await)
                    });
                }
                NicDialogAction::Cancel => self.nic_dialog = None,
                NicDialogAction::None => {}
            }
        }

        ctx.request_repaint_after(Duration::from_secs(1));
    }
}
