//! egui rendering of the volume group details page and its dialogs.

use crate::dialog::{DialogError, NO_DISKS_AVAILABLE, validate_disk_selection, validate_lvm2_name};
use crate::format::fmt_size;
use crate::storage::{ActiveUsage, AvailableSpace};
use crate::theme;
use crate::vgroup_details::{DeletePrompt, VGroupDetails};
use eframe::egui;

/// What the user asked for this frame. The app runs it off the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VGroupAction {
    None,
    Refresh,
    OpenAddDisks,
    AddDisks(Vec<AvailableSpace>),
    RemovePvol(String),
    OpenRename,
    Rename(String),
    RequestDelete,
    ConfirmDelete(ActiveUsage),
}

pub enum VGroupDialog {
    AddDisks {
        candidates: Vec<AvailableSpace>,
        selected: Vec<bool>,
        error: Option<String>,
    },
    Rename {
        name: String,
        error: Option<String>,
    },
    Delete(DeletePrompt),
}

pub struct VGroupPanel {
    pub details: VGroupDetails,
    pub dialog: Option<VGroupDialog>,
    pub dialog_error: Option<DialogError>,
    pub busy: bool,
}

impl VGroupPanel {
    pub fn new(details: VGroupDetails) -> Self {
        Self {
            details,
            dialog: None,
            dialog_error: None,
            busy: false,
        }
    }

    pub fn open_add_disks(&mut self, candidates: Vec<AvailableSpace>) {
        let selected = vec![false; candidates.len()];
        self.dialog_error = None;
        self.dialog = Some(VGroupDialog::AddDisks {
            candidates,
            selected,
            error: None,
        });
    }

    pub fn open_rename(&mut self) {
        self.dialog_error = None;
        self.dialog = Some(VGroupDialog::Rename {
            name: self.details.vgroup().name.clone(),
            error: None,
        });
    }

    pub fn open_delete(&mut self, prompt: DeletePrompt) {
        self.dialog_error = None;
        self.dialog = Some(VGroupDialog::Delete(prompt));
    }

    pub fn close_dialog(&mut self) {
        self.dialog = None;
        self.dialog_error = None;
    }

    /// Header, physical volume sidebar and logical volume list.
    pub fn show(&mut self, ui: &mut egui::Ui) -> VGroupAction {
        let mut action = VGroupAction::None;
        let details = &self.details;
        let vgroup = details.vgroup();

        egui::Frame::default()
            .fill(theme::BG_ELEVATED)
            .stroke(egui::Stroke::new(1.0, theme::BORDER_DEFAULT))
            .rounding(6.0)
            .inner_margin(egui::Margin::symmetric(16.0, 12.0))
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.heading(details.title());
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let delete = ui.add_enabled(
                            !self.busy,
                            egui::Button::new(theme::danger_text("Delete"))
                                .fill(theme::ACTION_DANGER),
                        );
                        if delete.clicked() {
                            action = VGroupAction::RequestDelete;
                        }
                        if ui.add_enabled(!self.busy, egui::Button::new("Rename")).clicked() {
                            action = VGroupAction::OpenRename;
                        }
                        if ui.button("⟳").on_hover_text("Refresh").clicked() {
                            action = VGroupAction::Refresh;
                        }
                        if details.is_polling() {
                            ui.spinner().on_hover_text("Updating");
                        }
                    });
                });

                egui::Grid::new("hostdeck.vgroup.header")
                    .num_columns(2)
                    .spacing([16.0, 4.0])
                    .show(ui, |ui| {
                        ui.colored_label(theme::TEXT_SECONDARY, "UUID");
                        ui.monospace(vgroup.uuid.as_str());
                        ui.end_row();
                        ui.colored_label(theme::TEXT_SECONDARY, "Capacity");
                        ui.label(details.capacity());
                        ui.end_row();
                        ui.colored_label(theme::TEXT_SECONDARY, "Free");
                        ui.label(fmt_size(vgroup.free_size));
                        ui.end_row();
                    });
            });

        ui.add_space(10.0);
        ui.columns(2, |columns| {
            columns[0].horizontal(|ui| {
                ui.strong("Physical Volumes");
                let add = ui
                    .add_enabled(!self.busy, egui::Button::new("+"))
                    .on_hover_text("Add disks");
                if add.clicked() {
                    action = VGroupAction::OpenAddDisks;
                }
            });
            columns[0].separator();
            for pvol in details.pvols() {
                columns[0].horizontal(|ui| {
                    ui.vertical(|ui| {
                        ui.monospace(pvol.path.as_str());
                        ui.small(VGroupDetails::pvol_detail(pvol));
                    });
                    let decision = details.remove_decision(pvol);
                    let remove = ui.add_enabled(
                        !self.busy && decision.excuse().is_none(),
                        egui::Button::new("−"),
                    );
                    let remove = match decision.excuse() {
                        Some(excuse) => remove.on_disabled_hover_text(excuse),
                        None => remove.on_hover_text("Remove"),
                    };
                    if remove.clicked() {
                        action = VGroupAction::RemovePvol(pvol.path.clone());
                    }
                });
            }

            columns[1].strong("Logical Volumes");
            columns[1].separator();
            if details.lvols().is_empty() {
                columns[1].colored_label(theme::STATUS_UNKNOWN, "No logical volumes");
            }
            for lvol in details.lvols() {
                columns[1].horizontal(|ui| {
                    let color = if lvol.is_active() {
                        theme::STATUS_RUNNING
                    } else {
                        theme::STATUS_UNKNOWN
                    };
                    ui.colored_label(color, if lvol.is_active() { "●" } else { "○" });
                    ui.label(lvol.name.as_str());
                    ui.small(fmt_size(lvol.size));
                });
            }
        });

        ui.add_space(6.0);
        ui.small(format!(
            "Last updated {}",
            details.last_refreshed().format("%H:%M:%S")
        ));

        action
    }

    pub fn show_dialogs(&mut self, ctx: &egui::Context) -> VGroupAction {
        let Some(dialog) = self.dialog.as_mut() else {
            return VGroupAction::None;
        };

        let busy = self.busy;
        let dialog_error = self.dialog_error.clone();
        let mut action = VGroupAction::None;
        let mut close = false;
        let mut open = true;

        match dialog {
            VGroupDialog::AddDisks {
                candidates,
                selected,
                error,
            } => {
                egui::Window::new("Add Disks")
                    .open(&mut open)
                    .collapsible(false)
                    .resizable(false)
                    .show(ctx, |ui| {
                        if candidates.is_empty() {
                            ui.label(NO_DISKS_AVAILABLE);
                        }
                        for (space, checked) in candidates.iter().zip(selected.iter_mut()) {
                            let label = if space.description.is_empty() {
                                format!("{} ({})", space.block, fmt_size(space.size))
                            } else {
                                format!(
                                    "{} ({}) {}",
                                    space.block,
                                    fmt_size(space.size),
                                    space.description
                                )
                            };
                            ui.checkbox(checked, label);
                        }
                        if let Some(message) = error.as_deref() {
                            ui.colored_label(theme::ACTION_DANGER, message);
                        }
                        show_dialog_error(ui, dialog_error.as_ref());

                        ui.add_space(8.0);
                        ui.horizontal(|ui| {
                            if ui
                                .add_enabled(!busy && !candidates.is_empty(), egui::Button::new("Add"))
                                .clicked()
                            {
                                let chosen: Vec<AvailableSpace> = candidates
                                    .iter()
                                    .zip(selected.iter())
                                    .filter(|(_, checked)| **checked)
                                    .map(|(space, _)| space.clone())
                                    .collect();
                                match validate_disk_selection(&chosen) {
                                    Ok(()) => {
                                        *error = None;
                                        action = VGroupAction::AddDisks(chosen);
                                    }
                                    Err(message) => *error = Some(message),
                                }
                            }
                            if ui.button("Cancel").clicked() {
                                close = true;
                            }
                            if busy {
                                ui.spinner();
                            }
                        });
                    });
            }
            VGroupDialog::Rename { name, error } => {
                egui::Window::new("Rename Volume Group")
                    .open(&mut open)
                    .collapsible(false)
                    .resizable(false)
                    .show(ctx, |ui| {
                        ui.label("Name");
                        if ui.text_edit_singleline(name).changed() {
                            *error = validate_lvm2_name(name).err();
                        }
                        if let Some(message) = error.as_deref() {
                            ui.colored_label(theme::ACTION_DANGER, message);
                        }
                        show_dialog_error(ui, dialog_error.as_ref());

                        ui.add_space(8.0);
                        ui.horizontal(|ui| {
                            if ui.add_enabled(!busy, egui::Button::new("Rename")).clicked() {
                                match validate_lvm2_name(name) {
                                    Ok(()) => action = VGroupAction::Rename(name.clone()),
                                    Err(message) => *error = Some(message),
                                }
                            }
                            if ui.button("Cancel").clicked() {
                                close = true;
                            }
                        });
                    });
            }
            VGroupDialog::Delete(DeletePrompt::Blocked { title, message }) => {
                egui::Window::new(title.as_str())
                    .open(&mut open)
                    .collapsible(false)
                    .resizable(false)
                    .show(ctx, |ui| {
                        for line in message.iter() {
                            ui.label(line.as_str());
                        }
                        ui.add_space(8.0);
                        if ui.button("Close").clicked() {
                            close = true;
                        }
                    });
            }
            VGroupDialog::Delete(DeletePrompt::Confirm {
                title,
                danger,
                teardown,
                usage,
            }) => {
                egui::Window::new(title.as_str())
                    .open(&mut open)
                    .collapsible(false)
                    .resizable(false)
                    .show(ctx, |ui| {
                        ui.colored_label(theme::ACTION_DANGER, *danger);
                        if !teardown.is_empty() {
                            ui.add_space(6.0);
                            for line in teardown.iter() {
                                ui.small(line.as_str());
                            }
                        }
                        show_dialog_error(ui, dialog_error.as_ref());

                        ui.add_space(8.0);
                        ui.horizontal(|ui| {
                            let delete = ui.add_enabled(
                                !busy,
                                egui::Button::new(theme::danger_text("Delete"))
                                    .fill(theme::ACTION_DANGER),
                            );
                            if delete.clicked() {
                                action = VGroupAction::ConfirmDelete(usage.clone());
                            }
                            if ui.button("Cancel").clicked() {
                                close = true;
                            }
                            if busy {
                                ui.spinner();
                            }
                        });
                    });
            }
        }

        if close || !open {
            self.close_dialog();
        }
        action
    }
}

fn show_dialog_error(ui: &mut egui::Ui, error: Option<&DialogError>) {
    let Some(error) = error else {
        return;
    };
    ui.add_space(6.0);
    ui.colored_label(theme::ACTION_DANGER, error.text.as_str());
    if !error.detail.is_empty() {
        ui.small(error.detail.as_str());
    }
}
