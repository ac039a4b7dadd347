//! egui rendering of the network interface edit dialog.
//!
//! The window only collects input; saving runs on the caller's runtime and
//! the result is fed back through [`EditNicDialog::finish_save`].

use crate::nic::NicType;
use crate::nic_edit::{EditNicDialog, NicField};
use crate::provider::NetworkSettingsChange;
use crate::theme;
use eframe::egui;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicDialogAction {
    None,
    Save(NetworkSettingsChange),
    Cancel,
}

/// Types offered in the type selector. An interface of an unsupported type
/// keeps its own type listed so the selector never shows a blank entry.
pub fn type_choices(current: NicType) -> Vec<NicType> {
    let mut choices = NicType::EDITABLE.to_vec();
    if !choices.contains(&current) {
        choices.push(current);
    }
    choices
}

pub fn show_edit_nic_dialog(
    ctx: &egui::Context,
    dialog: &mut EditNicDialog,
    saving: bool,
) -> NicDialogAction {
    if !dialog.is_open() {
        return NicDialogAction::None;
    }

    let mut action = NicDialogAction::None;
    let mut open = true;
    let title = dialog.title();

    egui::Window::new(title)
        .id(egui::Id::new(("hostdeck.nic_edit", dialog.interface().mac.clone())))
        .open(&mut open)
        .collapsible(false)
        .resizable(false)
        .show(ctx, |ui| {
            if let Some(warning) = dialog.restart_warning() {
                ui.colored_label(theme::STATUS_WARNING, format!("⚠ {}", warning));
                ui.add_space(6.0);
            }

            let mut edits = Vec::new();
            let state = dialog.state().clone();

            egui::Grid::new("hostdeck.nic_edit.grid")
                .num_columns(2)
                .spacing([12.0, 8.0])
                .show(ui, |ui| {
                    ui.label("Interface type");
                    let mut network_type = state.network_type;
                    egui::ComboBox::from_id_source("hostdeck.nic_edit.type")
                        .selected_text(network_type.label())
                        .show_ui(ui, |ui| {
                            for choice in type_choices(dialog.interface().nic_type()) {
                                ui.selectable_value(&mut network_type, choice, choice.label());
                            }
                        });
                    if network_type != state.network_type {
                        edits.push(NicField::NetworkType(network_type));
                    }
                    ui.end_row();

                    ui.label("Source");
                    let choices = dialog.source_choices();
                    if choices.is_empty() {
                        ui.colored_label(theme::STATUS_UNKNOWN, "No sources available");
                    } else {
                        let mut source = state.network_source.clone();
                        egui::ComboBox::from_id_source("hostdeck.nic_edit.source")
                            .selected_text(source.as_deref().unwrap_or("Select a source"))
                            .show_ui(ui, |ui| {
                                for choice in choices {
                                    ui.selectable_value(
                                        &mut source,
                                        Some(choice.clone()),
                                        choice.as_str(),
                                    );
                                }
                            });
                        if source != state.network_source {
                            edits.push(NicField::NetworkSource(source));
                        }
                    }
                    ui.end_row();

                    ui.label("Model");
                    let mut model = state.network_model.clone();
                    egui::ComboBox::from_id_source("hostdeck.nic_edit.model")
                        .selected_text(model.as_str())
                        .show_ui(ui, |ui| {
                            for choice in dialog.model_choices() {
                                let label = choice.clone();
                                ui.selectable_value(&mut model, choice, label);
                            }
                        });
                    if model != state.network_model {
                        edits.push(NicField::NetworkModel(model));
                    }
                    ui.end_row();

                    ui.label("MAC address");
                    ui.monospace(dialog.interface().mac.as_str());
                    ui.end_row();
                });

            for edit in edits {
                dialog.on_value_changed(edit);
            }

            if let Some(error) = dialog.state().dialog_error.clone() {
                ui.add_space(6.0);
                egui::Frame::default()
                    .fill(theme::BG_ELEVATED)
                    .stroke(egui::Stroke::new(1.0, theme::ACTION_DANGER))
                    .rounding(4.0)
                    .inner_margin(8.0)
                    .show(ui, |ui| {
                        ui.colored_label(theme::ACTION_DANGER, error.text.as_str());
                        if !error.detail.is_empty() {
                            ui.small(error.detail.as_str());
                        }
                        if ui.small_button("Dismiss").clicked() {
                            dialog.dismiss_error();
                        }
                    });
            }

            ui.add_space(8.0);
            ui.horizontal(|ui| {
                let can_save = !dialog.state().save_disabled && !saving;
                let save = ui
                    .add_enabled(
                        can_save,
                        egui::Button::new("Save").fill(theme::ACTION_PRIMARY),
                    )
                    .on_disabled_hover_text(if saving {
                        "Saving…"
                    } else {
                        "Select a source first"
                    });
                if save.clicked() {
                    if let Some(change) = dialog.save_request() {
                        action = NicDialogAction::Save(change);
                    }
                }
                if ui.button("Cancel").clicked() {
                    action = NicDialogAction::Cancel;
                }
                if saving {
                    ui.spinner();
                }
            });
        });

    if !open {
        action = NicDialogAction::Cancel;
    }
    if action == NicDialogAction::Cancel {
        dialog.close();
    }
    action
}
