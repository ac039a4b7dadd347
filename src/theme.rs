use crate::log_warn;
use crate::vm::VmState;
use egui::{Color32, Stroke, Visuals};

// Ocean palette
pub const BG_MAIN: Color32 = Color32::from_rgb(0, 7, 45);
pub const BG_PANEL: Color32 = Color32::from_rgb(10, 27, 61);
pub const BG_SECONDARY: Color32 = Color32::from_rgb(26, 47, 82);
pub const BG_ELEVATED: Color32 = Color32::from_rgb(36, 55, 95);
pub const BG_HOVER: Color32 = Color32::from_rgb(26, 67, 191);
pub const BG_INPUT: Color32 = Color32::from_rgb(0, 5, 16);

pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(137, 207, 240);
pub const TEXT_SECONDARY: Color32 = Color32::from_rgb(48, 213, 200);

pub const STATUS_RUNNING: Color32 = Color32::from_rgb(80, 250, 123);
pub const STATUS_STOPPED: Color32 = Color32::from_rgb(255, 85, 85);
pub const STATUS_WARNING: Color32 = Color32::from_rgb(241, 250, 140);
pub const STATUS_SUSPENDED: Color32 = Color32::from_rgb(139, 233, 253);
pub const STATUS_UNKNOWN: Color32 = Color32::from_rgb(98, 114, 164);

pub const ACTION_PRIMARY: Color32 = Color32::from_rgb(48, 213, 200);
pub const ACTION_DANGER: Color32 = Color32::from_rgb(255, 85, 85);

pub const BORDER_DEFAULT: Color32 = Color32::from_rgb(36, 55, 95);

/// Apply the `[ui] theme` named in the config: `ocean` or `light`.
pub fn apply(ctx: &egui::Context, name: &str) {
    ctx.set_visuals(visuals_for(name));

    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = egui::vec2(8.0, 8.0);
    style.spacing.button_padding = egui::vec2(12.0, 8.0);
    style.spacing.menu_margin = egui::Margin::same(8.0);
    style.spacing.indent = 20.0;
    ctx.set_style(style);
}

pub fn visuals_for(name: &str) -> Visuals {
    match name {
        "light" => Visuals::light(),
        "ocean" => ocean_visuals(),
        other => {
            log_warn!("Unknown theme '{}', using ocean", other);
            ocean_visuals()
        }
    }
}

fn ocean_visuals() -> Visuals {
    let mut visuals = Visuals::dark();

    visuals.window_fill = BG_MAIN;
    visuals.panel_fill = BG_PANEL;
    visuals.extreme_bg_color = BG_INPUT;
    visuals.faint_bg_color = BG_SECONDARY;
    visuals.override_text_color = Some(TEXT_PRIMARY);
    visuals.hyperlink_color = ACTION_PRIMARY;

    visuals.widgets.noninteractive.bg_fill = BG_SECONDARY;
    visuals.widgets.noninteractive.bg_stroke = Stroke::new(1.0, BORDER_DEFAULT);
    visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, TEXT_PRIMARY);
    visuals.widgets.inactive.bg_fill = BG_ELEVATED;
    visuals.widgets.inactive.bg_stroke = Stroke::new(1.0, BORDER_DEFAULT);
    visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, TEXT_SECONDARY);
    visuals.widgets.hovered.bg_fill = BG_HOVER;
    visuals.widgets.hovered.bg_stroke = Stroke::new(1.5, ACTION_PRIMARY);

    visuals.selection.bg_fill = BG_HOVER;
    visuals.selection.stroke = Stroke::new(1.0, ACTION_PRIMARY);
    visuals
}

pub fn vm_state_color(state: VmState) -> Color32 {
    match state {
        VmState::Running => STATUS_RUNNING,
        VmState::ShutOff => STATUS_STOPPED,
        VmState::Paused => STATUS_SUSPENDED,
        VmState::Crashed => ACTION_DANGER,
        VmState::Other => STATUS_UNKNOWN,
    }
}

pub fn vm_state_icon(state: VmState) -> &'static str {
    match state {
        VmState::Running => "●",
        VmState::ShutOff => "○",
        VmState::Paused => "⏸",
        VmState::Crashed => "✕",
        VmState::Other => "◌",
    }
}

/// Label for buttons that start an irreversible action; pair with an
/// `ACTION_DANGER` fill.
pub fn danger_text(text: &str) -> egui::RichText {
    egui::RichText::new(text).color(BG_MAIN).strong()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_has_a_distinct_icon() {
        let states = [
            VmState::Running,
            VmState::Paused,
            VmState::ShutOff,
            VmState::Crashed,
            VmState::Other,
        ];
        let mut icons: Vec<&str> = states.iter().map(|s| vm_state_icon(*s)).collect();
        icons.sort();
        icons.dedup();
        assert_eq!(icons.len(), states.len());
        assert_eq!(vm_state_color(VmState::Running), STATUS_RUNNING);
    }

    #[test]
    fn configured_theme_selects_visuals() {
        assert_eq!(visuals_for("ocean").panel_fill, BG_PANEL);
        assert!(!visuals_for("light").dark_mode);
        // Unknown names fall back to ocean.
        assert_eq!(visuals_for("solarized").window_fill, BG_MAIN);
    }
}
