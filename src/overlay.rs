use imgui::Condition;

use crate::viewer::{AssetStatus, ViewerState};

pub fn draw(ui: &imgui::Ui, state: &mut ViewerState) {
    ui.window("Viewer")
        .position([16.0, 16.0], Condition::FirstUseEver)
        .size([260.0, 150.0], Condition::FirstUseEver)
        .always_auto_resize(true)
        .build(|| {
            if ui.button("Customize") {
                state.focus_viewer();
            }

            if state.controls.is_moving_home() {
                ui.same_line();
                ui.text_disabled("moving...");
            }

            ui.separator();
            status_line(ui, "Model", &state.model_status);
            status_line(ui, "Environment", &state.environment_status);

            if let Some(normalization) = state.model.as_ref().and_then(|m| m.normalization) {
                ui.text(format!("Scale {:.3}", normalization.scale));
            }

            ui.separator();
            ui.text(format!("{:.1} fps", ui.io().framerate));
        });
}

fn status_line(ui: &imgui::Ui, label: &str, status: &AssetStatus) {
    match status {
        AssetStatus::Loading => ui.text(format!("{label}: loading")),
        AssetStatus::Ready => ui.text(format!("{label}: ready")),
        AssetStatus::Failed(error) => {
            ui.text(format!("{label}: failed"));
            if ui.is_item_hovered() {
                ui.tooltip_text(error);
            }
        }
    }
}
