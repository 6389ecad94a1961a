use eframe::egui;
use std::path::PathBuf;

use crate::ops::session_loader::LoadState;
use crate::types::session::Session;

pub enum SessionListEvent {
    Selected(Session),
    DataDirPicked(PathBuf),
}

pub fn session_list_panel(
    ui: &mut egui::Ui,
    sessions: &[Session],
    selected: Option<&Session>,
    load_state: LoadState,
    scan_error: Option<&str>,
) -> Option<SessionListEvent> {
    let mut event = None;
    ui.vertical(|ui| {
        ui.heading("Sessions");
        ui.separator();

        if ui.button("Open Data Folder").clicked() {
            if let Some(path) = rfd::FileDialog::new().pick_folder() {
                event = Some(SessionListEvent::DataDirPicked(path));
            }
        }

        if let Some(error) = scan_error {
            ui.label(egui::RichText::new(error).color(egui::Color32::LIGHT_RED));
        } else if sessions.is_empty() {
            ui.label("No sessions found");
        }

        if load_state == LoadState::Loading {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading predictions...");
            });
        }

        egui::ScrollArea::vertical().show(ui, |ui| {
            for session in sessions {
                let is_selected = selected == Some(session);
                let label = egui::RichText::new(&session.key).size(11.0);
                if ui.selectable_label(is_selected, label).clicked() && !is_selected {
                    event = Some(SessionListEvent::Selected(session.clone()));
                }
            }
        });
    });
    event
}
