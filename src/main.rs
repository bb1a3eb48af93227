//! Student workout viewer: sign in, browse training plans and log loads.

use dirs_next as dirs;
use eframe::{App, Frame, NativeOptions, egui};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

mod grouping;
mod image_catalog;
mod loads;
mod models;
mod pager;
mod session;
mod session_slot;
mod store;
mod view_model;
mod worker;

use grouping::RenderUnit;
use models::{Direction, LoadInput};
use session::{PlanView, SaveOutcome, SessionCoordinator, SessionSnapshot, SessionState};
use session_slot::SessionSlot;
use store::RestStore;
use view_model::{ExerciseView, ViewModel};
use worker::{Command, Event, WorkerHandle};

/// Serializes tests that change process environment variables.
#[cfg(test)]
static ENV_MUTEX: once_cell::sync::Lazy<std::sync::Mutex<()>> =
    once_cell::sync::Lazy::new(|| std::sync::Mutex::new(()));

const DEFAULT_IMAGE_BASE_URL: &str = "https://fitcraft-gifs-html.vercel.app";

/// Persistent application settings.
///
/// Stored as JSON in the user's config directory. Every field falls back to
/// its default when missing, so older files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct Settings {
    /// Base URL of the training store. `TRAINING_STORE_URL` overrides it.
    store_url: String,
    /// `TRAINING_STORE_API_KEY` overrides it.
    api_key: String,
    image_base_url: String,
    request_timeout_secs: u64,
}

impl Settings {
    const FILE: &'static str = "student_workout_settings.json";

    fn path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join(Self::FILE))
    }

    fn load() -> Self {
        if let Some(path) = Self::path() {
            if let Ok(data) = std::fs::read_to_string(&path) {
                match serde_json::from_str(&data) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("Ignoring unreadable settings {}: {e}", path.display()),
                }
            }
        }
        Self::default()
    }

    fn save(&self) {
        if let Some(path) = Self::path() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(data) = serde_json::to_string_pretty(self) {
                if let Err(e) = std::fs::write(&path, data) {
                    log::error!("Failed to save settings: {e}");
                }
            }
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            api_key: String::new(),
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            request_timeout_secs: 15,
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn start_worker(settings: &Settings, ctx: &egui::Context) -> Result<WorkerHandle, String> {
    let url = store::resolve_store_url(non_empty(&settings.store_url))
        .ok_or("No training store URL configured")?;
    let key = store::resolve_api_key(non_empty(&settings.api_key))
        .ok_or("No training store API key configured")?;
    let store = RestStore::new(&url, &key, settings.timeout());
    let ctx = ctx.clone();
    WorkerHandle::spawn(SessionCoordinator::new(store), move || ctx.request_repaint())
        .map_err(|e| format!("Could not start the background worker: {e}"))
}

/// Load text shown for a stored value: `80` or `82.5`.
fn format_load(load: f64) -> String {
    format!("{load}")
}

/// Input texts keyed by exercise name, filled with each exercise's last load.
///
/// Loads are stored per name, so every card of a repeated exercise edits the
/// same text.
fn prefilled_inputs(view: &ViewModel) -> HashMap<String, String> {
    view.exercises()
        .map(|ex| (ex.name.clone(), ex.resolved_load.map(format_load).unwrap_or_default()))
        .collect()
}

/// One load input per distinct exercise name, in first-appearance order.
fn collect_load_inputs(view: &ViewModel, inputs: &HashMap<String, String>) -> Vec<LoadInput> {
    let mut seen = HashSet::new();
    view.exercises()
        .filter(|ex| seen.insert(ex.name.as_str()))
        .map(|ex| LoadInput::new(ex.name.clone(), inputs.get(&ex.name).cloned().unwrap_or_default()))
        .collect()
}

fn save_message(outcome: &SaveOutcome) -> String {
    match outcome {
        SaveOutcome::Saved { count: 1 } => "1 load saved".to_string(),
        SaveOutcome::Saved { count } => format!("{count} loads saved"),
        SaveOutcome::NothingToSave => "Fill in at least one load to save".to_string(),
        SaveOutcome::Failed(e) => format!("Saving failed: {e}"),
    }
}

enum UiAction {
    Login,
    Logout,
    Refresh,
    Navigate(Direction),
    Save,
}

struct StudentApp {
    ctx: egui::Context,
    settings: Settings,
    state: SessionState,
    credential: String,
    load_inputs: HashMap<String, String>,
    worker: Option<WorkerHandle>,
    worker_error: Option<String>,
    slot: Option<SessionSlot>,
    toast: Option<(String, Instant)>,
    show_settings: bool,
}

impl StudentApp {
    fn new(ctx: egui::Context) -> Self {
        let settings = Settings::load();
        image_catalog::load();
        let mut app = Self {
            ctx,
            settings,
            state: SessionState::default(),
            credential: String::new(),
            load_inputs: HashMap::new(),
            worker: None,
            worker_error: None,
            slot: SessionSlot::default_location(),
            toast: None,
            show_settings: false,
        };
        app.restart_worker();
        app.resume();
        app
    }

    fn restart_worker(&mut self) {
        self.state.logout();
        self.load_inputs.clear();
        match start_worker(&self.settings, &self.ctx) {
            Ok(worker) => {
                self.worker = Some(worker);
                self.worker_error = None;
            }
            Err(e) => {
                log::warn!("{e}");
                self.worker = None;
                self.worker_error = Some(e);
                self.show_settings = true;
            }
        }
    }

    fn resume(&mut self) {
        let Some(student_id) = self.slot.as_ref().and_then(SessionSlot::load) else {
            return;
        };
        log::info!("Resuming session of student {student_id}");
        if self.send(Command::Resume(student_id)) {
            self.state.begin_login();
        }
    }

    fn send(&mut self, command: Command) -> bool {
        match self.worker.as_mut() {
            Some(worker) => worker.send(command).is_some(),
            None => false,
        }
    }

    fn is_busy(&self) -> bool {
        self.worker.as_ref().is_some_and(WorkerHandle::is_busy)
    }

    fn show_toast(&mut self, message: String) {
        self.toast = Some((message, Instant::now()));
    }

    fn poll_worker(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        let replies: Vec<_> = std::iter::from_fn(|| worker.try_recv()).collect();
        for reply in replies {
            self.apply(reply.event);
        }
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::LoggedIn(snapshot) => {
                if let Some(slot) = &self.slot {
                    slot.store(&snapshot.student.id);
                }
                self.credential.clear();
                self.reset_inputs(&snapshot);
                self.state.finish_login(Ok(snapshot));
            }
            Event::LoginFailed(e) => self.state.finish_login(Err(e)),
            Event::ResumeFailed(e) => {
                log::info!("Stored session not resumed: {e}");
                if let Some(slot) = &self.slot {
                    slot.clear();
                }
                self.state.logout();
            }
            Event::ViewChanged(snapshot) => {
                self.reset_inputs(&snapshot);
                self.state.refresh(snapshot);
            }
            Event::SaveFinished(outcome) => self.show_toast(save_message(&outcome)),
            Event::LoggedOut => {
                self.load_inputs.clear();
                self.state.logout();
            }
        }
    }

    fn reset_inputs(&mut self, snapshot: &SessionSnapshot) {
        self.load_inputs = match &snapshot.view {
            PlanView::Plan(view) => prefilled_inputs(view),
            PlanView::Empty => HashMap::new(),
        };
    }

    fn perform(&mut self, action: UiAction) {
        match action {
            UiAction::Login => {
                let credential = self.credential.clone();
                if self.send(Command::Login(credential)) {
                    self.state.begin_login();
                }
            }
            UiAction::Logout => {
                if let Some(slot) = &self.slot {
                    slot.clear();
                }
                self.send(Command::Logout);
                self.load_inputs.clear();
                self.state.logout();
            }
            UiAction::Refresh => {
                self.send(Command::Refresh);
            }
            UiAction::Navigate(direction) => {
                self.send(Command::Navigate(direction));
            }
            UiAction::Save => {
                let inputs = match self.state.snapshot().map(|s| &s.view) {
                    Some(PlanView::Plan(view)) => collect_load_inputs(view, &self.load_inputs),
                    _ => return,
                };
                self.send(Command::Save(inputs));
            }
        }
    }

    fn login_screen(&mut self, ui: &mut egui::Ui, actions: &mut Vec<UiAction>) {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.heading("Sign in");
            ui.add_space(10.0);
            ui.label("Enter the credential you received from your trainer.");
            let busy = matches!(self.state, SessionState::Authenticating);
            let response = ui.add_enabled(
                !busy,
                egui::TextEdit::singleline(&mut self.credential)
                    .hint_text("Credential")
                    .desired_width(220.0),
            );
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let clicked = ui
                .add_enabled(!busy && self.worker.is_some(), egui::Button::new("Enter"))
                .clicked();
            if (submitted || clicked) && !busy {
                actions.push(UiAction::Login);
            }
            if busy {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Signing in...");
                });
            }
            if let SessionState::LoginFailed(e) = &self.state {
                ui.colored_label(ui.visuals().error_fg_color, e.to_string());
            }
            if let Some(e) = &self.worker_error {
                ui.colored_label(ui.visuals().warn_fg_color, e);
            }
        });
    }

    fn plan_screen(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot, actions: &mut Vec<UiAction>) {
        let busy = self.is_busy();
        if let Some(notice) = &snapshot.notice {
            ui.colored_label(ui.visuals().warn_fg_color, notice);
        }
        let view = match &snapshot.view {
            PlanView::Plan(view) => view,
            PlanView::Empty => {
                ui.add_space(20.0);
                ui.label("No training plan has been assigned to you yet.");
                return;
            }
        };

        ui.heading(&view.plan.name);
        ui.label(format!("Swap date: {}", view.plan.swap_date_label));
        if let Some(notes) = &view.plan.notes {
            ui.group(|ui| {
                ui.strong("Notes");
                ui.label(notes);
            });
        }

        let nav = view.navigation;
        if nav.shows_controls() {
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(nav.has_newer() && !busy, egui::Button::new("◀ Newer plan"))
                    .clicked()
                {
                    actions.push(UiAction::Navigate(Direction::Previous));
                }
                ui.label(format!("Plan {} of {}", nav.current_index + 1, nav.total_count));
                if ui
                    .add_enabled(nav.has_older() && !busy, egui::Button::new("Older plan ▶"))
                    .clicked()
                {
                    actions.push(UiAction::Navigate(Direction::Next));
                }
            });
        }
        ui.separator();

        if !view.has_exercises() {
            ui.label("This plan has no exercises.");
            return;
        }

        egui::ScrollArea::vertical().show(ui, |ui| {
            for unit in &view.units {
                match unit {
                    RenderUnit::Single(ex) => {
                        ui.group(|ui| self.exercise_row(ui, ex));
                    }
                    RenderUnit::Group { technique, members } => {
                        ui.group(|ui| {
                            ui.strong(technique.as_deref().unwrap_or("Combined exercises"));
                            for ex in members {
                                ui.separator();
                                self.exercise_row(ui, ex);
                            }
                        });
                    }
                }
                ui.add_space(4.0);
            }
            ui.add_space(8.0);
            if ui.add_enabled(!busy, egui::Button::new("Save loads")).clicked() {
                actions.push(UiAction::Save);
            }
        });
    }

    fn exercise_row(&mut self, ui: &mut egui::Ui, ex: &ExerciseView) {
        ui.strong(&ex.name);
        ui.label(format!("{} sets × {}", ex.set_count, ex.rep_spec));
        if let Some(technique) = &ex.inline_technique {
            ui.label(format!("Technique: {technique}"));
        }
        if let Some(image) = &ex.resolved_image {
            ui.hyperlink_to(
                "Demonstration",
                image_catalog::absolute_url(&self.settings.image_base_url, image),
            );
        }
        ui.horizontal(|ui| {
            ui.label("Load (kg)");
            let text = self.load_inputs.entry(ex.name.clone()).or_default();
            ui.add(
                egui::TextEdit::singleline(text)
                    .id_source(("load", &ex.id))
                    .desired_width(70.0),
            );
            if let Some(last) = ex.resolved_load {
                ui.weak(format!("last: {} kg", format_load(last)));
            }
        });
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        let mut open = self.show_settings;
        let mut apply = false;
        egui::Window::new("Settings").open(&mut open).show(ctx, |ui| {
            egui::Grid::new("settings_grid").num_columns(2).show(ui, |ui| {
                ui.label("Store URL");
                ui.text_edit_singleline(&mut self.settings.store_url);
                ui.end_row();
                ui.label("API key");
                ui.add(egui::TextEdit::singleline(&mut self.settings.api_key).password(true));
                ui.end_row();
                ui.label("Image base URL");
                ui.text_edit_singleline(&mut self.settings.image_base_url);
                ui.end_row();
                ui.label("Request timeout (s)");
                ui.add(egui::DragValue::new(&mut self.settings.request_timeout_secs).clamp_range(1..=120));
                ui.end_row();
            });
            if ui.button("Apply").clicked() {
                apply = true;
            }
        });
        self.show_settings = open;
        if apply {
            self.settings.save();
            self.restart_worker();
            self.resume();
        }
    }
}

impl App for StudentApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_worker();
        let mut actions = Vec::new();

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                if ui.button("Settings").clicked() {
                    self.show_settings = true;
                }
                if let Some(snapshot) = self.state.snapshot() {
                    ui.separator();
                    ui.label(format!("Hello, {}!", snapshot.student.first_name()));
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Log out").clicked() {
                            actions.push(UiAction::Logout);
                        }
                        let busy = self.is_busy();
                        if ui.add_enabled(!busy, egui::Button::new("Refresh")).clicked() {
                            actions.push(UiAction::Refresh);
                        }
                        if busy {
                            ui.spinner();
                        }
                    });
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            match self.state.snapshot().cloned() {
                Some(snapshot) => self.plan_screen(ui, &snapshot, &mut actions),
                None => self.login_screen(ui, &mut actions),
            }
        });

        if self.show_settings {
            self.settings_window(ctx);
        }

        if self
            .toast
            .as_ref()
            .is_some_and(|(_, start)| start.elapsed() >= Duration::from_secs(3))
        {
            self.toast = None;
        }
        if let Some((message, _)) = &self.toast {
            egui::Area::new(egui::Id::new("save_toast"))
                .anchor(egui::Align2::RIGHT_TOP, [-10.0, 40.0])
                .show(ctx, |ui| {
                    ui.label(message);
                });
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        for action in actions {
            self.perform(action);
        }
    }
}

fn main() -> eframe::Result<()> {
    env_logger::init();
    let options = NativeOptions::default();
    eframe::run_native(
        "Student Workout",
        options,
        Box::new(|cc| Box::new(StudentApp::new(cc.egui_ctx.clone()))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Exercise, Plan};
    use crate::pager::Navigation;
    use crate::view_model::build_view_model;
    use chrono::NaiveDate;
    fn sample_view() -> ViewModel {
        view_of(&[("1", "Squat"), ("2", "Row")])
    }

    fn view_of(exercises: &[(&str, &str)]) -> ViewModel {
        let exercise = |id: &str, name: &str| Exercise {
            id: id.into(),
            name: name.into(),
            set_count: 3,
            rep_spec: "12".into(),
            ..Default::default()
        };
        let plan = Plan {
            id: "p".into(),
            name: "Full body".into(),
            swap_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            notes: None,
            exercises: exercises.iter().map(|&(id, name)| exercise(id, name)).collect(),
        };
        let loads = HashMap::from([("Squat".to_string(), 82.5)]);
        build_view_model(&plan, Navigation::default(), &loads, |_: &str| None)
    }

    #[test]
    fn settings_roundtrip() {
        let s = Settings {
            store_url: "https://store.example".into(),
            api_key: "secret".into(),
            image_base_url: "https://img.example".into(),
            request_timeout_secs: 30,
        };
        let json = serde_json::to_string(&s).unwrap();
        let loaded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(s, loaded);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let loaded: Settings = serde_json::from_str(r#"{"store_url": "https://store.example"}"#).unwrap();
        assert_eq!(loaded.store_url, "https://store.example");
        assert_eq!(loaded.image_base_url, DEFAULT_IMAGE_BASE_URL);
        assert_eq!(loaded.request_timeout_secs, 15);
    }

    #[test]
    fn settings_persist_in_config_dir() {
        use std::env;

        let _guard = ENV_MUTEX.lock().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let prev_config = env::var_os("XDG_CONFIG_HOME");
        unsafe {
            env::set_var("XDG_CONFIG_HOME", dir.path());
        }

        let mut s = Settings::default();
        s.store_url = "https://store.example".into();
        s.request_timeout_secs = 5;
        s.save();
        let loaded = Settings::load();
        assert_eq!(loaded, s);

        std::fs::write(Settings::path().unwrap(), "garbage").unwrap();
        assert_eq!(Settings::load(), Settings::default());

        if let Some(val) = prev_config {
            unsafe {
                env::set_var("XDG_CONFIG_HOME", val);
            }
        } else {
            unsafe {
                env::remove_var("XDG_CONFIG_HOME");
            }
        }
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let s = Settings {
            request_timeout_secs: 0,
            ..Settings::default()
        };
        assert_eq!(s.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn inputs_are_prefilled_with_last_load() {
        let view = sample_view();
        let inputs = prefilled_inputs(&view);
        assert_eq!(inputs.get("Squat").map(String::as_str), Some("82.5"));
        assert_eq!(inputs.get("Row").map(String::as_str), Some(""));
    }

    #[test]
    fn collected_inputs_follow_plan_order() {
        let view = sample_view();
        let mut inputs = prefilled_inputs(&view);
        inputs.insert("Row".into(), "40".into());
        let collected = collect_load_inputs(&view, &inputs);
        assert_eq!(
            collected,
            vec![LoadInput::new("Squat", "82.5"), LoadInput::new("Row", "40")]
        );
    }

    #[test]
    fn repeated_exercise_keeps_the_typed_load() {
        let view = view_of(&[("1", "Squat"), ("2", "Row"), ("3", "Squat")]);
        let mut inputs = prefilled_inputs(&view);
        assert_eq!(inputs.len(), 2);

        // typing into either Squat card edits the one shared text
        inputs.insert("Squat".into(), "85".into());
        let collected = collect_load_inputs(&view, &inputs);
        assert_eq!(
            collected,
            vec![LoadInput::new("Squat", "85"), LoadInput::new("Row", "")]
        );

        let records = crate::loads::build_load_records("s1", &collected, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].load, 85.0);
    }

    #[test]
    fn loads_format_without_trailing_zeros() {
        assert_eq!(format_load(80.0), "80");
        assert_eq!(format_load(82.5), "82.5");
    }

    #[test]
    fn save_messages() {
        assert_eq!(save_message(&SaveOutcome::Saved { count: 1 }), "1 load saved");
        assert_eq!(save_message(&SaveOutcome::Saved { count: 3 }), "3 loads saved");
        assert!(save_message(&SaveOutcome::Failed("boom".into())).contains("boom"));
    }

    #[test]
    fn blank_settings_values_are_unset() {
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty(" https://x "), Some("https://x"));
    }
}
