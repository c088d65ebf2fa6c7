use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};

use crate::core::{AppConfig, PositionStore, APP_UNIX_NAME, CONFIG_SAVING_INTERVAL};
use crate::hotkeys::{Action, HotkeyMap};
use crate::player::{MplayerLauncher, PlayerPool, PoolEvent, PoolState, VideoOutput};
use crate::subtitles::{self, SubtitleView};

/// How often we ask the active player for its position.
const POSITION_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct TeeViewApp {
    pool: PlayerPool,
    positions: PositionStore,
    hotkeys: HotkeyMap,
    movie_path: PathBuf,

    subtitles: Option<SubtitleView>,
    subtitle_text: Option<String>,

    last_pos: Option<i64>,
    last_position_poll: Instant,
    last_position_save: Instant,

    error_message: Option<String>,
}

impl TeeViewApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: AppConfig,
        movie_path: PathBuf,
    ) -> anyhow::Result<Self> {
        let mut visuals = egui::Visuals::dark();
        visuals.override_text_color = Some(egui::Color32::WHITE);
        cc.egui_ctx.set_visuals(visuals);

        let hotkeys = HotkeyMap::from_config(&config.hotkeys)?;
        let positions = PositionStore::open_default()?;

        let window_id = native_window_id(cc);
        let mut pool = PlayerPool::new(Arc::new(MplayerLauncher::new(config.player_path.clone())));

        let last_pos = positions.movie_last_pos(&movie_path);
        let alternatives = find_alternatives(&movie_path);
        if !alternatives.is_empty() {
            log::info!("Found {} alternate track(s).", alternatives.len());
        }

        pool.open(&movie_path, &alternatives, last_pos, &mut |_id| {
            video_output(window_id)
        })?;

        Ok(Self {
            pool,
            positions,
            hotkeys,
            movie_path: movie_path.clone(),
            subtitles: load_subtitles(&movie_path),
            subtitle_text: None,
            last_pos: None,
            last_position_poll: Instant::now(),
            last_position_save: Instant::now(),
            error_message: None,
        })
    }

    fn handle_hotkeys(&mut self, ctx: &egui::Context) {
        let actions: Vec<Action> = ctx.input(|input| {
            input
                .events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key,
                        pressed: true,
                        ..
                    } => self.hotkeys.action_for(*key),
                    _ => None,
                })
                .collect()
        });

        for action in actions {
            match action {
                Action::OsdToggle => self.pool.osd_toggle(),
                Action::Pause => self.pool.pause(),
                Action::Seek(seconds) => self.pool.seek(seconds as f64),
                Action::Volume(delta) => self.pool.volume(delta),
                Action::NextAlternative => self.pool.next_alternative(),
                Action::PreviousAlternative => self.pool.previous_alternative(),
                Action::SwitchAlternative => self.pool.switch_alternative(),
                Action::Quit => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
            }
        }
    }

    fn handle_pool_events(&mut self) {
        for event in self.pool.poll_events() {
            match event {
                PoolEvent::OpenFailed { path, error } => {
                    self.error_message =
                        Some(format!("Unable to play '{}': {}", path.display(), error));
                }
                PoolEvent::Finished => {
                    log::info!("'{}' finished playing.", self.movie_path.display());
                    self.last_pos = None;
                    self.subtitle_text = None;
                    if let Err(e) = self.positions.mark_movie_as_watched(&self.movie_path) {
                        log::error!("Unable to update the saved position: {}.", e);
                    }
                }
                PoolEvent::PositionChanged(pos) => {
                    self.last_pos = Some(pos);
                    self.subtitle_text = self
                        .subtitles
                        .as_mut()
                        .and_then(|view| view.set_position(pos).map(str::to_string));
                }
            }
        }
    }

    fn save_position(&mut self) {
        if self.pool.state() != PoolState::Opened {
            return;
        }

        // Ask the player directly for a fresher position than the last
        // polled one.
        if let Some(pos) = self.pool.cur_pos().or(self.last_pos) {
            if let Err(e) = self.positions.save_movie_last_position(&self.movie_path, pos) {
                log::error!("Unable to save the movie's position: {}.", e);
            }
        }
    }

    fn draw(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                ui.with_layout(egui::Layout::bottom_up(egui::Align::Center), |ui| {
                    ui.add_space(24.0);
                    if let Some(text) = &self.subtitle_text {
                        ui.label(
                            egui::RichText::new(text)
                                .size(24.0)
                                .color(egui::Color32::WHITE),
                        );
                    } else if self.pool.state() == PoolState::Finished {
                        ui.label(egui::RichText::new("The movie finished.").size(18.0));
                    }
                });
            });

        if let Some(message) = self.error_message.clone() {
            egui::Window::new("Unable to play the movie")
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.label(&message);
                    if ui.button("Close").clicked() {
                        self.error_message = None;
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
        }
    }
}

impl eframe::App for TeeViewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_hotkeys(ctx);

        if self.last_position_poll.elapsed() >= POSITION_POLL_INTERVAL {
            self.last_position_poll = Instant::now();
            self.pool.poll_position();
        }

        self.handle_pool_events();

        if self.last_position_save.elapsed() >= CONFIG_SAVING_INTERVAL {
            self.last_position_save = Instant::now();
            self.save_position();
        }

        self.draw(ctx);
        ctx.request_repaint_after(POSITION_POLL_INTERVAL);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.save_position();
        self.pool.close();
    }
}

/// Identifier of the window the player should draw into, or `None` when a
/// native handle cannot be obtained.
fn native_window_id(cc: &eframe::CreationContext<'_>) -> Option<u64> {
    match cc.window_handle().map(|handle| handle.as_raw()) {
        Ok(RawWindowHandle::Xlib(handle)) => Some(handle.window as u64),
        Ok(RawWindowHandle::Xcb(handle)) => Some(u64::from(handle.window.get())),
        Ok(RawWindowHandle::Win32(handle)) => Some(handle.hwnd.get() as u64),
        _ => {
            log::warn!("Unable to obtain the native window id. The video will open in its own window.");
            None
        }
    }
}

fn video_output(window_id: Option<u64>) -> VideoOutput {
    if cfg!(target_os = "macos") {
        // Each player needs its own buffer name.
        let id = uuid::Uuid::new_v4().simple().to_string();
        VideoOutput::SharedBuffer(format!("{}-{}", APP_UNIX_NAME, &id[..16]))
    } else {
        match window_id {
            Some(id) => VideoOutput::Window(id),
            None => VideoOutput::OwnWindow,
        }
    }
}

/// Movies named like the main one with an extra tag between the stem and the
/// extension (movie.mkv -> movie.eng.mkv) are treated as alternate tracks.
fn find_alternatives(movie_path: &Path) -> Vec<PathBuf> {
    let (Some(dir), Some(stem)) = (
        movie_path.parent(),
        movie_path.file_stem().and_then(|stem| stem.to_str()),
    ) else {
        return Vec::new();
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Unable to look for alternate tracks: {}.", e);
            return Vec::new();
        }
    };

    let prefix = format!("{}.", stem);
    let mut alternatives: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && *path != *movie_path)
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .filter(|path| {
            path.extension()
                .and_then(|extension| extension.to_str())
                .map_or(true, |extension| !extension.eq_ignore_ascii_case("srt"))
        })
        .collect();

    alternatives.sort();
    alternatives
}

fn load_subtitles(movie_path: &Path) -> Option<SubtitleView> {
    let path = movie_path.with_extension("srt");
    if !path.is_file() {
        return None;
    }

    match subtitles::read(&path) {
        Ok(subtitles) => {
            log::info!("Loaded {} subtitle(s) from '{}'.", subtitles.len(), path.display());
            Some(SubtitleView::new(subtitles))
        }
        Err(e) => {
            log::warn!("{:#}.", e);
            None
        }
    }
}
