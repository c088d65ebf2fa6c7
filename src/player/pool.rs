use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::player::controller::{PlayerController, PlayerEvent};
use crate::player::error::PlayerError;
use crate::player::process::{SpawnPlayer, VideoOutput};

/// Rewind applied when resuming a movie from its saved position.
const RESUME_REWIND_SECONDS: i64 = 3;

/// Lifecycle of the whole pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// No movie is opened now.
    Closed,
    /// The pool is opening a movie.
    Opening,
    /// The pool failed to open a movie.
    Failed,
    /// A movie is opened and playing.
    Opened,
    /// The primary movie finished its playing.
    Finished,
}

/// Notifications the pool hands to the GUI after draining its controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// The primary movie could not be opened; the pool has closed itself.
    OpenFailed { path: PathBuf, error: String },
    /// The primary movie finished playing.
    Finished,
    /// Position of the primary track, in milliseconds. Forwarded only while
    /// the primary is the active track.
    PositionChanged(i64),
}

struct Track {
    path: PathBuf,
    controller: PlayerController,
    events: Receiver<PlayerEvent>,
}

/// Manages one controller per track: the primary movie at index 0 plus any
/// number of alternate tracks (the same content with a different audio
/// stream), kept paused for instant switching.
pub struct PlayerPool {
    launcher: Arc<dyn SpawnPlayer>,
    tracks: Vec<Track>,
    state: PoolState,
    cur_id: usize,
    cur_alt_id: usize,
    /// Where the primary was when we last switched away from it.
    last_main_pos: Option<i64>,
}

impl PlayerPool {
    pub fn new(launcher: Arc<dyn SpawnPlayer>) -> Self {
        Self {
            launcher,
            tracks: Vec::new(),
            state: PoolState::Closed,
            cur_id: 0,
            cur_alt_id: 0,
            last_main_pos: None,
        }
    }

    /// Opens a movie and optional alternate tracks for playing. The primary
    /// starts unpaused a few seconds before its saved position; alternates
    /// start paused at the beginning.
    pub fn open(
        &mut self,
        movie_path: &Path,
        alternatives: &[PathBuf],
        last_pos: i64,
        video_output: &mut dyn FnMut(usize) -> VideoOutput,
    ) -> Result<(), PlayerError> {
        self.close();

        self.state = PoolState::Opening;

        // Rewind a few seconds back when resuming.
        let start_from = (last_pos / 1000 - RESUME_REWIND_SECONDS).max(0) as u64;

        self.cur_id = 0;
        self.cur_alt_id = usize::from(!alternatives.is_empty());

        let paths = std::iter::once(movie_path.to_path_buf()).chain(alternatives.iter().cloned());
        for (id, path) in paths.enumerate() {
            let (controller, events) = PlayerController::new(Arc::clone(&self.launcher));
            let result = controller.run(
                &path,
                if id == 0 { start_from } else { 0 },
                id != 0,
                video_output(id),
            );

            match result {
                Ok(()) => self.tracks.push(Track { path, controller, events }),
                Err(e) if id == 0 => {
                    self.close();
                    self.state = PoolState::Failed;
                    return Err(e);
                }
                Err(e) => log::warn!("Unable to play '{}': {}.", path.display(), e),
            }
        }

        Ok(())
    }

    /// Returns true if any movie is opened.
    pub fn opened(&self) -> bool {
        !self.tracks.is_empty()
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Drains every track's notification queue. Must be called from the UI
    /// thread's run loop; controllers never call back into the GUI directly.
    pub fn poll_events(&mut self) -> Vec<PoolEvent> {
        let mut out = Vec::new();

        loop {
            let mut next = None;
            for (id, track) in self.tracks.iter().enumerate() {
                if let Ok(event) = track.events.try_recv() {
                    next = Some((id, event));
                    break;
                }
            }

            match next {
                Some((id, event)) => self.handle_event(id, event, &mut out),
                None => break,
            }
        }

        out
    }

    /// Periodic status hook; asks every running track for its position.
    pub fn poll_position(&self) {
        for track in &self.tracks {
            track.controller.poll_position();
        }
    }

    /// Current position of the primary track, if it can be obtained.
    pub fn cur_pos(&self) -> Option<i64> {
        let track = self.tracks.first()?;
        if !track.controller.running() {
            return None;
        }

        match track.controller.cur_pos() {
            Ok(pos) => Some(pos),
            Err(e) => {
                log::error!(
                    "Unable to get current playing position for movie '{}': {}.",
                    track.path.display(),
                    e
                );
                None
            }
        }
    }

    pub fn pause(&self) {
        self.movie_control("pause", |player| player.pause());
    }

    pub fn seek(&self, seconds: f64) {
        self.movie_control("seek", |player| player.seek(seconds, false));
    }

    pub fn volume(&self, delta: i64) {
        self.movie_control("volume", |player| player.volume(delta));
    }

    pub fn osd_toggle(&self) {
        self.movie_control("osd_toggle", |player| player.osd_toggle());
    }

    /// Switches to the alternate movie if the primary is active, or back to
    /// the primary otherwise.
    pub fn switch_alternative(&mut self) {
        log::info!("Player control: switch_alternative.");
        if !self.check_opened() {
            return;
        }

        if self.cur_id != 0 {
            self.switch_to(0);
        } else {
            self.switch_to(self.cur_alt_id.min(self.tracks.len() - 1));
        }
    }

    /// Switches to the next alternate movie.
    pub fn next_alternative(&mut self) {
        log::info!("Player control: next_alternative.");
        if !self.check_opened() {
            return;
        }

        self.cur_alt_id += 1;
        if self.cur_alt_id >= self.tracks.len() {
            self.cur_alt_id = 1.min(self.tracks.len() - 1);
        }

        self.switch_to(self.cur_alt_id);
    }

    /// Switches to the previous alternate movie.
    pub fn previous_alternative(&mut self) {
        log::info!("Player control: previous_alternative.");
        if !self.check_opened() {
            return;
        }

        self.cur_alt_id = if self.cur_alt_id <= 1 {
            self.tracks.len() - 1
        } else {
            self.cur_alt_id - 1
        };

        self.switch_to(self.cur_alt_id);
    }

    /// Makes the track with the given id the active one. Every step is
    /// best-effort: a track that cannot be paused or re-synced never aborts
    /// the switch.
    pub fn switch_to(&mut self, id: usize) {
        if id >= self.tracks.len() || id == self.cur_id {
            return;
        }

        log::debug!("Switching to the movie {} from {}.", id, self.cur_id);

        {
            let active = &self.tracks[self.cur_id].controller;
            if active.running() {
                match active.paused() {
                    Ok(false) => {
                        if let Err(e) = active.pause() {
                            log::debug!("Unable to pause the current movie: {}.", e);
                        }
                    }
                    Ok(true) => {}
                    Err(e) => log::debug!("Unable to pause the current movie: {}.", e),
                }

                if self.cur_id == 0 {
                    match active.cur_pos() {
                        Ok(pos) => self.last_main_pos = Some(pos),
                        Err(e) => {
                            log::debug!("Unable to get the movie's current position: {}.", e)
                        }
                    }
                }
            }
        }

        self.cur_id = id;

        let target = &self.tracks[id].controller;
        if target.running() {
            // The primary is re-synced to where it was left; alternates play
            // the same content in lockstep and are simply resumed.
            let seek_to = if id == 0 { self.last_main_pos } else { None };
            let result = match seek_to {
                Some(pos) => target.seek(pos as f64 / 1000.0, true),
                None => target.pause(),
            };

            if let Err(e) = result {
                log::debug!("Unable to continue playing of the target movie: {}.", e);
            }
        }
    }

    /// Closes all opened movies. Safe to call multiple times.
    pub fn close(&mut self) {
        for track in &self.tracks {
            track.controller.terminate();
        }

        self.tracks.clear();
        self.cur_id = 0;
        self.cur_alt_id = 0;
        self.last_main_pos = None;
        self.state = PoolState::Closed;
    }

    fn handle_event(&mut self, id: usize, event: PlayerEvent, out: &mut Vec<PoolEvent>) {
        match event {
            PlayerEvent::Started => {
                if id == 0 {
                    if let Some(movie) = self.tracks[id].controller.movie() {
                        log::debug!(
                            "The primary movie '{}' ({}x{}, aspect ratio {:.2}) is playing.",
                            movie.path().display(),
                            movie.width(),
                            movie.height(),
                            movie.aspect_ratio()
                        );
                    }
                    self.state = PoolState::Opened;
                }
            }
            PlayerEvent::Failed(error) => {
                let path = self.tracks[id].path.clone();
                if id == 0 {
                    self.close();
                    self.state = PoolState::Failed;
                    out.push(PoolEvent::OpenFailed { path, error });
                } else {
                    // A broken alternate track must not interrupt playback
                    // of the primary.
                    log::warn!("Unable to play '{}': {}", path.display(), error);
                    if self.cur_id == id {
                        self.switch_to(0);
                    }
                    self.remove_track(id);
                }
            }
            PlayerEvent::Terminated => {
                if id == 0 && self.state == PoolState::Opened {
                    self.state = PoolState::Finished;
                    out.push(PoolEvent::Finished);
                }
            }
            PlayerEvent::PositionChanged(pos) => {
                if id == self.cur_id && id == 0 {
                    out.push(PoolEvent::PositionChanged(pos));
                }
            }
        }
    }

    fn remove_track(&mut self, id: usize) {
        self.tracks.remove(id);

        if self.cur_id > id {
            self.cur_id -= 1;
        }
        if self.cur_alt_id > id {
            self.cur_alt_id -= 1;
        }
        if self.cur_alt_id >= self.tracks.len() {
            self.cur_alt_id = self.tracks.len().saturating_sub(1);
        }
    }

    fn movie_control(&self, name: &str, op: impl FnOnce(&PlayerController) -> Result<(), PlayerError>) {
        log::info!("Player control: {}.", name);
        if !self.check_opened() {
            return;
        }

        if let Err(e) = op(&self.tracks[self.cur_id].controller) {
            log::warn!("Player control request rejected: {}.", e);
        }
    }

    fn check_opened(&self) -> bool {
        if self.opened() {
            true
        } else {
            log::warn!("Player control request rejected: no movie is opened.");
            false
        }
    }
}

impl Drop for PlayerPool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::testing::{fake_player, FakeHandle, FakeLauncher};
    use std::thread;
    use std::time::{Duration, Instant};

    const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

    fn wait_for(pool: &mut PlayerPool, mut done: impl FnMut(&PlayerPool, &[PoolEvent]) -> bool) -> Vec<PoolEvent> {
        let mut all = Vec::new();
        let deadline = Instant::now() + WAIT_TIMEOUT;

        loop {
            all.extend(pool.poll_events());
            if done(pool, &all) {
                return all;
            }
            assert!(Instant::now() < deadline, "timed out; events so far: {:?}", all);
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn window_outputs() -> impl FnMut(usize) -> VideoOutput {
        |id| VideoOutput::Window(id as u64 + 1)
    }

    /// A pool with a primary and one alternate, both successfully started.
    fn opened_pool() -> (PlayerPool, FakeHandle, FakeHandle, Arc<FakeLauncher>) {
        let launcher = FakeLauncher::new();

        let (main, main_link) = fake_player();
        main.push_startup_replies(1280, 720);
        launcher.add("movie.mkv", main_link);

        let (alt, alt_link) = fake_player();
        alt.push_startup_replies(1280, 720);
        launcher.add("movie.eng.mkv", alt_link);

        let mut pool = PlayerPool::new(Arc::clone(&launcher) as Arc<dyn SpawnPlayer>);
        pool.open(
            Path::new("movie.mkv"),
            &[PathBuf::from("movie.eng.mkv")],
            10000,
            &mut window_outputs(),
        )
        .unwrap();

        wait_for(&mut pool, |pool, _| {
            pool.state() == PoolState::Opened && pool.tracks.iter().all(|t| t.controller.running())
        });

        (pool, main, alt, launcher)
    }

    #[test]
    fn test_open_applies_rewind_and_pauses_alternates() {
        let (pool, main, alt, launcher) = opened_pool();

        // last_pos of 10000 ms becomes a 7 second start offset for the
        // primary; the alternate starts paused at the beginning.
        let main_args = launcher.args_for("movie.mkv").unwrap();
        assert!(main_args.windows(2).any(|w| w == ["-ss", "7"]));
        let alt_args = launcher.args_for("movie.eng.mkv").unwrap();
        assert!(alt_args.windows(2).any(|w| w == ["-ss", "0"]));

        assert!(!main.written().contains(&"pause".to_string()));
        assert_eq!(alt.written()[0], "pause");

        assert_eq!(pool.state(), PoolState::Opened);
        assert!(pool.opened());
    }

    #[test]
    fn test_primary_failure_closes_the_pool() {
        let launcher = FakeLauncher::new();
        launcher.add_error("movie.mkv");

        let (alt, alt_link) = fake_player();
        alt.push_startup_replies(1280, 720);
        launcher.add("movie.eng.mkv", alt_link);

        let mut pool = PlayerPool::new(Arc::clone(&launcher) as Arc<dyn SpawnPlayer>);
        pool.open(
            Path::new("movie.mkv"),
            &[PathBuf::from("movie.eng.mkv")],
            0,
            &mut window_outputs(),
        )
        .unwrap();

        let events = wait_for(&mut pool, |pool, _| pool.state() == PoolState::Failed);
        assert!(events
            .iter()
            .any(|e| matches!(e, PoolEvent::OpenFailed { path, .. } if path == Path::new("movie.mkv"))));

        assert!(!pool.opened());
        assert!(alt.terminated());
    }

    #[test]
    fn test_alternate_failure_only_drops_that_track() {
        let launcher = FakeLauncher::new();

        let (main, main_link) = fake_player();
        main.push_startup_replies(1280, 720);
        launcher.add("movie.mkv", main_link);
        launcher.add_error("movie.eng.mkv");

        let mut pool = PlayerPool::new(Arc::clone(&launcher) as Arc<dyn SpawnPlayer>);
        pool.open(
            Path::new("movie.mkv"),
            &[PathBuf::from("movie.eng.mkv")],
            0,
            &mut window_outputs(),
        )
        .unwrap();

        wait_for(&mut pool, |pool, _| {
            pool.state() == PoolState::Opened && pool.tracks.len() == 1
        });
        assert!(pool.opened());
    }

    #[test]
    fn test_switch_to_alternate_pauses_and_captures_position() {
        let (mut pool, main, alt, _launcher) = opened_pool();

        // The switch asks the primary whether it is paused, pauses it, and
        // captures its position. The alternate is only resumed.
        main.push("ANS_pause=no");
        main.push("ANS_time_pos=45.000");
        pool.switch_alternative();

        let main_written = pool_written_tail(&main, 3);
        assert_eq!(
            main_written,
            [
                "pausing_keep_force get_property pause",
                "pause",
                "pausing_keep_force get_property time_pos",
            ]
        );

        let alt_written = alt.written();
        assert_eq!(alt_written.last().map(String::as_str), Some("pause"));
        assert!(!alt_written.iter().any(|line| line.starts_with("seek")));

        // Switching back re-syncs the primary with an absolute seek.
        alt.push("ANS_pause=yes");
        pool.switch_alternative();
        assert_eq!(main.written().last().map(String::as_str), Some("seek 45 2"));
    }

    fn pool_written_tail(handle: &FakeHandle, n: usize) -> Vec<String> {
        let written = handle.written();
        written[written.len() - n..].to_vec()
    }

    #[test]
    fn test_next_and_previous_alternative_cycle() {
        let (mut pool, main, alt, _launcher) = opened_pool();

        main.push("ANS_pause=no");
        main.push("ANS_time_pos=1.000");
        pool.next_alternative();
        assert_eq!(pool.cur_id, 1);

        // With a single alternate, cycling in either direction stays on it.
        alt.push("ANS_pause=yes");
        pool.next_alternative();
        assert_eq!(pool.cur_id, 1);

        alt.push("ANS_pause=yes");
        pool.previous_alternative();
        assert_eq!(pool.cur_id, 1);
    }

    #[test]
    fn test_position_is_forwarded_only_for_the_active_primary() {
        let (mut pool, main, alt, _launcher) = opened_pool();

        main.push("ANS_time_pos=2.000");
        alt.push("ANS_time_pos=9.000");
        pool.poll_position();

        let events = wait_for(&mut pool, |_, events| {
            events.iter().any(|e| matches!(e, PoolEvent::PositionChanged(_)))
        });
        let positions: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, PoolEvent::PositionChanged(_)))
            .collect();
        assert_eq!(positions, [&PoolEvent::PositionChanged(2000)]);
    }

    #[test]
    fn test_primary_eof_reports_finished() {
        let (mut pool, main, _alt, _launcher) = opened_pool();

        // The primary's process exits; the next position poll runs into EOF
        // and the pool reports the movie as finished.
        main.push_eof();
        pool.poll_position();

        let events = wait_for(&mut pool, |pool, _| pool.state() == PoolState::Finished);
        assert!(events.iter().any(|e| *e == PoolEvent::Finished));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut pool, main, alt, _launcher) = opened_pool();

        pool.close();
        assert!(!pool.opened());
        assert!(main.terminated());
        assert!(alt.terminated());

        pool.close();
        assert_eq!(pool.state(), PoolState::Closed);
    }
}
