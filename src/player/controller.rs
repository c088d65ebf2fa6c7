use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::player::error::PlayerError;
use crate::player::movie::Movie;
use crate::player::process::{player_args, PlayerLink, SpawnPlayer, VideoOutput};

/// Bound on every protocol read. The player answers property queries within
/// milliseconds, so expiry is treated as a closed connection.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of one backing player process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Stopped,
    Staging,
    Running,
}

/// Notifications the controller delivers to the UI thread.
///
/// They are queued over an mpsc channel and must be drained by the receiver's
/// run loop; the controller never calls back into the UI directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The player started and the movie is playing.
    Started,
    /// The player failed to start, with a user-presentable reason.
    Failed(String),
    /// A running player has been torn down.
    Terminated,
    /// Current position in the playing movie, in milliseconds.
    PositionChanged(i64),
}

struct StateCell {
    state: State,
    movie: Option<Movie>,
    osd_displaying: bool,
}

struct ControllerShared {
    /// The state machine. Held only for short, non-blocking sections; all
    /// process I/O happens after it is released.
    cell: Mutex<StateCell>,
    /// The control connection. Doubles as the command lock: protocol I/O
    /// happens while holding it, so at most one query is ever in flight.
    link: Mutex<Option<Box<dyn PlayerLink>>>,
    events: Sender<PlayerEvent>,
}

/// Controls one player process.
///
/// `run()` spawns a background worker that performs the whole startup
/// sequence (spawn, initial pause, movie-property handshake) and commits the
/// Staging -> Running transition only if no concurrent `terminate()` was
/// observed in between. A controller never runs two processes at once.
pub struct PlayerController {
    shared: Arc<ControllerShared>,
    launcher: Arc<dyn SpawnPlayer>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PlayerController {
    pub fn new(launcher: Arc<dyn SpawnPlayer>) -> (Self, Receiver<PlayerEvent>) {
        let (events, receiver) = mpsc::channel();

        let controller = Self {
            shared: Arc::new(ControllerShared {
                cell: Mutex::new(StateCell {
                    state: State::Stopped,
                    movie: None,
                    osd_displaying: false,
                }),
                link: Mutex::new(None),
                events,
            }),
            launcher,
            worker: Mutex::new(None),
        };

        (controller, receiver)
    }

    /// Starts the player for a movie. Non-blocking; the outcome arrives as a
    /// `Started` or `Failed` event.
    pub fn run(
        &self,
        movie_path: &Path,
        start_from: u64,
        paused: bool,
        output: VideoOutput,
    ) -> Result<(), PlayerError> {
        {
            let mut cell = self.shared.cell.lock().unwrap();
            if cell.state != State::Stopped {
                return Err(PlayerError::AlreadyRunning);
            }
            cell.state = State::Staging;
            cell.osd_displaying = false;
        }

        // A previous worker has finished its startup sequence by now (the
        // state it left behind was Stopped), so this join is immediate.
        let mut worker = self.worker.lock().unwrap();
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }

        let shared = Arc::clone(&self.shared);
        let launcher = Arc::clone(&self.launcher);
        let movie_path = movie_path.to_path_buf();

        let handle = thread::Builder::new()
            .name("player worker".to_string())
            .spawn(move || run_worker(shared, launcher, movie_path, start_from, paused, output));

        match handle {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.cell.lock().unwrap().state = State::Stopped;
                Err(PlayerError::Spawn(e.to_string()))
            }
        }
    }

    /// Checks whether the player is running (the state in which it accepts
    /// commands).
    pub fn running(&self) -> bool {
        self.shared.cell.lock().unwrap().state == State::Running
    }

    /// Returns the movie that is playing at this moment.
    pub fn movie(&self) -> Option<Movie> {
        self.shared.cell.lock().unwrap().movie.clone()
    }

    /// Toggles pause.
    pub fn pause(&self) -> Result<(), PlayerError> {
        self.ensure_running()?;
        self.send_command("pause")
    }

    /// Seeks by (or to, when `absolute`) the specified number of seconds.
    pub fn seek(&self, seconds: f64, absolute: bool) -> Result<(), PlayerError> {
        self.ensure_running()?;
        self.send_command(&format!("seek {} {}", seconds, if absolute { 2 } else { 0 }))
    }

    /// Changes the volume by the specified amount.
    pub fn volume(&self, delta: i64) -> Result<(), PlayerError> {
        self.ensure_running()?;
        self.send_command(&format!("volume {} 0", delta))
    }

    /// Toggles the OSD displaying.
    pub fn osd_toggle(&self) -> Result<(), PlayerError> {
        self.ensure_running()?;

        let command = {
            let mut cell = self.shared.cell.lock().unwrap();
            let command = if cell.osd_displaying { "osd 1" } else { "osd 3" };
            cell.osd_displaying = !cell.osd_displaying;
            command
        };

        self.send_command(command)
    }

    /// Returns the current position in the playing movie, in milliseconds.
    pub fn cur_pos(&self) -> Result<i64, PlayerError> {
        let pos: f64 = self.get_property("time_pos", true)?;
        Ok((pos * 1000.0) as i64)
    }

    /// Checks whether the player is paused.
    pub fn paused(&self) -> Result<bool, PlayerError> {
        let value: String = self.get_property("pause", true)?;
        Ok(value == "yes")
    }

    /// Periodic status hook. Emits `PositionChanged` while running; errors
    /// caused by the player terminating under our feet are swallowed.
    pub fn poll_position(&self) {
        if !self.running() {
            return;
        }

        match self.cur_pos() {
            Ok(pos) => {
                let _ = self.shared.events.send(PlayerEvent::PositionChanged(pos));
            }
            Err(e) => {
                if self.running() {
                    log::error!("Player status update failed: {}.", e);
                }
            }
        }
    }

    /// Tears the player down. Safe to call from any state and idempotent;
    /// `Terminated` fires only when a running player was actually stopped.
    pub fn terminate(&self) {
        let prev = {
            let mut cell = self.shared.cell.lock().unwrap();
            let prev = cell.state;
            cell.state = State::Stopped;
            cell.movie = None;
            cell.osd_displaying = false;
            prev
        };

        if let Some(mut link) = self.shared.link.lock().unwrap().take() {
            link.terminate();
        }

        if prev == State::Running {
            let _ = self.shared.events.send(PlayerEvent::Terminated);
        }
    }

    fn ensure_running(&self) -> Result<(), PlayerError> {
        if self.running() {
            Ok(())
        } else {
            Err(PlayerError::NotRunning)
        }
    }

    fn send_command(&self, command: &str) -> Result<(), PlayerError> {
        log::debug!("Sending '{}' command to the player...", command);

        let result = match self.shared.link.lock().unwrap().as_mut() {
            Some(link) => link.write_line(command),
            None => return Err(PlayerError::NotRunning),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                log::debug!("Error while sending a command to the player: {}.", e);
                // Assuming that the player terminated because the movie
                // finished.
                self.terminate();
                Err(PlayerError::ConnectionClosed)
            }
        }
    }

    fn get_property<T: FromStr>(&self, name: &str, force_pausing: bool) -> Result<T, PlayerError> {
        self.ensure_running()?;

        let result = match self.shared.link.lock().unwrap().as_mut() {
            Some(link) => query_property(link.as_mut(), name, force_pausing),
            None => return Err(PlayerError::NotRunning),
        };

        match result {
            Err(PlayerError::ConnectionClosed) => {
                self.terminate();
                Err(PlayerError::ConnectionClosed)
            }
            other => other,
        }
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        self.terminate();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// One synchronous property query over the control protocol. Lines that are
/// not `ANS_` replies are playback log noise and are passed through to our
/// own stdout.
fn query_property<T: FromStr>(
    link: &mut dyn PlayerLink,
    name: &str,
    force_pausing: bool,
) -> Result<T, PlayerError> {
    let command = format!(
        "{}get_property {}",
        if force_pausing { "pausing_keep_force " } else { "" },
        name
    );

    if let Err(e) = link.write_line(&command) {
        log::debug!("Error while sending a command to the player: {}.", e);
        return Err(PlayerError::ConnectionClosed);
    }

    let reply_prefix = format!("ANS_{}=", name);

    loop {
        let line = match link.read_line(QUERY_TIMEOUT) {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::debug!("Unexpected end of file while reading a player response.");
                return Err(PlayerError::ConnectionClosed);
            }
            Err(e) => {
                log::debug!("Error while reading a command response from the player: {}.", e);
                return Err(PlayerError::ConnectionClosed);
            }
        };

        if let Some(value) = line.strip_prefix(&reply_prefix) {
            let value = value.trim_end();
            return value.parse().map_err(|_| {
                log::error!("Property {} has an invalid value '{}'.", name, value);
                PlayerError::Internal(format!("property {} has an invalid value '{}'", name, value))
            });
        }

        if line.starts_with("ANS_") {
            log::error!("Invalid response for property {} received: {}.", name, line);
            return Err(PlayerError::Internal(format!(
                "unexpected response for property {}: {}",
                name, line
            )));
        }

        println!("{}", line);
    }
}

/// The startup sequence, executed entirely off the UI thread.
fn run_worker(
    shared: Arc<ControllerShared>,
    launcher: Arc<dyn SpawnPlayer>,
    movie_path: PathBuf,
    start_from: u64,
    paused: bool,
    output: VideoOutput,
) {
    let args = player_args(&movie_path, start_from, &output);
    log::debug!("Running the player: {:?}.", args);

    let mut link = match launcher.spawn(&args) {
        Ok(link) => link,
        Err(e) => {
            log::error!("Unable to start the player: {}.", e);
            fail(&shared, format!("Unable to start the player: {}.", e));
            return;
        }
    };

    if paused {
        // Written before anything reads stdout, so it cannot race a query.
        if let Err(e) = link.write_line("pause") {
            log::error!("The player failed to open '{}': {}.", movie_path.display(), e);
            link.terminate();
            fail(&shared, format!("The player failed to open '{}'.", movie_path.display()));
            return;
        }
    }

    // The movie dimensions double as the startup handshake: a player that
    // cannot open the movie exits without answering.
    let movie = query_property::<u32>(link.as_mut(), "width", true).and_then(|width| {
        let height = query_property::<u32>(link.as_mut(), "height", true)?;
        Ok(Movie::new(movie_path.clone(), width, height))
    });

    let movie = match movie {
        Ok(movie) => movie,
        Err(e) => {
            log::error!("The player failed to open '{}': {}.", movie_path.display(), e);
            link.terminate();
            fail(&shared, format!("The player failed to open '{}'.", movie_path.display()));
            return;
        }
    };

    let mut cell = shared.cell.lock().unwrap();
    if cell.state == State::Staging {
        cell.movie = Some(movie);
        cell.state = State::Running;
        *shared.link.lock().unwrap() = Some(link);
        drop(cell);

        log::debug!("We successfully started the player for movie '{}'.", movie_path.display());
        let _ = shared.events.send(PlayerEvent::Started);
    } else {
        // A concurrent terminate() won the race; the process must not
        // outlive it.
        drop(cell);
        link.terminate();
    }
}

fn fail(shared: &ControllerShared, error: String) {
    let mut cell = shared.cell.lock().unwrap();
    if cell.state != State::Staging {
        log::debug!("Ignoring the startup failure: the player is already stopped.");
        return;
    }

    cell.state = State::Stopped;
    drop(cell);

    let _ = shared.events.send(PlayerEvent::Failed(error));
}
