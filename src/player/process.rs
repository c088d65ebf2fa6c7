use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Interval at which a terminating process is polled for exit.
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a process is given to exit gracefully before it is killed.
const TERMINATE_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Where the player should render its video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutput {
    /// A native window id, passed to the player via `-wid`.
    Window(u64),
    /// A shared-memory framebuffer name for the corevideo output driver.
    SharedBuffer(String),
    /// No embedding; the player opens its own window. `-wid` must be omitted
    /// here: on X11 a zero id would make the player draw into the root
    /// window.
    OwnWindow,
}

/// Builds the argument vector for running the player in slave mode.
pub fn player_args(movie_path: &Path, start_from: u64, output: &VideoOutput) -> Vec<String> {
    let mut args = vec![
        "-framedrop".to_string(),
        "-slave".to_string(),
        "-quiet".to_string(),
        "-nosub".to_string(),
        "-noautosub".to_string(),
        "-input".to_string(),
        "nodefault-bindings".to_string(),
        "-noconfig".to_string(),
        "all".to_string(),
        "-ss".to_string(),
        start_from.to_string(),
    ];

    match output {
        VideoOutput::SharedBuffer(name) => {
            args.push("-ao".to_string());
            args.push("null".to_string());
            args.push("-vo".to_string());
            args.push(format!("corevideo:shared_buffer:rgb_only:buffer_name={}", name));
        }
        VideoOutput::Window(id) => {
            // Forcing the XV driver to disable VDPAU which may cause system
            // hang-ups. SDL audio output works around PulseAudio pausing bugs.
            args.push("-vo".to_string());
            args.push("xv".to_string());
            args.push("-ao".to_string());
            args.push("sdl".to_string());
            args.push("-wid".to_string());
            args.push(id.to_string());
        }
        VideoOutput::OwnWindow => {
            args.push("-vo".to_string());
            args.push("xv".to_string());
            args.push("-ao".to_string());
            args.push("sdl".to_string());
        }
    }

    args.push(movie_path.to_string_lossy().into_owned());
    args
}

/// A line-oriented control connection to a running player process.
///
/// The controller is the only owner of a link, so all reads and writes are
/// naturally serialized through it.
pub trait PlayerLink: Send {
    /// Writes one command line (newline appended) to the player's stdin.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Reads one line from the player's stdout, without the trailing newline.
    /// Returns `None` on end of stream. A `TimedOut` error means the player
    /// produced nothing within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>>;

    /// Tears the process down. Idempotent; an already-exited process is not
    /// an error.
    fn terminate(&mut self);
}

/// Spawns player processes. The seam that lets tests substitute a scripted
/// in-process link for a real child process.
pub trait SpawnPlayer: Send + Sync {
    fn spawn(&self, args: &[String]) -> io::Result<Box<dyn PlayerLink>>;
}

/// Launches the real player binary with piped stdin/stdout.
pub struct MplayerLauncher {
    binary_path: PathBuf,
}

impl MplayerLauncher {
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }
}

impl SpawnPlayer for MplayerLauncher {
    fn spawn(&self, args: &[String]) -> io::Result<Box<dyn PlayerLink>> {
        let child = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        Ok(Box::new(MplayerProcess::new(child)?))
    }
}

/// A running player process.
///
/// Stdout is drained by a dedicated reader thread feeding an mpsc channel,
/// which is what makes a bounded `read_line` timeout possible on top of
/// blocking pipe I/O.
pub struct MplayerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: mpsc::Receiver<io::Result<String>>,
    reader: Option<thread::JoinHandle<()>>,
}

impl MplayerProcess {
    pub fn new(mut child: Child) -> io::Result<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "player stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "player stdout is not piped"))?;

        let (tx, rx) = mpsc::channel();
        let reader = thread::Builder::new()
            .name("player reader".to_string())
            .spawn(move || {
                let mut stdout = BufReader::new(stdout);
                loop {
                    let mut line = String::new();
                    match stdout.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            while line.ends_with('\n') || line.ends_with('\r') {
                                line.pop();
                            }
                            if tx.send(Ok(line)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            break;
                        }
                    }
                }
            })
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            lines: rx,
            reader: Some(reader),
        })
    }

    fn exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

impl PlayerLink for MplayerProcess {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "player stdin is closed"))?;

        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        match self.lines.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(Some(line)),
            Ok(Err(e)) => Err(e),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "timed out waiting for the player's output",
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn terminate(&mut self) {
        let pid = self.child.id();
        log::debug!("Killing the player process {}...", pid);

        // Closing stdin asks a slave-mode player to quit by itself.
        self.stdin.take();

        let deadline = Instant::now() + TERMINATE_GRACE_PERIOD;
        let mut exited = false;

        loop {
            if self.exited() {
                exited = true;
                break;
            }

            if Instant::now() >= deadline {
                break;
            }

            #[cfg(unix)]
            unsafe {
                if libc::kill(pid as libc::pid_t, libc::SIGTERM) != 0 {
                    let err = io::Error::last_os_error();
                    if err.raw_os_error() == Some(libc::ESRCH) {
                        // Already gone; reap it below.
                        break;
                    }
                    log::error!("Unable to kill the player process {}: {}.", pid, err);
                    break;
                }
            }

            thread::sleep(TERMINATE_POLL_INTERVAL);
        }

        if !exited && !self.exited() {
            log::debug!("Killing the player process {} with SIGKILL...", pid);
            if let Err(e) = self.child.kill() {
                log::error!("Unable to kill the player process {}: {}.", pid, e);
            }
        }

        if let Err(e) = self.child.wait() {
            log::error!("Unable to reap the player process {}: {}.", pid, e);
        }

        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for MplayerProcess {
    fn drop(&mut self) {
        if self.reader.is_some() {
            self.terminate();
        }
    }
}
