//! Scripted in-process player doubles for controller and pool tests.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::player::process::{PlayerLink, SpawnPlayer};

pub struct FakeLink {
    lines: mpsc::Receiver<Option<String>>,
    written: Arc<Mutex<Vec<String>>>,
    fail_writes: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
}

impl PlayerLink for FakeLink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin is closed"));
        }
        self.written.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => Ok(line),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// Test-side view of a fake link: feeds scripted replies and observes what
/// the controller wrote.
pub struct FakeHandle {
    lines: mpsc::Sender<Option<String>>,
    written: Arc<Mutex<Vec<String>>>,
    fail_writes: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
}

impl FakeHandle {
    pub fn push(&self, line: &str) {
        self.lines.send(Some(line.to_string())).unwrap();
    }

    pub fn push_eof(&self) {
        self.lines.send(None).unwrap();
    }

    pub fn push_startup_replies(&self, width: u32, height: u32) {
        self.push(&format!("ANS_width={}", width));
        self.push(&format!("ANS_height={}", height));
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

pub fn fake_player() -> (FakeHandle, Box<dyn PlayerLink>) {
    let (tx, rx) = mpsc::channel();
    let written = Arc::new(Mutex::new(Vec::new()));
    let fail_writes = Arc::new(AtomicBool::new(false));
    let terminated = Arc::new(AtomicBool::new(false));

    let handle = FakeHandle {
        lines: tx,
        written: Arc::clone(&written),
        fail_writes: Arc::clone(&fail_writes),
        terminated: Arc::clone(&terminated),
    };
    let link = Box::new(FakeLink {
        lines: rx,
        written,
        fail_writes,
        terminated,
    });

    (handle, link)
}

/// Scripted links are keyed by movie path: workers of different controllers
/// spawn their processes concurrently, so arrival order is not deterministic.
pub struct FakeLauncher {
    links: Mutex<HashMap<String, io::Result<Box<dyn PlayerLink>>>>,
    args: Mutex<HashMap<String, Vec<String>>>,
    spawns: AtomicUsize,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            links: Mutex::new(HashMap::new()),
            args: Mutex::new(HashMap::new()),
            spawns: AtomicUsize::new(0),
        })
    }

    pub fn add(&self, movie_path: &str, link: Box<dyn PlayerLink>) {
        self.links.lock().unwrap().insert(movie_path.to_string(), Ok(link));
    }

    pub fn add_error(&self, movie_path: &str) {
        self.links.lock().unwrap().insert(
            movie_path.to_string(),
            Err(io::Error::new(io::ErrorKind::NotFound, "no such binary")),
        );
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Argument vector the given movie was spawned with.
    pub fn args_for(&self, movie_path: &str) -> Option<Vec<String>> {
        self.args.lock().unwrap().get(movie_path).cloned()
    }
}

impl SpawnPlayer for FakeLauncher {
    fn spawn(&self, args: &[String]) -> io::Result<Box<dyn PlayerLink>> {
        self.spawns.fetch_add(1, Ordering::SeqCst);

        // The movie path is always the last argument.
        let movie_path = args.last().cloned().unwrap_or_default();
        self.args.lock().unwrap().insert(movie_path.clone(), args.to_vec());

        self.links
            .lock()
            .unwrap()
            .remove(&movie_path)
            .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::NotFound, "no scripted link")))
    }
}
