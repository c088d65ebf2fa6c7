use std::fmt;
use std::path::{Path, PathBuf};

/// Information about a movie the player has opened. Immutable after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movie {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl Movie {
    pub fn new(path: PathBuf, width: u32, height: u32) -> Self {
        Self { path, width, height }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl fmt::Display for Movie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
