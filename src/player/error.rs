use thiserror::Error;

/// Errors produced by the playback controller and its process handle.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The player binary failed to launch.
    #[error("unable to start the player: {0}")]
    Spawn(String),

    /// A running-only operation was invoked while the player was stopped or
    /// still staging.
    #[error("the player is not running")]
    NotRunning,

    /// `run()` was invoked while a previous run is still alive.
    #[error("the player is already running")]
    AlreadyRunning,

    /// EOF on the player's stdout or a write failure on its stdin. While a
    /// movie is playing this is interpreted as "the movie finished".
    #[error("the movie finished")]
    ConnectionClosed,

    /// The player sent a malformed or out-of-sequence protocol reply.
    #[error("internal player error: {0}")]
    Internal(String),
}
