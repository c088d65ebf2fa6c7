mod core;
mod gui;
mod hotkeys;
mod player;
mod subtitles;

use std::path::PathBuf;

use clap::Parser;
use eframe::egui;

use crate::core::{AppConfig, APP_NAME};
use gui::TeeViewApp;

/// A minimalistic media player for watching videos with alternate audio
/// tracks and external subtitles.
#[derive(Parser, Debug)]
#[command(name = crate::core::APP_UNIX_NAME, version, about)]
struct Cli {
    /// Enable debug logging.
    #[arg(short = 'd', long = "debug-mode")]
    debug_mode: bool,

    /// Path to the movie to play.
    movie_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    // Exit code 1 on bad arguments; --help and --version still exit with 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.debug_mode { "debug" } else { "info" }),
    )
    .format_timestamp_millis()
    .init();

    let config = AppConfig::load()?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 480.0])
            .with_title(APP_NAME),
        ..Default::default()
    };

    let movie_path = cli.movie_path;
    eframe::run_native(
        APP_NAME,
        options,
        Box::new(move |cc| {
            match TeeViewApp::new(cc, config, movie_path) {
                Ok(app) => Ok(Box::new(app)),
                Err(e) => {
                    eprintln!("Failed to initialize app: {}", e);
                    std::process::exit(1);
                }
            }
        }),
    ).map_err(|e| anyhow::anyhow!("Failed to run app: {}", e))?;

    Ok(())
}
