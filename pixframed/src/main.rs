use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use clap::Parser;
use pixframe::prelude::*;

#[derive(Debug, Parser)]
#[command(version, about = "Streams GIF animations to an LED matrix")]
struct Args {
    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the GIF sources.
    #[arg(long)]
    gifs_dir: Option<PathBuf>,

    /// Where display settings are saved between runs.
    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long)]
    osc_port: Option<u16>,

    /// Show frames at refresh_hz / divisor.
    #[arg(long)]
    divisor: Option<u32>,

    /// Do not reload a source when its file changes on disk.
    #[arg(long)]
    no_watch: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,

    /// Animation to show at startup instead of the saved one.
    source: Option<String>,
}

fn main() {
    let args = Args::parse();
    init_logger_with(if args.verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    });

    if let Err(err) = run(args) {
        error!("pixframed failed: {}", err);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<AppConfig, DisplayError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    if let Some(dir) = &args.gifs_dir {
        config.gifs_dir = dir.clone();
    }
    if let Some(path) = &args.settings {
        config.settings_path = Some(path.clone());
    }
    if let Some(port) = args.osc_port {
        config.osc_port = port;
    }
    if let Some(divisor) = args.divisor {
        config.playback.framerate_divisor = divisor;
    }
    if args.no_watch {
        config.watch_sources = false;
    }

    config.playback.validate()?;
    Ok(config)
}

#[cfg(feature = "hardware")]
fn canvas_factory(config: &AppConfig) -> CanvasFactory {
    pixframe::render::led_matrix::LedMatrixCanvas::factory(
        config.panel.clone(),
    )
}

#[cfg(not(feature = "hardware"))]
fn canvas_factory(config: &AppConfig) -> CanvasFactory {
    let (width, height) = config.panel.dimensions();
    warn!("Built without the hardware feature, using a headless canvas");
    HeadlessCanvas::factory(width, height, config.panel.refresh_hz)
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    debug!("Config: {:?}", config);

    let store = JsonSettingsStore::new(config.settings_path());
    let settings = store.load()?;
    info!(
        "Restored settings from {}: {:?}",
        store.path().display(),
        settings
    );

    let persister = Persister::spawn(store)?;
    let state = Arc::new(DisplayState::with_persister(settings, persister));

    if let Some(source) = &args.source {
        state.apply(Mutation::SetSource(source.clone()))?;
    }

    let decoder = GifDirectoryDecoder::new(&config.gifs_dir);
    let mut playback = PlaybackLoop::new(
        state.clone(),
        decoder,
        canvas_factory(&config),
        config.playback.clone(),
    );
    if config.watch_sources {
        match SourceWatch::start(config.gifs_dir.clone()) {
            Ok(watch) => playback = playback.with_watch(watch),
            Err(err) => warn!("{}; file changes will be ignored", err),
        }
    }

    let mut player = Player::spawn(playback)?;
    let surface = ControlSurface::new(state.clone());
    let observer = player
        .events()
        .map(|events| surface.observe(events))
        .transpose()?;

    let mut osc = OscControlServer::new(surface);
    osc.start(config.osc_port)?;

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    loop {
        match stop_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(()) => {
                info!("Shutdown requested");
                break;
            }
            Err(RecvTimeoutError::Timeout) if player.is_running() => {}
            Err(_) => break,
        }
    }

    osc.stop();
    let result = player.shutdown();
    state.flush();
    if let Some(observer) = observer {
        let _ = observer.join();
    }

    result?;
    info!("Display stopped cleanly");
    Ok(())
}
