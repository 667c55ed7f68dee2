//! clipshot: save the clipboard image with a global hotkey.
//!
//! This is the app shell that wires together:
//! - Hotkey detection (hotkey/)
//! - Clipboard image extraction (clipboard/, bitmap/)
//! - Capture scheduling and the PNG sink (capture/)
//! - Settings and their live reload (config.rs)

pub mod bitmap;
pub mod capture;
pub mod clipboard;
pub mod config;
pub mod hotkey;

#[cfg(feature = "global-listener")]
use capture::{CaptureOrchestrator, ImageSink};
#[cfg(feature = "global-listener")]
use clipboard::ClipboardImageExtractor;
#[cfg(feature = "global-listener")]
use hotkey::{ChordConfig, HotkeyDetector, KeyChord};
#[cfg(feature = "global-listener")]
use std::sync::Arc;
#[cfg(feature = "global-listener")]
use std::time::Duration;

/// Entry point for the `clipshot` binary.
///
/// `clipshot` listens until the process exits. `clipshot --record` waits for
/// one chord, prints it with its settings fragment and exits.
#[cfg(feature = "global-listener")]
pub fn run() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let record = std::env::args().skip(1).any(|arg| arg == "--record");
    let settings = config::load();

    let chord_config = settings.chord_config().unwrap_or_else(|e| {
        let fallback = KeyChord::default();
        log::warn!("[CONFIG] Invalid shortcut ({}), falling back to {}", e, fallback);
        ChordConfig::new(fallback, Duration::from_millis(settings.debounce_interval_ms))
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;
    let detector = Arc::new(HotkeyDetector::new(chord_config));

    if record {
        return record_chord(detector, &runtime);
    }

    let extractor = ClipboardImageExtractor::system().with_open_attempts(settings.open_attempts);
    let sink = ImageSink::new(&settings.save_folder);
    let orchestrator = CaptureOrchestrator::new(
        Arc::clone(&detector),
        extractor,
        runtime.handle().clone(),
        sink.into_callback(),
    )
    .with_settle_delay(settings.settle_delay());

    orchestrator.start();
    runtime.spawn(config::watch(
        config::config_path(),
        Arc::clone(&detector),
        config::RELOAD_INTERVAL,
    ));
    log::info!(
        "clipshot ready: {} saves the clipboard image to {}",
        detector.config().chord,
        settings.save_folder.display()
    );

    hotkey::listen(move |code, is_press| {
        orchestrator.handle_key_event(&code, is_press);
    })?;
    Ok(())
}

/// Records one chord from the live keyboard and prints it.
#[cfg(feature = "global-listener")]
fn record_chord(detector: Arc<HotkeyDetector>, runtime: &tokio::runtime::Runtime) -> Result<(), AppError> {
    detector.start();
    let recorded = detector.start_recording();
    println!("Press the new shortcut (modifiers first, then the key)...");

    runtime.spawn(async move {
        let Ok(chord) = recorded.await else {
            return;
        };
        println!("Recorded: {}", chord);
        match config::ShortcutConfig::from_chord(&chord).to_json_fragment() {
            Ok(fragment) => {
                println!("Add this to {}:", config::config_path().display());
                println!("{}", fragment);
            }
            Err(e) => log::error!("[CONFIG] Failed to format shortcut: {}", e),
        }
        std::process::exit(0);
    });

    hotkey::listen(move |code, is_press| {
        detector.handle_key_event(&code, is_press);
    })?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "global-listener")]
    #[error(transparent)]
    Listen(#[from] hotkey::ListenError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
