//! Capture domain: public API.
//!
//! `CaptureOrchestrator` wires hotkey triggers to clipboard extraction. The
//! key-event path only decides whether a chord fired; each trigger becomes
//! an independent task on the tokio runtime that waits out the settle
//! delay, reads the clipboard on a blocking thread and hands any image to
//! the caller's callback.
//!
//! After `stop()` returns, no new task is scheduled and no callback starts.
//! A callback already running when `stop()` is called holds it until the
//! callback returns. Tasks are not aborted; `wait_idle()` joins whatever is
//! still outstanding.

mod sink;

pub use sink::{ImageSink, SinkError};

use crate::bitmap::DecodedImage;
use crate::clipboard::ClipboardImageExtractor;
use crate::hotkey::{HotkeyDetector, KeyCode, Trigger};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Receives each captured image. Called from a blocking worker thread.
///
/// The callback must not call [`CaptureOrchestrator::stop`]; `stop` waits for
/// running callbacks and would never return.
pub type ImageCallback = Arc<dyn Fn(DecodedImage) + Send + Sync>;

pub struct CaptureOrchestrator {
    detector: Arc<HotkeyDetector>,
    extractor: Arc<ClipboardImageExtractor>,
    settle_delay: Duration,
    running: Arc<AtomicBool>,
    /// Readers are callbacks in progress; `stop` takes it for writing.
    delivery: Arc<RwLock<()>>,
    runtime: Handle,
    on_image: ImageCallback,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl CaptureOrchestrator {
    pub fn new<F>(
        detector: Arc<HotkeyDetector>,
        extractor: ClipboardImageExtractor,
        runtime: Handle,
        on_image: F,
    ) -> Self
    where
        F: Fn(DecodedImage) + Send + Sync + 'static,
    {
        Self {
            detector,
            extractor: Arc::new(extractor),
            settle_delay: DEFAULT_SETTLE_DELAY,
            running: Arc::new(AtomicBool::new(false)),
            delivery: Arc::new(RwLock::new(())),
            runtime,
            on_image: Arc::new(on_image),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn detector(&self) -> &Arc<HotkeyDetector> {
        &self.detector
    }

    /// Starts detection with an empty keyboard state.
    pub fn start(&self) {
        self.detector.start();
        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "[CAPTURE] Orchestrator started (settle delay {}ms)",
            self.settle_delay.as_millis()
        );
    }

    /// Stops scheduling captures and suppresses delivery from tasks still
    /// in flight.
    ///
    /// Blocks until any callback already in progress returns; no callback
    /// starts afterwards. Outstanding tasks are not awaited; see
    /// [`wait_idle`](Self::wait_idle).
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.detector.stop();
        // Every delivery checks `running` under the read side.
        drop(match self.delivery.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        });
        log::info!("[CAPTURE] Orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Feeds one key event from the listener. Never blocks: a fired chord
    /// only schedules a task. Returns true if a capture was scheduled.
    pub fn handle_key_event(&self, code: &KeyCode, is_press: bool) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.detector.handle_key_event(code, is_press) {
            Some(trigger) => {
                self.schedule(trigger);
                true
            }
            None => false,
        }
    }

    /// Number of capture tasks that have not finished yet.
    pub fn pending_tasks(&self) -> usize {
        let mut pending = self.pending_slot();
        pending.retain(|task| !task.is_finished());
        pending.len()
    }

    /// Waits for every capture task scheduled so far.
    pub async fn wait_idle(&self) {
        let tasks = std::mem::take(&mut *self.pending_slot());
        for task in tasks {
            if let Err(e) = task.await {
                log::error!("[CAPTURE] Capture task failed: {}", e);
            }
        }
    }

    fn schedule(&self, trigger: Trigger) {
        let extractor = Arc::clone(&self.extractor);
        let running = Arc::clone(&self.running);
        let delivery = Arc::clone(&self.delivery);
        let on_image = Arc::clone(&self.on_image);
        let delay = self.settle_delay;

        log::debug!("[CAPTURE] Scheduling capture for {} at {}ms", trigger.chord, trigger.at_ms);

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !running.load(Ordering::SeqCst) {
                log::debug!("[CAPTURE] Stopped during settle delay; skipping read");
                return;
            }

            let image = match tokio::task::spawn_blocking(move || extractor.extract()).await {
                Ok(Some(image)) => image,
                Ok(None) => return,
                Err(e) => {
                    log::error!("[CAPTURE] Clipboard read task failed: {}", e);
                    return;
                }
            };

            let delivered = tokio::task::spawn_blocking(move || {
                let _delivering = match delivery.read() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if !running.load(Ordering::SeqCst) {
                    log::debug!("[CAPTURE] Stopped before delivery; dropping image");
                    return;
                }
                on_image(image);
            })
            .await;
            if let Err(e) = delivered {
                log::error!("[CAPTURE] Image callback panicked: {}", e);
            }
        });

        let mut pending = self.pending_slot();
        pending.retain(|task| !task.is_finished());
        pending.push(task);
    }

    fn pending_slot(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
