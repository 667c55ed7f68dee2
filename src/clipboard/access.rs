//! Clipboard collaborator contract and scoped acquisition.
//!
//! The OS clipboard is a process-external exclusive resource. Every reader
//! goes through `OpenClipboard`, which releases it from `Drop` so the
//! clipboard is closed on every exit path, including early returns and
//! panics inside the read.

use std::thread;
use std::time::Duration;

/// Formats the extractor knows how to ask for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClipboardFormat {
    /// A registered encoded-image format, by name (`"PNG"`).
    EncodedImage(String),
    /// Device-independent bitmap record (CF_DIB).
    RawBitmap,
    /// Legacy bitmap handle (CF_BITMAP). Probed, never read.
    LegacyBitmap,
    /// List of file paths (CF_HDROP).
    FileList,
}

/// The OS clipboard, as seen by the extractor.
///
/// Every call is fallible from the extractor's point of view. `open` may
/// fail because another process holds the clipboard; `close` must be safe
/// to call after a successful `open`.
pub trait ClipboardAccess: Send + Sync {
    fn open(&self) -> Result<(), ClipboardError>;
    fn close(&self);
    fn is_format_available(&self, format: &ClipboardFormat) -> bool;
    fn get_data(&self, format: &ClipboardFormat) -> Result<Vec<u8>, ClipboardError>;
}

/// An open clipboard. Closing happens in `Drop`.
pub struct OpenClipboard<'a> {
    access: &'a dyn ClipboardAccess,
}

impl<'a> OpenClipboard<'a> {
    /// Opens the clipboard, retrying while another process holds it.
    pub fn acquire(
        access: &'a dyn ClipboardAccess,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, ClipboardError> {
        let attempts = attempts.max(1);
        let mut last_err = ClipboardError::Locked;

        for attempt in 1..=attempts {
            match access.open() {
                Ok(()) => return Ok(Self { access }),
                Err(e) => {
                    log::debug!(
                        "[CLIPBOARD] Open failed (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        e
                    );
                    last_err = e;
                }
            }
            if attempt < attempts {
                thread::sleep(retry_delay);
            }
        }

        Err(last_err)
    }

    pub fn has(&self, format: &ClipboardFormat) -> bool {
        self.access.is_format_available(format)
    }

    pub fn read(&self, format: &ClipboardFormat) -> Result<Vec<u8>, ClipboardError> {
        self.access.get_data(format)
    }
}

impl Drop for OpenClipboard<'_> {
    fn drop(&mut self) {
        self.access.close();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("Clipboard is locked by another process")]
    Locked,

    #[error("Clipboard format not available: {0}")]
    FormatUnavailable(String),

    #[error("Clipboard read failed: {0}")]
    Read(String),
}
