//! Clipboard access through `arboard` for non-Windows platforms.
//!
//! arboard hands back decoded RGBA rather than raw formats, so `open` takes
//! a snapshot of the clipboard image and serves it as the "PNG" encoded
//! format until the matching `close`. Overlapping acquisitions share the
//! snapshot taken by the first one, and it is dropped when the last one
//! closes. Raw bitmap records and file lists are never reported on these
//! platforms.

use super::access::{ClipboardAccess, ClipboardError, ClipboardFormat};
use crate::bitmap::DecodedImage;
use std::sync::{Mutex, MutexGuard};

const PNG_FORMAT: &str = "PNG";

/// Open acquisitions and the image they all see.
#[derive(Debug, Default)]
struct Session {
    holders: usize,
    image: Option<DecodedImage>,
}

#[derive(Debug, Default)]
pub struct PortableClipboard {
    session: Mutex<Session>,
}

impl PortableClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one acquisition; only the first takes a snapshot.
    fn open_with<F>(&self, snapshot: F) -> Result<(), ClipboardError>
    where
        F: FnOnce() -> Result<Option<DecodedImage>, ClipboardError>,
    {
        let mut session = self.session();
        if session.holders == 0 {
            session.image = snapshot()?;
        }
        session.holders += 1;
        Ok(())
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_snapshot() -> Result<Option<DecodedImage>, ClipboardError> {
        let mut clipboard = arboard::Clipboard::new().map_err(open_error)?;

        match clipboard.get_image() {
            Ok(data) => {
                let width = data.width as u32;
                let height = data.height as u32;
                let image = DecodedImage::from_rgba(width, height, data.bytes.into_owned());
                if image.is_none() {
                    log::warn!(
                        "[CLIPBOARD] Clipboard image {}x{} has inconsistent pixel data",
                        width,
                        height
                    );
                }
                Ok(image)
            }
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(arboard::Error::ClipboardOccupied) => Err(ClipboardError::Locked),
            Err(e) => {
                log::debug!("[CLIPBOARD] get_image failed: {}", e);
                Ok(None)
            }
        }
    }

    fn holds_png(&self, format: &ClipboardFormat) -> bool {
        matches!(format, ClipboardFormat::EncodedImage(name) if name == PNG_FORMAT)
    }
}

fn open_error(e: arboard::Error) -> ClipboardError {
    match e {
        arboard::Error::ClipboardOccupied => ClipboardError::Locked,
        other => ClipboardError::Read(other.to_string()),
    }
}

impl ClipboardAccess for PortableClipboard {
    fn open(&self) -> Result<(), ClipboardError> {
        self.open_with(Self::take_snapshot)
    }

    fn close(&self) {
        let mut session = self.session();
        session.holders = session.holders.saturating_sub(1);
        if session.holders == 0 {
            session.image = None;
        }
    }

    fn is_format_available(&self, format: &ClipboardFormat) -> bool {
        self.holds_png(format) && self.session().image.is_some()
    }

    fn get_data(&self, format: &ClipboardFormat) -> Result<Vec<u8>, ClipboardError> {
        if !self.holds_png(format) {
            return Err(ClipboardError::FormatUnavailable(format!("{:?}", format)));
        }
        let session = self.session();
        let image = session
            .image
            .as_ref()
            .ok_or_else(|| ClipboardError::FormatUnavailable(PNG_FORMAT.to_string()))?;
        image
            .to_png_bytes()
            .map_err(|e| ClipboardError::Read(format!("PNG encode failed: {}", e)))
    }
}
