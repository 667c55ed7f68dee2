//! Clipboard domain: public API.
//!
//! `ClipboardImageExtractor` answers one question: is there an image on the
//! clipboard right now, and if so, what are its pixels? Clipboard trouble
//! (locked, empty, unsupported format, undecodable data) is never an error
//! for the caller; it is "no image", with the reason kept in `Extraction`.

mod access;
#[cfg(not(target_os = "windows"))]
mod portable;
#[cfg(target_os = "windows")]
mod win32;

pub use access::{ClipboardAccess, ClipboardError, ClipboardFormat, OpenClipboard};
#[cfg(not(target_os = "windows"))]
pub use portable::PortableClipboard;
#[cfg(target_os = "windows")]
pub use win32::WindowsClipboard;

use crate::bitmap::{self, DecodedImage};
use std::time::Duration;

/// Registered encoded-image format names, in probe order.
pub const ENCODED_IMAGE_FORMATS: &[&str] = &["PNG", "image/png"];

pub const DEFAULT_OPEN_ATTEMPTS: u32 = 5;
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(10);

/// What the clipboard holds, by probe priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardFormatTag {
    EncodedImage(String),
    RawBitmap,
    FileList,
    None,
}

/// Outcome of one extraction attempt.
#[derive(Debug)]
pub enum Extraction {
    Image(DecodedImage),
    /// Files were copied, not image data.
    FileList,
    /// Only the legacy bitmap handle is present. Unsupported: any app that
    /// offers a usable bitmap also offers the raw bitmap record.
    LegacyBitmapOnly,
    /// The clipboard was readable but held no image format.
    NoImage,
    /// Another process held the clipboard for every attempt.
    Unavailable,
    /// Image data was present but could not be decoded.
    DecodeFailed(String),
}

impl Extraction {
    pub fn into_image(self) -> Option<DecodedImage> {
        match self {
            Extraction::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Extraction::Image(_))
    }
}

/// Bytes pulled out while the clipboard was open; decoded after closing.
enum Payload {
    Encoded(String, Vec<u8>),
    Raw(Vec<u8>),
    LegacyBitmap,
    FileList,
    Nothing,
}

pub struct ClipboardImageExtractor {
    access: Box<dyn ClipboardAccess>,
    open_attempts: u32,
}

impl ClipboardImageExtractor {
    pub fn new(access: Box<dyn ClipboardAccess>) -> Self {
        Self {
            access,
            open_attempts: DEFAULT_OPEN_ATTEMPTS,
        }
    }

    /// Extractor over the platform's clipboard.
    pub fn system() -> Self {
        #[cfg(target_os = "windows")]
        let access: Box<dyn ClipboardAccess> = Box::new(WindowsClipboard::new());
        #[cfg(not(target_os = "windows"))]
        let access: Box<dyn ClipboardAccess> = Box::new(PortableClipboard::new());

        Self::new(access)
    }

    /// How many times to try opening a locked clipboard (at least once).
    pub fn with_open_attempts(mut self, attempts: u32) -> Self {
        self.open_attempts = attempts.max(1);
        self
    }

    /// The image on the clipboard, if any.
    pub fn extract(&self) -> Option<DecodedImage> {
        self.extract_detailed().into_image()
    }

    /// Same as `extract`, keeping the reason when there is no image.
    pub fn extract_detailed(&self) -> Extraction {
        let payload = match self.read_payload() {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("[CLIPBOARD] Clipboard unavailable: {}", e);
                return Extraction::Unavailable;
            }
        };

        match payload {
            Payload::Encoded(name, bytes) => match image::load_from_memory(&bytes) {
                Ok(decoded) => match DecodedImage::from_dynamic(decoded) {
                    Some(image) => {
                        log::info!(
                            "[CLIPBOARD] Decoded {} image {}x{}",
                            name,
                            image.width(),
                            image.height()
                        );
                        Extraction::Image(image)
                    }
                    None => Extraction::DecodeFailed(format!("{} image has no pixels", name)),
                },
                Err(e) => {
                    log::warn!("[CLIPBOARD] {} decode failed: {}", name, e);
                    Extraction::DecodeFailed(e.to_string())
                }
            },
            Payload::Raw(bytes) => match bitmap::decode(&bytes) {
                Ok(image) => {
                    log::info!(
                        "[CLIPBOARD] Decoded raw bitmap {}x{}",
                        image.width(),
                        image.height()
                    );
                    Extraction::Image(image)
                }
                Err(e) => {
                    log::warn!("[CLIPBOARD] Raw bitmap decode failed: {}", e);
                    Extraction::DecodeFailed(e.to_string())
                }
            },
            Payload::LegacyBitmap => {
                log::debug!("[CLIPBOARD] Only a legacy bitmap handle is present; not supported");
                Extraction::LegacyBitmapOnly
            }
            Payload::FileList => {
                log::debug!("[CLIPBOARD] Clipboard holds a file list, not an image");
                Extraction::FileList
            }
            Payload::Nothing => {
                log::debug!("[CLIPBOARD] No image on clipboard");
                Extraction::NoImage
            }
        }
    }

    /// Highest-priority format present, without reading it.
    pub fn probe(&self) -> ClipboardFormatTag {
        let clipboard = match self.acquire() {
            Ok(clipboard) => clipboard,
            Err(_) => return ClipboardFormatTag::None,
        };

        for name in ENCODED_IMAGE_FORMATS {
            if clipboard.has(&ClipboardFormat::EncodedImage(name.to_string())) {
                return ClipboardFormatTag::EncodedImage(name.to_string());
            }
        }
        if clipboard.has(&ClipboardFormat::RawBitmap) {
            return ClipboardFormatTag::RawBitmap;
        }
        if clipboard.has(&ClipboardFormat::FileList) {
            return ClipboardFormatTag::FileList;
        }
        ClipboardFormatTag::None
    }

    fn acquire(&self) -> Result<OpenClipboard<'_>, ClipboardError> {
        OpenClipboard::acquire(self.access.as_ref(), self.open_attempts, OPEN_RETRY_DELAY)
    }

    /// Copies out the first usable payload in priority order. The clipboard
    /// is closed when `clipboard` drops at the end of this function.
    fn read_payload(&self) -> Result<Payload, ClipboardError> {
        let clipboard = self.acquire()?;

        for name in ENCODED_IMAGE_FORMATS {
            let format = ClipboardFormat::EncodedImage(name.to_string());
            if !clipboard.has(&format) {
                continue;
            }
            match clipboard.read(&format) {
                Ok(bytes) => return Ok(Payload::Encoded(name.to_string(), bytes)),
                Err(e) => log::warn!("[CLIPBOARD] Reading {} failed: {}", name, e),
            }
        }

        if clipboard.has(&ClipboardFormat::RawBitmap) {
            match clipboard.read(&ClipboardFormat::RawBitmap) {
                Ok(bytes) => return Ok(Payload::Raw(bytes)),
                Err(e) => log::warn!("[CLIPBOARD] Reading raw bitmap failed: {}", e),
            }
        }

        if clipboard.has(&ClipboardFormat::LegacyBitmap) {
            return Ok(Payload::LegacyBitmap);
        }
        if clipboard.has(&ClipboardFormat::FileList) {
            return Ok(Payload::FileList);
        }
        Ok(Payload::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counters {
        opens: AtomicU32,
        closes: AtomicU32,
    }

    struct FakeClipboard {
        formats: Mutex<HashMap<ClipboardFormat, Vec<u8>>>,
        locked_for: AtomicU32,
        counters: Arc<Counters>,
    }

    impl FakeClipboard {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                formats: Mutex::new(HashMap::new()),
                locked_for: AtomicU32::new(0),
                counters,
            }
        }

        fn with(self, format: ClipboardFormat, bytes: Vec<u8>) -> Self {
            self.formats.lock().unwrap().insert(format, bytes);
            self
        }

        fn locked(self, attempts: u32) -> Self {
            self.locked_for.store(attempts, Ordering::SeqCst);
            self
        }
    }

    impl ClipboardAccess for FakeClipboard {
        fn open(&self) -> Result<(), ClipboardError> {
            let remaining = self.locked_for.load(Ordering::SeqCst);
            if remaining > 0 {
                self.locked_for.store(remaining - 1, Ordering::SeqCst);
                return Err(ClipboardError::Locked);
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn is_format_available(&self, format: &ClipboardFormat) -> bool {
            self.formats.lock().unwrap().contains_key(format)
        }

        fn get_data(&self, format: &ClipboardFormat) -> Result<Vec<u8>, ClipboardError> {
            self.formats
                .lock()
                .unwrap()
                .get(format)
                .cloned()
                .ok_or_else(|| ClipboardError::FormatUnavailable(format!("{:?}", format)))
        }
    }

    /// 1x1 24-bit bottom-up record, pixel BGR (10, 20, 30).
    fn tiny_dib() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&40u32.to_le_bytes());
        b.extend_from_slice(&1i32.to_le_bytes());
        b.extend_from_slice(&1i32.to_le_bytes());
        b.extend_from_slice(&1u16.to_le_bytes());
        b.extend_from_slice(&24u16.to_le_bytes());
        b.extend_from_slice(&[0u8; 24]);
        b.extend_from_slice(&[10, 20, 30, 0]);
        b
    }

    fn tiny_png() -> Vec<u8> {
        DecodedImage::from_rgba(1, 1, vec![1, 2, 3, 255])
            .unwrap()
            .to_png_bytes()
            .unwrap()
    }

    fn extractor(fake: FakeClipboard) -> ClipboardImageExtractor {
        ClipboardImageExtractor::new(Box::new(fake)).with_open_attempts(2)
    }

    #[test]
    fn raw_bitmap_is_decoded() {
        let counters = Arc::new(Counters::default());
        let fake = FakeClipboard::new(counters.clone()).with(ClipboardFormat::RawBitmap, tiny_dib());
        let image = extractor(fake).extract().expect("image");
        assert_eq!(image.pixel(0, 0), Some([30, 20, 10, 255]));
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn png_wins_over_raw_bitmap() {
        let fake = FakeClipboard::new(Arc::default())
            .with(ClipboardFormat::RawBitmap, tiny_dib())
            .with(ClipboardFormat::EncodedImage("PNG".into()), tiny_png());
        let ex = extractor(fake);
        assert_eq!(ex.probe(), ClipboardFormatTag::EncodedImage("PNG".into()));
        assert_eq!(ex.extract().unwrap().pixel(0, 0), Some([1, 2, 3, 255]));
    }

    #[test]
    fn locked_clipboard_is_no_image() {
        let counters = Arc::new(Counters::default());
        let fake = FakeClipboard::new(counters.clone())
            .with(ClipboardFormat::RawBitmap, tiny_dib())
            .locked(10);
        let ex = extractor(fake);
        assert!(matches!(ex.extract_detailed(), Extraction::Unavailable));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lock_released_within_attempts_succeeds() {
        let fake = FakeClipboard::new(Arc::default())
            .with(ClipboardFormat::RawBitmap, tiny_dib())
            .locked(1);
        assert!(extractor(fake).extract().is_some());
    }

    #[test]
    fn file_list_is_distinct_from_decode_failure() {
        let fake = FakeClipboard::new(Arc::default()).with(ClipboardFormat::FileList, b"C:\\a.png".to_vec());
        assert!(matches!(extractor(fake).extract_detailed(), Extraction::FileList));

        let counters = Arc::new(Counters::default());
        let fake = FakeClipboard::new(counters.clone()).with(ClipboardFormat::RawBitmap, vec![0; 39]);
        assert!(matches!(extractor(fake).extract_detailed(), Extraction::DecodeFailed(_)));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn legacy_bitmap_alone_is_unsupported() {
        let fake = FakeClipboard::new(Arc::default()).with(ClipboardFormat::LegacyBitmap, Vec::new());
        let ex = extractor(fake);
        assert!(matches!(ex.extract_detailed(), Extraction::LegacyBitmapOnly));
        assert_eq!(ex.probe(), ClipboardFormatTag::None);
    }

    #[test]
    fn empty_clipboard_is_no_image() {
        let ex = extractor(FakeClipboard::new(Arc::default()));
        assert!(matches!(ex.extract_detailed(), Extraction::NoImage));
        assert_eq!(ex.probe(), ClipboardFormatTag::None);
    }

    #[test]
    fn corrupt_png_is_decode_failure() {
        let fake = FakeClipboard::new(Arc::default())
            .with(ClipboardFormat::EncodedImage("PNG".into()), vec![0x89, 0x50, 0x4E, 0x47, 0, 0]);
        assert!(matches!(extractor(fake).extract_detailed(), Extraction::DecodeFailed(_)));
    }
}
