//! Windows clipboard via the `windows` crate (Win32 DataExchange).
//!
//! This is the infrastructure layer; it talks to the OS. Formats map to
//! CF_DIB, CF_BITMAP, CF_HDROP and registered names such as "PNG".
//!
//! NOTE: open/close must happen on the same thread; the extractor always
//! does both inside one blocking call.

use super::access::{ClipboardAccess, ClipboardError, ClipboardFormat};

use windows::core::PCWSTR;
use windows::Win32::Foundation::{HGLOBAL, HWND};
use windows::Win32::System::DataExchange::{
    CloseClipboard, GetClipboardData, IsClipboardFormatAvailable, OpenClipboard,
    RegisterClipboardFormatW,
};
use windows::Win32::System::Memory::{GlobalLock, GlobalSize, GlobalUnlock};
use windows::Win32::System::Ole::{CF_BITMAP, CF_DIB, CF_HDROP};

#[derive(Debug, Default)]
pub struct WindowsClipboard;

impl WindowsClipboard {
    pub fn new() -> Self {
        Self
    }
}

/// Numeric clipboard format for a `ClipboardFormat`.
fn format_id(format: &ClipboardFormat) -> Option<u32> {
    match format {
        ClipboardFormat::RawBitmap => Some(CF_DIB.0 as u32),
        ClipboardFormat::LegacyBitmap => Some(CF_BITMAP.0 as u32),
        ClipboardFormat::FileList => Some(CF_HDROP.0 as u32),
        ClipboardFormat::EncodedImage(name) => registered_format(name),
    }
}

/// Looks up (registering if needed) a named clipboard format.
fn registered_format(name: &str) -> Option<u32> {
    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    // Safety: `wide` is NUL-terminated and outlives the call.
    let id = unsafe { RegisterClipboardFormatW(PCWSTR(wide.as_ptr())) };
    (id != 0).then_some(id)
}

impl ClipboardAccess for WindowsClipboard {
    fn open(&self) -> Result<(), ClipboardError> {
        // Safety: no owner window; paired with CloseClipboard in `close`.
        unsafe { OpenClipboard(HWND::default()) }.map_err(|e| {
            log::debug!("[CLIPBOARD] OpenClipboard failed: {}", e);
            ClipboardError::Locked
        })
    }

    fn close(&self) {
        // Safety: only called by the guard after a successful open.
        if let Err(e) = unsafe { CloseClipboard() } {
            log::warn!("[CLIPBOARD] CloseClipboard failed: {}", e);
        }
    }

    fn is_format_available(&self, format: &ClipboardFormat) -> bool {
        match format_id(format) {
            // Safety: plain query, no pointers involved.
            Some(id) => unsafe { IsClipboardFormatAvailable(id) }.is_ok(),
            None => false,
        }
    }

    fn get_data(&self, format: &ClipboardFormat) -> Result<Vec<u8>, ClipboardError> {
        let id = format_id(format)
            .ok_or_else(|| ClipboardError::FormatUnavailable(format!("{:?}", format)))?;

        // Safety: the clipboard is open (guard held by the caller). The
        // handle belongs to the clipboard; we only lock, copy, and unlock it.
        unsafe {
            let handle = GetClipboardData(id).map_err(|e| ClipboardError::Read(e.to_string()))?;
            let global = HGLOBAL(handle.0);

            let size = GlobalSize(global);
            if size == 0 {
                return Err(ClipboardError::Read("clipboard handle is empty".to_string()));
            }

            let ptr = GlobalLock(global) as *const u8;
            if ptr.is_null() {
                return Err(ClipboardError::Read("GlobalLock failed".to_string()));
            }
            let bytes = std::slice::from_raw_parts(ptr, size).to_vec();
            // GlobalUnlock reports an "error" when the lock count reaches zero.
            let _ = GlobalUnlock(global);

            Ok(bytes)
        }
    }
}
