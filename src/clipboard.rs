//! Copying short links to the system clipboard
//!
//! The clipboard itself belongs to the host environment; this is only the
//! seam a front end plugs it into.

use tracing::{debug, warn};

use crate::model::ShortenedUrl;

pub trait Clipboard {
    /// Writes `text`, returning whether it succeeded
    fn write(&self, text: &str) -> bool;
}

/// Copies the public short link of `url`
pub fn copy_short_url(clipboard: &dyn Clipboard, url: &ShortenedUrl) -> bool {
    let copied = clipboard.write(&url.short_url);
    if copied {
        debug!("Copied to clipboard: {}", url.short_url);
    } else {
        warn!("Failed to copy to clipboard: {}", url.short_url);
    }
    copied
}
