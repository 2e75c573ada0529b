//! Media classification and local upload validation.
//!
//! Files are validated against a MIME allow-list and a size ceiling
//! before any network traffic happens, so a rejected file never reaches
//! the backend.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::format::format_file_size;

/// Maximum accepted upload size (100 MB).
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Accepted still-image MIME types.
pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

/// Accepted video MIME types.
pub const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/avi",
    "video/mov",
    "video/webm",
    "video/mkv",
    "video/flv",
];

/// Accepted audio MIME types.
pub const AUDIO_MIME_TYPES: &[&str] = &[
    "audio/mp3",
    "audio/wav",
    "audio/m4a",
    "audio/ogg",
    "audio/flac",
    "audio/aac",
    "audio/mpeg",
];

/// Kind of media a job analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Classify a MIME type by its top-level prefix.
    ///
    /// This does not consult the allow-list; use [`is_accepted_mime`] for that.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else if mime.starts_with("audio/") {
            Some(Self::Audio)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `mime` is on the allow-list (case-insensitive, exact match).
pub fn is_accepted_mime(mime: &str) -> bool {
    let mime = mime.trim().to_ascii_lowercase();
    IMAGE_MIME_TYPES
        .iter()
        .chain(VIDEO_MIME_TYPES)
        .chain(AUDIO_MIME_TYPES)
        .any(|accepted| *accepted == mime)
}

/// Validate a candidate upload. The type is checked before the size.
///
/// Returns the file's [`MediaKind`] when both constraints hold.
pub fn validate_upload(size: u64, mime: &str) -> Result<MediaKind, CoreError> {
    let kind = MediaKind::from_mime(mime)
        .filter(|_| is_accepted_mime(mime))
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "File type not supported: '{mime}'. Please upload an image, video, or audio file."
            ))
        })?;

    if size > MAX_UPLOAD_BYTES {
        return Err(CoreError::Validation(format!(
            "File size too large ({}). Maximum size is {}.",
            format_file_size(size),
            format_file_size(MAX_UPLOAD_BYTES)
        )));
    }

    Ok(kind)
}
