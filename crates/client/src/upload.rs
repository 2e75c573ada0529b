//! Upload sources and the progress-reporting request body.
//!
//! [`UploadSource`] describes a local file about to be submitted. Its
//! constraints are checked with [`UploadSource::validate`] before the
//! file is opened, and the body produced by [`progress_body`] reports
//! transfer progress and honours cancellation at every chunk boundary.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use deepcheck_core::error::CoreError;
use deepcheck_core::media::{is_accepted_mime, validate_upload, MediaKind};
use deepcheck_core::progress::ProgressTracker;
use deepcheck_core::record::ClientFileRecord;
use deepcheck_core::types::JobId;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Read size for streamed uploads.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Callback receiving upload progress percentages (0-100).
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// A local file to upload, with its declared size and MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSource {
    path: PathBuf,
    filename: String,
    size: u64,
    mime: String,
}

impl UploadSource {
    pub fn new(
        path: impl Into<PathBuf>,
        filename: impl Into<String>,
        size: u64,
        mime: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
            size,
            mime: mime.into(),
        }
    }

    /// Describe a file on disk, reading its size and guessing its MIME
    /// type from the extension.
    ///
    /// When several MIME types match the extension, an accepted one is
    /// preferred.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
            filename,
            size: metadata.len(),
            mime: guess_mime(path),
        })
    }

    pub fn from_record(record: &ClientFileRecord) -> Self {
        Self::new(
            record.path(),
            record.filename(),
            record.size(),
            record.mime(),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Check the size and type constraints. Performs no I/O.
    pub fn validate(&self) -> Result<MediaKind, CoreError> {
        validate_upload(self.size, &self.mime)
    }

    pub fn into_record(self) -> ClientFileRecord {
        ClientFileRecord::new(self.path, self.filename, self.size, self.mime)
    }
}

/// Guess a MIME type from a path's extension.
pub fn guess_mime(path: &Path) -> String {
    let guesses = mime_guess::from_path(path);
    guesses
        .iter()
        .find(|m| is_accepted_mime(m.essence_str()))
        .or_else(|| guesses.first())
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Result of a successful upload: the job the backend created for the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub job_id: JobId,
    pub filename: String,
    pub file_size: u64,
    pub file_type: String,
}

/// Build a streaming request body over the first `size` bytes of `file`.
///
/// The multipart part announces `size` as its length, so the body never
/// yields more than that even if the file grew since it was measured.
/// Each chunk read advances `tracker` and forwards new percentages to
/// `on_progress`. A cancelled token turns the next chunk into an I/O
/// error, which aborts the request.
pub(crate) fn progress_body(
    file: tokio::fs::File,
    size: u64,
    tracker: Arc<Mutex<ProgressTracker>>,
    on_progress: ProgressFn,
    cancel: CancellationToken,
) -> reqwest::Body {
    let reader = file.take(size);
    let stream = ReaderStream::with_capacity(reader, UPLOAD_CHUNK_SIZE).map(move |chunk| {
        if cancel.is_cancelled() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "upload cancelled",
            ));
        }
        let chunk = chunk?;
        let emitted = tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .advance(chunk.len() as u64);
        if let Some(pct) = emitted {
            on_progress(pct);
        }
        Ok(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}
