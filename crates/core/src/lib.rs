//! `deepcheck-core` -- domain types and pure logic for the deepfake
//! detection client.
//!
//! Nothing in this crate performs I/O. The HTTP layer, the status
//! poller and the batch workflow live in `deepcheck-client`.

pub mod error;
pub mod export;
pub mod format;
pub mod job;
pub mod media;
pub mod progress;
pub mod record;
pub mod result;
pub mod types;
