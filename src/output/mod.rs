//! Dataset output writers.
//!
//! JSONL is the only supported format. The writer is an append-only sink;
//! `sync` is the durability boundary the checkpoint protocol relies on.

mod jsonl;

pub use jsonl::JsonlWriter;

use std::path::Path;

use crate::models::{ConfigError, Result, Sample};

/// A dataset output sink.
///
/// Methods take `&self`; implementations serialize access internally so the
/// writer can be shared across tasks.
pub trait Writer: Send + Sync {
    /// Open for writing, truncating any existing file. Parent directories
    /// are created as needed.
    fn open(&self, path: &Path) -> Result<()>;

    /// Open for appending, preserving existing data. Used when resuming.
    fn open_append(&self, path: &Path) -> Result<()>;

    /// Write a single sample.
    fn write(&self, sample: &Sample) -> Result<()>;

    /// Flush buffered data to the OS.
    fn flush(&self) -> Result<()>;

    /// Flush and fsync to physical storage. Call at checkpoint boundaries.
    fn sync(&self) -> Result<()>;

    /// Flush and release the file handle.
    fn close(&self) -> Result<()>;

    /// Output format name.
    fn format(&self) -> &'static str;
}

/// Create a writer for the given format name.
pub fn new_writer(format: &str) -> std::result::Result<JsonlWriter, ConfigError> {
    match format {
        "jsonl" | "" => Ok(JsonlWriter::new()),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}
