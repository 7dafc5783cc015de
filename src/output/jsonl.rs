//! JSON Lines writer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as IoWrite};
use std::path::Path;
use std::sync::Mutex;

use crate::models::{KothasetError, Result, Sample};
use crate::output::Writer;

const BUFFER_SIZE: usize = 64 * 1024;

/// Writes samples as JSON Lines: each sample's `fields` object on one line.
pub struct JsonlWriter {
    inner: Mutex<Option<BufWriter<File>>>,
}

impl Default for JsonlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonlWriter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn open_with(&self, path: &Path, truncate: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| KothasetError::io("creating output directory", e))?;
            }
        }

        let mut options = OpenOptions::new();
        options.create(true).write(true);
        if truncate {
            options.truncate(true);
        } else {
            options.append(true);
        }
        let file = options
            .open(path)
            .map_err(|e| KothasetError::io("opening output file", e))?;

        let mut guard = self.inner.lock().expect("writer lock poisoned");
        *guard = Some(BufWriter::with_capacity(BUFFER_SIZE, file));
        Ok(())
    }
}

impl Writer for JsonlWriter {
    fn open(&self, path: &Path) -> Result<()> {
        self.open_with(path, true)
    }

    fn open_append(&self, path: &Path) -> Result<()> {
        self.open_with(path, false)
    }

    fn write(&self, sample: &Sample) -> Result<()> {
        let mut guard = self.inner.lock().expect("writer lock poisoned");
        let writer = guard.as_mut().ok_or_else(|| {
            KothasetError::write(
                "writer is not open",
                std::io::Error::from(std::io::ErrorKind::NotConnected),
            )
        })?;

        let data = serde_json::to_vec(&sample.fields)
            .map_err(|e| KothasetError::Parse(format!("serializing sample: {e}")))?;

        writer
            .write_all(&data)
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| KothasetError::write("writing sample", e))?;

        // Flush to the OS immediately so data survives application crashes.
        writer
            .flush()
            .map_err(|e| KothasetError::write("flushing sample", e))
    }

    fn flush(&self) -> Result<()> {
        let mut guard = self.inner.lock().expect("writer lock poisoned");
        if let Some(writer) = guard.as_mut() {
            writer
                .flush()
                .map_err(|e| KothasetError::write("flushing output", e))?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let mut guard = self.inner.lock().expect("writer lock poisoned");
        if let Some(writer) = guard.as_mut() {
            writer
                .flush()
                .map_err(|e| KothasetError::write("flushing output", e))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| KothasetError::write("syncing output", e))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock().expect("writer lock poisoned");
        if let Some(mut writer) = guard.take() {
            writer
                .flush()
                .map_err(|e| KothasetError::write("flushing output on close", e))?;
        }
        Ok(())
    }

    fn format(&self) -> &'static str {
        "jsonl"
    }
}
