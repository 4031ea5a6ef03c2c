//! TensorBoard event-file backend.

use super::MetricLogger;
use std::path::Path;
use std::sync::Mutex;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Writes scalars to TensorBoard event files under `log_dir`.
///
/// Events are buffered by the writer and flushed on [`MetricLogger::close`]
/// or drop.
pub struct TensorBoardLogger {
    writer: Mutex<SummaryWriter>,
    prefix: String,
}

impl TensorBoardLogger {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        Self {
            writer: Mutex::new(SummaryWriter::new(log_dir.as_ref())),
            prefix: String::new(),
        }
    }

    /// Group every tag under `prefix/`, e.g. `train/value_loss`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn tag(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }
}

impl MetricLogger for TensorBoardLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        let tag = self.tag(name);
        if let Ok(mut writer) = self.writer.lock() {
            writer.add_scalar(&tag, value as f32, step as usize);
        }
    }

    fn close(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            writer.flush();
        }
    }
}

impl Drop for TensorBoardLogger {
    fn drop(&mut self) {
        self.close();
    }
}
