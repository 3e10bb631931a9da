use std::path::Path;

use chrono::Utc;

use crate::error::Result;
use crate::fsutil;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscInfo {
    pub release: String,
    pub base_arch: String,
}

impl DiscInfo {
    pub fn new(release: impl Into<String>, base_arch: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            base_arch: base_arch.into(),
        }
    }

    /// Three lines: creation time as fractional unix seconds, release, base arch.
    pub fn render(&self, unix_secs: f64) -> String {
        format!("{unix_secs:.6}\n{}\n{}\n", self.release, self.base_arch)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let now = Utc::now();
        let secs = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;
        fsutil::write_text(path, &self.render(secs))
    }
}
