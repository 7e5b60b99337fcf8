//! JSON report artifacts under a reports directory.
//!
//! Every write goes to a `.tmp` sibling first and is renamed into place, so a
//! poller reading `batch_progress.json` never sees a half-written file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::error::QuantgateError;
use crate::domain::progressive::{BatchProgress, BatchReport};
use crate::ports::report_port::ReportPort;

pub const PROGRESS_FILE: &str = "batch_progress.json";
pub const REPORT_FILE: &str = "full_report.json";

pub struct JsonReportAdapter {
    reports_dir: PathBuf,
}

impl JsonReportAdapter {
    pub fn new(reports_dir: PathBuf) -> Self {
        Self { reports_dir }
    }

    pub fn progress_path(&self) -> PathBuf {
        self.reports_dir.join(PROGRESS_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.reports_dir.join(REPORT_FILE)
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), QuantgateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })?;
    debug!(path = %path.display(), "wrote report artifact");
    Ok(())
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, QuantgateError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl ReportPort for JsonReportAdapter {
    fn publish_progress(&self, progress: &BatchProgress) -> Result<(), QuantgateError> {
        write_atomic(&self.progress_path(), progress)
    }

    fn write_report(&self, report: &BatchReport) -> Result<(), QuantgateError> {
        write_atomic(&self.report_path(), report)
    }

    fn read_progress(&self) -> Result<Option<BatchProgress>, QuantgateError> {
        read_optional(&self.progress_path())
    }

    fn read_report(&self) -> Result<Option<BatchReport>, QuantgateError> {
        read_optional(&self.report_path())
    }
}
