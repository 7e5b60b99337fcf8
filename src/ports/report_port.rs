//! Report artifact port trait.

use crate::domain::error::QuantgateError;
use crate::domain::progressive::{BatchProgress, BatchReport};

/// Port for the batch progress snapshot and the final batch report.
pub trait ReportPort: Send + Sync {
    /// Replace the published progress snapshot. Readers never observe a
    /// partially written snapshot.
    fn publish_progress(&self, progress: &BatchProgress) -> Result<(), QuantgateError>;

    fn write_report(&self, report: &BatchReport) -> Result<(), QuantgateError>;

    fn read_progress(&self) -> Result<Option<BatchProgress>, QuantgateError>;

    fn read_report(&self) -> Result<Option<BatchReport>, QuantgateError>;
}
