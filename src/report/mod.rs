//! Test report and failure evidence
//!
//! [`ReportAggregator`] collects one [`ReportEntry`] per test attempt and
//! writes the HTML/JSON report at the end of the run. [`ArtifactPipeline`]
//! turns a terminal failure into a [`FailureArtifact`] on that entry.

pub mod aggregator;
pub mod artifact;
mod html;

pub use aggregator::{
    EntryId, LogLevel, LogLine, ReportAggregator, ReportEntry, ReportMeta, Summary, SystemInfo,
    TestLog, TestStatus,
};
pub use artifact::{ArtifactPipeline, FailureArtifact};
