//! swapbench-report — Test log, result artifacts and review output.
//!
//! The CSV log is the system's compatibility contract with downstream
//! dashboards; everything else here is derived from it or written
//! alongside it.

pub mod artifacts;
pub mod review;
pub mod sink;
pub mod summary;

pub use artifacts::{ArtifactError, ArtifactStore, SavedArtifact};
pub use review::render_review;
pub use sink::{read_log, CsvSink, LogRow, SinkError, LOG_COLUMNS};
pub use summary::{BatchSummary, ProviderSummary};
