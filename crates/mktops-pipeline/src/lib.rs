//! Scheduled-job pipeline: ingestion, reconciliation, aggregation, discrepancy
//! detection, and the orchestrator that sequences them under a wall-clock
//! budget.
//!
//! Everything here is invoked either by an HTTP job handler or by the
//! in-process scheduler; all dependencies (pool, vendor clients, budgets) are
//! passed in explicitly so tests can substitute fakes.

use thiserror::Error;

pub mod aggregate;
pub mod context;
pub mod detector;
pub mod ingest;
pub mod jobs;
pub mod orchestrator;
pub mod outcome;
pub mod reconcile;

pub use context::{JobContext, RetryPolicy};
pub use jobs::JobReport;
pub use orchestrator::{Phase, PhaseOutcome, PhaseStatus, RunBudget, RunManifest};
pub use outcome::{RunStatus, UnitOutcome, UnitStatus};

/// Errors crossing pipeline module boundaries.
///
/// Unit-level failures inside batch loops are converted into structured
/// [`UnitOutcome`] entries instead; this type surfaces only when an entire
/// operation cannot proceed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] mktops_db::DbError),

    #[error(transparent)]
    Connector(#[from] mktops_connectors::ConnectorError),

    /// The operation needs a credential the deployment does not carry.
    #[error("{vendor} credentials are not configured")]
    MissingCredentials { vendor: &'static str },

    /// The operation needs a company scope and none could be inferred.
    #[error("company scope required: {0}")]
    AmbiguousCompany(String),
}
