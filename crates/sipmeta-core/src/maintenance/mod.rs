//! Batch maintenance jobs over the token cache
//!
//! Every job scans a set of contract IDs in batches of `batch_size`,
//! sleeping `batch_delay` between batches so remote sources are not
//! hammered. Dry-run mode never writes to the store.

mod jobs;
mod probe;
mod report;
mod score;

pub use probe::{HttpImageProbe, ImageProbe};
pub use report::{ItemFailure, JobReport, ScoreSummary};
pub use score::completeness_score;

use crate::error::Result;
use crate::fetcher::Placeholders;
use crate::models::ContractId;
use crate::service::TokenService;
use crate::sources::ChainReader;
use crate::store::KvStore;
use report::ItemOutcome;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    Audit,
    FixIdentifiers,
    ConvertSupply,
    AuditImages,
    RefreshIncomplete,
    RefreshManaged,
}

impl Job {
    pub const ALL: [Job; 6] = [
        Job::Audit,
        Job::FixIdentifiers,
        Job::ConvertSupply,
        Job::AuditImages,
        Job::RefreshIncomplete,
        Job::RefreshManaged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Job::Audit => "audit",
            Job::FixIdentifiers => "fix-identifiers",
            Job::ConvertSupply => "convert-supply",
            Job::AuditImages => "audit-images",
            Job::RefreshIncomplete => "refresh-incomplete",
            Job::RefreshManaged => "refresh-managed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Report only: no store writes and no refreshes. Remote reads that
    /// decide the outcome (contract interface, image HEAD) still run.
    #[default]
    DryRun,
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::DryRun => "dry-run",
            Mode::Live => "live",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Mode::Live)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseNameError {
    kind: &'static str,
    value: String,
    expected: String,
}

impl FromStr for Job {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Job::ALL
            .into_iter()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| ParseNameError {
                kind: "job",
                value: s.to_string(),
                expected: Job::ALL.map(|j| j.as_str()).join(", "),
            })
    }
}

impl FromStr for Mode {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry-run" => Ok(Mode::DryRun),
            "live" => Ok(Mode::Live),
            other => Err(ParseNameError {
                kind: "mode",
                value: other.to_string(),
                expected: "dry-run, live".to_string(),
            }),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    pub mode: Mode,
    pub batch_size: usize,
    pub batch_delay: Duration,
    /// `refresh-incomplete` refreshes entries scoring below this
    pub score_threshold: u8,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            mode: Mode::DryRun,
            batch_size: 10,
            batch_delay: Duration::from_millis(1000),
            score_threshold: 80,
        }
    }
}

pub struct MaintenanceRunner {
    service: Arc<TokenService>,
    store: Arc<dyn KvStore>,
    chain: Arc<dyn ChainReader>,
    probe: Arc<dyn ImageProbe>,
    placeholders: Placeholders,
    options: JobOptions,
}

impl MaintenanceRunner {
    pub fn new(
        service: Arc<TokenService>,
        store: Arc<dyn KvStore>,
        chain: Arc<dyn ChainReader>,
        probe: Arc<dyn ImageProbe>,
        placeholders: Placeholders,
        options: JobOptions,
    ) -> Self {
        Self {
            service,
            store,
            chain,
            probe,
            placeholders,
            options,
        }
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Run one job; only failing to enumerate entries is an error
    pub async fn run(&self, job: Job) -> Result<JobReport> {
        let started = Instant::now();
        let mut report = JobReport::new(job, self.options.mode);
        info!(job = %job, mode = %self.options.mode, batch_size = self.options.batch_size, "Starting maintenance job");

        match job {
            Job::Audit => self.audit(&mut report).await?,
            Job::FixIdentifiers => self.fix_identifiers(&mut report).await?,
            Job::ConvertSupply => self.convert_supply(&mut report).await?,
            Job::AuditImages => self.audit_images(&mut report).await?,
            Job::RefreshIncomplete => self.refresh_incomplete(&mut report).await?,
            Job::RefreshManaged => self.refresh_managed(&mut report).await?,
        }

        report.elapsed = started.elapsed();
        info!(
            job = %job,
            scanned = report.scanned,
            changed = report.changed.len(),
            failed = report.failures.len(),
            "Maintenance job finished"
        );
        Ok(report)
    }

    /// Process `ids` batch by batch; `throttle` sleeps between batches
    async fn in_batches<F, Fut>(&self, ids: Vec<ContractId>, report: &mut JobReport, throttle: bool, f: F)
    where
        F: Fn(ContractId) -> Fut,
        Fut: Future<Output = ItemOutcome>,
    {
        let batch_size = self.options.batch_size.max(1);
        let batches = ids.len().div_ceil(batch_size);

        for (i, chunk) in ids.chunks(batch_size).enumerate() {
            let outcomes = futures::future::join_all(chunk.iter().map(|id| {
                let fut = f(id.clone());
                async move { (id.clone(), fut.await) }
            }))
            .await;
            for (id, outcome) in outcomes {
                report.record(id, outcome);
            }
            debug!(batch = i + 1, batches, "Batch complete");

            if throttle && i + 1 < batches && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }
        }
    }
}
