//! Per-job results and the human-readable summary

use super::{Job, Mode};
use crate::models::ContractId;
use std::fmt;
use std::time::Duration;

/// How many lowest-scoring entries an audit keeps
const LOWEST_KEPT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub contract_id: ContractId,
    pub message: String,
}

/// Score histogram from `audit`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSummary {
    /// Buckets 0-19, 20-39, 40-59, 60-79, 80-100
    pub buckets: [usize; 5],
    pub total: u64,
    pub count: usize,
    /// Ascending by score
    pub lowest: Vec<(ContractId, u8)>,
}

impl ScoreSummary {
    pub fn add(&mut self, contract_id: ContractId, score: u8) {
        let bucket = (score as usize / 20).min(4);
        self.buckets[bucket] += 1;
        self.total += score as u64;
        self.count += 1;

        let pos = self.lowest.partition_point(|(_, s)| *s <= score);
        if pos < LOWEST_KEPT {
            self.lowest.insert(pos, (contract_id, score));
            self.lowest.truncate(LOWEST_KEPT);
        }
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total as f64 / self.count as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job: Job,
    pub mode: Mode,
    pub scanned: usize,
    /// Patched in live mode, would be patched in dry-run
    pub changed: Vec<ContractId>,
    pub unchanged: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    pub scores: Option<ScoreSummary>,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn new(job: Job, mode: Mode) -> Self {
        Self {
            job,
            mode,
            scanned: 0,
            changed: Vec::new(),
            unchanged: 0,
            skipped: 0,
            failures: Vec::new(),
            scores: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn add_failure(&mut self, contract_id: ContractId, message: impl Into<String>) {
        self.failures.push(ItemFailure {
            contract_id,
            message: message.into(),
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, contract_id: ContractId, outcome: ItemOutcome) {
        self.scanned += 1;
        match outcome {
            ItemOutcome::Changed => self.changed.push(contract_id),
            ItemOutcome::Unchanged => self.unchanged += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Scored(score) => {
                self.unchanged += 1;
                self.scores.get_or_insert_with(ScoreSummary::default).add(contract_id, score);
            }
            ItemOutcome::Failed(message) => self.add_failure(contract_id, message),
        }
    }
}

/// Result of processing one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Changed,
    Unchanged,
    Skipped,
    Scored(u8),
    Failed(String),
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.mode {
            Mode::DryRun => "would change",
            Mode::Live => "changed",
        };
        writeln!(
            f,
            "{} ({}) finished in {:.1}s",
            self.job,
            self.mode,
            self.elapsed.as_secs_f64()
        )?;
        writeln!(
            f,
            "  scanned: {}  {}: {}  unchanged: {}  skipped: {}  failed: {}",
            self.scanned,
            verb,
            self.changed.len(),
            self.unchanged,
            self.skipped,
            self.failures.len()
        )?;

        if let Some(scores) = &self.scores {
            writeln!(f, "  average score: {:.1}", scores.average())?;
            for (i, count) in scores.buckets.iter().enumerate() {
                let upper = if i == 4 { 100 } else { i * 20 + 19 };
                writeln!(f, "    {:>3}-{:<3} {}", i * 20, upper, count)?;
            }
            if !scores.lowest.is_empty() {
                writeln!(f, "  lowest:")?;
                for (id, score) in &scores.lowest {
                    writeln!(f, "    {:>3}  {}", score, id)?;
                }
            }
        }

        if !self.changed.is_empty() {
            writeln!(f, "  {}:", verb)?;
            for id in &self.changed {
                writeln!(f, "    {}", id)?;
            }
        }
        if !self.failures.is_empty() {
            writeln!(f, "  failures:")?;
            for failure in &self.failures {
                writeln!(f, "    {}: {}", failure.contract_id, failure.message)?;
            }
        }
        Ok(())
    }
}
