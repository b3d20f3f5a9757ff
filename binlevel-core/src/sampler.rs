//! Sampling passes: read each bin's distance, convert it, append a record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::enumerator::BinEnumerator;
use crate::level::trash_level;
use crate::model::{BinId, NewTrashLevel, TrashLevelRecord};
use crate::ports::{DEFAULT_STORE_TIMEOUT, RecordPort, StoreError, TelemetryPort, with_timeout};

#[derive(Debug, Clone, Copy)]
/// Tuning knobs for a sampler.
pub struct SamplerOptions {
    /// Upper bound for each telemetry read.
    pub read_timeout: Duration,
    /// Upper bound for each record append.
    pub write_timeout: Duration,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_STORE_TIMEOUT,
            write_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

#[derive(thiserror::Error, Debug)]
/// Reasons a single bin produced no record in a pass.
pub enum BinFailure {
    /// Nothing stored for the bin, or no usable distance field.
    #[error("No distance data found")]
    MissingReading,
    /// Reading the bin's raw value failed.
    #[error("Reading telemetry failed: {0}")]
    ReadFailed(#[source] StoreError),
    /// Appending the computed record failed.
    #[error("Posting trash level failed: {0}")]
    WriteFailed(#[source] StoreError),
    /// Processing the bin panicked or was cancelled.
    #[error("Processing aborted: {0}")]
    Aborted(String),
}

#[derive(Debug)]
/// Result of processing one bin.
pub struct BinOutcome {
    /// Bin that was processed.
    pub bin: BinId,
    /// Appended record, or why there is none.
    pub result: Result<TrashLevelRecord, BinFailure>,
}

#[derive(Debug)]
/// Everything that happened during one sampling pass.
pub struct PassReport {
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the last bin finished.
    pub finished_at: DateTime<Utc>,
    /// Whether listing bins failed and was treated as an empty store.
    pub enumeration_degraded: bool,
    /// One outcome per enumerated bin, in enumeration order.
    pub outcomes: Vec<BinOutcome>,
}

impl PassReport {
    /// Records appended during the pass.
    pub fn recorded(&self) -> impl Iterator<Item = &TrashLevelRecord> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
    }

    /// Bins that produced no record, with the reason.
    pub fn failed(&self) -> impl Iterator<Item = (&BinId, &BinFailure)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err().map(|err| (&outcome.bin, err)))
    }

    /// Log every outcome followed by a summary line.
    pub fn log(&self) {
        if self.outcomes.is_empty() {
            info!(
                enumeration_degraded = self.enumeration_degraded,
                "No bins found in telemetry store"
            );
            return;
        }

        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(record) => info!(
                    bin = %record.bin,
                    trash_level = record.trash_level.percent(),
                    created_at = %record.created_at,
                    "Trash level posted for {}: {}",
                    record.bin,
                    record.trash_level
                ),
                Err(BinFailure::MissingReading) => {
                    error!(bin = %outcome.bin, "No distance data found for bin {}", outcome.bin);
                }
                Err(err) => error!(bin = %outcome.bin, error = %err, "Error processing bin"),
            }
        }

        let recorded = self.recorded().count();
        info!(
            bins = self.outcomes.len(),
            recorded,
            failed = self.outcomes.len() - recorded,
            elapsed_ms = (self.finished_at - self.started_at).num_milliseconds(),
            "Sampling pass finished"
        );
    }
}

/// Reads bin distances and appends fill level records.
#[derive(Clone)]
pub struct TrashLevelSampler {
    enumerator: BinEnumerator,
    telemetry: Arc<dyn TelemetryPort>,
    records: Arc<dyn RecordPort>,
    options: SamplerOptions,
}

impl TrashLevelSampler {
    /// Create a sampler over the given stores.
    #[must_use]
    pub fn new(
        telemetry: Arc<dyn TelemetryPort>,
        records: Arc<dyn RecordPort>,
        options: SamplerOptions,
    ) -> Self {
        let enumerator =
            BinEnumerator::new(Arc::clone(&telemetry)).with_read_timeout(options.read_timeout);
        Self {
            enumerator,
            telemetry,
            records,
            options,
        }
    }

    /// Run one pass over every bin currently in the telemetry store.
    ///
    /// Bins are processed one at a time in enumeration order. A failing bin
    /// never stops the pass; the report is logged before it is returned.
    pub async fn run_pass(&self) -> PassReport {
        let started_at = Utc::now();
        let (bins, enumeration_degraded) = match self.enumerator.try_list_bins().await {
            Ok(bins) => (bins, false),
            Err(_logged) => (Vec::new(), true),
        };

        let mut outcomes = Vec::with_capacity(bins.len());
        for bin in bins {
            outcomes.push(self.sample_isolated(bin).await);
        }

        let report = PassReport {
            started_at,
            finished_at: Utc::now(),
            enumeration_degraded,
            outcomes,
        };
        report.log();
        report
    }

    /// Read, convert, and record a single bin.
    pub async fn sample_bin(&self, bin: &BinId) -> BinOutcome {
        BinOutcome {
            bin: bin.clone(),
            result: self.record_level(bin).await,
        }
    }

    // Runs the bin on its own task so a panicking store call only costs that bin.
    async fn sample_isolated(&self, bin: BinId) -> BinOutcome {
        let sampler = self.clone();
        let task_bin = bin.clone();
        match tokio::spawn(async move { sampler.sample_bin(&task_bin).await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(bin = %bin, error = %err, "Bin task did not complete");
                BinOutcome {
                    bin,
                    result: Err(BinFailure::Aborted(err.to_string())),
                }
            }
        }
    }

    async fn record_level(&self, bin: &BinId) -> Result<TrashLevelRecord, BinFailure> {
        let reading = with_timeout(self.options.read_timeout, self.telemetry.latest_reading(bin))
            .await
            .map_err(BinFailure::ReadFailed)?;

        let distance_cm = reading
            .and_then(|reading| reading.distance_cm)
            .ok_or(BinFailure::MissingReading)?;

        let level = NewTrashLevel {
            bin: bin.clone(),
            trash_level: trash_level(distance_cm),
        };

        with_timeout(self.options.write_timeout, self.records.append(&level))
            .await
            .map_err(BinFailure::WriteFailed)
    }
}
