//! High-level service facade invoked by the scheduled and manual triggers.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::ports::StorePlugin;
use crate::sampler::{PassReport, SamplerOptions, TrashLevelSampler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What started a sampling pass.
pub enum Trigger {
    /// The hourly timer.
    Scheduled,
    /// A request to the trigger endpoint.
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
        };
        formatter.write_str(label)
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors escaping a whole sampling pass.
pub enum PassError {
    /// The pass task panicked or was cancelled before finishing.
    #[error("Sampling pass aborted: {0}")]
    Aborted(#[from] JoinError),
}

/// Public entry point for running sampling passes.
pub struct SamplingService {
    backend: &'static str,
    sampler: TrashLevelSampler,
    pass_guard: Option<Arc<Mutex<()>>>,
}

impl SamplingService {
    /// Create a service over the stores of the given plugin.
    ///
    /// Overlapping passes run independently unless [`Self::exclusive`] is applied.
    #[must_use]
    pub fn new(plugin: StorePlugin, options: SamplerOptions) -> Self {
        Self {
            backend: plugin.name,
            sampler: TrashLevelSampler::new(plugin.telemetry, plugin.records, options),
            pass_guard: None,
        }
    }

    /// Serialize passes: a trigger arriving mid-pass waits, then runs its own pass.
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.pass_guard = Some(Arc::new(Mutex::new(())));
        self
    }

    /// Name of the storage backend in use.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Run one sampling pass to completion.
    ///
    /// The pass runs on its own task and finishes even if the caller stops
    /// waiting; in exclusive mode it keeps the pass lock until it is done.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Aborted`] if the pass task panics.
    pub async fn run_pass(&self, trigger: Trigger) -> Result<PassReport, PassError> {
        let running = match &self.pass_guard {
            Some(guard) => Some(Arc::clone(guard).lock_owned().await),
            None => None,
        };

        info!(%trigger, backend = self.backend, "Sampling pass started");

        let sampler = self.sampler.clone();
        let pass = tokio::spawn(async move {
            let report = sampler.run_pass().await;
            drop(running);
            report
        });

        pass.await
            .map_err(PassError::from)
            .inspect_err(|err| error!(%trigger, error = %err, "Sampling pass failed"))
    }
}
