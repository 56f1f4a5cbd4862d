//! Per-unit outcome aggregation
//!
//! The [`ResultAggregator`] is written to by workers (fetch failures) and by
//! the writer (write outcomes). Every mutation, and every progress callback,
//! happens under its single lock.

use crate::domain::{UnitDescriptor, UnitStatus, WorkUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress event emitted exactly once per unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub unit_index: usize,
    pub total_units: usize,
    pub rows: usize,
    pub success: bool,
    pub error: Option<String>,
}

/// Caller-supplied observer of unit completions
///
/// Never invoked concurrently with itself.
pub type ProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

/// Where a unit failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Transform,
    Write,
    /// Never claimed because the run was stopped
    Cancelled,
}

impl FailureStage {
    fn terminal_status(self) -> UnitStatus {
        match self {
            FailureStage::Fetch | FailureStage::Transform => UnitStatus::FetchFailed,
            FailureStage::Write => UnitStatus::WriteFailed,
            FailureStage::Cancelled => UnitStatus::Cancelled,
        }
    }
}

/// One failed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub index: usize,
    pub descriptor: UnitDescriptor,
    pub stage: FailureStage,
    pub message: String,
}

/// Final outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub destination: String,
    pub total_rows: usize,
    pub total_units: usize,
    pub successful_units: usize,
    pub failed_units: usize,
    /// Exactly the units whose fetch or write did not complete, in plan order
    pub failed_unit_descriptors: Vec<UnitDescriptor>,
    pub failures: Vec<UnitFailure>,
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
    pub interrupted: bool,
    pub dry_run: bool,
}

impl AggregateResult {
    pub fn has_failures(&self) -> bool {
        self.failed_units > 0
    }

    /// Successful units as a percentage of all units
    pub fn success_rate(&self) -> f64 {
        if self.total_units == 0 {
            return 100.0;
        }
        (self.successful_units as f64 / self.total_units as f64) * 100.0
    }

    /// Log the result
    pub fn log_summary(&self) {
        tracing::info!(
            destination = %self.destination,
            total_units = self.total_units,
            successful_units = self.successful_units,
            failed_units = self.failed_units,
            total_rows = self.total_rows,
            duration_secs = self.duration.as_secs(),
            success_rate = format!("{:.2}%", self.success_rate()),
            interrupted = self.interrupted,
            dry_run = self.dry_run,
            "Export run completed"
        );

        if self.has_failures() {
            tracing::warn!(
                failed_units = self.failed_units,
                "Export run completed with failed units"
            );
            for failure in &self.failures {
                tracing::warn!(
                    unit_index = failure.index,
                    unit = %failure.descriptor,
                    stage = ?failure.stage,
                    error = %failure.message,
                    "Unit failed"
                );
            }
        }
    }
}

#[derive(Debug)]
struct AggregatorState {
    statuses: Vec<UnitStatus>,
    total_rows: usize,
    successful_units: usize,
    failures: Vec<UnitFailure>,
}

/// Shared accumulator of unit outcomes
pub struct ResultAggregator {
    descriptors: Vec<UnitDescriptor>,
    state: Mutex<AggregatorState>,
    on_unit_complete: Option<ProgressCallback>,
}

impl std::fmt::Debug for ResultAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultAggregator")
            .field("total_units", &self.descriptors.len())
            .field("has_callback", &self.on_unit_complete.is_some())
            .finish()
    }
}

impl ResultAggregator {
    pub fn new(units: &[WorkUnit], on_unit_complete: Option<ProgressCallback>) -> Self {
        Self {
            descriptors: units.iter().map(|u| u.descriptor).collect(),
            state: Mutex::new(AggregatorState {
                statuses: units.iter().map(|u| u.status).collect(),
                total_rows: 0,
                successful_units: 0,
                failures: Vec::new(),
            }),
            on_unit_complete,
        }
    }

    pub fn total_units(&self) -> usize {
        self.descriptors.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move a unit along its state machine; illegal moves are logged and refused
    pub fn transition(&self, index: usize, next: UnitStatus) -> bool {
        let mut state = self.lock();
        Self::apply_transition(&mut state, index, next)
    }

    fn apply_transition(state: &mut AggregatorState, index: usize, next: UnitStatus) -> bool {
        let Some(current) = state.statuses.get(index).copied() else {
            tracing::warn!(unit_index = index, "Transition for unknown unit ignored");
            return false;
        };
        if !current.can_transition_to(next) {
            tracing::warn!(
                unit_index = index,
                from = ?current,
                to = ?next,
                "Illegal unit state transition refused"
            );
            return false;
        }
        state.statuses[index] = next;
        true
    }

    pub fn status(&self, index: usize) -> Option<UnitStatus> {
        self.lock().statuses.get(index).copied()
    }

    /// Record a successful write of `rows` rows
    pub fn record_success(&self, index: usize, rows: usize) {
        let mut state = self.lock();
        if !Self::apply_transition(&mut state, index, UnitStatus::Written) {
            return;
        }
        state.total_rows += rows;
        state.successful_units += 1;

        self.notify(&BatchProgress {
            unit_index: index,
            total_units: self.total_units(),
            rows,
            success: true,
            error: None,
        });
    }

    /// Record a failed unit
    pub fn record_failure(&self, index: usize, stage: FailureStage, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.lock();
        if !Self::apply_transition(&mut state, index, stage.terminal_status()) {
            return;
        }
        state.failures.push(UnitFailure {
            index,
            descriptor: self.descriptors[index],
            stage,
            message: message.clone(),
        });

        self.notify(&BatchProgress {
            unit_index: index,
            total_units: self.total_units(),
            rows: 0,
            success: false,
            error: Some(message),
        });
    }

    /// Cancel every unit still pending
    pub fn cancel_pending(&self) -> usize {
        let pending: Vec<usize> = {
            let state = self.lock();
            state
                .statuses
                .iter()
                .enumerate()
                .filter(|(_, s)| **s == UnitStatus::Pending)
                .map(|(i, _)| i)
                .collect()
        };
        for index in &pending {
            self.record_failure(*index, FailureStage::Cancelled, "run stopped before unit started");
        }
        pending.len()
    }

    // Callers hold the state lock, which serializes callback invocations
    fn notify(&self, progress: &BatchProgress) {
        if let Some(ref callback) = self.on_unit_complete {
            callback(progress);
        }
    }

    /// Fold everything into the final result
    ///
    /// Only meaningful once every worker and the writer have finished. A unit
    /// that somehow never reached a terminal state is reported as failed.
    pub fn finish(
        &self,
        destination: &str,
        duration: Duration,
        interrupted: bool,
        dry_run: bool,
    ) -> AggregateResult {
        let stranded: Vec<(usize, UnitStatus)> = {
            let state = self.lock();
            state
                .statuses
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.is_terminal())
                .map(|(i, s)| (i, *s))
                .collect()
        };
        for (index, status) in stranded {
            let stage = match status {
                UnitStatus::Queued => FailureStage::Write,
                UnitStatus::Fetching => FailureStage::Fetch,
                _ => FailureStage::Cancelled,
            };
            let message = format!("unit left in {status:?} state");
            // Force the terminal state directly; the edge may not exist
            let mut state = self.lock();
            state.statuses[index] = stage.terminal_status();
            state.failures.push(UnitFailure {
                index,
                descriptor: self.descriptors[index],
                stage,
                message: message.clone(),
            });

            self.notify(&BatchProgress {
                unit_index: index,
                total_units: self.total_units(),
                rows: 0,
                success: false,
                error: Some(message),
            });
        }

        let state = self.lock();
        let mut failures = state.failures.clone();
        failures.sort_by_key(|f| f.index);

        AggregateResult {
            destination: destination.to_string(),
            total_rows: state.total_rows,
            total_units: self.total_units(),
            successful_units: state.successful_units,
            failed_units: failures.len(),
            failed_unit_descriptors: failures.iter().map(|f| f.descriptor).collect(),
            failures,
            duration,
            completed_at: Utc::now(),
            interrupted,
            dry_run,
        }
    }
}
