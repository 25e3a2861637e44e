//! Tuning outcomes and their append-only store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tuneforge_core::{KernelConfiguration, KernelId};

/// Verdict for one evaluated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    /// Ran to completion and matched the reference.
    Valid,
    /// Ran to completion but differs from the reference.
    Invalid,
    /// Did not complete: engine failure, orchestrator error or timeout.
    Failed,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Invalid => "invalid",
            ValidationStatus::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Outcome of evaluating one configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResult {
    pub kernel_name: String,
    pub configuration: KernelConfiguration,
    /// Device-side computation time in nanoseconds.
    pub duration_ns: u64,
    /// Time spent inside orchestrator code outside device execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overhead_ns: Option<u64>,
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TuningResult {
    /// Result of a completed run, pending validation.
    pub fn completed(
        kernel_name: impl Into<String>,
        configuration: KernelConfiguration,
        duration_ns: u64,
        overhead_ns: Option<u64>,
    ) -> Self {
        Self {
            kernel_name: kernel_name.into(),
            configuration,
            duration_ns,
            overhead_ns,
            status: ValidationStatus::Valid,
            error_message: None,
        }
    }

    /// Result of a run that did not complete.
    pub fn failed(
        kernel_name: impl Into<String>,
        configuration: KernelConfiguration,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            kernel_name: kernel_name.into(),
            configuration,
            duration_ns: 0,
            overhead_ns: None,
            status: ValidationStatus::Failed,
            error_message: Some(non_empty(message)),
        }
    }

    /// Downgrades a completed run whose outputs differ from the reference.
    pub fn mark_invalid(&mut self, message: impl Into<String>) {
        self.status = ValidationStatus::Invalid;
        self.error_message = Some(non_empty(message.into()));
    }

    /// Downgrades a completed run that failed during validation.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = ValidationStatus::Failed;
        self.error_message = Some(non_empty(message.into()));
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

// Non-valid results always carry a message for the report.
fn non_empty(message: String) -> String {
    if message.is_empty() {
        "unspecified error".into()
    } else {
        message
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KernelResults {
    kernel_id: KernelId,
    results: Vec<TuningResult>,
}

/// Append-only collection of tuning results, grouped per kernel.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResultStore {
    kernels: Vec<KernelResults>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kernel_id: KernelId, result: TuningResult) {
        match self
            .kernels
            .iter_mut()
            .find(|entry| entry.kernel_id == kernel_id)
        {
            Some(entry) => entry.results.push(result),
            None => self.kernels.push(KernelResults {
                kernel_id,
                results: vec![result],
            }),
        }
    }

    /// Results for one kernel in insertion order.
    pub fn results(&self, kernel_id: KernelId) -> &[TuningResult] {
        self.kernels
            .iter()
            .find(|entry| entry.kernel_id == kernel_id)
            .map(|entry| entry.results.as_slice())
            .unwrap_or(&[])
    }

    /// The valid result with the minimum computation duration.
    pub fn best(&self, kernel_id: KernelId) -> Option<&TuningResult> {
        self.results(kernel_id)
            .iter()
            .filter(|result| result.is_valid())
            .min_by_key(|result| result.duration_ns)
    }

    /// Persists the store as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        std::fs::write(path, json)
    }

    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuneforge_core::{DimensionVector, LaunchGeometry, ParameterValue};

    fn configuration(value: u64) -> KernelConfiguration {
        KernelConfiguration::single(
            vec![ParameterValue::new("A", value)],
            LaunchGeometry::new(DimensionVector::new(8, 1, 1), DimensionVector::new(1, 1, 1)),
        )
    }

    #[test]
    fn best_ignores_invalid_and_failed_runs() {
        let mut store = ResultStore::new();
        let mut slow = TuningResult::completed("k", configuration(1), 900, None);
        slow.mark_invalid("results differ");
        store.add(0, slow);
        store.add(0, TuningResult::completed("k", configuration(2), 500, None));
        store.add(0, TuningResult::failed("k", configuration(3), "boom"));
        store.add(0, TuningResult::completed("k", configuration(4), 700, None));

        let best = store.best(0).unwrap();
        assert_eq!(best.duration_ns, 500);
        assert_eq!(best.configuration.value_of("A"), Some(2));
    }

    #[test]
    fn non_valid_results_carry_a_message() {
        let mut result = TuningResult::completed("k", configuration(1), 100, None);
        result.mark_invalid("");
        assert!(!result.error_message.as_ref().unwrap().is_empty());

        let failed = TuningResult::failed("k", configuration(1), "");
        assert!(!failed.error_message.as_ref().unwrap().is_empty());
    }

    #[test]
    fn results_keep_insertion_order() {
        let mut store = ResultStore::new();
        for value in 0..4 {
            store.add(1, TuningResult::completed("k", configuration(value), value, None));
        }

        let order: Vec<u64> = store
            .results(1)
            .iter()
            .map(|result| result.configuration.value_of("A").unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
