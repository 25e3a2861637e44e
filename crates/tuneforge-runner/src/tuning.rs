//! End-to-end tuning orchestration.

use crate::kernel_runner::{KernelRun, KernelRunner};
use crate::orchestrator::LaunchOrchestrator;
use crate::results::{ResultStore, TuningResult, ValidationStatus};
use crate::validator::{ElementComparator, ReferenceComputer, ResultValidator, ValidationMethod};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tuneforge_core::{
    AccessMode, ArgumentId, ArgumentStore, GeneratorSettings, KernelConfiguration, KernelId,
    KernelParameter, KernelRegistry, ParameterValue, ReferenceSpec, Result, TunerError,
};
use tuneforge_engine::{ComputeEngine, OutputDescriptor};
use tuneforge_search::create_searcher;

/// What the session is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Full tuning with validation and reference management.
    Tuning,
    /// Plain execution of chosen configurations; validation and reference
    /// APIs are rejected.
    Computation,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Tuning => f.write_str("tuning"),
            RunMode::Computation => f.write_str("computation"),
        }
    }
}

/// Owns one tuning session: argument store, registry, engine, validator and
/// collected results.
///
/// The session is single-threaded and cooperative: one configuration runs at
/// a time, its device effects are flushed before the next one starts, and a
/// stop flag is honoured at iteration boundaries.
pub struct TuningRunner {
    store: ArgumentStore,
    registry: KernelRegistry,
    engine: Box<dyn ComputeEngine>,
    validator: ResultValidator,
    results: ResultStore,
    orchestrators: BTreeMap<KernelId, Box<dyn LaunchOrchestrator>>,
    run_mode: RunMode,
    stop: Arc<AtomicBool>,
    time_budgets: BTreeMap<KernelId, Duration>,
    searcher_seed: u64,
}

impl TuningRunner {
    pub fn new(engine: Box<dyn ComputeEngine>) -> Self {
        Self::with_mode(engine, RunMode::Tuning)
    }

    pub fn with_mode(engine: Box<dyn ComputeEngine>, run_mode: RunMode) -> Self {
        Self {
            store: ArgumentStore::new(),
            registry: KernelRegistry::new(),
            engine,
            validator: ResultValidator::new(),
            results: ResultStore::new(),
            orchestrators: BTreeMap::new(),
            run_mode,
            stop: Arc::new(AtomicBool::new(false)),
            time_budgets: BTreeMap::new(),
            searcher_seed: 0x5eed,
        }
    }

    pub fn arguments(&self) -> &ArgumentStore {
        &self.store
    }

    pub fn arguments_mut(&mut self) -> &mut ArgumentStore {
        &mut self.store
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut KernelRegistry {
        &mut self.registry
    }

    pub fn engine(&self) -> &dyn ComputeEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn ComputeEngine {
        self.engine.as_mut()
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    /// Handle observed at every iteration boundary; setting it stops the
    /// session after the in-flight configuration completes.
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Seed for searcher construction; fix it for reproducible sessions.
    pub fn set_searcher_seed(&mut self, seed: u64) {
        self.searcher_seed = seed;
    }

    /// Soft per-kernel time budget. Once a tuning session for the kernel has
    /// spent the budget, remaining configurations are recorded as failed
    /// without being launched.
    pub fn set_time_budget(&mut self, kernel_id: KernelId, budget: Duration) {
        self.time_budgets.insert(kernel_id, budget);
    }

    pub fn set_launch_orchestrator(
        &mut self,
        kernel_id: KernelId,
        orchestrator: Box<dyn LaunchOrchestrator>,
    ) {
        self.orchestrators.insert(kernel_id, orchestrator);
    }

    pub fn set_validation_method(
        &mut self,
        method: ValidationMethod,
        tolerance: f64,
    ) -> Result<()> {
        self.require_tuning_mode("validation")?;
        self.validator.set_validation_method(method, tolerance)
    }

    pub fn set_validation_range(
        &mut self,
        argument_id: ArgumentId,
        element_count: usize,
    ) -> Result<()> {
        self.require_tuning_mode("validation")?;
        self.validator.set_validation_range(argument_id, element_count);
        Ok(())
    }

    pub fn set_element_comparator(
        &mut self,
        argument_id: ArgumentId,
        comparator: ElementComparator,
    ) -> Result<()> {
        self.require_tuning_mode("validation")?;
        self.validator.set_element_comparator(argument_id, comparator);
        Ok(())
    }

    /// Validates `kernel_id` against another registered kernel run once at a
    /// fixed configuration.
    pub fn set_reference_kernel(
        &mut self,
        kernel_id: KernelId,
        reference_id: KernelId,
        values: Vec<ParameterValue>,
        argument_ids: Vec<ArgumentId>,
    ) -> Result<()> {
        self.require_tuning_mode("reference setup")?;
        self.registry
            .set_reference_kernel(kernel_id, reference_id, values, argument_ids)
    }

    /// Validates `kernel_id` against a host-side reference computer.
    pub fn set_reference_computer(
        &mut self,
        kernel_id: KernelId,
        computer: Box<dyn ReferenceComputer>,
        argument_ids: Vec<ArgumentId>,
    ) -> Result<()> {
        self.require_tuning_mode("reference setup")?;
        self.registry.set_reference_computer(kernel_id, argument_ids)?;
        self.validator.set_reference_computer(kernel_id, computer);
        Ok(())
    }

    /// Tunes one kernel or composition and returns its recorded results in
    /// searcher order.
    pub fn tune(&mut self, kernel_id: KernelId) -> Result<&[TuningResult]> {
        self.require_tuning_mode("kernel tuning")?;

        let name = self.registry.name(kernel_id)?.to_string();
        let policy = self.registry.search_policy(kernel_id)?.clone();
        let parameters = self.searchable_parameters(kernel_id)?;
        let settings = self.generator_settings();
        let configurations: Vec<_> = self.registry.configurations(kernel_id, settings)?.collect();

        // Reference failure aborts: without it no run can be judged.
        self.ensure_reference(kernel_id)?;

        let mut searcher =
            create_searcher(&policy, configurations, &parameters, self.searcher_seed)?;
        let total = searcher.remaining();
        let budget = self.time_budgets.get(&kernel_id).copied();
        let started = Instant::now();
        let mut iteration = 0usize;

        while searcher.remaining() > 0 {
            if self.stop.load(Ordering::Relaxed) {
                info!(kernel = %name, "tuning stopped cooperatively");
                break;
            }
            iteration += 1;
            let configuration = searcher.next_configuration().clone();

            let out_of_budget = budget.is_some_and(|budget| started.elapsed() > budget);
            let outcome = if out_of_budget {
                Err(TunerError::Timeout {
                    budget_ms: budget.unwrap_or_default().as_millis() as u64,
                })
            } else {
                info!(
                    kernel = %name,
                    iteration,
                    total,
                    configuration = %configuration,
                    "launching kernel"
                );
                self.run_configuration(kernel_id, &configuration, &mut [])
            };

            let mut result = match outcome {
                Ok(run) => TuningResult::completed(
                    &name,
                    configuration,
                    run.duration_ns,
                    run.overhead_ns,
                ),
                Err(err) => {
                    warn!(kernel = %name, error = %err, "kernel run failed");
                    TuningResult::failed(&name, configuration, format!("failed kernel run: {}", err))
                }
            };

            if result.status != ValidationStatus::Failed {
                match self.check_result(kernel_id) {
                    Ok(true) => {}
                    Ok(false) => result.mark_invalid("results differ from reference beyond tolerance"),
                    Err(err) => {
                        warn!(kernel = %name, error = %err, "validation failed");
                        result.mark_failed(format!("failed validation: {}", err));
                    }
                }
            }

            let feedback = if result.status == ValidationStatus::Failed {
                f64::INFINITY
            } else {
                result.duration_ns as f64
            };
            self.results.add(kernel_id, result);
            searcher.advance(feedback);

            self.clear_buffers_between_runs(kernel_id)?;
        }

        self.engine.clear_buffers()?;
        self.validator.clear_reference(kernel_id);
        Ok(self.results.results(kernel_id))
    }

    /// Runs a chosen configuration outside of tuning, filling the output
    /// descriptors. Available in both run modes.
    pub fn run_kernel(
        &mut self,
        kernel_id: KernelId,
        values: &[ParameterValue],
        outputs: &mut [OutputDescriptor<'_>],
    ) -> Result<KernelRun> {
        let settings = self.generator_settings();
        let configuration = self.registry.configuration_for(kernel_id, values, settings)?;
        info!(
            kernel = kernel_id,
            configuration = %configuration,
            "running kernel"
        );

        let run = self.run_configuration(kernel_id, &configuration, outputs);
        self.engine.clear_buffers()?;
        run
    }

    fn run_configuration(
        &mut self,
        kernel_id: KernelId,
        configuration: &KernelConfiguration,
        outputs: &mut [OutputDescriptor<'_>],
    ) -> Result<KernelRun> {
        let mut runner = KernelRunner::new(self.engine.as_mut(), &self.store, &self.registry);
        runner.run(
            kernel_id,
            configuration,
            self.orchestrators.get_mut(&kernel_id),
            outputs,
        )
    }

    /// Computes and caches the reference result for a kernel, once.
    fn ensure_reference(&mut self, kernel_id: KernelId) -> Result<()> {
        let Some(reference) = self.registry.reference(kernel_id)?.cloned() else {
            return Ok(());
        };
        if self.validator.has_reference(kernel_id) {
            return Ok(());
        }

        match reference {
            ReferenceSpec::Kernel {
                reference_id,
                values,
                argument_ids,
            } => {
                info!(kernel = kernel_id, reference = reference_id, "computing reference result");
                let settings = self.generator_settings();
                let configuration =
                    self.registry
                        .configuration_for(reference_id, &values, settings)?;

                let mut runner =
                    KernelRunner::new(self.engine.as_mut(), &self.store, &self.registry);
                runner.run(reference_id, &configuration, None, &mut [])?;

                let mut outputs = Vec::with_capacity(argument_ids.len());
                for argument_id in argument_ids {
                    let argument = self.store.argument(argument_id)?;
                    let mut buffer = vec![0u8; argument.data_size_bytes()];
                    self.engine.download_argument(argument_id, &mut buffer)?;
                    outputs.push((argument_id, buffer));
                }
                self.engine.clear_buffers()?;
                self.validator.store_reference(kernel_id, outputs);
            }
            ReferenceSpec::Computer { argument_ids } => {
                info!(kernel = kernel_id, "computing reference result on the host");
                let mut argument_sizes = Vec::with_capacity(argument_ids.len());
                for argument_id in argument_ids {
                    let argument = self.store.argument(argument_id)?;
                    argument_sizes.push((argument_id, argument.data_size_bytes()));
                }
                self.validator
                    .compute_reference_from_computer(kernel_id, &argument_sizes)?;
            }
        }
        Ok(())
    }

    /// Downloads the marked output arguments of a completed run and compares
    /// them against the cached reference.
    fn check_result(&mut self, kernel_id: KernelId) -> Result<bool> {
        let Some(reference) = self.registry.reference(kernel_id)? else {
            return Ok(true);
        };
        let argument_ids = reference.argument_ids().to_vec();

        for argument_id in argument_ids {
            let argument = self.store.argument(argument_id)?;
            let kind = argument.kind();
            let mut actual = vec![0u8; argument.data_size_bytes()];
            self.engine.download_argument(argument_id, &mut actual)?;

            if !self
                .validator
                .validate_argument(kernel_id, argument_id, kind, &actual)?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Buffer hygiene between two runs of one tuning session: outputs are
    /// always dropped; inputs too when an orchestrator may have mutated them.
    fn clear_buffers_between_runs(&mut self, kernel_id: KernelId) -> Result<()> {
        self.engine.clear_buffers_with_access(AccessMode::WriteOnly)?;
        self.engine.clear_buffers_with_access(AccessMode::ReadWrite)?;
        if self.orchestrators.contains_key(&kernel_id) {
            self.engine.clear_buffers_with_access(AccessMode::ReadOnly)?;
        }
        Ok(())
    }

    fn searchable_parameters(&self, kernel_id: KernelId) -> Result<Vec<KernelParameter>> {
        if self.registry.is_composition(kernel_id) {
            Ok(self
                .registry
                .composition(kernel_id)?
                .parameters()
                .iter()
                .map(|entry| entry.parameter.clone())
                .collect())
        } else {
            Ok(self.registry.kernel(kernel_id)?.parameters().to_vec())
        }
    }

    fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            global_size_type: self.engine.global_size_type(),
            automatic_size_correction: self.engine.automatic_size_correction(),
        }
    }

    fn require_tuning_mode(&self, operation: &str) -> Result<()> {
        if self.run_mode == RunMode::Computation {
            return Err(TunerError::InvalidMode {
                operation: operation.into(),
                mode: self.run_mode.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for TuningRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TuningRunner")
            .field("run_mode", &self.run_mode)
            .field("kernels", &self.registry.len())
            .field("arguments", &self.store.len())
            .finish_non_exhaustive()
    }
}
