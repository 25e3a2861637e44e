//! Launch orchestration: user-controlled kernel launching for one run.
//!
//! A launch orchestrator replaces the direct launch of a configuration with
//! arbitrary host logic: several launches, argument rewrites between them,
//! iterative schemes. It only ever talks to the engine through the
//! [`ManipulatorContext`] handed to it for the duration of a single run, so
//! no engine state can leak across runs.

use std::collections::BTreeMap;
use tuneforge_core::{
    ArgumentId, ArgumentStore, DimensionVector, ElementValue, KernelConfiguration, KernelId,
    Result, TunerError,
};
use tuneforge_engine::{ComputeEngine, KernelRunResult, KernelRuntimeData};

/// User-supplied launch logic for one kernel or composition.
pub trait LaunchOrchestrator {
    /// Launches the computation for `kernel_id`.
    ///
    /// May call [`ManipulatorContext::run_kernel`] any number of times and
    /// mutate argument contents or bindings between calls.
    fn launch_computation(
        &mut self,
        kernel_id: KernelId,
        ctx: &mut ManipulatorContext<'_>,
    ) -> Result<()>;

    /// When true the runner uploads every bound argument before invoking
    /// [`launch_computation`](LaunchOrchestrator::launch_computation);
    /// otherwise the orchestrator orders uploads itself through the update
    /// methods.
    fn enable_argument_preload(&self) -> bool {
        true
    }
}

/// Bounded engine access granted to an orchestrator during one run.
pub struct ManipulatorContext<'a> {
    engine: &'a mut dyn ComputeEngine,
    store: &'a ArgumentStore,
    kernels: BTreeMap<KernelId, KernelRuntimeData>,
    configuration: &'a KernelConfiguration,
    device_duration_ns: u64,
}

impl<'a> ManipulatorContext<'a> {
    pub(crate) fn new(
        engine: &'a mut dyn ComputeEngine,
        store: &'a ArgumentStore,
        kernels: BTreeMap<KernelId, KernelRuntimeData>,
        configuration: &'a KernelConfiguration,
    ) -> Self {
        Self {
            engine,
            store,
            kernels,
            configuration,
            device_duration_ns: 0,
        }
    }

    /// Launches one kernel of the current run with its configured geometry.
    pub fn run_kernel(&mut self, kernel_id: KernelId) -> Result<KernelRunResult> {
        let data = self
            .kernels
            .get(&kernel_id)
            .ok_or(TunerError::InvalidKernelId(kernel_id))?
            .clone();
        self.launch(data)
    }

    /// Launches one kernel with an overriding geometry; the configured
    /// geometry is untouched.
    pub fn run_kernel_with_geometry(
        &mut self,
        kernel_id: KernelId,
        global_size: DimensionVector,
        local_size: DimensionVector,
    ) -> Result<KernelRunResult> {
        let mut data = self
            .kernels
            .get(&kernel_id)
            .ok_or(TunerError::InvalidKernelId(kernel_id))?
            .clone();
        data.set_global_size(global_size);
        data.set_local_size(local_size);
        self.launch(data)
    }

    fn launch(&mut self, data: KernelRuntimeData) -> Result<KernelRunResult> {
        let arguments = self.store.arguments(&data.argument_ids)?;
        let result = self.engine.run_kernel(&data, &arguments, &mut [])?;
        self.device_duration_ns += result.duration_ns;
        Ok(result)
    }

    /// Kernels of the current run, in ascending id order.
    pub fn kernel_ids(&self) -> Vec<KernelId> {
        self.kernels.keys().copied().collect()
    }

    pub fn current_global_size(&self, kernel_id: KernelId) -> Result<DimensionVector> {
        self.kernels
            .get(&kernel_id)
            .map(|data| data.global_size)
            .ok_or(TunerError::InvalidKernelId(kernel_id))
    }

    pub fn current_local_size(&self, kernel_id: KernelId) -> Result<DimensionVector> {
        self.kernels
            .get(&kernel_id)
            .map(|data| data.local_size)
            .ok_or(TunerError::InvalidKernelId(kernel_id))
    }

    pub fn current_configuration(&self) -> &KernelConfiguration {
        self.configuration
    }

    pub fn parameter_value(&self, name: &str) -> Result<u64> {
        self.configuration.value_of(name).ok_or_else(|| {
            TunerError::InvalidArgument(format!("no parameter named {} in this run", name))
        })
    }

    /// Overwrites the device contents of a vector argument. Uploads the
    /// buffer first when it is not resident yet.
    pub fn update_argument_vector<T: ElementValue>(
        &mut self,
        argument_id: ArgumentId,
        data: &[T],
    ) -> Result<()> {
        self.update_argument_bytes(argument_id, bytemuck::cast_slice(data))
    }

    /// Overwrites the device contents of a scalar argument.
    pub fn update_argument_scalar<T: ElementValue>(
        &mut self,
        argument_id: ArgumentId,
        value: T,
    ) -> Result<()> {
        self.update_argument_bytes(argument_id, bytemuck::bytes_of(&value))
    }

    fn update_argument_bytes(&mut self, argument_id: ArgumentId, bytes: &[u8]) -> Result<()> {
        match self.engine.update_argument(argument_id, bytes) {
            Err(TunerError::InvalidArgumentId(_)) => {
                self.engine.upload_argument(self.store.argument(argument_id)?)?;
                self.engine.update_argument(argument_id, bytes)
            }
            other => other,
        }
    }

    /// Swaps the binding positions of two arguments of a kernel.
    pub fn swap_kernel_arguments(
        &mut self,
        kernel_id: KernelId,
        first: ArgumentId,
        second: ArgumentId,
    ) -> Result<()> {
        let data = self
            .kernels
            .get_mut(&kernel_id)
            .ok_or(TunerError::InvalidKernelId(kernel_id))?;

        let mut ids = data.argument_ids.clone();
        let first_position = ids.iter().position(|id| *id == first);
        let second_position = ids.iter().position(|id| *id == second);
        match (first_position, second_position) {
            (Some(lhs), Some(rhs)) => {
                ids.swap(lhs, rhs);
                data.set_argument_ids(ids);
                Ok(())
            }
            _ => Err(TunerError::InvalidArgument(format!(
                "arguments {} and {} are not both bound to kernel {}",
                first, second, kernel_id
            ))),
        }
    }

    /// Replaces the argument binding of a kernel for the rest of the run.
    pub fn change_kernel_arguments(
        &mut self,
        kernel_id: KernelId,
        argument_ids: Vec<ArgumentId>,
    ) -> Result<()> {
        for argument_id in &argument_ids {
            self.store.argument(*argument_id)?;
        }
        let data = self
            .kernels
            .get_mut(&kernel_id)
            .ok_or(TunerError::InvalidKernelId(kernel_id))?;
        data.set_argument_ids(argument_ids);
        Ok(())
    }

    /// Device time accumulated by the run's launches so far.
    pub(crate) fn device_duration_ns(&self) -> u64 {
        self.device_duration_ns
    }
}
