//! Executes a single configuration against the compute engine.

use crate::orchestrator::{LaunchOrchestrator, ManipulatorContext};
use std::collections::BTreeMap;
use std::time::Instant;
use tuneforge_core::{
    ArgumentId, ArgumentStore, Kernel, KernelConfiguration, KernelId, KernelRegistry,
    LocalMemoryModifier, Result, TunerError,
};
use tuneforge_engine::{ComputeEngine, KernelRuntimeData, OutputDescriptor};

/// Timing of one executed configuration.
#[derive(Debug, Clone, Copy)]
pub struct KernelRun {
    /// Summed device-side computation time in nanoseconds.
    pub duration_ns: u64,
    /// Orchestrator wall time spent outside device execution; `None` for
    /// direct launches.
    pub overhead_ns: Option<u64>,
}

/// Runs one configuration, either directly or through an orchestrator.
///
/// Borrowed pieces of the tuning session are assembled per call; nothing
/// survives a run, which keeps orchestrator access scoped to the
/// [`ManipulatorContext`] lifetime.
pub struct KernelRunner<'a> {
    engine: &'a mut dyn ComputeEngine,
    store: &'a ArgumentStore,
    registry: &'a KernelRegistry,
}

impl<'a> KernelRunner<'a> {
    pub fn new(
        engine: &'a mut dyn ComputeEngine,
        store: &'a ArgumentStore,
        registry: &'a KernelRegistry,
    ) -> Self {
        Self {
            engine,
            store,
            registry,
        }
    }

    /// Executes `configuration` for the kernel or composition `id`.
    ///
    /// Compositions always require an orchestrator; plain kernels use one
    /// when registered. On failure the device is synchronised before the
    /// error is returned.
    pub fn run(
        &mut self,
        id: KernelId,
        configuration: &KernelConfiguration,
        orchestrator: Option<&mut Box<dyn LaunchOrchestrator>>,
        outputs: &mut [OutputDescriptor<'_>],
    ) -> Result<KernelRun> {
        let outcome = if self.registry.is_composition(id) {
            let orchestrator = orchestrator.ok_or_else(|| {
                TunerError::InvalidArgument(format!(
                    "composition {} requires a launch orchestrator",
                    id
                ))
            })?;
            self.run_orchestrated(id, configuration, orchestrator, outputs)
        } else {
            match orchestrator {
                Some(orchestrator) => {
                    self.run_orchestrated(id, configuration, orchestrator, outputs)
                }
                None => self.run_direct(id, configuration, outputs),
            }
        };

        if outcome.is_err() {
            // Leave no launch pending behind a failed run.
            let _ = self.engine.synchronize_device();
        }
        outcome
    }

    fn run_direct(
        &mut self,
        id: KernelId,
        configuration: &KernelConfiguration,
        outputs: &mut [OutputDescriptor<'_>],
    ) -> Result<KernelRun> {
        let kernel = self.registry.kernel(id)?;
        let data = self.runtime_data(kernel, configuration)?;
        let arguments = self.store.arguments(kernel.argument_ids())?;

        let result = self.engine.run_kernel(&data, &arguments, outputs)?;
        Ok(KernelRun {
            duration_ns: result.duration_ns,
            overhead_ns: None,
        })
    }

    fn run_orchestrated(
        &mut self,
        id: KernelId,
        configuration: &KernelConfiguration,
        orchestrator: &mut Box<dyn LaunchOrchestrator>,
        outputs: &mut [OutputDescriptor<'_>],
    ) -> Result<KernelRun> {
        let kernels = self.orchestrated_kernels(id, configuration)?;

        if orchestrator.enable_argument_preload() {
            for data in kernels.values() {
                for argument_id in &data.argument_ids {
                    self.engine.upload_argument(self.store.argument(*argument_id)?)?;
                }
            }
            if self.registry.is_composition(id) {
                for argument_id in self.registry.composition(id)?.shared_argument_ids() {
                    self.engine.upload_argument(self.store.argument(*argument_id)?)?;
                }
            }
        }

        let mut ctx =
            ManipulatorContext::new(&mut *self.engine, self.store, kernels, configuration);
        let started = Instant::now();
        let outcome = orchestrator.launch_computation(id, &mut ctx);
        let wall_ns = started.elapsed().as_nanos() as u64;
        let device_ns = ctx.device_duration_ns();
        drop(ctx);

        outcome?;
        self.engine.synchronize_device()?;
        for output in outputs.iter_mut() {
            self.engine.download_argument(output.argument_id, output.destination)?;
        }

        Ok(KernelRun {
            duration_ns: device_ns,
            overhead_ns: Some(wall_ns.saturating_sub(device_ns)),
        })
    }

    /// Runtime data for every kernel reachable by the orchestrator: the
    /// kernel itself, or all members of the composition with their own
    /// geometries and bindings.
    fn orchestrated_kernels(
        &self,
        id: KernelId,
        configuration: &KernelConfiguration,
    ) -> Result<BTreeMap<KernelId, KernelRuntimeData>> {
        let mut kernels = BTreeMap::new();

        if self.registry.is_composition(id) {
            let composition = self.registry.composition(id)?;
            for member_id in composition.kernel_ids() {
                let member = self.registry.kernel(*member_id)?;
                let mut data = self.runtime_data(member, configuration)?;
                if let Some(overridden) = composition.argument_ids_for(*member_id) {
                    data.set_argument_ids(overridden.to_vec());
                }
                // Composition-scoped sizing shadows the member's own.
                let scoped = self.resolved_local_memory(
                    composition.local_memory_modifiers_for(*member_id),
                    configuration,
                )?;
                for (argument_id, count) in scoped {
                    data.local_memory_sizes
                        .retain(|(existing, _)| *existing != argument_id);
                    data.local_memory_sizes.push((argument_id, count));
                }
                kernels.insert(*member_id, data);
            }
        } else {
            let kernel = self.registry.kernel(id)?;
            kernels.insert(id, self.runtime_data(kernel, configuration)?);
        }
        Ok(kernels)
    }

    fn runtime_data(
        &self,
        kernel: &Kernel,
        configuration: &KernelConfiguration,
    ) -> Result<KernelRuntimeData> {
        let geometry = configuration.geometry_for(kernel.id()).ok_or_else(|| {
            TunerError::ConfigurationInvalid(format!(
                "configuration carries no geometry for kernel {}",
                kernel.id()
            ))
        })?;
        let source = self
            .registry
            .kernel_source_with_defines(kernel.id(), configuration)?;

        let mut data = KernelRuntimeData::new(
            kernel.id(),
            kernel.name(),
            source,
            geometry.global,
            geometry.local,
            kernel.argument_ids().to_vec(),
        );
        data.set_local_memory_sizes(
            self.resolved_local_memory(kernel.local_memory_modifiers(), configuration)?,
        );
        Ok(data)
    }

    /// Evaluates local-memory modifiers against the configuration, yielding
    /// the element count per affected argument for this launch.
    fn resolved_local_memory<'m>(
        &self,
        modifiers: impl IntoIterator<Item = &'m LocalMemoryModifier>,
        configuration: &KernelConfiguration,
    ) -> Result<Vec<(ArgumentId, usize)>> {
        let mut sizes = Vec::new();
        for modifier in modifiers {
            let mut values = Vec::with_capacity(modifier.parameter_names().len());
            for name in modifier.parameter_names() {
                let value = configuration.value_of(name).ok_or_else(|| {
                    TunerError::InvalidArgument(format!(
                        "configuration carries no value for parameter {}",
                        name
                    ))
                })?;
                values.push(value);
            }
            let default_count = self.store.argument(modifier.argument_id())?.count();
            sizes.push((
                modifier.argument_id(),
                modifier.resolved_count(default_count, &values),
            ));
        }
        Ok(sizes)
    }
}
