//! In-process compute engine executing registered host functions.
//!
//! `HostEngine` stands in for a device driver: kernels are Rust closures
//! keyed by entry-point name, device buffers are plain byte vectors keyed by
//! argument id, and a launch is a timed closure call. The configured source
//! still flows through the engine — the `#define` prefix is parsed back out
//! and exposed to the closure, so a host kernel reacts to tuning parameters
//! exactly like a compiled one would.

use crate::engine::{ComputeEngine, KernelRunResult, OutputDescriptor};
use crate::info::{DeviceInfo, DeviceType, PlatformInfo};
use crate::runtime_data::KernelRuntimeData;
use std::collections::BTreeMap;
use std::time::Instant;
use tuneforge_core::{
    AccessMode, ArgumentId, DimensionVector, ElementKind, ElementValue, GlobalSizeType,
    KernelArgument, Result, TunerError, UploadKind,
};

/// Geometry and parameter values visible to a host kernel during a launch.
#[derive(Debug, Clone)]
pub struct HostLaunch {
    /// Total work-item count per dimension, independent of the engine's
    /// global-size convention.
    pub global_size: DimensionVector,
    pub local_size: DimensionVector,
    defines: BTreeMap<String, u64>,
}

impl HostLaunch {
    /// Value of a tuning parameter, recovered from the source's `#define`
    /// prefix.
    pub fn define(&self, name: &str) -> Option<u64> {
        self.defines.get(name).copied()
    }
}

/// A device buffer held by the host engine.
#[derive(Debug, Clone)]
pub struct HostBuffer {
    id: ArgumentId,
    kind: ElementKind,
    access: AccessMode,
    data: Vec<u8>,
}

impl HostBuffer {
    pub fn id(&self) -> ArgumentId {
        self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_slice<T: ElementValue>(&self) -> Result<&[T]> {
        self.check_kind::<T>()?;
        bytemuck::try_cast_slice(&self.data)
            .map_err(|err| TunerError::EngineFailure(format!("buffer {} view: {}", self.id, err)))
    }

    pub fn as_mut_slice<T: ElementValue>(&mut self) -> Result<&mut [T]> {
        self.check_kind::<T>()?;
        bytemuck::try_cast_slice_mut(&mut self.data)
            .map_err(|err| TunerError::EngineFailure(format!("buffer {} view: {}", self.id, err)))
    }

    fn check_kind<T: ElementValue>(&self) -> Result<()> {
        if T::KIND != self.kind {
            return Err(TunerError::EngineFailure(format!(
                "buffer {} holds {:?} elements, requested {:?}",
                self.id,
                self.kind,
                T::KIND
            )));
        }
        Ok(())
    }
}

/// Host kernel body. Buffers arrive in the launch's argument-binding order.
pub type HostKernelFn = Box<dyn FnMut(&HostLaunch, &mut [HostBuffer]) -> Result<()> + Send>;

/// In-process [`ComputeEngine`] implementation.
pub struct HostEngine {
    kernels: BTreeMap<String, HostKernelFn>,
    buffers: BTreeMap<ArgumentId, HostBuffer>,
    compiler_options: String,
    global_size_type: GlobalSizeType,
    automatic_size_correction: bool,
}

impl HostEngine {
    pub fn new() -> Self {
        Self {
            kernels: BTreeMap::new(),
            buffers: BTreeMap::new(),
            compiler_options: String::new(),
            global_size_type: GlobalSizeType::default(),
            automatic_size_correction: true,
        }
    }

    /// Registers the host function backing an entry-point name.
    pub fn register_kernel<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: FnMut(&HostLaunch, &mut [HostBuffer]) -> Result<()> + Send + 'static,
    {
        self.kernels.insert(name.into(), Box::new(function));
    }

    pub fn compiler_options(&self) -> &str {
        &self.compiler_options
    }

    fn parse_defines(source: &str) -> BTreeMap<String, u64> {
        let mut defines = BTreeMap::new();
        for line in source.lines() {
            let Some(rest) = line.strip_prefix("#define ") else {
                continue;
            };
            let mut parts = rest.split_whitespace();
            if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
                if let Ok(value) = value.parse::<u64>() {
                    defines.insert(name.to_string(), value);
                }
            }
        }
        defines
    }

    /// Total work-item grid for a launch, resolving the engine's global-size
    /// convention and the divisibility rule.
    fn resolve_grid(&self, data: &KernelRuntimeData) -> Result<(DimensionVector, DimensionVector)> {
        let local = data.local_size;
        let mut global = match self.global_size_type {
            GlobalSizeType::OpenCl => data.global_size,
            GlobalSizeType::Cuda => data.global_size.multiplied_by(&local),
        };

        if !local.divides(&global) {
            if self.automatic_size_correction {
                global.round_up_to_multiple(&local);
            } else {
                return Err(TunerError::EngineFailure(format!(
                    "global size {} is not divisible by local size {}",
                    global, local
                )));
            }
        }
        Ok((global, local))
    }
}

impl Default for HostEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeEngine for HostEngine {
    fn run_kernel(
        &mut self,
        data: &KernelRuntimeData,
        arguments: &[&KernelArgument],
        outputs: &mut [OutputDescriptor<'_>],
    ) -> Result<KernelRunResult> {
        let (global_size, local_size) = self.resolve_grid(data)?;

        for argument in arguments {
            if !self.buffers.contains_key(&argument.id()) {
                self.upload_argument(argument)?;
            }
        }

        // Local-memory scratch is re-allocated at the size this launch asks
        // for, zero-initialised.
        for (id, count) in &data.local_memory_sizes {
            let buffer = self.buffers.get_mut(id).ok_or_else(|| {
                TunerError::EngineFailure(format!(
                    "local-memory argument {} has no device buffer",
                    id
                ))
            })?;
            buffer.data = vec![0; count * buffer.kind.size_bytes()];
        }

        // Move the launch's buffers out of the pool so the kernel closure
        // can borrow them mutably alongside the engine.
        let mut launch_buffers = Vec::with_capacity(data.argument_ids.len());
        for id in &data.argument_ids {
            let buffer = self.buffers.remove(id).ok_or_else(|| {
                TunerError::EngineFailure(format!("argument {} has no device buffer", id))
            })?;
            launch_buffers.push(buffer);
        }

        let launch = HostLaunch {
            global_size,
            local_size,
            defines: Self::parse_defines(&data.source),
        };
        tracing::debug!(
            kernel = %data.name,
            global = %launch.global_size,
            local = %launch.local_size,
            "host launch"
        );

        let outcome = match self.kernels.get_mut(&data.name) {
            Some(function) => {
                let started = Instant::now();
                function(&launch, &mut launch_buffers)
                    .map(|_| started.elapsed().as_nanos() as u64)
                    .map_err(|err| {
                        TunerError::EngineFailure(format!("{}: {}", data.name, err))
                    })
            }
            None => Err(TunerError::EngineFailure(format!(
                "no host function registered for entry point {}",
                data.name
            ))),
        };

        for buffer in launch_buffers {
            self.buffers.insert(buffer.id, buffer);
        }
        let duration_ns = outcome?;

        for output in outputs.iter_mut() {
            self.download_argument(output.argument_id, output.destination)?;
        }

        Ok(KernelRunResult {
            duration_ns,
            overhead_ns: 0,
        })
    }

    fn upload_argument(&mut self, argument: &KernelArgument) -> Result<()> {
        let data = if argument.upload() == UploadKind::Local {
            vec![0; argument.data_size_bytes()]
        } else {
            argument.bytes().to_vec()
        };
        self.buffers.insert(
            argument.id(),
            HostBuffer {
                id: argument.id(),
                kind: argument.kind(),
                access: argument.access(),
                data,
            },
        );
        Ok(())
    }

    fn update_argument(&mut self, id: ArgumentId, data: &[u8]) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or(TunerError::InvalidArgumentId(id))?;
        buffer.data = data.to_vec();
        Ok(())
    }

    fn download_argument(&self, id: ArgumentId, destination: &mut [u8]) -> Result<()> {
        let buffer = self.buffers.get(&id).ok_or(TunerError::InvalidArgumentId(id))?;
        let length = destination.len().min(buffer.data.len());
        destination[..length].copy_from_slice(&buffer.data[..length]);
        Ok(())
    }

    fn clear_buffer(&mut self, id: ArgumentId) -> Result<()> {
        self.buffers.remove(&id);
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.buffers.clear();
        Ok(())
    }

    fn clear_buffers_with_access(&mut self, access: AccessMode) -> Result<()> {
        self.buffers.retain(|_, buffer| buffer.access != access);
        Ok(())
    }

    fn synchronize_device(&mut self) -> Result<()> {
        // Host launches complete before run_kernel returns; nothing is in
        // flight.
        Ok(())
    }

    fn set_compiler_options(&mut self, options: &str) {
        self.compiler_options = options.to_string();
    }

    fn set_global_size_type(&mut self, global_size_type: GlobalSizeType) {
        self.global_size_type = global_size_type;
    }

    fn global_size_type(&self) -> GlobalSizeType {
        self.global_size_type
    }

    fn set_automatic_size_correction(&mut self, enabled: bool) {
        self.automatic_size_correction = enabled;
    }

    fn automatic_size_correction(&self) -> bool {
        self.automatic_size_correction
    }

    fn platform_info(&self) -> Vec<PlatformInfo> {
        vec![PlatformInfo {
            index: 0,
            name: "TuneForge Host".into(),
            vendor: "tuneforge".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }]
    }

    fn device_info(&self, platform_index: usize) -> Result<Vec<DeviceInfo>> {
        if platform_index != 0 {
            return Err(TunerError::InvalidArgument(format!(
                "host engine has a single platform, got index {}",
                platform_index
            )));
        }
        Ok(vec![self.current_device_info()])
    }

    fn current_device_info(&self) -> DeviceInfo {
        DeviceInfo {
            index: 0,
            name: "host-cpu".into(),
            vendor: "tuneforge".into(),
            device_type: DeviceType::Cpu,
            global_memory_bytes: 0,
            local_memory_bytes: 0,
            max_work_group_size: 1024,
            max_compute_units: std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuneforge_core::ArgumentStore;

    fn runtime_data(name: &str, source: &str, argument_ids: Vec<ArgumentId>) -> KernelRuntimeData {
        KernelRuntimeData::new(
            0,
            name,
            source,
            DimensionVector::new(4, 1, 1),
            DimensionVector::new(1, 1, 1),
            argument_ids,
        )
    }

    #[test]
    fn runs_a_registered_kernel_and_downloads_output() {
        let mut store = ArgumentStore::new();
        let input = store
            .add_vector(&[1.0f32, 2.0, 3.0, 4.0], AccessMode::ReadOnly)
            .unwrap();
        let output = store
            .add_vector(&[0.0f32; 4], AccessMode::WriteOnly)
            .unwrap();

        let mut engine = HostEngine::new();
        engine.register_kernel("double_it", |launch: &HostLaunch, buffers: &mut [HostBuffer]| {
            let factor = launch.define("FACTOR").unwrap_or(1) as f32;
            let input: Vec<f32> = buffers[0].as_slice::<f32>()?.to_vec();
            let output = buffers[1].as_mut_slice::<f32>()?;
            for (slot, value) in output.iter_mut().zip(input) {
                *slot = value * factor;
            }
            Ok(())
        });

        let data = runtime_data("double_it", "#define FACTOR 2\nBODY", vec![input, output]);
        let arguments = store.arguments(&[input, output]).unwrap();
        let mut destination = [0.0f32; 4];
        let mut outputs = [OutputDescriptor::new(
            output,
            bytemuck::cast_slice_mut(&mut destination),
        )];

        engine.run_kernel(&data, &arguments, &mut outputs).unwrap();
        assert_eq!(destination, [2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn missing_entry_point_is_an_engine_failure() {
        let mut store = ArgumentStore::new();
        let id = store.add_vector(&[1i32], AccessMode::ReadOnly).unwrap();

        let mut engine = HostEngine::new();
        let data = runtime_data("unknown", "BODY", vec![id]);
        let arguments = store.arguments(&[id]).unwrap();

        let result = engine.run_kernel(&data, &arguments, &mut []);
        assert!(matches!(result, Err(TunerError::EngineFailure(_))));
        // The buffer survives the failed launch.
        assert!(engine.buffers.contains_key(&id));
    }

    #[test]
    fn access_scoped_clearing() {
        let mut store = ArgumentStore::new();
        let read = store.add_vector(&[1i32], AccessMode::ReadOnly).unwrap();
        let write = store.add_vector(&[0i32], AccessMode::WriteOnly).unwrap();

        let mut engine = HostEngine::new();
        engine.upload_argument(store.argument(read).unwrap()).unwrap();
        engine.upload_argument(store.argument(write).unwrap()).unwrap();

        engine.clear_buffers_with_access(AccessMode::WriteOnly).unwrap();
        assert!(engine.buffers.contains_key(&read));
        assert!(!engine.buffers.contains_key(&write));
    }

    #[test]
    fn local_memory_is_sized_per_launch() {
        let mut store = ArgumentStore::new();
        let scratch = store.add_local(ElementKind::F32, 4).unwrap();
        let output = store
            .add_vector(&[0.0f32], AccessMode::WriteOnly)
            .unwrap();

        let mut engine = HostEngine::new();
        engine.register_kernel("probe", |_launch: &HostLaunch, buffers: &mut [HostBuffer]| {
            let scratch_len = buffers[0].as_slice::<f32>()?.len();
            buffers[1].as_mut_slice::<f32>()?[0] = scratch_len as f32;
            Ok(())
        });

        let mut data = runtime_data("probe", "BODY", vec![scratch, output]);
        data.set_local_memory_sizes(vec![(scratch, 16)]);

        let arguments = store.arguments(&[scratch, output]).unwrap();
        let mut observed = [0.0f32];
        let mut outputs = [OutputDescriptor::new(
            output,
            bytemuck::cast_slice_mut(&mut observed),
        )];
        engine.run_kernel(&data, &arguments, &mut outputs).unwrap();

        // The registration-time count of 4 is overridden for this launch.
        assert_eq!(observed[0], 16.0);
    }

    #[test]
    fn cuda_grid_expansion() {
        let mut engine = HostEngine::new();
        engine.set_global_size_type(GlobalSizeType::Cuda);

        let data = KernelRuntimeData::new(
            0,
            "k",
            "BODY",
            DimensionVector::new(4, 1, 1),
            DimensionVector::new(16, 1, 1),
            vec![],
        );
        let (global, local) = engine.resolve_grid(&data).unwrap();
        assert_eq!(global, DimensionVector::new(64, 1, 1));
        assert_eq!(local, DimensionVector::new(16, 1, 1));
    }
}
