//! The compute-engine capability consumed by the tuning core.

use crate::info::{DeviceInfo, PlatformInfo};
use crate::runtime_data::KernelRuntimeData;
use tuneforge_core::{AccessMode, ArgumentId, GlobalSizeType, KernelArgument, Result};

/// Outcome of one kernel launch.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelRunResult {
    /// Device-side computation time.
    pub duration_ns: u64,
    /// Engine-internal time spent outside device execution.
    pub overhead_ns: u64,
}

/// Destination for downloading one output argument after a run.
pub struct OutputDescriptor<'a> {
    pub argument_id: ArgumentId,
    pub destination: &'a mut [u8],
}

impl<'a> OutputDescriptor<'a> {
    pub fn new(argument_id: ArgumentId, destination: &'a mut [u8]) -> Self {
        Self {
            argument_id,
            destination,
        }
    }
}

/// Device abstraction: program compilation, buffer management, kernel
/// enqueue and timing.
///
/// Engines are synchronous from the caller's point of view: when a method
/// returns, its device effects are observable. `run_kernel` compiles (or
/// reuses) the program for the submitted source, uploads arguments that are
/// not yet resident, sizes local-memory allocations per the launch's
/// `local_memory_sizes`, enqueues with the specified geometry, waits for
/// completion and fills the output descriptors.
pub trait ComputeEngine {
    fn run_kernel(
        &mut self,
        data: &KernelRuntimeData,
        arguments: &[&KernelArgument],
        outputs: &mut [OutputDescriptor<'_>],
    ) -> Result<KernelRunResult>;

    /// Creates or replaces the device buffer of an argument.
    fn upload_argument(&mut self, argument: &KernelArgument) -> Result<()>;

    /// Overwrites the contents of a resident device buffer.
    fn update_argument(&mut self, id: ArgumentId, data: &[u8]) -> Result<()>;

    /// Copies a device buffer back to the host.
    fn download_argument(&self, id: ArgumentId, destination: &mut [u8]) -> Result<()>;

    fn clear_buffer(&mut self, id: ArgumentId) -> Result<()>;

    fn clear_buffers(&mut self) -> Result<()>;

    fn clear_buffers_with_access(&mut self, access: AccessMode) -> Result<()>;

    /// Blocks until all pending device work has finished and discards any
    /// outstanding events.
    fn synchronize_device(&mut self) -> Result<()>;

    fn set_compiler_options(&mut self, options: &str);

    fn set_global_size_type(&mut self, global_size_type: GlobalSizeType);

    fn global_size_type(&self) -> GlobalSizeType;

    fn set_automatic_size_correction(&mut self, enabled: bool);

    fn automatic_size_correction(&self) -> bool;

    fn platform_info(&self) -> Vec<PlatformInfo>;

    fn device_info(&self, platform_index: usize) -> Result<Vec<DeviceInfo>>;

    fn current_device_info(&self) -> DeviceInfo;
}
