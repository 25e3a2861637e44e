//! Launch description handed to a compute engine.

use tuneforge_core::{ArgumentId, DimensionVector, KernelId};

/// Everything an engine needs to compile and enqueue one kernel launch:
/// configured source, rendered sizes, bound argument ids and the launch's
/// local-memory allocation sizes.
#[derive(Debug, Clone)]
pub struct KernelRuntimeData {
    pub id: KernelId,
    pub name: String,
    pub source: String,
    pub global_size: DimensionVector,
    pub local_size: DimensionVector,
    pub argument_ids: Vec<ArgumentId>,
    /// Element counts for local-memory arguments, resolved from the current
    /// configuration by the kernel runner. The engine allocates these sizes
    /// instead of the registration-time defaults.
    pub local_memory_sizes: Vec<(ArgumentId, usize)>,
}

impl KernelRuntimeData {
    pub fn new(
        id: KernelId,
        name: impl Into<String>,
        source: impl Into<String>,
        global_size: DimensionVector,
        local_size: DimensionVector,
        argument_ids: Vec<ArgumentId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            source: source.into(),
            global_size,
            local_size,
            argument_ids,
            local_memory_sizes: Vec::new(),
        }
    }

    pub fn set_global_size(&mut self, global_size: DimensionVector) {
        self.global_size = global_size;
    }

    pub fn set_local_memory_sizes(&mut self, local_memory_sizes: Vec<(ArgumentId, usize)>) {
        self.local_memory_sizes = local_memory_sizes;
    }

    pub fn set_local_size(&mut self, local_size: DimensionVector) {
        self.local_size = local_size;
    }

    pub fn set_argument_ids(&mut self, argument_ids: Vec<ArgumentId>) {
        self.argument_ids = argument_ids;
    }
}
