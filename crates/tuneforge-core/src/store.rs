//! Argument store: owns host-side buffers and issues stable ids.

use crate::argument::{
    AccessMode, ArgumentData, ArgumentId, ElementKind, ElementValue, KernelArgument,
    MemoryLocation, UploadKind,
};
use crate::error::{Result, TunerError};

/// Single owner of host-side kernel argument data.
///
/// Ids are sequential and remain valid for the lifetime of the store; an
/// update replaces the contents of an entry but never its id or element
/// kind.
#[derive(Debug, Default)]
pub struct ArgumentStore {
    arguments: Vec<KernelArgument>,
}

impl ArgumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new argument and returns its id.
    pub fn add_argument(
        &mut self,
        kind: ElementKind,
        count: usize,
        access: AccessMode,
        location: MemoryLocation,
        upload: UploadKind,
        data: ArgumentData,
    ) -> Result<ArgumentId> {
        if count == 0 {
            return Err(TunerError::InvalidArgument(
                "argument must contain at least one element".into(),
            ));
        }
        if upload != UploadKind::Local && data.len() != count * kind.size_bytes() {
            return Err(TunerError::InvalidArgument(format!(
                "argument data holds {} bytes, expected {} ({} x {:?})",
                data.len(),
                count * kind.size_bytes(),
                count,
                kind
            )));
        }

        let id = self.arguments.len();
        self.arguments
            .push(KernelArgument::new(id, kind, count, access, location, upload, data));
        Ok(id)
    }

    /// Registers a vector argument, copying the data into the store.
    pub fn add_vector<T: ElementValue>(&mut self, data: &[T], access: AccessMode) -> Result<ArgumentId> {
        self.add_argument(
            T::KIND,
            data.len(),
            access,
            MemoryLocation::Device,
            UploadKind::Vector,
            ArgumentData::from_slice(data),
        )
    }

    /// Registers a vector argument backed by a shared allocation.
    pub fn add_vector_shared<T: ElementValue>(
        &mut self,
        data: std::sync::Arc<[u8]>,
        count: usize,
        access: AccessMode,
    ) -> Result<ArgumentId> {
        self.add_argument(
            T::KIND,
            count,
            access,
            MemoryLocation::Device,
            UploadKind::Vector,
            ArgumentData::Shared(data),
        )
    }

    /// Registers a scalar argument.
    pub fn add_scalar<T: ElementValue>(&mut self, value: T) -> Result<ArgumentId> {
        self.add_argument(
            T::KIND,
            1,
            AccessMode::ReadOnly,
            MemoryLocation::Device,
            UploadKind::Scalar,
            ArgumentData::from_slice(&[value]),
        )
    }

    /// Registers a local-memory argument: a device-side allocation request
    /// with no host contents.
    pub fn add_local(&mut self, kind: ElementKind, count: usize) -> Result<ArgumentId> {
        self.add_argument(
            kind,
            count,
            AccessMode::ReadWrite,
            MemoryLocation::Device,
            UploadKind::Local,
            ArgumentData::Owned(Vec::new()),
        )
    }

    /// Replaces the contents of an existing argument.
    ///
    /// The element kind is fixed at registration; the element count may
    /// change with the new data.
    pub fn update_argument(&mut self, id: ArgumentId, data: ArgumentData, count: usize) -> Result<()> {
        if count == 0 {
            return Err(TunerError::InvalidArgument(
                "argument must contain at least one element".into(),
            ));
        }

        let argument = self
            .arguments
            .get_mut(id)
            .ok_or(TunerError::InvalidArgumentId(id))?;

        if argument.upload() != UploadKind::Local && data.len() != count * argument.kind().size_bytes() {
            return Err(TunerError::InvalidArgument(format!(
                "update for argument {} holds {} bytes, expected {} ({} x {:?})",
                id,
                data.len(),
                count * argument.kind().size_bytes(),
                count,
                argument.kind()
            )));
        }

        argument.replace_data(data, count);
        Ok(())
    }

    /// Typed update convenience wrapper.
    pub fn update_vector<T: ElementValue>(&mut self, id: ArgumentId, data: &[T]) -> Result<()> {
        let kind = self.argument(id)?.kind();
        if T::KIND != kind {
            return Err(TunerError::InvalidArgument(format!(
                "argument {} holds {:?} elements, update provided {:?}",
                id,
                kind,
                T::KIND
            )));
        }
        self.update_argument(id, ArgumentData::from_slice(data), data.len())
    }

    pub fn argument(&self, id: ArgumentId) -> Result<&KernelArgument> {
        self.arguments
            .get(id)
            .ok_or(TunerError::InvalidArgumentId(id))
    }

    pub fn arguments(&self, ids: &[ArgumentId]) -> Result<Vec<&KernelArgument>> {
        ids.iter().map(|id| self.argument(*id)).collect()
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }
}
