//! Host-side kernel argument buffers.
//!
//! Argument data lives in a single tagged container: an element kind plus a
//! raw byte buffer. Typed views are derived on read via `bytemuck`, which
//! keeps the store free of one vector field per scalar type.

use crate::error::{Result, TunerError};
use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable identifier issued by the [`crate::store::ArgumentStore`].
pub type ArgumentId = usize;

/// Scalar element type of an argument buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl ElementKind {
    pub fn size_bytes(&self) -> usize {
        match self {
            ElementKind::I8 | ElementKind::U8 => 1,
            ElementKind::I16 | ElementKind::U16 | ElementKind::F16 => 2,
            ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 4,
            ElementKind::I64 | ElementKind::U64 | ElementKind::F64 => 8,
        }
    }
}

/// How the kernel accesses an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Where the engine should place the device copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryLocation {
    Device,
    HostZeroCopy,
}

/// How the argument is handed to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadKind {
    Vector,
    Scalar,
    Local,
}

/// Scalar types storable in an argument buffer.
///
/// Ties a Rust type to its [`ElementKind`] tag so the typed entry points of
/// the store cannot disagree with the buffer contents.
pub trait ElementValue: Pod {
    const KIND: ElementKind;
}

macro_rules! element_value {
    ($ty:ty, $kind:expr) => {
        impl ElementValue for $ty {
            const KIND: ElementKind = $kind;
        }
    };
}

element_value!(i8, ElementKind::I8);
element_value!(i16, ElementKind::I16);
element_value!(i32, ElementKind::I32);
element_value!(i64, ElementKind::I64);
element_value!(u8, ElementKind::U8);
element_value!(u16, ElementKind::U16);
element_value!(u32, ElementKind::U32);
element_value!(u64, ElementKind::U64);
element_value!(half::f16, ElementKind::F16);
element_value!(f32, ElementKind::F32);
element_value!(f64, ElementKind::F64);

/// Argument contents, either owned by the store or shared with the caller.
#[derive(Debug, Clone)]
pub enum ArgumentData {
    /// Copy held by the store.
    Owned(Vec<u8>),
    /// Non-owning view; the caller keeps the allocation alive through the
    /// shared handle.
    Shared(Arc<[u8]>),
}

impl ArgumentData {
    pub fn from_slice<T: ElementValue>(data: &[T]) -> Self {
        ArgumentData::Owned(bytemuck::cast_slice(data).to_vec())
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            ArgumentData::Owned(data) => data,
            ArgumentData::Shared(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

/// A typed host-side buffer bound to kernels by id.
#[derive(Debug, Clone)]
pub struct KernelArgument {
    id: ArgumentId,
    kind: ElementKind,
    count: usize,
    access: AccessMode,
    location: MemoryLocation,
    upload: UploadKind,
    data: ArgumentData,
}

impl KernelArgument {
    pub(crate) fn new(
        id: ArgumentId,
        kind: ElementKind,
        count: usize,
        access: AccessMode,
        location: MemoryLocation,
        upload: UploadKind,
        data: ArgumentData,
    ) -> Self {
        Self {
            id,
            kind,
            count,
            access,
            location,
            upload,
            data,
        }
    }

    pub fn id(&self) -> ArgumentId {
        self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    pub fn upload(&self) -> UploadKind {
        self.upload
    }

    /// Size of the argument contents on the device.
    ///
    /// For local-memory arguments this is the allocation request; the host
    /// buffer stays empty.
    pub fn data_size_bytes(&self) -> usize {
        self.count * self.kind.size_bytes()
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.bytes()
    }

    /// Typed read view over the buffer.
    ///
    /// Fails when the requested element type does not match the stored kind.
    pub fn as_slice<T: ElementValue>(&self) -> Result<&[T]> {
        if T::KIND != self.kind {
            return Err(TunerError::InvalidArgument(format!(
                "argument {} holds {:?} elements, requested {:?}",
                self.id,
                self.kind,
                T::KIND
            )));
        }
        bytemuck::try_cast_slice(self.data.bytes()).map_err(|err| {
            TunerError::InvalidArgument(format!("argument {} view failed: {}", self.id, err))
        })
    }

    pub(crate) fn replace_data(&mut self, data: ArgumentData, count: usize) {
        self.data = data;
        self.count = count;
    }
}
