//! Core tuning-space model for TuneForge.
//!
//! This crate holds everything the tuning engine needs to describe a kernel
//! and its search space: host-side argument buffers, tunable parameters with
//! thread modifiers, constraints, the configuration generator and the kernel
//! registry.
//!
//! # Key Components
//!
//! - [`store::ArgumentStore`]: owns host-side argument buffers, issues ids
//! - [`registry::KernelRegistry`]: kernels, compositions and their metadata
//! - [`generator::ConfigurationGenerator`]: lazy sequence of valid
//!   configurations with derived launch geometry

pub mod argument;
pub mod composition;
pub mod configuration;
pub mod constraint;
pub mod dimensions;
pub mod error;
pub mod generator;
pub mod kernel;
pub mod local_memory;
pub mod parameter;
pub mod registry;
pub mod store;

pub use argument::{
    AccessMode, ArgumentData, ArgumentId, ElementKind, ElementValue, KernelArgument,
    MemoryLocation, UploadKind,
};
pub use composition::{CompositionParameter, KernelComposition, ParameterScope};
pub use configuration::{KernelConfiguration, LaunchGeometry, ParameterValue};
pub use constraint::KernelConstraint;
pub use dimensions::{DimensionVector, GlobalSizeType};
pub use error::{Result, TunerError};
pub use generator::{ConfigurationGenerator, GeneratorSettings};
pub use kernel::{Kernel, KernelId, ReferenceSpec, SearchMethod, SearchPolicy};
pub use local_memory::LocalMemoryModifier;
pub use parameter::{
    KernelParameter, ModifierAction, ModifierDimension, ModifierTarget, ThreadModifier,
};
pub use registry::KernelRegistry;
pub use store::ArgumentStore;
