//! Compute-engine capability for TuneForge.
//!
//! The tuning core never talks to a device API directly; it drives the
//! [`ComputeEngine`] trait defined here. Accelerator drivers implement it in
//! their own crates. [`host::HostEngine`] is an in-process implementation
//! executing registered Rust closures, used by the test suites and the demo
//! CLI.

pub mod engine;
pub mod host;
pub mod info;
pub mod runtime_data;

pub use engine::{ComputeEngine, KernelRunResult, OutputDescriptor};
pub use host::{HostBuffer, HostEngine, HostLaunch};
pub use info::{DeviceInfo, DeviceType, PlatformInfo};
pub use runtime_data::KernelRuntimeData;
