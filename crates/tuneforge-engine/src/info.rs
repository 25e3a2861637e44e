//! Platform and device descriptions.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Cpu,
    Gpu,
    Accelerator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub index: usize,
    pub name: String,
    pub vendor: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub vendor: String,
    pub device_type: DeviceType,
    pub global_memory_bytes: u64,
    pub local_memory_bytes: u64,
    pub max_work_group_size: usize,
    pub max_compute_units: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {} compute units, {} bytes global memory)",
            self.name, self.device_type, self.max_compute_units, self.global_memory_bytes
        )
    }
}
