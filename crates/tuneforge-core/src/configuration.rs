//! Kernel configurations: one chosen value per parameter plus the derived
//! launch geometry.
//!
//! Configurations are small immutable value objects; they are cloned freely
//! between the generator, the searchers and the runner.

use crate::dimensions::DimensionVector;
use crate::kernel::KernelId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single `name = value` assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    pub value: u64,
}

impl ParameterValue {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Effective global and local size for one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchGeometry {
    pub global: DimensionVector,
    pub local: DimensionVector,
}

impl LaunchGeometry {
    pub fn new(global: DimensionVector, local: DimensionVector) -> Self {
        Self { global, local }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Geometry {
    /// One launch geometry, for a plain kernel.
    Single(LaunchGeometry),
    /// One geometry per member kernel, for a composition. Ordered by the
    /// composition's kernel list.
    PerKernel(Vec<(KernelId, LaunchGeometry)>),
}

/// A concrete choice of one value per tunable parameter, together with the
/// derived launch geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfiguration {
    values: Vec<ParameterValue>,
    geometry: Geometry,
}

impl KernelConfiguration {
    /// Configuration of a plain kernel.
    pub fn single(values: Vec<ParameterValue>, geometry: LaunchGeometry) -> Self {
        Self {
            values,
            geometry: Geometry::Single(geometry),
        }
    }

    /// Configuration of a composition, with one geometry per member.
    pub fn composite(values: Vec<ParameterValue>, geometries: Vec<(KernelId, LaunchGeometry)>) -> Self {
        Self {
            values,
            geometry: Geometry::PerKernel(geometries),
        }
    }

    /// Parameter assignments in declaration order.
    pub fn values(&self) -> &[ParameterValue] {
        &self.values
    }

    pub fn value_of(&self, name: &str) -> Option<u64> {
        self.values
            .iter()
            .find(|pair| pair.name == name)
            .map(|pair| pair.value)
    }

    /// The launch geometry of a plain kernel; `None` for compositions.
    pub fn geometry(&self) -> Option<&LaunchGeometry> {
        match &self.geometry {
            Geometry::Single(geometry) => Some(geometry),
            Geometry::PerKernel(_) => None,
        }
    }

    /// The launch geometry used for a given kernel.
    ///
    /// For a plain kernel the single geometry is returned regardless of id;
    /// for a composition the member's entry is looked up.
    pub fn geometry_for(&self, kernel_id: KernelId) -> Option<&LaunchGeometry> {
        match &self.geometry {
            Geometry::Single(geometry) => Some(geometry),
            Geometry::PerKernel(geometries) => geometries
                .iter()
                .find(|(id, _)| *id == kernel_id)
                .map(|(_, geometry)| geometry),
        }
    }

    /// Member kernels and their geometries, in composition order.
    pub fn kernel_geometries(&self) -> &[(KernelId, LaunchGeometry)] {
        match &self.geometry {
            Geometry::Single(_) => &[],
            Geometry::PerKernel(geometries) => geometries,
        }
    }
}

impl fmt::Display for KernelConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.geometry {
            Geometry::Single(geometry) => {
                write!(
                    f,
                    "global size {}, local size {}",
                    geometry.global, geometry.local
                )?;
            }
            Geometry::PerKernel(geometries) => {
                for (kernel_id, geometry) in geometries {
                    write!(
                        f,
                        "kernel {}: global size {}, local size {}; ",
                        kernel_id, geometry.global, geometry.local
                    )?;
                }
            }
        }

        write!(f, ", parameters: ")?;
        if self.values.is_empty() {
            write!(f, "none")?;
        }
        for (position, pair) in self.values.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", pair.name, pair.value)?;
        }
        Ok(())
    }
}
