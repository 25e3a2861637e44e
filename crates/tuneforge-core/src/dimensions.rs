//! Three-dimensional launch geometry.

use crate::error::{Result, TunerError};
use crate::parameter::{ModifierAction, ModifierDimension};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Convention used when handing a global size to the compute engine.
///
/// `OpenCl` treats the declared global size as the total grid. `Cuda` treats
/// it as the block count, with the local size giving the block dimensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalSizeType {
    #[default]
    OpenCl,
    Cuda,
}

/// Launch size in up to three dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionVector {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl DimensionVector {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Total number of items covered by this size.
    pub fn total_size(&self) -> usize {
        self.x * self.y * self.z
    }

    pub fn get(&self, dimension: ModifierDimension) -> usize {
        match dimension {
            ModifierDimension::X => self.x,
            ModifierDimension::Y => self.y,
            ModifierDimension::Z => self.z,
        }
    }

    fn get_mut(&mut self, dimension: ModifierDimension) -> &mut usize {
        match dimension {
            ModifierDimension::X => &mut self.x,
            ModifierDimension::Y => &mut self.y,
            ModifierDimension::Z => &mut self.z,
        }
    }

    /// Applies a modifier operator to one dimension.
    ///
    /// A result of zero is never a usable launch size, so any operation
    /// producing one rejects the configuration.
    pub fn apply(
        &mut self,
        action: ModifierAction,
        dimension: ModifierDimension,
        value: u64,
    ) -> Result<()> {
        let value = value as usize;
        let slot = self.get_mut(dimension);
        let updated = match action {
            ModifierAction::Multiply => slot.checked_mul(value),
            ModifierAction::Divide => {
                if value == 0 {
                    None
                } else {
                    Some(*slot / value)
                }
            }
            ModifierAction::Add => slot.checked_add(value),
            ModifierAction::Subtract => slot.checked_sub(value),
        };

        match updated {
            Some(size) if size > 0 => {
                *slot = size;
                Ok(())
            }
            _ => Err(TunerError::ConfigurationInvalid(format!(
                "thread modifier {:?} with value {} produced an unusable {:?} dimension",
                action, value, dimension
            ))),
        }
    }

    /// True when every component of `self` divides the matching component of
    /// `global`.
    pub fn divides(&self, global: &DimensionVector) -> bool {
        self.x > 0
            && self.y > 0
            && self.z > 0
            && global.x % self.x == 0
            && global.y % self.y == 0
            && global.z % self.z == 0
    }

    /// Rounds each component up to the nearest multiple of `local`.
    pub fn round_up_to_multiple(&mut self, local: &DimensionVector) {
        self.x = round_up(self.x, local.x);
        self.y = round_up(self.y, local.y);
        self.z = round_up(self.z, local.z);
    }

    /// Componentwise division, used to render a CUDA-style block count from
    /// a total grid size.
    pub fn divided_by(&self, other: &DimensionVector) -> DimensionVector {
        DimensionVector::new(self.x / other.x, self.y / other.y, self.z / other.z)
    }

    /// Componentwise product, used to expand a CUDA-style block count into a
    /// total thread count.
    pub fn multiplied_by(&self, other: &DimensionVector) -> DimensionVector {
        DimensionVector::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }
}

fn round_up(size: usize, multiple: usize) -> usize {
    if multiple == 0 || size % multiple == 0 {
        size
    } else {
        (size / multiple + 1) * multiple
    }
}

impl fmt::Display for DimensionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_multiply_and_divide() {
        let mut size = DimensionVector::new(64, 1, 1);
        size.apply(ModifierAction::Divide, ModifierDimension::X, 4)
            .unwrap();
        assert_eq!(size, DimensionVector::new(16, 1, 1));

        size.apply(ModifierAction::Multiply, ModifierDimension::Y, 8)
            .unwrap();
        assert_eq!(size, DimensionVector::new(16, 8, 1));
    }

    #[test]
    fn subtract_to_zero_is_rejected() {
        let mut size = DimensionVector::new(4, 1, 1);
        let result = size.apply(ModifierAction::Subtract, ModifierDimension::X, 4);
        assert!(result.is_err());
        // The original size is untouched on rejection.
        assert_eq!(size, DimensionVector::new(4, 1, 1));
    }

    #[test]
    fn divide_by_zero_is_rejected() {
        let mut size = DimensionVector::new(4, 1, 1);
        assert!(size
            .apply(ModifierAction::Divide, ModifierDimension::X, 0)
            .is_err());
    }

    #[test]
    fn round_up_to_local_multiple() {
        let mut global = DimensionVector::new(100, 1, 1);
        let local = DimensionVector::new(16, 1, 1);
        assert!(!local.divides(&global));

        global.round_up_to_multiple(&local);
        assert_eq!(global, DimensionVector::new(112, 1, 1));
        assert!(local.divides(&global));
    }
}
