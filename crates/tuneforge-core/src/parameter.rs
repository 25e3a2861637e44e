//! Tunable kernel parameters and thread modifiers.

use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};

/// Which launch size a thread modifier rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierTarget {
    Global,
    Local,
}

/// Arithmetic applied to the targeted dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierAction {
    Multiply,
    Divide,
    Add,
    Subtract,
}

/// Dimension the modifier acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierDimension {
    X,
    Y,
    Z,
}

/// Rule transforming one launch-geometry dimension with the parameter's
/// chosen value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadModifier {
    pub target: ModifierTarget,
    pub action: ModifierAction,
    pub dimension: ModifierDimension,
}

impl ThreadModifier {
    pub fn new(target: ModifierTarget, action: ModifierAction, dimension: ModifierDimension) -> Self {
        Self {
            target,
            action,
            dimension,
        }
    }
}

/// A named tuning parameter with its admissible values.
///
/// Values are opaque to the tuner; their meaning is defined entirely by the
/// kernel source receiving them as `#define`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelParameter {
    name: String,
    values: Vec<u64>,
    modifier: Option<ThreadModifier>,
}

impl KernelParameter {
    pub fn new(name: impl Into<String>, values: Vec<u64>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(TunerError::InvalidArgument(
                "parameter name must not be empty".into(),
            ));
        }
        if values.is_empty() {
            return Err(TunerError::InvalidArgument(format!(
                "parameter {} must have at least one admissible value",
                name
            )));
        }

        Ok(Self {
            name,
            values,
            modifier: None,
        })
    }

    pub fn with_modifier(mut self, modifier: ThreadModifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn modifier(&self) -> Option<&ThreadModifier> {
        self.modifier.as_ref()
    }
}
