//! Local-memory modifiers: per-configuration sizing of local-memory
//! arguments.
//!
//! A local-memory argument is registered with a default element count, but
//! the right amount of scratch space usually depends on the tuning
//! parameters (a tile size, a work-group dimension). A modifier binds the
//! argument to a subset of parameters and recomputes its element count from
//! their current values before every launch.

use crate::argument::ArgumentId;
use crate::error::{Result, TunerError};
use std::fmt;
use std::sync::Arc;

/// Maps `(default element count, projected parameter values)` to the element
/// count used for the launch. Values arrive in the order the modifier names
/// its parameters.
pub type LocalMemoryFunction = Arc<dyn Fn(usize, &[u64]) -> usize + Send + Sync>;

/// Rule recomputing a local-memory argument's element count from the current
/// configuration.
#[derive(Clone)]
pub struct LocalMemoryModifier {
    argument_id: ArgumentId,
    parameter_names: Vec<String>,
    function: LocalMemoryFunction,
}

impl LocalMemoryModifier {
    /// `parameter_names` may be empty for a modifier depending only on the
    /// registered default count.
    pub fn new(
        argument_id: ArgumentId,
        parameter_names: Vec<String>,
        function: impl Fn(usize, &[u64]) -> usize + Send + Sync + 'static,
    ) -> Result<Self> {
        if parameter_names.iter().any(|name| name.is_empty()) {
            return Err(TunerError::InvalidArgument(
                "local-memory modifier parameter names must not be empty".into(),
            ));
        }

        Ok(Self {
            argument_id,
            parameter_names,
            function: Arc::new(function),
        })
    }

    pub fn argument_id(&self) -> ArgumentId {
        self.argument_id
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// Element count for a launch, given the argument's registered count and
    /// values projected in `parameter_names` order.
    pub fn resolved_count(&self, default_count: usize, values: &[u64]) -> usize {
        (self.function)(default_count, values)
    }
}

// The sizing function is opaque; Debug shows the binding only.
impl fmt::Debug for LocalMemoryModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMemoryModifier")
            .field("argument_id", &self.argument_id)
            .field("parameter_names", &self.parameter_names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_count_from_parameter_values() {
        let modifier = LocalMemoryModifier::new(3, vec!["TILE".into()], |_, values| {
            values[0] as usize * 2
        })
        .unwrap();

        assert_eq!(modifier.argument_id(), 3);
        assert_eq!(modifier.resolved_count(64, &[8]), 16);
    }

    #[test]
    fn default_count_reaches_the_function() {
        let modifier =
            LocalMemoryModifier::new(0, vec![], |default_count, _| default_count * 4).unwrap();
        assert_eq!(modifier.resolved_count(16, &[]), 64);
    }

    #[test]
    fn empty_parameter_name_is_rejected() {
        assert!(LocalMemoryModifier::new(0, vec!["".into()], |count, _| count).is_err());
    }
}
