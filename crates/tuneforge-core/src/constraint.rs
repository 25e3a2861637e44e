//! Constraints restricting the parameter space.

use crate::error::{Result, TunerError};
use std::fmt;
use std::sync::Arc;

/// Predicate over the values of the constrained parameters, in the order the
/// constraint names them.
pub type ConstraintFunction = Arc<dyn Fn(&[u64]) -> bool + Send + Sync>;

/// A predicate over a named subset of parameters.
///
/// A configuration is valid iff every constraint evaluates true on the
/// projection of its values onto the constraint's parameters.
#[derive(Clone)]
pub struct KernelConstraint {
    parameter_names: Vec<String>,
    function: ConstraintFunction,
}

impl KernelConstraint {
    pub fn new(
        parameter_names: Vec<String>,
        function: impl Fn(&[u64]) -> bool + Send + Sync + 'static,
    ) -> Result<Self> {
        if parameter_names.is_empty() {
            return Err(TunerError::InvalidArgument(
                "constraint must name at least one parameter".into(),
            ));
        }

        Ok(Self {
            parameter_names,
            function: Arc::new(function),
        })
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// Evaluates the predicate on values projected in `parameter_names`
    /// order.
    pub fn is_satisfied(&self, values: &[u64]) -> bool {
        (self.function)(values)
    }
}

// The predicate is opaque; Debug shows only the constrained names.
impl fmt::Debug for KernelConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConstraint")
            .field("parameter_names", &self.parameter_names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_order_matches_names() {
        let constraint = KernelConstraint::new(
            vec!["A".into(), "B".into()],
            |values| values[0] + values[1] <= 11,
        )
        .unwrap();

        assert!(constraint.is_satisfied(&[1, 10]));
        assert!(!constraint.is_satisfied(&[3, 10]));
    }

    #[test]
    fn empty_parameter_list_is_rejected() {
        assert!(KernelConstraint::new(vec![], |_| true).is_err());
    }
}
