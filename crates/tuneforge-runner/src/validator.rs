//! Compares tuned-kernel outputs against cached reference results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tuneforge_core::{ArgumentId, ElementKind, KernelId, Result, TunerError};

/// Guard for side-by-side denominators around zero.
const SIDE_BY_SIDE_EPSILON: f64 = 1e-12;

/// Host-side producer of expected argument contents.
pub trait ReferenceComputer {
    /// Fills `buffer` with the expected contents for `argument_id`, given
    /// the current input data.
    fn compute_reference(&mut self, argument_id: ArgumentId, buffer: &mut [u8]) -> Result<()>;
}

/// Element-wise comparison policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationMethod {
    /// `|a - b| <= tolerance`
    AbsoluteDifference,
    /// `|a - b| <= tolerance * max(|a|, |b|, epsilon)`
    SideBySideComparison,
    /// `|a - b| <= tolerance * |reference|`
    SideBySideRelative,
}

/// Custom per-argument element comparator; receives `(actual, reference)`.
pub type ElementComparator = Box<dyn Fn(f64, f64) -> bool + Send + Sync>;

/// Caches reference outputs per kernel id and judges tuned runs.
///
/// A reference is computed at most once per kernel between
/// [`clear_reference`](ResultValidator::clear_reference) calls; the cached
/// bytes are the expected value for every subsequent comparison.
pub struct ResultValidator {
    method: ValidationMethod,
    tolerance: f64,
    ranges: BTreeMap<ArgumentId, usize>,
    comparators: BTreeMap<ArgumentId, ElementComparator>,
    computers: BTreeMap<KernelId, Box<dyn ReferenceComputer>>,
    references: BTreeMap<KernelId, Vec<(ArgumentId, Vec<u8>)>>,
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultValidator {
    pub fn new() -> Self {
        Self {
            method: ValidationMethod::SideBySideComparison,
            tolerance: 1e-4,
            ranges: BTreeMap::new(),
            comparators: BTreeMap::new(),
            computers: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn set_validation_method(&mut self, method: ValidationMethod, tolerance: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(TunerError::InvalidArgument(format!(
                "tolerance threshold must lie in [0, 1], got {}",
                tolerance
            )));
        }
        self.method = method;
        self.tolerance = tolerance;
        Ok(())
    }

    /// Caps the number of leading elements compared for one argument.
    pub fn set_validation_range(&mut self, argument_id: ArgumentId, element_count: usize) {
        self.ranges.insert(argument_id, element_count);
    }

    /// Overrides the comparison policy for one argument.
    pub fn set_element_comparator(&mut self, argument_id: ArgumentId, comparator: ElementComparator) {
        self.comparators.insert(argument_id, comparator);
    }

    pub fn set_reference_computer(&mut self, kernel_id: KernelId, computer: Box<dyn ReferenceComputer>) {
        self.computers.insert(kernel_id, computer);
    }

    pub fn has_reference(&self, kernel_id: KernelId) -> bool {
        self.references.contains_key(&kernel_id)
    }

    /// Caches reference bytes for a kernel. A second call for the same id is
    /// a no-op until the reference is cleared.
    pub fn store_reference(&mut self, kernel_id: KernelId, outputs: Vec<(ArgumentId, Vec<u8>)>) {
        if self.references.contains_key(&kernel_id) {
            tracing::debug!(kernel = kernel_id, "reference already cached, keeping it");
            return;
        }
        self.references.insert(kernel_id, outputs);
    }

    /// Invokes the registered reference computer once, filling one buffer
    /// per `(argument id, byte size)` pair.
    pub fn compute_reference_from_computer(
        &mut self,
        kernel_id: KernelId,
        argument_sizes: &[(ArgumentId, usize)],
    ) -> Result<()> {
        if self.references.contains_key(&kernel_id) {
            return Ok(());
        }
        let computer = self.computers.get_mut(&kernel_id).ok_or_else(|| {
            TunerError::InvalidArgument(format!(
                "no reference computer registered for kernel {}",
                kernel_id
            ))
        })?;

        let mut outputs = Vec::with_capacity(argument_sizes.len());
        for (argument_id, size_bytes) in argument_sizes {
            let mut buffer = vec![0u8; *size_bytes];
            computer.compute_reference(*argument_id, &mut buffer)?;
            outputs.push((*argument_id, buffer));
        }
        self.references.insert(kernel_id, outputs);
        Ok(())
    }

    pub fn clear_reference(&mut self, kernel_id: KernelId) {
        self.references.remove(&kernel_id);
    }

    pub fn clear_all_references(&mut self) {
        self.references.clear();
    }

    /// Compares one downloaded argument against the cached reference.
    ///
    /// Returns `Ok(false)` on the first mismatching element.
    pub fn validate_argument(
        &self,
        kernel_id: KernelId,
        argument_id: ArgumentId,
        kind: ElementKind,
        actual: &[u8],
    ) -> Result<bool> {
        let references = self.references.get(&kernel_id).ok_or_else(|| {
            TunerError::ValidationFailure(format!(
                "no reference cached for kernel {}",
                kernel_id
            ))
        })?;
        let reference = references
            .iter()
            .find(|(id, _)| *id == argument_id)
            .map(|(_, bytes)| bytes.as_slice())
            .ok_or_else(|| {
                TunerError::InvalidArgument(format!(
                    "argument {} is not part of the reference for kernel {}",
                    argument_id, kernel_id
                ))
            })?;

        let element = kind.size_bytes();
        let mut count = (reference.len() / element).min(actual.len() / element);
        if let Some(cap) = self.ranges.get(&argument_id) {
            count = count.min(*cap);
        }

        let comparator = self.comparators.get(&argument_id);
        for index in 0..count {
            let lhs = read_element(kind, actual, index);
            let rhs = read_element(kind, reference, index);
            let matches = match comparator {
                Some(custom) => custom(lhs, rhs),
                None => self.elements_match(lhs, rhs),
            };
            if !matches {
                tracing::debug!(
                    kernel = kernel_id,
                    argument = argument_id,
                    index,
                    actual = lhs,
                    reference = rhs,
                    "element mismatch"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn elements_match(&self, actual: f64, reference: f64) -> bool {
        let difference = (actual - reference).abs();
        match self.method {
            ValidationMethod::AbsoluteDifference => difference <= self.tolerance,
            ValidationMethod::SideBySideComparison => {
                difference
                    <= self.tolerance * actual.abs().max(reference.abs()).max(SIDE_BY_SIDE_EPSILON)
            }
            ValidationMethod::SideBySideRelative => difference <= self.tolerance * reference.abs(),
        }
    }
}

impl fmt::Debug for ResultValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultValidator")
            .field("method", &self.method)
            .field("tolerance", &self.tolerance)
            .field("cached_references", &self.references.len())
            .finish_non_exhaustive()
    }
}

/// Reads one element as `f64` for comparison purposes.
fn read_element(kind: ElementKind, bytes: &[u8], index: usize) -> f64 {
    let size = kind.size_bytes();
    let start = index * size;
    let chunk = &bytes[start..start + size];
    match kind {
        ElementKind::I8 => chunk[0] as i8 as f64,
        ElementKind::U8 => chunk[0] as f64,
        ElementKind::I16 => i16::from_ne_bytes([chunk[0], chunk[1]]) as f64,
        ElementKind::U16 => u16::from_ne_bytes([chunk[0], chunk[1]]) as f64,
        ElementKind::F16 => half::f16::from_ne_bytes([chunk[0], chunk[1]]).to_f64(),
        ElementKind::I32 => {
            i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
        }
        ElementKind::U32 => {
            u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
        }
        ElementKind::F32 => {
            f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
        }
        ElementKind::I64 => i64::from_ne_bytes(eight(chunk)) as f64,
        ElementKind::U64 => u64::from_ne_bytes(eight(chunk)) as f64,
        ElementKind::F64 => f64::from_ne_bytes(eight(chunk)),
    }
}

fn eight(chunk: &[u8]) -> [u8; 8] {
    [
        chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(values: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    fn validator_with(method: ValidationMethod, tolerance: f64) -> ResultValidator {
        let mut validator = ResultValidator::new();
        validator.set_validation_method(method, tolerance).unwrap();
        validator.store_reference(7, vec![(0, bytes(&[1.0, 2.0, 3.0, 4.0]))]);
        validator
    }

    #[test]
    fn tolerance_threshold_is_bounded() {
        let mut validator = ResultValidator::new();
        assert!(validator
            .set_validation_method(ValidationMethod::AbsoluteDifference, 1.5)
            .is_err());
        assert!(validator
            .set_validation_method(ValidationMethod::AbsoluteDifference, -0.1)
            .is_err());
    }

    #[test]
    fn absolute_difference_comparison() {
        let validator = validator_with(ValidationMethod::AbsoluteDifference, 0.05);

        let close = bytes(&[1.01, 2.01, 3.01, 4.01]);
        assert!(validator.validate_argument(7, 0, ElementKind::F32, &close).unwrap());

        let far = bytes(&[1.2, 2.0, 3.0, 4.0]);
        assert!(!validator.validate_argument(7, 0, ElementKind::F32, &far).unwrap());
    }

    #[test]
    fn side_by_side_scales_with_magnitude() {
        let mut validator = ResultValidator::new();
        validator
            .set_validation_method(ValidationMethod::SideBySideComparison, 0.01)
            .unwrap();
        validator.store_reference(7, vec![(0, bytes(&[1000.0]))]);

        // 0.5% off a large value passes a 1% relative bound but would fail
        // any small absolute one.
        let actual = bytes(&[1005.0]);
        assert!(validator.validate_argument(7, 0, ElementKind::F32, &actual).unwrap());

        let too_far = bytes(&[1020.0]);
        assert!(!validator.validate_argument(7, 0, ElementKind::F32, &too_far).unwrap());
    }

    #[test]
    fn validation_range_caps_compared_elements() {
        let mut validator = validator_with(ValidationMethod::AbsoluteDifference, 0.05);
        validator.set_validation_range(0, 2);

        // Elements beyond the range cap may differ arbitrarily.
        let actual = bytes(&[1.0, 2.0, 30.0, 40.0]);
        assert!(validator.validate_argument(7, 0, ElementKind::F32, &actual).unwrap());
    }

    #[test]
    fn custom_comparator_overrides_the_method() {
        let mut validator = validator_with(ValidationMethod::AbsoluteDifference, 0.0);
        validator.set_element_comparator(0, Box::new(|actual, reference| actual >= reference));

        let actual = bytes(&[10.0, 20.0, 30.0, 40.0]);
        assert!(validator.validate_argument(7, 0, ElementKind::F32, &actual).unwrap());
    }

    #[test]
    fn reference_is_computed_at_most_once() {
        struct Counting(std::sync::Arc<std::sync::atomic::AtomicUsize>);
        impl ReferenceComputer for Counting {
            fn compute_reference(&mut self, _id: ArgumentId, buffer: &mut [u8]) -> Result<()> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                buffer.fill(1);
                Ok(())
            }
        }

        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut validator = ResultValidator::new();
        validator.set_reference_computer(3, Box::new(Counting(calls.clone())));

        validator.compute_reference_from_computer(3, &[(0, 4)]).unwrap();
        validator.compute_reference_from_computer(3, &[(0, 4)]).unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        validator.clear_reference(3);
        validator.compute_reference_from_computer(3, &[(0, 4)]).unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
