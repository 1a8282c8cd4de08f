//! Unified error handling for place detection.
//!
//! Two failure families exist:
//! - [`PlaceError::InvalidArgument`]: a caller-supplied value (unit string,
//!   weighting scheme, label array, radius) is outside the recognized set.
//! - [`PlaceError::InsufficientData`]: too few fixes for the requested
//!   operation. Batch drivers treat this as "skip this window".

use thiserror::Error;

/// Errors produced by the place detection core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaceError {
    /// A caller-supplied argument is not in the recognized set.
    #[error("invalid {argument} '{value}': expected {expected}")]
    InvalidArgument {
        argument: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Not enough fixes to run the operation.
    #[error("{operation} needs at least {minimum_required} points, got {point_count} points")]
    InsufficientData {
        operation: &'static str,
        point_count: usize,
        minimum_required: usize,
    },
}

impl PlaceError {
    pub(crate) fn invalid(
        argument: &'static str,
        value: impl ToString,
        expected: &'static str,
    ) -> Self {
        PlaceError::InvalidArgument {
            argument,
            value: value.to_string(),
            expected,
        }
    }

    pub(crate) fn insufficient(
        operation: &'static str,
        point_count: usize,
        minimum_required: usize,
    ) -> Self {
        PlaceError::InsufficientData {
            operation,
            point_count,
            minimum_required,
        }
    }

    /// True when the error only means the window was too small to analyze.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, PlaceError::InsufficientData { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlaceError>;

/// Check that `point_count` meets a minimum, returning `InsufficientData` otherwise.
pub(crate) fn require_points(
    operation: &'static str,
    point_count: usize,
    minimum_required: usize,
) -> Result<()> {
    if point_count < minimum_required {
        return Err(PlaceError::insufficient(
            operation,
            point_count,
            minimum_required,
        ));
    }
    Ok(())
}

/// Extension trait for turning empty lookups into `InsufficientData`.
pub trait OptionExt<T> {
    fn ok_or_insufficient_data(
        self,
        operation: &'static str,
        point_count: usize,
        minimum_required: usize,
    ) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_data(
        self,
        operation: &'static str,
        point_count: usize,
        minimum_required: usize,
    ) -> Result<T> {
        self.ok_or_else(|| PlaceError::insufficient(operation, point_count, minimum_required))
    }
}
