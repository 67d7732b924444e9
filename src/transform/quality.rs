//! Output quality accumulator.

use crate::error::PipelineError;
use crate::pipeline::params::Params;

pub const MAX_QUALITY: i64 = 100;

/// Quality applied at encode time.
///
/// `quality` operations never touch the canvas; they overwrite this value.
/// `q` is a fraction scaled by 100 and rounded to the nearest integer, so
/// `0.57` is 57 even though `0.57 * 100.0` is 56.99... in binary floating
/// point. Out-of-range results are kept as-is and clamped by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(i64);

impl Default for Quality {
    fn default() -> Self {
        Quality(MAX_QUALITY)
    }
}

impl Quality {
    pub fn new(value: i64) -> Self {
        Quality(value)
    }

    /// Apply a `quality` operation. Absent `q` leaves the value unchanged.
    pub fn apply(&mut self, params: Params<'_>) -> Result<(), PipelineError> {
        if let Some(q) = params.parse::<f64>("q")? {
            if !q.is_finite() {
                return Err(PipelineError::malformed_parameter(
                    "quality",
                    format!("q_{}", params.raw("q").unwrap_or_default()),
                    "not a finite number",
                ));
            }
            self.0 = (q * 100.0).round() as i64;
        }
        Ok(())
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_in_range(&self) -> bool {
        (1..=MAX_QUALITY).contains(&self.0)
    }

    /// Value handed to lossy encoders.
    pub fn clamped(&self) -> u8 {
        self.0.clamp(1, MAX_QUALITY) as u8
    }
}
