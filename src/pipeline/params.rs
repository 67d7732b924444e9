//! Typed access to an operation's raw parameters
//!
//! Values arrive as opaque strings. Stages bind them through `Params`, which
//! turns a bad value into `MalformedParameter` naming the offending token.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use std::str::FromStr;

use super::parser::Operation;
use crate::error::PipelineError;

/// Read-only view over one operation's parameters.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    operation: &'a Operation,
}

impl<'a> Params<'a> {
    pub fn new(operation: &'a Operation) -> Self {
        Self { operation }
    }

    pub fn raw(&self, key: &str) -> Option<&'a str> {
        self.operation.param(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.operation.param(key).is_some()
    }

    fn malformed(&self, key: &str, value: &str, reason: impl Into<String>) -> PipelineError {
        PipelineError::malformed_parameter(
            self.operation.name(),
            format!("{}_{}", key, value),
            reason,
        )
    }

    /// Parse `key` with `FromStr`, or fall back to `default` when absent.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, PipelineError>
    where
        T: FromStr,
    {
        self.parse(key).map(|value| value.unwrap_or(default))
    }

    /// Parse `key` with `FromStr` if present.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, PipelineError>
    where
        T: FromStr,
    {
        match self.raw(key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| self.malformed(key, value, "not a valid number")),
        }
    }

    /// Parse a float and check it lies in `[min, max]`.
    pub fn ranged_or(&self, key: &str, default: f64, min: f64, max: f64) -> Result<f64, PipelineError> {
        let value: f64 = self.parse_or(key, default)?;
        if !(min..=max).contains(&value) {
            let raw = self.raw(key).unwrap_or_default();
            return Err(self.malformed(key, raw, format!("must be within {}..={}", min, max)));
        }
        Ok(value)
    }

    /// Decode a base64 value (standard or URL-safe alphabet, padding optional) as UTF-8.
    pub fn base64_text(&self, key: &str) -> Result<Option<String>, PipelineError> {
        let Some(value) = self.raw(key) else {
            return Ok(None);
        };

        let bytes = decode_base64(value)
            .ok_or_else(|| self.malformed(key, value, "not valid base64"))?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| self.malformed(key, value, "decoded value is not UTF-8"))
    }
}

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .into_iter()
        .find_map(|engine| engine.decode(value).ok())
}
