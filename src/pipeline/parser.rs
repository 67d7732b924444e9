//! Operation string parsing
//!
//! Grammar: `image/op1,k1_v1,k2_v2/op2,k1_v1/...`
//!
//! - segments are separated by `/`, the first one must be the literal `image`
//! - a segment is an operation name followed by `,`-separated parameter tokens
//! - a parameter token splits on its first `_` into key and value
//!
//! Keys and values stay opaque strings here. Each stage coerces and validates
//! its own parameters when it binds them, and unknown operation names are only
//! rejected when the executor reaches them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Leading segment every operation string must start with.
pub const PIPELINE_TARGET: &str = "image";

/// Operation kinds the executor knows how to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Resize,
    Watermark,
    Quality,
    /// Accepted by the parser, rejected by the executor
    Unknown(String),
}

impl OperationKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "resize" => OperationKind::Resize,
            "watermark" => OperationKind::Watermark,
            "quality" => OperationKind::Quality,
            other => OperationKind::Unknown(other.to_string()),
        }
    }

    pub fn as_label(&self) -> &str {
        match self {
            OperationKind::Resize => "resize",
            OperationKind::Watermark => "watermark",
            OperationKind::Quality => "quality",
            OperationKind::Unknown(name) => name,
        }
    }
}

/// One parsed operation segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: String,
    params: HashMap<String, String>,
}

impl Operation {
    pub fn new(name: impl Into<String>, params: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        OperationKind::from_name(&self.name)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn parse_segment(segment: &str) -> Result<Self, PipelineError> {
        let mut tokens = segment.split(',');
        // split always yields at least one item
        let name = tokens.next().unwrap_or_default();

        let mut params = HashMap::new();
        for token in tokens {
            let (key, value) = token.split_once('_').ok_or_else(|| {
                PipelineError::malformed_parameter(name, token, "missing '_' separator")
            })?;
            if key.is_empty() {
                return Err(PipelineError::malformed_parameter(
                    name,
                    token,
                    "empty parameter key",
                ));
            }
            // Repeated keys: the last occurrence wins
            params.insert(key.to_string(), value.to_string());
        }

        Ok(Self::new(name, params))
    }
}

/// Ordered list of operations parsed from one operation string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    operations: Vec<Operation>,
}

impl Pipeline {
    /// Parse an operation string.
    ///
    /// # Errors
    ///
    /// - `MalformedPipeline` if the first segment is not `image`
    /// - `MalformedParameter` if a parameter token has no `_`
    pub fn parse(input: &str) -> Result<Self, PipelineError> {
        let mut segments = input.split('/');

        if segments.next() != Some(PIPELINE_TARGET) {
            return Err(PipelineError::MalformedPipeline {
                input: input.to_string(),
            });
        }

        let operations = segments
            .map(Operation::parse_segment)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { operations })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// True if any segment is a watermark operation.
    pub fn has_watermark(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.kind() == OperationKind::Watermark)
    }
}

impl FromStr for Pipeline {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pipeline::parse(s)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", PIPELINE_TARGET)?;
        for op in &self.operations {
            write!(f, "/{}", op.name)?;
            let mut keys: Vec<&String> = op.params.keys().collect();
            keys.sort();
            for key in keys {
                write!(f, ",{}_{}", key, op.params[key])?;
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}
