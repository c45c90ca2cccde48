//! Audit records for the manipulations along a search path.

use std::fmt;

use crate::data::Data;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMethod {
    StartSet,
    Conversion,
    Aggregation,
    Model,
    Combine,
    Subset,
}

impl fmt::Display for StepMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StepMethod::StartSet => "start set",
            StepMethod::Conversion => "conversion",
            StepMethod::Aggregation => "aggregation",
            StepMethod::Model => "model",
            StepMethod::Combine => "combine",
            StepMethod::Subset => "subset",
        };
        f.write_str(text)
    }
}

/// One manipulation in a path: what was done, to which sources, and what came
/// out. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub method: StepMethod,
    pub method_detail: String,
    pub input: Vec<Data>,
    pub output: Vec<Data>,
}

impl PathStep {
    pub fn new(
        method: StepMethod,
        method_detail: impl Into<String>,
        input: Vec<Data>,
        output: Vec<Data>,
    ) -> Self {
        Self {
            method,
            method_detail: method_detail.into(),
            input,
            output,
        }
    }

    /// The opening step of every path.
    pub fn start() -> Self {
        Self::new(StepMethod::StartSet, "", Vec::new(), Vec::new())
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method)?;
        if !self.method_detail.is_empty() {
            write!(f, " [{}]", self.method_detail)?;
        }
        if let Some(output) = self.output.first() {
            write!(f, " -> {}", output.notation())?;
        }
        Ok(())
    }
}
