use serde::{Deserialize, Serialize};
use std::fmt;

use crate::executor::Value;

/// One positional unit of pipeline code
///
/// The index is the step's position among all cells of the pipeline, so two
/// steps with the same content at different positions are distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub content: String,
}

impl Step {
    pub fn new(index: usize, content: impl Into<String>) -> Self {
        Self {
            index,
            content: content.into(),
        }
    }

    /// First 40 characters of the content with whitespace collapsed, for logs
    pub fn snippet(&self) -> String {
        let collapsed = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.chars().take(40).collect()
    }
}

/// What a step produced
///
/// `result` is the value of the step's last statement, `None` when the step
/// has no statements. A step without a result still gets a value blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepValue {
    pub result: Option<Value>,
    #[serde(default)]
    pub output: Vec<String>,
}

impl StepValue {
    pub fn new(result: Option<Value>) -> Self {
        Self {
            result,
            output: Vec::new(),
        }
    }

    /// The result, if it is anything other than `none`
    pub fn observable(&self) -> Option<&Value> {
        match &self.result {
            Some(Value::None) | None => None,
            Some(value) => Some(value),
        }
    }
}

impl fmt::Display for StepValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.observable() {
            Some(value) => write!(f, "{}", value),
            None => f.write_str("-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_collapses_whitespace() {
        let step = Step::new(0, "x = 1\n\n   y =    2\n");
        assert_eq!(step.snippet(), "x = 1 y = 2");

        let long = Step::new(1, "a".repeat(100));
        assert_eq!(long.snippet().len(), 40);
    }

    #[test]
    fn test_observable_hides_none() {
        assert!(StepValue::new(None).observable().is_none());
        assert!(StepValue::new(Some(Value::None)).observable().is_none());
        assert_eq!(
            StepValue::new(Some(Value::Int(4))).observable(),
            Some(&Value::Int(4))
        );
    }
}
