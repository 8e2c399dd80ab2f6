use serde::{Deserialize, Serialize};

use super::Error;

/// User-facing rendering of an [`Error`]: stable code, message and fix steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub details: serde_json::Value,
    pub fix_steps: Vec<String>,
}

impl Diagnostic {
    pub fn from_error(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            details: err.details(),
            fix_steps: err.fix_steps(),
        }
    }

    pub fn format_terminal(&self) -> String {
        let mut s = format!("error[{}]: {}\n", self.code, self.message);
        s.push_str(&format!("  retryable: {}\n", self.retryable));

        if self.details.as_object().is_some_and(|o| !o.is_empty()) {
            if let Ok(json) = serde_json::to_string_pretty(&self.details) {
                for line in json.lines() {
                    s.push_str(&format!("  {}\n", line));
                }
            }
        }

        if !self.fix_steps.is_empty() {
            s.push_str("\nFix:\n");
            for (i, step) in self.fix_steps.iter().enumerate() {
                s.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }
        s
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format_terminal())
    }
}
