use serde_json::{json, Value};
use thiserror::Error;

use crate::validate::StructureError;

/// Why a batch was rejected. Patch indexes are 1-based positions in the
/// submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("patch {index}: content at lines {line_start}-{line_end} does not match expectedContent")]
    ContentMismatch {
        index: usize,
        line_start: usize,
        line_end: usize,
        expected: String,
        actual: String,
    },
    #[error("patch {index}: line before {line_start} does not match expectedContext")]
    ContextMismatch {
        index: usize,
        line_start: usize,
        expected: String,
        actual: String,
    },
    #[error("patch {index}: {op} requires {field}")]
    MissingGuard {
        index: usize,
        op: &'static str,
        field: &'static str,
    },
    #[error("patch {index}: {op} requires lineStart")]
    MissingLineStart { index: usize, op: &'static str },
    #[error("patch {index}: lines {line_start}-{line_end} are outside a {line_count}-line script")]
    InvalidRange {
        index: usize,
        line_start: usize,
        line_end: usize,
        line_count: usize,
    },
    #[error("patched script is structurally invalid: {0}")]
    Validation(StructureError),
}

impl PatchError {
    pub fn code(&self) -> &'static str {
        match self {
            PatchError::ContentMismatch { .. } => "content_mismatch",
            PatchError::ContextMismatch { .. } => "context_mismatch",
            PatchError::MissingGuard { .. } => "missing_guard",
            PatchError::MissingLineStart { .. } => "missing_line_start",
            PatchError::InvalidRange { .. } => "invalid_range",
            PatchError::Validation(_) => "validation_failed",
        }
    }

    /// Index of the offending patch; `None` for whole-batch validation.
    pub fn index(&self) -> Option<usize> {
        match self {
            PatchError::ContentMismatch { index, .. }
            | PatchError::ContextMismatch { index, .. }
            | PatchError::MissingGuard { index, .. }
            | PatchError::MissingLineStart { index, .. }
            | PatchError::InvalidRange { index, .. } => Some(*index),
            PatchError::Validation(_) => None,
        }
    }

    /// Structured error payload returned to the caller.
    pub fn to_value(&self) -> Value {
        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(index) = self.index() {
            body["patchIndex"] = json!(index);
        }
        match self {
            PatchError::ContentMismatch {
                line_start,
                line_end,
                expected,
                actual,
                ..
            } => {
                body["lineStart"] = json!(line_start);
                body["lineEnd"] = json!(line_end);
                body["expected"] = json!(expected);
                body["actual"] = json!(actual);
            }
            PatchError::ContextMismatch {
                line_start,
                expected,
                actual,
                ..
            } => {
                body["lineStart"] = json!(line_start);
                body["expected"] = json!(expected);
                body["actual"] = json!(actual);
            }
            PatchError::InvalidRange { line_count, .. } => {
                body["lineCount"] = json!(line_count);
            }
            PatchError::Validation(err) => {
                body["line"] = json!(err.line);
            }
            PatchError::MissingGuard { .. } | PatchError::MissingLineStart { .. } => {}
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_payload_carries_both_texts() {
        let err = PatchError::ContentMismatch {
            index: 2,
            line_start: 5,
            line_end: 6,
            expected: "old".into(),
            actual: "new".into(),
        };
        let body = err.to_value();
        assert_eq!(body["code"], "content_mismatch");
        assert_eq!(body["patchIndex"], 2);
        assert_eq!(body["expected"], "old");
        assert_eq!(body["actual"], "new");
    }

    #[test]
    fn validation_payload_has_no_index() {
        let err = PatchError::Validation(StructureError {
            line: 3,
            message: "unclosed '('".into(),
        });
        let body = err.to_value();
        assert!(body.get("patchIndex").is_none());
        assert_eq!(body["line"], 3);
    }
}
