use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert `content` before `lineStart`. Guarded by `expectedContext`.
    Insert,
    /// Replace `[lineStart, lineEnd]` with `content`. Guarded by `expectedContent`.
    Replace,
    /// Remove `[lineStart, lineEnd]`. Guarded by `expectedContent`.
    Delete,
    Append,
    Prepend,
}

impl PatchOp {
    pub fn as_str(self) -> &'static str {
        match self {
            PatchOp::Insert => "insert",
            PatchOp::Replace => "replace",
            PatchOp::Delete => "delete",
            PatchOp::Append => "append",
            PatchOp::Prepend => "prepend",
        }
    }

    pub fn is_ranged(self) -> bool {
        matches!(self, PatchOp::Replace | PatchOp::Delete)
    }
}

/// One line-addressed edit. Line numbers are 1-based and refer to the
/// document as left by the previous patch in the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub op: PatchOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_context: Option<String>,
}

impl Patch {
    pub fn replace(line_start: usize, line_end: usize, expected: &str, content: &str) -> Self {
        Self {
            op: PatchOp::Replace,
            line_start: Some(line_start),
            line_end: Some(line_end),
            content: content.to_string(),
            expected_content: Some(expected.to_string()),
            expected_context: None,
        }
    }

    pub fn delete(line_start: usize, line_end: usize, expected: &str) -> Self {
        Self {
            op: PatchOp::Delete,
            line_start: Some(line_start),
            line_end: Some(line_end),
            content: String::new(),
            expected_content: Some(expected.to_string()),
            expected_context: None,
        }
    }

    pub fn insert(line_start: usize, context: &str, content: &str) -> Self {
        Self {
            op: PatchOp::Insert,
            line_start: Some(line_start),
            line_end: None,
            content: content.to_string(),
            expected_content: None,
            expected_context: Some(context.to_string()),
        }
    }

    pub fn append(content: &str) -> Self {
        Self::unguarded(PatchOp::Append, content)
    }

    pub fn prepend(content: &str) -> Self {
        Self::unguarded(PatchOp::Prepend, content)
    }

    fn unguarded(op: PatchOp, content: &str) -> Self {
        Self {
            op,
            line_start: None,
            line_end: None,
            content: content.to_string(),
            expected_content: None,
            expected_context: None,
        }
    }

    /// `lineEnd` defaults to `lineStart`.
    pub fn range(&self) -> Option<(usize, usize)> {
        let start = self.line_start?;
        Some((start, self.line_end.unwrap_or(start)))
    }
}

/// Job arguments of a `patch_script` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub patches: Vec<Patch>,
}
