use crate::document::{split_lines, Document};
use crate::error::PatchError;
use crate::patch::{Patch, PatchOp};
use crate::validate::validate;

/// Result of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub source: String,
    pub line_count: usize,
    pub applied: usize,
}

/// Applies `patches` in order to a copy of `source`.
///
/// Each patch sees the document left by the previous one. The first guard
/// failure aborts the batch; after the last patch the whole result must pass
/// [`validate`](crate::validate). On any error the caller keeps `source`
/// as it was, since nothing here writes back.
pub fn apply(source: &str, patches: &[Patch]) -> Result<PatchOutcome, PatchError> {
    let mut document = Document::parse(source);
    for (offset, patch) in patches.iter().enumerate() {
        apply_one(&mut document, offset + 1, patch)?;
    }
    let source = document.to_source();
    validate(&source).map_err(PatchError::Validation)?;
    Ok(PatchOutcome {
        source,
        line_count: document.line_count(),
        applied: patches.len(),
    })
}

fn apply_one(document: &mut Document, index: usize, patch: &Patch) -> Result<(), PatchError> {
    let op = patch.op.as_str();
    match patch.op {
        PatchOp::Append => document.extend(split_lines(&patch.content)),
        PatchOp::Prepend => document.insert_before(1, split_lines(&patch.content)),
        PatchOp::Insert => {
            let expected = patch
                .expected_context
                .as_deref()
                .ok_or(PatchError::MissingGuard {
                    index,
                    op,
                    field: "expectedContext",
                })?;
            let line_start = patch
                .line_start
                .ok_or(PatchError::MissingLineStart { index, op })?;
            let line_count = document.line_count();
            if line_start == 0 || line_start > line_count + 1 {
                return Err(PatchError::InvalidRange {
                    index,
                    line_start,
                    line_end: line_start,
                    line_count,
                });
            }
            // Inserting at line 1 has no preceding line.
            let actual = document.line(line_start - 1).unwrap_or_default();
            if normalize(expected) != actual {
                return Err(PatchError::ContextMismatch {
                    index,
                    line_start,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
            document.insert_before(line_start, split_lines(&patch.content));
        }
        PatchOp::Replace | PatchOp::Delete => {
            let expected = patch
                .expected_content
                .as_deref()
                .ok_or(PatchError::MissingGuard {
                    index,
                    op,
                    field: "expectedContent",
                })?;
            let (line_start, line_end) = patch
                .range()
                .ok_or(PatchError::MissingLineStart { index, op })?;
            let line_count = document.line_count();
            if line_start == 0 || line_start > line_end || line_end > line_count {
                return Err(PatchError::InvalidRange {
                    index,
                    line_start,
                    line_end,
                    line_count,
                });
            }
            let actual = document.slice(line_start, line_end);
            if normalize(expected) != actual {
                return Err(PatchError::ContentMismatch {
                    index,
                    line_start,
                    line_end,
                    expected: expected.to_string(),
                    actual,
                });
            }
            let replacement = if patch.op == PatchOp::Replace {
                let indent = leading_whitespace(document.line(line_start).unwrap_or_default());
                reindent(split_lines(&patch.content), indent)
            } else {
                Vec::new()
            };
            document.splice(line_start, line_end, replacement);
        }
    }
    Ok(())
}

// Guards are compared after the same line-ending normalization the document gets.
fn normalize(text: &str) -> String {
    split_lines(text).join("\n")
}

fn leading_whitespace(line: &str) -> String {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').collect()
}

fn reindent(lines: Vec<String>, indent: String) -> Vec<String> {
    if indent.is_empty() {
        return lines;
    }
    lines
        .into_iter()
        .map(|line| {
            if line.trim().is_empty() || line.starts_with([' ', '\t']) {
                line
            } else {
                format!("{indent}{line}")
            }
        })
        .collect()
}
