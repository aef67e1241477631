/// A script source as an ordered list of lines.
///
/// Line breaks are `\n`; a `\r` before a break is dropped. A single trailing
/// newline is remembered so that unrelated edits do not add or remove it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Document {
    pub fn parse(source: &str) -> Self {
        if source.is_empty() {
            return Self::default();
        }
        let (body, trailing_newline) = match source.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (source, false),
        };
        Self {
            lines: split_lines(body),
            trailing_newline,
        }
    }

    pub fn to_source(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// 1-based line lookup.
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
    }

    /// Text of the inclusive 1-based range, joined with `\n`.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.lines[start - 1..end].join("\n")
    }

    pub(crate) fn splice(&mut self, start: usize, end: usize, replacement: Vec<String>) {
        self.lines.splice(start - 1..end, replacement);
    }

    pub(crate) fn insert_before(&mut self, line: usize, content: Vec<String>) {
        self.lines.splice(line - 1..line - 1, content);
    }

    pub(crate) fn extend(&mut self, content: Vec<String>) {
        self.lines.extend(content);
    }
}

pub(crate) fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_newline_is_preserved() {
        let doc = Document::parse("local a = 1\nreturn a\n");
        assert_eq!(doc.line_count(), 2);
        assert_eq!(doc.to_source(), "local a = 1\nreturn a\n");
    }

    #[test]
    fn crlf_is_normalized() {
        let doc = Document::parse("a\r\nb\r\n");
        assert_eq!(doc.lines(), ["a", "b"]);
    }

    #[test]
    fn empty_source_has_no_lines() {
        let doc = Document::parse("");
        assert_eq!(doc.line_count(), 0);
        assert_eq!(doc.line(1), None);
        assert_eq!(doc.to_source(), "");
    }

    #[test]
    fn blank_line_source_is_one_line() {
        assert_eq!(Document::parse("\n").lines(), [""]);
    }
}
