//! Shallow structural check for Luau sources.
//!
//! This is not a parser. It tokenizes just enough to skip strings and
//! comments, then checks that brackets nest and that block keywords pair up
//! (`function`, `if`, `do`, `while`, `for` with `end`; `repeat` with
//! `until`). Luau's expression form `if a then b else c` opens no block.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct StructureError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Function,
    If,
    Do,
    While,
    For,
    Repeat,
}

impl Block {
    fn keyword(self) -> &'static str {
        match self {
            Block::Function => "function",
            Block::If => "if",
            Block::Do => "do",
            Block::While => "while",
            Block::For => "for",
            Block::Repeat => "repeat",
        }
    }
}

/// What the previous significant token leaves the scanner expecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    /// A statement may start here.
    Boundary,
    /// A complete value was just read.
    Operand,
    /// An expression must follow.
    Operator,
    /// After `.` or `:`; the next word is a field or method name.
    Member,
}

pub fn validate(source: &str) -> Result<(), StructureError> {
    Scanner::new(source).run()
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    brackets: Vec<(char, usize)>,
    blocks: Vec<(Block, usize)>,
    // `while`/`for` headers whose `do` has not been seen yet
    pending_loops: usize,
    prev: Prev,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            brackets: Vec::new(),
            blocks: Vec::new(),
            pending_loops: 0,
            prev: Prev::Boundary,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn error(&self, line: usize, message: impl Into<String>) -> StructureError {
        StructureError {
            line,
            message: message.into(),
        }
    }

    fn run(mut self) -> Result<(), StructureError> {
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                c if c.is_whitespace() => self.pos += 1,
                '-' if self.peek(1) == Some('-') => {
                    self.pos += 2;
                    self.comment()?;
                }
                '"' | '\'' | '`' => {
                    self.quoted(c)?;
                    self.prev = Prev::Operand;
                }
                '[' if self.long_bracket_level().is_some() => {
                    self.long_bracket("string")?;
                    self.prev = Prev::Operand;
                }
                '(' | '[' | '{' => {
                    self.brackets.push((c, self.line));
                    self.pos += 1;
                    self.prev = Prev::Operator;
                }
                ')' | ']' | '}' => {
                    self.close_bracket(c)?;
                    self.pos += 1;
                    self.prev = Prev::Operand;
                }
                c if c.is_ascii_digit() => self.number(),
                '.' if self.peek(1).is_some_and(|d| d.is_ascii_digit()) => self.number(),
                c if c == '_' || c.is_alphabetic() => {
                    let word = self.word();
                    self.keyword(&word)?;
                }
                '.' => {
                    let mut dots = 0;
                    while self.peek(0) == Some('.') {
                        dots += 1;
                        self.pos += 1;
                    }
                    self.prev = match dots {
                        1 => Prev::Member,
                        3 => Prev::Operand,
                        _ => Prev::Operator,
                    };
                }
                ':' if self.peek(1) == Some(':') => {
                    self.pos += 2;
                    self.prev = Prev::Operator;
                }
                ':' => {
                    self.pos += 1;
                    self.prev = Prev::Member;
                }
                ';' => {
                    self.pos += 1;
                    self.prev = Prev::Boundary;
                }
                _ => {
                    self.pos += 1;
                    self.prev = Prev::Operator;
                }
            }
        }
        self.finish()
    }

    fn finish(self) -> Result<(), StructureError> {
        if let Some((open, line)) = self.brackets.last() {
            return Err(self.error(*line, format!("unclosed '{open}'")));
        }
        if let Some((block, line)) = self.blocks.last() {
            let closer = if *block == Block::Repeat {
                "until"
            } else {
                "end"
            };
            return Err(self.error(
                *line,
                format!("'{}' is never closed by '{closer}'", block.keyword()),
            ));
        }
        Ok(())
    }

    fn comment(&mut self) -> Result<(), StructureError> {
        if self.peek(0) == Some('[') && self.long_bracket_level().is_some() {
            return self.long_bracket("comment");
        }
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
        Ok(())
    }

    /// Level of a long bracket opening at the cursor: `[[` is 0, `[==[` is 2.
    fn long_bracket_level(&self) -> Option<usize> {
        let mut level = 0;
        while self.peek(1 + level) == Some('=') {
            level += 1;
        }
        (self.peek(1 + level) == Some('[')).then_some(level)
    }

    fn long_bracket(&mut self, what: &str) -> Result<(), StructureError> {
        let start_line = self.line;
        let level = self.long_bracket_level().unwrap_or(0);
        self.pos += level + 2;
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                self.line += 1;
            } else if c == ']'
                && (1..=level).all(|i| self.peek(i) == Some('='))
                && self.peek(level + 1) == Some(']')
            {
                self.pos += level + 2;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(self.error(start_line, format!("unterminated long {what}")))
    }

    fn quoted(&mut self, quote: char) -> Result<(), StructureError> {
        let start_line = self.line;
        self.pos += 1;
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    return Err(self.error(start_line, "unterminated string"));
                }
                Some('\\') => {
                    match self.peek(1) {
                        Some('\n') => self.line += 1,
                        Some('z') => {
                            self.pos += 2;
                            while let Some(c) = self.peek(0).filter(|c| c.is_whitespace()) {
                                if c == '\n' {
                                    self.line += 1;
                                }
                                self.pos += 1;
                            }
                            continue;
                        }
                        _ => {}
                    }
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn close_bracket(&mut self, close: char) -> Result<(), StructureError> {
        let expected = match close {
            ')' => '(',
            ']' => '[',
            _ => '{',
        };
        match self.brackets.pop() {
            None => Err(self.error(self.line, format!("unexpected '{close}'"))),
            Some((open, _)) if open == expected => Ok(()),
            Some((open, line)) => Err(self.error(
                self.line,
                format!("'{close}' does not match '{open}' opened at line {line}"),
            )),
        }
    }

    fn number(&mut self) {
        let mut last = '0';
        while let Some(c) = self.peek(0) {
            let exponent_sign =
                matches!(c, '+' | '-') && matches!(last, 'e' | 'E' | 'p' | 'P');
            let part = c.is_ascii_alphanumeric() || c == '_';
            let point = c == '.' && self.peek(1) != Some('.');
            if !(part || point || exponent_sign) {
                break;
            }
            last = c;
            self.pos += 1;
        }
        self.prev = Prev::Operand;
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c == '_' || c.is_alphanumeric())
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn keyword(&mut self, word: &str) -> Result<(), StructureError> {
        if self.prev == Prev::Member {
            self.prev = Prev::Operand;
            return Ok(());
        }
        let line = self.line;
        self.prev = match word {
            "function" => {
                self.blocks.push((Block::Function, line));
                Prev::Boundary
            }
            "if" => {
                if self.prev != Prev::Operator {
                    self.blocks.push((Block::If, line));
                }
                Prev::Operator
            }
            "while" | "for" => {
                let block = if word == "while" {
                    Block::While
                } else {
                    Block::For
                };
                self.blocks.push((block, line));
                self.pending_loops += 1;
                Prev::Operator
            }
            "do" => {
                if self.pending_loops > 0 {
                    self.pending_loops -= 1;
                } else {
                    self.blocks.push((Block::Do, line));
                }
                Prev::Boundary
            }
            "repeat" => {
                self.blocks.push((Block::Repeat, line));
                Prev::Boundary
            }
            "end" => {
                match self.blocks.pop() {
                    None => return Err(self.error(line, "unexpected 'end'")),
                    Some((Block::Repeat, opened)) => {
                        return Err(self.error(
                            line,
                            format!("'end' closes 'repeat' opened at line {opened}; expected 'until'"),
                        ))
                    }
                    Some(_) => {}
                }
                Prev::Boundary
            }
            "until" => {
                match self.blocks.pop() {
                    Some((Block::Repeat, _)) => {}
                    None => return Err(self.error(line, "unexpected 'until'")),
                    Some((block, opened)) => {
                        return Err(self.error(
                            line,
                            format!(
                                "'until' closes '{}' opened at line {opened}; expected 'end'",
                                block.keyword()
                            ),
                        ))
                    }
                }
                Prev::Operator
            }
            "then" | "else" | "break" | "continue" | "local" => Prev::Boundary,
            "return" | "and" | "or" | "not" | "in" | "elseif" => Prev::Operator,
            _ => Prev::Operand,
        };
        Ok(())
    }
}
