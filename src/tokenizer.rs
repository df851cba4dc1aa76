//! Token extraction for source-code samples.
//!
//! Produces the token stream the classifier trains and predicts on. Comment
//! bodies, string literal bodies and numeric literals are dropped, since they
//! say little about the language a file is written in. Identifiers, keywords,
//! operator runs, SGML tag names and shebang interpreters are kept.

/// Maximum number of bytes of a blob that are tokenized
pub const BYTE_LIMIT: usize = 100_000;

/// Block comment delimiters, longest opening first
const BLOCK_COMMENTS: &[(&str, &str)] = &[
    ("<!--", "-->"),
    ("\"\"\"", "\"\"\""),
    ("/*", "*/"),
    ("{-", "-}"),
    ("(*", "*)"),
];

const OPERATOR_CHARS: &str = "+-*/%&|^!~=<>?:;,.\\";
const BRACKET_CHARS: &str = "(){}[]";

/// Extract tokens from raw file content.
///
/// Input beyond [`BYTE_LIMIT`] bytes is ignored.
#[must_use]
pub fn extract_tokens(data: &[u8]) -> Vec<String> {
    let data = &data[..data.len().min(BYTE_LIMIT)];
    let text = String::from_utf8_lossy(data);
    Scanner::new(&text).run()
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<String>,
}

impl Scanner {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<String> {
        self.shebang();

        while let Some(c) = self.peek(0) {
            if c.is_whitespace() {
                self.pos += 1;
            } else if self.block_comment() || self.line_comment() {
                // consumed
            } else if c == '"' || c == '\'' || c == '`' {
                self.string_literal(c);
            } else if c.is_ascii_digit() {
                self.skip_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
            } else if c == '<' && self.peek(1).is_some_and(|n| n.is_ascii_alphabetic() || n == '/')
            {
                self.sgml_tag();
            } else if is_identifier_start(c)
                || ((c == '#' || c == '@') && self.peek(1).is_some_and(is_identifier_start))
            {
                let start = self.pos;
                self.pos += 1;
                self.skip_while(is_identifier_char);
                self.emit(start);
            } else if BRACKET_CHARS.contains(c) {
                self.tokens.push(c.to_string());
                self.pos += 1;
            } else if OPERATOR_CHARS.contains(c) || c == '#' || c == '@' || c == '$' {
                let start = self.pos;
                self.pos += 1;
                self.operator_run();
                self.emit(start);
            } else {
                self.pos += 1;
            }
        }

        self.tokens
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, needle: &str) -> bool {
        needle
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek(i) == Some(c))
    }

    fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek(0).is_some_and(&pred) {
            self.pos += 1;
        }
    }

    /// Operator characters stick together, but never swallow the start of a tag
    fn operator_run(&mut self) {
        while let Some(c) = self.peek(0) {
            let opens_tag = c == '<'
                && self
                    .peek(1)
                    .is_some_and(|n| n.is_ascii_alphabetic() || n == '/');
            if opens_tag || !OPERATOR_CHARS.contains(c) {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_line(&mut self) {
        self.skip_while(|c| c != '\n');
    }

    fn emit(&mut self, start: usize) {
        self.tokens.push(self.chars[start..self.pos].iter().collect());
    }

    /// `#!/usr/bin/env ruby` becomes `SHEBANG#!ruby`
    fn shebang(&mut self) {
        if !self.starts_with("#!") {
            return;
        }
        let end = self
            .chars
            .iter()
            .position(|&c| c == '\n')
            .unwrap_or(self.chars.len());
        let line: String = self.chars[2..end].iter().collect();
        let mut words = line.split_whitespace();
        let mut interpreter = words
            .next()
            .and_then(|w| w.rsplit('/').next())
            .unwrap_or_default();
        if interpreter == "env" {
            interpreter = words.find(|w| !w.starts_with('-')).unwrap_or_default();
        }
        let interpreter = interpreter.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        if !interpreter.is_empty() {
            self.tokens.push(format!("SHEBANG#!{interpreter}"));
        }
        self.pos = end;
    }

    fn block_comment(&mut self) -> bool {
        let Some((open, close)) = BLOCK_COMMENTS
            .iter()
            .find(|(open, _)| self.starts_with(open))
        else {
            return false;
        };
        self.pos += open.chars().count();
        while self.peek(0).is_some() && !self.starts_with(close) {
            self.pos += 1;
        }
        self.pos = (self.pos + close.chars().count()).min(self.chars.len());
        true
    }

    fn line_comment(&mut self) -> bool {
        let next = self.peek(1);
        let is_comment = self.starts_with("//")
            || self.starts_with(";;")
            || (self.starts_with("--") && next_is_blank(self.peek(2)))
            || (self.peek(0) == Some('#') && next_is_blank(next))
            || (self.peek(0) == Some('%') && next_is_blank(next));
        if is_comment {
            self.skip_line();
        }
        is_comment
    }

    fn string_literal(&mut self, quote: char) {
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            if c == '\\' {
                self.pos += 2;
                continue;
            }
            if c == quote || (c == '\n' && quote != '`') {
                self.pos += 1;
                return;
            }
            self.pos += 1;
        }
    }

    /// `<div class="x">` yields `<div>` followed by the attribute names
    fn sgml_tag(&mut self) {
        self.pos += 1;
        let closing = self.peek(0) == Some('/');
        if closing {
            self.pos += 1;
        }
        let start = self.pos;
        self.skip_while(|c| c.is_ascii_alphanumeric() || c == ':' || c == '-' || c == '_');
        let name: String = self.chars[start..self.pos].iter().collect();
        if !name.is_empty() {
            let token = if closing {
                format!("</{name}>")
            } else {
                format!("<{name}>")
            };
            self.tokens.push(token);
        }
    }
}

fn next_is_blank(c: Option<char>) -> bool {
    c.map_or(true, char::is_whitespace)
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '?' || c == '!'
}
