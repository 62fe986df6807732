//! Character scanner that classifies SQL source into code, quoted and
//! commented regions.
//!
//! Recognised syntax:
//! - Single-quoted strings (`'...'`, `''` and optionally `\'` escapes)
//! - Double-quoted strings/identifiers (`"..."`, `""` and optionally `\"`)
//! - Backtick identifiers (`` `...` ``, no escapes)
//! - Line comments (`#`, and `-- ` when surrounded by whitespace)
//! - Block comments (`/* */`, not nested)
//! - Dollar-quoted bodies (`$$...$$`, `$tag$...$tag$`), when enabled
//!
//! Every consumer in this crate (splitting, masking, parameters, dialect
//! translation) walks the same [`Scanner`], so escape rules are identical
//! everywhere.

use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::Regex;

static DOLLAR_TAG_RE: OnceLock<Regex> = OnceLock::new();

fn dollar_tag_re() -> &'static Regex {
    DOLLAR_TAG_RE.get_or_init(|| {
        Regex::new(r"^\$(?:[A-Za-z_][A-Za-z0-9_]*)?\$").expect("dollar tag pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Code,
    SingleQuoted,
    DoubleQuoted,
    Backticked,
    LineComment,
    BlockComment,
    DollarQuoted,
}

impl Region {
    #[must_use]
    pub fn is_code(self) -> bool {
        self == Self::Code
    }
}

/// Position of a character inside its region. Code characters are always
/// [`Role::Body`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Open,
    Body,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedChar {
    /// Byte offset into the source.
    pub offset: usize,
    pub ch: char,
    pub region: Region,
    pub role: Role,
}

impl ScannedChar {
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.ch.len_utf8()
    }

    #[must_use]
    pub fn is_code(&self) -> bool {
        self.region.is_code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Treat `\` inside single/double quotes as escaping the next character.
    pub backslash_escapes: bool,
    /// Recognise PostgreSQL `$tag$` bodies.
    pub dollar_quotes: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            backslash_escapes: true,
            dollar_quotes: false,
        }
    }
}

impl ScanOptions {
    #[must_use]
    pub fn with_dollar_quotes(mut self) -> Self {
        self.dollar_quotes = true;
        self
    }

    #[must_use]
    pub fn with_backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }
}

/// Snapshot of the scanner's lexical state. At most one flag is set, and
/// `dollar_tag` is only present when no flag is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    pub in_single_quote: bool,
    pub in_double_quote: bool,
    pub in_backtick: bool,
    pub in_line_comment: bool,
    pub in_block_comment: bool,
    pub dollar_tag: Option<String>,
}

impl ScanState {
    #[must_use]
    pub fn is_code(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Code,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
    Dollar(String),
}

#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    prev: Option<char>,
    mode: Mode,
    options: ScanOptions,
    queue: VecDeque<ScannedChar>,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub fn new(src: &'a str, options: ScanOptions) -> Self {
        Self {
            src,
            pos: 0,
            prev: None,
            mode: Mode::Code,
            options,
            queue: VecDeque::with_capacity(4),
        }
    }

    /// Lexical state after the characters scanned so far. A multi-character
    /// delimiter is scanned as a whole, so while its characters are still
    /// being yielded the state already reflects the region that follows it.
    #[must_use]
    pub fn state(&self) -> ScanState {
        let mut state = ScanState::default();
        match &self.mode {
            Mode::Code => {}
            Mode::SingleQuote => state.in_single_quote = true,
            Mode::DoubleQuote => state.in_double_quote = true,
            Mode::Backtick => state.in_backtick = true,
            Mode::LineComment => state.in_line_comment = true,
            Mode::BlockComment => state.in_block_comment = true,
            Mode::Dollar(tag) => state.dollar_tag = Some(tag.clone()),
        }
        state
    }

    fn char_at(&self, offset: usize) -> Option<char> {
        self.src.get(offset..)?.chars().next()
    }

    fn emit(&mut self, ch: char, region: Region, role: Role) {
        self.queue.push_back(ScannedChar {
            offset: self.pos,
            ch,
            region,
            role,
        });
        self.pos += ch.len_utf8();
        self.prev = Some(ch);
    }

    fn emit_str(&mut self, text: &str, region: Region, role: Role) {
        for ch in text.chars() {
            self.emit(ch, region, role);
        }
    }

    fn emit_next(&mut self, region: Region, role: Role) {
        if let Some(ch) = self.char_at(self.pos) {
            self.emit(ch, region, role);
        }
    }

    /// `--` only opens a comment when preceded by start/whitespace/`(`/`;`
    /// and followed by end/whitespace, so `a--b` stays arithmetic.
    fn opens_dash_comment(&self) -> bool {
        let preceded = self
            .prev
            .is_none_or(|prev| prev.is_whitespace() || prev == '(' || prev == ';');
        let followed = self
            .char_at(self.pos + 2)
            .is_none_or(char::is_whitespace);
        preceded && followed
    }

    fn step_code(&mut self, ch: char) {
        let next = self.char_at(self.pos + ch.len_utf8());
        match ch {
            '\'' => {
                self.mode = Mode::SingleQuote;
                self.emit(ch, Region::SingleQuoted, Role::Open);
            }
            '"' => {
                self.mode = Mode::DoubleQuote;
                self.emit(ch, Region::DoubleQuoted, Role::Open);
            }
            '`' => {
                self.mode = Mode::Backtick;
                self.emit(ch, Region::Backticked, Role::Open);
            }
            '#' => {
                self.mode = Mode::LineComment;
                self.emit(ch, Region::LineComment, Role::Open);
            }
            '-' if next == Some('-') && self.opens_dash_comment() => {
                self.mode = Mode::LineComment;
                self.emit_str("--", Region::LineComment, Role::Open);
            }
            '/' if next == Some('*') => {
                self.mode = Mode::BlockComment;
                self.emit_str("/*", Region::BlockComment, Role::Open);
            }
            '$' if self.options.dollar_quotes => {
                if let Some(tag) = dollar_tag_re().find(&self.src[self.pos..]) {
                    let tag = tag.as_str().to_string();
                    self.emit_str(&tag, Region::DollarQuoted, Role::Open);
                    self.mode = Mode::Dollar(tag);
                } else {
                    self.emit(ch, Region::Code, Role::Body);
                }
            }
            _ => self.emit(ch, Region::Code, Role::Body),
        }
    }

    fn step_quoted(&mut self, ch: char, delimiter: char, region: Region) {
        if ch == '\\' && self.options.backslash_escapes {
            self.emit(ch, region, Role::Body);
            self.emit_next(region, Role::Body);
        } else if ch == delimiter {
            if self.char_at(self.pos + 1) == Some(delimiter) {
                self.emit(ch, region, Role::Body);
                self.emit(ch, region, Role::Body);
            } else {
                self.mode = Mode::Code;
                self.emit(ch, region, Role::Close);
            }
        } else {
            self.emit(ch, region, Role::Body);
        }
    }

    fn step(&mut self, ch: char) {
        match &self.mode {
            Mode::Code => self.step_code(ch),
            Mode::SingleQuote => self.step_quoted(ch, '\'', Region::SingleQuoted),
            Mode::DoubleQuote => self.step_quoted(ch, '"', Region::DoubleQuoted),
            Mode::Backtick => {
                if ch == '`' {
                    self.mode = Mode::Code;
                    self.emit(ch, Region::Backticked, Role::Close);
                } else {
                    self.emit(ch, Region::Backticked, Role::Body);
                }
            }
            Mode::LineComment => {
                if ch == '\n' {
                    self.mode = Mode::Code;
                    self.emit(ch, Region::Code, Role::Body);
                } else {
                    self.emit(ch, Region::LineComment, Role::Body);
                }
            }
            Mode::BlockComment => {
                if ch == '*' && self.char_at(self.pos + 1) == Some('/') {
                    self.mode = Mode::Code;
                    self.emit_str("*/", Region::BlockComment, Role::Close);
                } else {
                    self.emit(ch, Region::BlockComment, Role::Body);
                }
            }
            Mode::Dollar(tag) => {
                if self.src[self.pos..].starts_with(tag.as_str()) {
                    let tag = tag.clone();
                    self.mode = Mode::Code;
                    self.emit_str(&tag, Region::DollarQuoted, Role::Close);
                } else {
                    self.emit(ch, Region::DollarQuoted, Role::Body);
                }
            }
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = ScannedChar;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(queued) = self.queue.pop_front() {
            return Some(queued);
        }
        let ch = self.char_at(self.pos)?;
        self.step(ch);
        self.queue.pop_front()
    }
}

/// Replaces every quoted or commented character with a space, keeping
/// newlines so line structure survives.
#[must_use]
pub fn mask(sql: &str, options: ScanOptions) -> String {
    Scanner::new(sql, options)
        .map(|scanned| {
            if scanned.is_code() || scanned.ch == '\n' {
                scanned.ch
            } else {
                ' '
            }
        })
        .collect()
}
