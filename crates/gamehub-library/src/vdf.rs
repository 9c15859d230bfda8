//! Minimal reader for Valve's KeyValues text format (`.acf`, `.vdf`)

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VdfError {
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Unexpected '{0}' at byte {1}")]
    UnexpectedToken(char, usize),

    #[error("Unterminated string starting at byte {0}")]
    UnterminatedString(usize),
}

/// A node: either a string or a nested block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdfValue {
    Str(String),
    Block(VdfBlock),
}

impl VdfValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VdfValue::Str(s) => Some(s),
            VdfValue::Block(_) => None,
        }
    }

    pub fn as_block(&self) -> Option<&VdfBlock> {
        match self {
            VdfValue::Block(block) => Some(block),
            VdfValue::Str(_) => None,
        }
    }
}

/// Ordered key/value pairs of a block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VdfBlock {
    entries: Vec<(String, VdfValue)>,
}

impl VdfBlock {
    /// First value under `key`, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&VdfValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(VdfValue::as_str)
    }

    pub fn get_block(&self, key: &str) -> Option<&VdfBlock> {
        self.get(key).and_then(VdfValue::as_block)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VdfValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Str(String),
    Open,
    Close,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                    self.bump();
                }
                Some('/') if self.input[self.pos..].starts_with("//") => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<(Token, usize)>, VdfError> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.bump() else {
            return Ok(None);
        };

        let token = match c {
            '{' => Token::Open,
            '}' => Token::Close,
            '"' => Token::Str(self.quoted(start)?),
            _ => {
                let mut word = String::from(c);
                while let Some(c) = self.peek_char() {
                    if c.is_whitespace() || matches!(c, '{' | '}' | '"') {
                        break;
                    }
                    word.push(c);
                    self.bump();
                }
                Token::Str(word)
            }
        };

        Ok(Some((token, start)))
    }

    fn quoted(&mut self, start: usize) -> Result<String, VdfError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(VdfError::UnterminatedString(start)),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(VdfError::UnterminatedString(start)),
                },
                Some(c) => out.push(c),
            }
        }
    }
}

/// Parse a document into its top-level block
pub fn parse(input: &str) -> Result<VdfBlock, VdfError> {
    let mut lexer = Lexer::new(input);
    parse_block(&mut lexer, false)
}

fn parse_block(lexer: &mut Lexer<'_>, nested: bool) -> Result<VdfBlock, VdfError> {
    let mut block = VdfBlock::default();

    loop {
        let key = match lexer.next_token()? {
            None if nested => return Err(VdfError::UnexpectedEof),
            None => return Ok(block),
            Some((Token::Close, _)) if nested => return Ok(block),
            Some((Token::Close, at)) => return Err(VdfError::UnexpectedToken('}', at)),
            Some((Token::Open, at)) => return Err(VdfError::UnexpectedToken('{', at)),
            Some((Token::Str(key), _)) => key,
        };

        let value = match lexer.next_token()? {
            None => return Err(VdfError::UnexpectedEof),
            Some((Token::Str(value), _)) => VdfValue::Str(value),
            Some((Token::Open, _)) => VdfValue::Block(parse_block(lexer, true)?),
            Some((Token::Close, at)) => return Err(VdfError::UnexpectedToken('}', at)),
        };

        block.entries.push((key, value));
    }
}
