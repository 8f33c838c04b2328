//! Tokenizer for table declarations, on top of the `sqlparser` tokenizer.
//!
//! Keywords are not distinguished from identifiers here; the parser matches
//! them case-insensitively with [`Token::is_keyword`]. Every token keeps its
//! byte span so callers can slice groups and clauses out of the source.
//!
//! Tokenizing is best effort. When the tokenizer rejects the input, the
//! prefix before the error is kept, and an unterminated literal at that
//! point becomes one quoted token running to the end of input.

use std::iter::Peekable;
use std::str::CharIndices;

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Location, Token as SqlToken, TokenWithSpan, Tokenizer};

/// Token kinds produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare word: keyword or unquoted identifier.
    Word(String),
    /// Quoted text. `quote` is the opening character (`'`, `"`, `` ` `` or `[`).
    Quoted { quote: char, text: String },
    Number(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    /// Operators and punctuation, as written.
    Symbol(String),
}

impl Token {
    /// Case-insensitive keyword match against a bare word.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(word) if word.eq_ignore_ascii_case(keyword))
    }

    /// Identifier text for bare words and quoted names.
    pub fn ident(&self) -> Option<&str> {
        match self {
            Token::Word(word) => Some(word),
            Token::Quoted { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Literal text for single- or double-quoted strings.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Token::Quoted { quote: '\'' | '"', text } => Some(text),
            _ => None,
        }
    }

    fn from_sql(token: &SqlToken) -> Token {
        match token {
            SqlToken::Word(word) => match word.quote_style {
                Some(quote) => Token::Quoted {
                    quote,
                    text: word.value.clone(),
                },
                None => Token::Word(word.value.clone()),
            },
            SqlToken::SingleQuotedString(text)
            | SqlToken::NationalStringLiteral(text)
            | SqlToken::EscapedStringLiteral(text) => Token::Quoted {
                quote: '\'',
                text: text.clone(),
            },
            SqlToken::DoubleQuotedString(text) => Token::Quoted {
                quote: '"',
                text: text.clone(),
            },
            SqlToken::Number(text, _) => Token::Number(text.clone()),
            SqlToken::LParen => Token::LParen,
            SqlToken::RParen => Token::RParen,
            SqlToken::Comma => Token::Comma,
            SqlToken::Period => Token::Dot,
            SqlToken::SemiColon => Token::Semicolon,
            other => Token::Symbol(other.to_string()),
        }
    }
}

/// A token with its byte range in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// A raw tokenizer token, whitespace and comments included, located by
/// byte offsets.
#[derive(Debug, Clone)]
pub(crate) struct Piece {
    pub token: SqlToken,
    pub start: usize,
    pub end: usize,
}

/// Raw tokens of a source text. Tokenizing stopped at `rest`; anything
/// after it could not be tokenized.
#[derive(Debug)]
pub(crate) struct Lexed {
    pub pieces: Vec<Piece>,
    pub rest: usize,
}

pub(crate) fn lex(input: &str) -> Lexed {
    let dialect = GenericDialect {};
    let mut end = input.len();
    loop {
        let source = &input[..end];
        match Tokenizer::new(&dialect, source).tokenize_with_location() {
            Ok(tokens) => {
                return Lexed {
                    pieces: locate(source, tokens),
                    rest: end,
                };
            }
            Err(err) => {
                let at = Offsets::new(source).seek(err.location);
                end = if at < end {
                    at
                } else {
                    source
                        .char_indices()
                        .next_back()
                        .map(|(idx, _)| idx)
                        .unwrap_or(0)
                };
            }
        }
    }
}

/// The text after `rest` when it is an unterminated quoted literal.
pub(crate) fn unterminated_literal(input: &str, rest: usize) -> Option<(char, &str)> {
    let tail = &input[rest..];
    let quote = tail.chars().next().filter(|c| matches!(c, '\'' | '"' | '`'))?;
    Some((quote, tail))
}

/// Tokenize `input`, dropping whitespace and comments.
///
/// `[name]` identifiers and the `[]` array suffix become
/// [`Token::Quoted`] with `[` as the quote.
pub fn tokenize(input: &str) -> Vec<Spanned> {
    let Lexed { pieces, rest } = lex(input);
    let mut tokens = Vec::with_capacity(pieces.len());

    let mut idx = 0;
    while idx < pieces.len() {
        let piece = &pieces[idx];
        idx += 1;
        match &piece.token {
            SqlToken::Whitespace(_) | SqlToken::EOF => {}
            SqlToken::LBracket => {
                let close = pieces[idx..]
                    .iter()
                    .position(|p| p.token == SqlToken::RBracket)
                    .map(|ahead| idx + ahead);
                let Some(close) = close else {
                    tokens.push(Spanned {
                        token: Token::Quoted {
                            quote: '[',
                            text: input[piece.end..].to_string(),
                        },
                        start: piece.start,
                        end: input.len(),
                    });
                    return tokens;
                };
                tokens.push(Spanned {
                    token: Token::Quoted {
                        quote: '[',
                        text: input[piece.end..pieces[close].start].to_string(),
                    },
                    start: piece.start,
                    end: pieces[close].end,
                });
                idx = close + 1;
            }
            other => tokens.push(Spanned {
                token: Token::from_sql(other),
                start: piece.start,
                end: piece.end,
            }),
        }
    }

    if let Some((quote, tail)) = unterminated_literal(input, rest) {
        tokens.push(Spanned {
            token: Token::Quoted {
                quote,
                text: tail[quote.len_utf8()..].to_string(),
            },
            start: rest,
            end: input.len(),
        });
    }
    tokens
}

fn locate(source: &str, tokens: Vec<TokenWithSpan>) -> Vec<Piece> {
    let mut offsets = Offsets::new(source);
    tokens
        .into_iter()
        .filter(|located| located.token != SqlToken::EOF)
        .map(|located| {
            let start = offsets.seek(located.span.start);
            let end = offsets.seek(located.span.end);
            Piece {
                token: located.token,
                start,
                end,
            }
        })
        .collect()
}

/// Maps tokenizer locations (1-based line, 1-based character column) to
/// byte offsets. Locations must be sought in non-decreasing order.
struct Offsets<'a> {
    chars: Peekable<CharIndices<'a>>,
    len: usize,
    line: u64,
    column: u64,
}

impl<'a> Offsets<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            len: source.len(),
            line: 1,
            column: 1,
        }
    }

    fn seek(&mut self, target: Location) -> usize {
        while (self.line, self.column) < (target.line, target.column) {
            match self.chars.next() {
                Some((_, '\n')) => {
                    self.line += 1;
                    self.column = 1;
                }
                Some(_) => self.column += 1,
                None => return self.len,
            }
        }
        self.chars.peek().map(|(idx, _)| *idx).unwrap_or(self.len)
    }
}
