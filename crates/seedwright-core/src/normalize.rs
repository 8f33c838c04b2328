//! Statement normalization and nesting-aware splitting.
//!
//! All structure is read from tokens, so quoted literals such as `'a,b'`
//! or `'('` and comments never affect where a group closes or a clause
//! ends.

use sqlparser::tokenizer::Token as SqlToken;

use crate::lexer::{Lexed, Spanned, Token, lex, tokenize, unterminated_literal};

/// Drop comments and collapse the text onto one line.
///
/// `--` comments and `/* ... */` blocks are removed and every run of
/// whitespace outside quoted literals becomes a single space. Applying this
/// twice gives the same result as applying it once.
pub fn normalize_statements(text: &str) -> String {
    let Lexed { pieces, rest } = lex(text);
    let mut out = String::with_capacity(text.len());
    let mut gap = false;

    let mut push = |piece: &str, gap: &mut bool| {
        if *gap && !out.is_empty() {
            out.push(' ');
        }
        *gap = false;
        out.push_str(piece);
    };

    for piece in &pieces {
        if matches!(piece.token, SqlToken::Whitespace(_)) {
            gap = true;
        } else {
            push(&text[piece.start..piece.end], &mut gap);
        }
    }
    if let Some((_, tail)) = unterminated_literal(text, rest) {
        push(tail.trim_end(), &mut gap);
    }
    out
}

/// Index of the parenthesis closing the one at `tokens[0]`.
pub(crate) fn closing_paren(tokens: &[Spanned]) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, spanned) in tokens.iter().enumerate() {
        match spanned.token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `text` on commas outside parentheses and quotes.
///
/// Parts are returned untrimmed; the trailing part is always included, so
/// callers should trim and skip empties.
pub fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut from = 0;
    let mut depth = 0usize;

    for spanned in tokenize(text) {
        match spanned.token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                parts.push(&text[from..spanned.start]);
                from = spanned.end;
            }
            _ => {}
        }
    }

    parts.push(&text[from..]);
    parts
}

/// A located table declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration<'a> {
    pub name: String,
    /// Content between the outer parentheses.
    pub body: &'a str,
    /// False when the body ran to the end of its span without closing.
    pub terminated: bool,
}

/// Locate every `CREATE TABLE` declaration in normalized text.
///
/// Accepts `CREATE [TEMP|TEMPORARY|UNLOGGED] TABLE [IF NOT EXISTS] name (`
/// with bare, quoted, or schema-qualified names (the last segment wins).
/// Each declaration's span ends where the next one starts.
pub fn split_declarations(text: &str) -> Vec<Declaration<'_>> {
    let tokens = tokenize(text);
    let mut heads: Vec<(usize, String, usize)> = Vec::new();

    let mut idx = 0;
    while idx < tokens.len() {
        if let Some((name, paren)) = match_declaration_head(&tokens, idx) {
            heads.push((idx, name, paren));
            idx = paren + 1;
        } else {
            idx += 1;
        }
    }

    let mut declarations = Vec::with_capacity(heads.len());
    for (pos, (_, name, paren)) in heads.iter().enumerate() {
        let limit = heads
            .get(pos + 1)
            .map(|(next, _, _)| *next)
            .unwrap_or(tokens.len());
        let start = tokens[*paren].end;
        let (body, terminated) = match closing_paren(&tokens[*paren..limit]) {
            Some(close) => (&text[start..tokens[paren + close].start], true),
            None => {
                let span_end = tokens.get(limit).map_or(text.len(), |next| next.start);
                (&text[start..span_end], false)
            }
        };
        declarations.push(Declaration {
            name: name.clone(),
            body,
            terminated,
        });
    }

    declarations
}

/// Returns `(name, index of "(")` when a declaration head starts at `idx`.
fn match_declaration_head(tokens: &[Spanned], idx: usize) -> Option<(String, usize)> {
    let at = |i: usize| tokens.get(i).map(|spanned| &spanned.token);

    if !at(idx)?.is_keyword("create") {
        return None;
    }
    let mut i = idx + 1;
    if at(i).is_some_and(|t| {
        t.is_keyword("temp") || t.is_keyword("temporary") || t.is_keyword("unlogged")
    }) {
        i += 1;
    }
    if !at(i)?.is_keyword("table") {
        return None;
    }
    i += 1;

    if at(i)?.is_keyword("if")
        && at(i + 1).is_some_and(|t| t.is_keyword("not"))
        && at(i + 2).is_some_and(|t| t.is_keyword("exists"))
    {
        i += 3;
    }

    let mut name = at(i)?.ident()?.to_string();
    i += 1;
    while at(i) == Some(&Token::Dot) {
        name = at(i + 1)?.ident()?.to_string();
        i += 2;
    }

    if at(i)? != &Token::LParen {
        return None;
    }
    Some((name, i))
}
