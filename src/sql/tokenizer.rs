//! Conservative SQL tokenizer
//!
//! Just enough lexing to find FROM/JOIN targets and top-level LIMIT clauses:
//! string literals and quoted identifiers are kept whole, every token records
//! its byte span and parenthesis depth. Anything it cannot make sense of is
//! left for the validator to reject.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword
    Word,
    /// `"double quoted"` identifier
    QuotedIdent,
    /// `'single quoted'` or `E'escaped'` literal
    StringLit,
    Number,
    /// `$1`, `$2`, ...
    Placeholder,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    /// Parenthesis nesting level. `(` and `)` carry the level outside them.
    pub depth: u32,
}

impl<'a> Token<'a> {
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(c)
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }

    /// Identifier as the database would resolve it: unquoted names fold
    /// to lowercase, quoted names are taken verbatim.
    pub fn identifier_name(&self) -> String {
        match self.kind {
            TokenKind::QuotedIdent => self.text[1..self.text.len() - 1].replace("\"\"", "\""),
            _ => self.text.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    /// A quote was opened and never closed. Carries its byte offset.
    UnterminatedQuote(usize),
    /// A `$` that does not start a `$n` placeholder, e.g. a dollar quote.
    StrayDollar(usize),
}

pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split `sql` into tokens.
pub fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, TokenizeError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut depth: u32 = 0;
    let mut chars = sql.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let (kind, end) = match c {
            '\'' | '"' => {
                let end = scan_quoted(bytes, start, c as u8)
                    .ok_or(TokenizeError::UnterminatedQuote(start))?;
                let kind = if c == '\'' {
                    TokenKind::StringLit
                } else {
                    TokenKind::QuotedIdent
                };
                (kind, end)
            }
            'e' | 'E' if bytes.get(start + 1) == Some(&b'\'') => {
                let end = scan_escaped(bytes, start + 1)
                    .ok_or(TokenizeError::UnterminatedQuote(start))?;
                (TokenKind::StringLit, end)
            }
            '$' if bytes.get(start + 1).map_or(false, u8::is_ascii_digit) => {
                let end = scan_while(sql, start + 1, |c| c.is_ascii_digit());
                (TokenKind::Placeholder, end)
            }
            '$' => return Err(TokenizeError::StrayDollar(start)),
            c if c.is_ascii_digit() => {
                let end = scan_while(sql, start, |c| c.is_ascii_digit() || c == '.');
                (TokenKind::Number, end)
            }
            c if is_word_char(c) => {
                let end = scan_while(sql, start, is_word_char);
                (TokenKind::Word, end)
            }
            c => (TokenKind::Punct, start + c.len_utf8()),
        };

        let token_depth = if kind == TokenKind::Punct && c == ')' {
            depth = depth.saturating_sub(1);
            depth
        } else {
            depth
        };

        tokens.push(Token {
            kind,
            text: &sql[start..end],
            start,
            end,
            depth: token_depth,
        });

        if kind == TokenKind::Punct && c == '(' {
            depth += 1;
        }

        while chars.peek().map_or(false, |&(i, _)| i < end) {
            chars.next();
        }
    }

    Ok(tokens)
}

/// Returns the byte offset just past the closing quote. A doubled quote is
/// an escaped quote, not a terminator.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Like `scan_quoted` for `E'...'` literals, where a backslash escapes the
/// next byte. `start` is the offset of the opening quote.
fn scan_escaped(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn scan_while(sql: &str, from: usize, pred: impl Fn(char) -> bool) -> usize {
    sql[from..]
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map(|(i, _)| from + i)
        .unwrap_or(sql.len())
}

/// Bare words of `text`, split on anything that cannot be part of an
/// identifier. Quoting is ignored on purpose: keywords hidden in literals
/// still count.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_word_char(c)).filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<(TokenKind, &str, u32)> {
        tokenize(sql)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text, t.depth))
            .collect()
    }

    #[test]
    fn test_literals_are_single_tokens() {
        let tokens = kinds("SELECT 'from orders' FROM customers");
        assert_eq!(tokens[1], (TokenKind::StringLit, "'from orders'", 0));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_escaped_quotes() {
        let tokens = kinds("SELECT 'it''s' , \"Odd\"\"Name\"");
        assert_eq!(tokens[1].1, "'it''s'");
        assert_eq!(tokens[3].0, TokenKind::QuotedIdent);

        let ident = tokenize("\"Odd\"\"Name\"").unwrap()[0].identifier_name();
        assert_eq!(ident, "Odd\"Name");
    }

    #[test]
    fn test_depth_tracking() {
        let tokens = kinds("SELECT (a) FROM t");
        assert_eq!(tokens[1], (TokenKind::Punct, "(", 0));
        assert_eq!(tokens[2], (TokenKind::Word, "a", 1));
        assert_eq!(tokens[3], (TokenKind::Punct, ")", 0));
        assert_eq!(tokens[4].2, 0);
    }

    #[test]
    fn test_placeholders_and_numbers() {
        let tokens = kinds("LIMIT $12 OFFSET 3.5");
        assert_eq!(tokens[1], (TokenKind::Placeholder, "$12", 0));
        assert_eq!(tokens[3], (TokenKind::Number, "3.5", 0));
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            tokenize("SELECT 'oops FROM x"),
            Err(TokenizeError::UnterminatedQuote(7))
        );
    }

    #[test]
    fn test_escape_string_backslash_quote() {
        let tokens = kinds(r"SELECT E'\'' AS a, o.* FROM orders o WHERE E'\'' <> 'x'");
        assert_eq!(tokens[1], (TokenKind::StringLit, r"E'\''", 0));
        assert!(tokens.iter().any(|t| t.1 == "orders"));
        assert_eq!(tokenize(r"SELECT e'abc\'"), Err(TokenizeError::UnterminatedQuote(7)));
    }

    #[test]
    fn test_dollar_outside_placeholder_is_an_error() {
        assert_eq!(
            tokenize("SELECT $$'$$ AS a FROM orders"),
            Err(TokenizeError::StrayDollar(7))
        );
        assert_eq!(tokenize("SELECT $tag$x$tag$"), Err(TokenizeError::StrayDollar(7)));
        assert_eq!(tokenize("SELECT a$b FROM t"), Err(TokenizeError::StrayDollar(8)));
    }

    #[test]
    fn test_non_ascii_words() {
        let tokens = kinds("SELECT café FROM t");
        assert_eq!(tokens[1], (TokenKind::Word, "café", 0));
    }

    #[test]
    fn test_words_split() {
        let found: Vec<_> = words("x;DROP(table)\nupdated_at").collect();
        assert_eq!(found, vec!["x", "DROP", "table", "updated_at"]);
    }
}
