//! Allow-list validation for generated SQL
//!
//! Textual checks only, no SQL parser. Anything ambiguous is rejected.
//! Order of checks:
//! SELECT prefix → comments → separators → forbidden words → tables → LIMIT

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::tokenizer::{self, Token, TokenKind, TokenizeError};

pub const DEFAULT_MAX_ROWS: u32 = 1000;

/// Mutating verbs plus server-side functions that read outside the table.
pub const DEFAULT_FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "INSERT", "UPDATE", "ALTER", "CREATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE", "COPY", "MERGE", "CALL", "VACUUM", "INTO",
    "PG_READ_FILE", "PG_READ_BINARY_FILE", "PG_LS_DIR", "LO_IMPORT", "LO_EXPORT",
    "DBLINK", "QUERY_TO_XML", "PG_SLEEP",
];

/// Words that introduce a FROM argument inside a function call rather than
/// a table reference, e.g. `EXTRACT(YEAR FROM created_at)`.
const FROM_IN_FUNCTIONS: &[&str] = &["extract", "substring", "trim", "overlay", "position"];

/// Words that end a FROM list.
const FROM_TERMINATORS: &[&str] = &[
    "where", "group", "order", "limit", "offset", "union", "intersect", "except", "having",
    "window", "fetch", "for",
];

/// Words that may follow a table reference and are never an alias.
const NOT_ALIAS: &[&str] = &[
    "join", "inner", "left", "right", "full", "cross", "natural", "on", "using", "tablesample",
    "from",
];

//
// ================= Allow-list =================
//

/// Per-table validation rules. Built once at agent start-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowList {
    pub table: String,
    pub forbidden_keywords: Vec<String>,
    pub max_rows: u32,
}

impl AllowList {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            forbidden_keywords: DEFAULT_FORBIDDEN_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_forbidden_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

//
// ================= Outcome =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NotASelect,
    StatementSeparator,
    DisallowedTable,
    ForbiddenKeyword,
    Comment,
    UnboundedLimit,
    UnterminatedLiteral,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::NotASelect => "not_a_select",
            RejectionReason::StatementSeparator => "statement_separator",
            RejectionReason::DisallowedTable => "disallowed_table",
            RejectionReason::ForbiddenKeyword => "forbidden_keyword",
            RejectionReason::Comment => "comment",
            RejectionReason::UnboundedLimit => "unbounded_limit",
            RejectionReason::UnterminatedLiteral => "unterminated_literal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.reason.code(), self.message)
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LimitAction {
    Appended,
    Unchanged,
    Clamped,
    Parameterized,
}

/// SQL that passed every check, with the row cap applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatedSql {
    pub sql: String,
    pub limit_action: LimitAction,
}

pub type ValidationResult = std::result::Result<ValidatedSql, Rejection>;

//
// ================= Validator =================
//

pub struct SqlValidator {
    allow_list: AllowList,
    forbidden: HashSet<String>,
    allowed_names: [String; 2],
}

impl SqlValidator {
    pub fn new(allow_list: AllowList) -> Self {
        let forbidden = allow_list
            .forbidden_keywords
            .iter()
            .map(|k| k.to_uppercase())
            .collect();
        let table = allow_list.table.to_lowercase();
        let allowed_names = [format!("public.{}", table), table];

        Self {
            allow_list,
            forbidden,
            allowed_names,
        }
    }

    pub fn validate(&self, sql: &str) -> ValidationResult {
        check_select_prefix(sql)?;
        check_comments(sql)?;
        let body = check_separators(sql)?;
        self.check_forbidden_keywords(sql)?;

        let tokens = tokenizer::tokenize(body).map_err(|e| match e {
            TokenizeError::UnterminatedQuote(at) => Rejection::new(
                RejectionReason::UnterminatedLiteral,
                format!("quote opened at byte {} is never closed", at),
            ),
            TokenizeError::StrayDollar(at) => Rejection::new(
                RejectionReason::UnterminatedLiteral,
                format!("'$' at byte {} is not a placeholder; dollar quoting is not supported", at),
            ),
        })?;

        self.check_tables(&tokens)?;
        apply_row_cap(body, &tokens, self.allow_list.max_rows)
    }

    fn check_forbidden_keywords(&self, sql: &str) -> Result<(), Rejection> {
        match tokenizer::words(sql).find(|w| self.forbidden.contains(&w.to_uppercase())) {
            Some(word) => Err(Rejection::new(
                RejectionReason::ForbiddenKeyword,
                format!("keyword {} is not allowed", word.to_uppercase()),
            )),
            None => Ok(()),
        }
    }

    fn check_tables(&self, tokens: &[Token<'_>]) -> Result<(), Rejection> {
        for name in table_references(tokens)? {
            if !self.allowed_names.iter().any(|allowed| *allowed == name) {
                return Err(Rejection::new(
                    RejectionReason::DisallowedTable,
                    format!(
                        "table '{}' is not allowed; only '{}' may be queried",
                        name, self.allow_list.table
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Validate one statement against a single-table allow-list.
pub fn validate(
    statement_text: &str,
    allowed_table: &str,
    forbidden_keywords: &[&str],
    max_rows: u32,
) -> ValidationResult {
    let allow_list = AllowList::new(allowed_table)
        .with_forbidden_keywords(forbidden_keywords.iter().copied())
        .with_max_rows(max_rows);
    SqlValidator::new(allow_list).validate(statement_text)
}

fn check_select_prefix(sql: &str) -> Result<(), Rejection> {
    let trimmed = sql.trim_start();
    let end = trimmed
        .find(|c: char| !tokenizer::is_word_char(c))
        .unwrap_or(trimmed.len());

    if trimmed[..end].eq_ignore_ascii_case("select") {
        Ok(())
    } else if trimmed.is_empty() {
        Err(Rejection::new(RejectionReason::NotASelect, "statement is empty"))
    } else {
        Err(Rejection::new(
            RejectionReason::NotASelect,
            "only SELECT statements are allowed",
        ))
    }
}

fn check_comments(sql: &str) -> Result<(), Rejection> {
    match ["--", "/*", "*/"].iter().find(|marker| sql.contains(*marker)) {
        Some(marker) => Err(Rejection::new(
            RejectionReason::Comment,
            format!("SQL comment marker '{}' is not allowed", marker),
        )),
        None => Ok(()),
    }
}

/// Returns the statement with one optional trailing `;` removed.
fn check_separators(sql: &str) -> Result<&str, Rejection> {
    let trimmed = sql.trim();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    if body.contains(';') {
        Err(Rejection::new(
            RejectionReason::StatementSeparator,
            "multiple statements are not allowed",
        ))
    } else {
        Ok(body)
    }
}

/// Names referenced by FROM, JOIN and TABLE, lowercased unless quoted.
/// A FROM clause that does not read as a list of known item shapes is
/// rejected outright.
fn table_references(tokens: &[Token<'_>]) -> Result<Vec<String>, Rejection> {
    let mut names = Vec::new();
    let mut function_depths: Vec<u32> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if token.is_punct(')') {
            while function_depths.last().map_or(false, |&d| d > token.depth) {
                function_depths.pop();
            }
            continue;
        }

        if FROM_IN_FUNCTIONS.iter().any(|f| token.is_word(f))
            && tokens.get(i + 1).map_or(false, |t| t.is_punct('('))
        {
            function_depths.push(token.depth + 1);
            continue;
        }

        if token.is_word("from") {
            let inside_function = function_depths.last() == Some(&token.depth);
            if !inside_function && !is_distinct_from(tokens, i) {
                read_from_list(tokens, i + 1, &mut names)?;
            }
        } else if token.is_word("table") {
            read_relation(tokens, i + 1, &mut names)?;
        }
    }

    Ok(names)
}

/// `a IS [NOT] DISTINCT FROM b`
fn is_distinct_from(tokens: &[Token<'_>], i: usize) -> bool {
    i >= 2
        && tokens[i - 1].is_word("distinct")
        && (tokens[i - 2].is_word("is") || tokens[i - 2].is_word("not"))
}

/// Reads a FROM list starting at `j` and returns the index of the token
/// that ends it: end of input, `)` or a clause keyword.
fn read_from_list(
    tokens: &[Token<'_>],
    mut j: usize,
    names: &mut Vec<String>,
) -> Result<usize, Rejection> {
    loop {
        j = read_from_item(tokens, j, names)?;

        match tokens.get(j) {
            None => return Ok(j),
            Some(t) if t.is_punct(',') => j += 1,
            Some(t) if t.is_punct(')') || is_one_of(t, FROM_TERMINATORS) => return Ok(j),
            Some(t) => return Err(unexpected(t)),
        }
    }
}

/// One FROM item with any joins chained onto it.
fn read_from_item(
    tokens: &[Token<'_>],
    j: usize,
    names: &mut Vec<String>,
) -> Result<usize, Rejection> {
    let level = tokens.get(j).map_or(0, |t| t.depth);
    let mut j = read_primary(tokens, j, names)?;

    while let Some(next) = join_prefix(tokens, j) {
        j = read_primary(tokens, next, names)?;

        match tokens.get(j) {
            Some(t) if t.is_word("on") => j = skip_join_condition(tokens, j + 1, level),
            Some(t) if t.is_word("using") => match tokens.get(j + 1) {
                Some(open) if open.is_punct('(') => j = skip_group(tokens, j + 1),
                Some(other) => return Err(unexpected(other)),
                None => return Err(missing("USING without columns")),
            },
            _ => {}
        }
    }

    Ok(j)
}

/// Table, derived table, function call or parenthesized join, followed by
/// its alias and sampling clause. Returns the index just past it.
fn read_primary(
    tokens: &[Token<'_>],
    mut j: usize,
    names: &mut Vec<String>,
) -> Result<usize, Rejection> {
    while tokens
        .get(j)
        .map_or(false, |t| t.is_word("only") || t.is_word("lateral"))
    {
        j += 1;
    }

    let Some(first) = tokens.get(j) else {
        return Err(missing("FROM or JOIN without a table"));
    };

    if first.is_punct('(') {
        let derived = tokens
            .get(j + 1)
            .map_or(false, |t| is_one_of(t, &["select", "values", "with"]));

        if derived {
            // Its own FROM clauses are visited by the caller.
            j = skip_group(tokens, j);
        } else {
            let close = read_from_list(tokens, j + 1, names)?;
            match tokens.get(close) {
                Some(t) if t.is_punct(')') => j = close + 1,
                Some(t) => return Err(unexpected(t)),
                None => return Err(missing("unclosed parenthesis in FROM")),
            }
        }
    } else if first.is_identifier() {
        j = read_relation(tokens, j, names)?;

        if tokens.get(j).map_or(false, |t| t.is_punct('*')) {
            j += 1;
        } else if tokens.get(j).map_or(false, |t| t.is_punct('(')) {
            // Set-returning function in FROM, e.g. generate_series(...)
            j = skip_group(tokens, j);
        }
    } else {
        return Err(unexpected(first));
    }

    j = read_alias(tokens, j)?;

    if tokens.get(j).map_or(false, |t| t.is_word("tablesample")) {
        j = read_tablesample(tokens, j + 1)?;
    }

    Ok(j)
}

/// Possibly schema-qualified name at `j`; records it and returns the index
/// just past it.
fn read_relation(
    tokens: &[Token<'_>],
    mut j: usize,
    names: &mut Vec<String>,
) -> Result<usize, Rejection> {
    let first = match tokens.get(j) {
        Some(t) if t.is_identifier() => t,
        Some(t) => return Err(unexpected(t)),
        None => return Err(missing("missing table name")),
    };

    let mut parts = vec![first.identifier_name()];
    j += 1;
    while tokens.get(j).map_or(false, |t| t.is_punct('.'))
        && tokens.get(j + 1).map_or(false, Token::is_identifier)
    {
        parts.push(tokens[j + 1].identifier_name());
        j += 2;
    }
    names.push(parts.join("."));

    Ok(j)
}

/// Optional `[AS] alias [(columns)]`.
fn read_alias(tokens: &[Token<'_>], mut j: usize) -> Result<usize, Rejection> {
    let explicit = tokens.get(j).map_or(false, |t| t.is_word("as"));
    if explicit {
        j += 1;
    }

    match tokens.get(j) {
        Some(t) if is_alias(t) => {
            j += 1;
            if tokens.get(j).map_or(false, |t| t.is_punct('(')) {
                j = skip_group(tokens, j);
            }
            Ok(j)
        }
        Some(t) if explicit => Err(unexpected(t)),
        None if explicit => Err(missing("AS without an alias")),
        _ => Ok(j),
    }
}

/// `method (args) [REPEATABLE (seed)]`, starting just after TABLESAMPLE.
fn read_tablesample(tokens: &[Token<'_>], j: usize) -> Result<usize, Rejection> {
    let Some(method) = tokens.get(j) else {
        return Err(missing("TABLESAMPLE without a method"));
    };
    if !method.is_identifier() || !tokens.get(j + 1).map_or(false, |t| t.is_punct('(')) {
        return Err(unexpected(method));
    }

    let mut j = skip_group(tokens, j + 1);
    if tokens.get(j).map_or(false, |t| t.is_word("repeatable"))
        && tokens.get(j + 1).map_or(false, |t| t.is_punct('('))
    {
        j = skip_group(tokens, j + 1);
    }

    Ok(j)
}

/// `[NATURAL] [INNER | CROSS | {LEFT | RIGHT | FULL} [OUTER]] JOIN` at `j`.
/// Returns the index just past JOIN.
fn join_prefix(tokens: &[Token<'_>], mut j: usize) -> Option<usize> {
    let is = |at: usize, word: &str| tokens.get(at).map_or(false, |t| t.is_word(word));

    if is(j, "natural") {
        j += 1;
    }
    if is(j, "inner") || is(j, "cross") {
        j += 1;
    } else if is(j, "left") || is(j, "right") || is(j, "full") {
        j += 1;
        if is(j, "outer") {
            j += 1;
        }
    }

    is(j, "join").then_some(j + 1)
}

/// Index of the first token after an ON condition: the next `,`, join or
/// clause keyword at `level`, or the `)` closing the enclosing group.
fn skip_join_condition(tokens: &[Token<'_>], mut j: usize, level: u32) -> usize {
    while let Some(t) = tokens.get(j) {
        if t.depth < level {
            break;
        }
        if t.depth == level
            && (t.is_punct(',') || is_one_of(t, FROM_TERMINATORS) || join_prefix(tokens, j).is_some())
        {
            break;
        }
        j += 1;
    }
    j
}

fn is_one_of(token: &Token<'_>, words: &[&str]) -> bool {
    token.kind == TokenKind::Word && words.iter().any(|w| token.is_word(w))
}

fn is_alias(token: &Token<'_>) -> bool {
    token.is_identifier() && !is_one_of(token, FROM_TERMINATORS) && !is_one_of(token, NOT_ALIAS)
}

fn unexpected(token: &Token<'_>) -> Rejection {
    Rejection::new(
        RejectionReason::DisallowedTable,
        format!("cannot read a table reference at '{}'", token.text),
    )
}

fn missing(what: &str) -> Rejection {
    Rejection::new(RejectionReason::DisallowedTable, what)
}

/// Index just past the `)` matching the `(` at `open`.
fn skip_group(tokens: &[Token<'_>], open: usize) -> usize {
    let depth = tokens[open].depth;
    tokens[open + 1..]
        .iter()
        .position(|t| t.is_punct(')') && t.depth == depth)
        .map(|offset| open + 1 + offset + 1)
        .unwrap_or(tokens.len())
}

/// Enforce the row cap on the top-level query. Never raises a limit.
fn apply_row_cap(body: &str, tokens: &[Token<'_>], max_rows: u32) -> ValidationResult {
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut action = None;

    for (i, token) in tokens.iter().enumerate() {
        if token.depth != 0 {
            continue;
        }

        if token.is_word("fetch") {
            return Err(Rejection::new(
                RejectionReason::UnboundedLimit,
                "FETCH is not supported; use LIMIT",
            ));
        }

        if !token.is_word("limit") {
            continue;
        }

        let Some(arg) = tokens.get(i + 1) else {
            return Err(Rejection::new(
                RejectionReason::UnboundedLimit,
                "LIMIT without a row count",
            ));
        };

        let step = match arg.kind {
            TokenKind::Number if arg.text.bytes().all(|b| b.is_ascii_digit()) => {
                // Digits that overflow u64 are certainly above the cap.
                match arg.text.parse::<u64>() {
                    Ok(k) if k <= u64::from(max_rows) => LimitAction::Unchanged,
                    _ => {
                        edits.push((arg.start, arg.end, max_rows.to_string()));
                        LimitAction::Clamped
                    }
                }
            }
            TokenKind::Word if arg.is_word("all") => {
                edits.push((arg.start, arg.end, max_rows.to_string()));
                LimitAction::Clamped
            }
            TokenKind::Placeholder => {
                edits.push((
                    arg.start,
                    arg.end,
                    format!("LEAST({}, {})", arg.text, max_rows),
                ));
                LimitAction::Parameterized
            }
            _ => {
                return Err(Rejection::new(
                    RejectionReason::UnboundedLimit,
                    format!("LIMIT {} is not a row count", arg.text),
                ))
            }
        };

        // Report the strongest rewrite when several limits appear.
        action = Some(match (action, step) {
            (Some(LimitAction::Clamped), _) => LimitAction::Clamped,
            (Some(LimitAction::Parameterized), LimitAction::Unchanged) => {
                LimitAction::Parameterized
            }
            (_, step) => step,
        });
    }

    let Some(limit_action) = action else {
        return Ok(ValidatedSql {
            sql: format!("{} LIMIT {}", body, max_rows),
            limit_action: LimitAction::Appended,
        });
    };

    let mut sql = body.to_string();
    for (start, end, replacement) in edits.into_iter().rev() {
        sql.replace_range(start..end, &replacement);
    }

    Ok(ValidatedSql { sql, limit_action })
}

//
// ================= Tests =================
//
