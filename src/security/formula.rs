//! Allow-list sanitizer for filter formulas and search text.
//!
//! A formula is tokenized and every token must be an allowed function or
//! operator, a field of the target table, or a literal. Checks that need no
//! schema (length, nesting, lexing, function names) run in [`prevalidate`]
//! so a bad expression is rejected before anything is fetched; field names
//! are checked afterwards in [`ParsedFormula::bind`]. The rendered output
//! re-quotes every string literal with its quotes escaped.

use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

pub const MAX_FORMULA_LENGTH: usize = 1000;
pub const MAX_NESTING_DEPTH: usize = 10;
pub const MAX_QUERY_LENGTH: usize = 500;

/// Formula functions that may appear in user-supplied expressions.
const ALLOWED_FUNCTIONS: &[&str] = &[
    // logical
    "AND", "OR", "NOT", "IF", "SWITCH", "XOR", "TRUE", "FALSE", "BLANK", "ISERROR",
    // text
    "FIND", "SEARCH", "LOWER", "UPPER", "TRIM", "LEN", "LEFT", "RIGHT", "MID",
    "CONCATENATE", "SUBSTITUTE", "REPLACE", "REPT", "T", "ENCODE_URL_COMPONENT",
    // numeric
    "ABS", "ROUND", "ROUNDUP", "ROUNDDOWN", "CEILING", "FLOOR", "INT", "MOD",
    "MIN", "MAX", "SUM", "AVERAGE", "COUNT", "COUNTA", "COUNTALL", "VALUE",
    // dates
    "TODAY", "NOW", "DATEADD", "DATETIME_DIFF", "DATETIME_FORMAT", "DATETIME_PARSE",
    "IS_BEFORE", "IS_AFTER", "IS_SAME", "YEAR", "MONTH", "DAY", "WEEKDAY",
    "CREATED_TIME", "LAST_MODIFIED_TIME",
    // records and arrays
    "RECORD_ID", "ARRAYJOIN", "ARRAYUNIQUE", "ARRAYCOMPACT",
];

const OPERATORS: &[&str] = &["!=", "<=", ">=", "=", "<", ">", "&", "+", "-", "*", "/"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("expression is {len} characters, the limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("unbalanced parentheses")]
    Unbalanced,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unterminated field reference")]
    UnterminatedField,

    #[error("function '{0}' is not allowed")]
    DisallowedFunction(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("control characters are not allowed")]
    ControlCharacter,

    #[error("invalid field name '{0}'")]
    InvalidFieldName(String),
}

/// Lexical unit of a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// String literal, unescaped content.
    Str(String),
    Number(String),
    Bool(bool),
    /// Function name (upper-cased), always followed by `(`.
    Function(String),
    /// `{Field Name}` reference.
    FieldRef(String),
    /// Bare identifier naming a field.
    BareField(String),
    Operator(&'static str),
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn render(&self) -> String {
        match self {
            Self::Str(s) => quote_literal(s),
            Self::Number(n) => n.clone(),
            Self::Bool(true) => "TRUE()".into(),
            Self::Bool(false) => "FALSE()".into(),
            Self::Function(name) => name.clone(),
            Self::FieldRef(name) | Self::BareField(name) => format!("{{{name}}}"),
            Self::Operator(op) => (*op).to_string(),
            Self::LParen => "(".into(),
            Self::RParen => ")".into(),
            Self::Comma => ",".into(),
        }
    }
}

fn is_allowed_function(name: &str) -> bool {
    ALLOWED_FUNCTIONS.contains(&name)
}

fn check_length(text: &str, max: usize) -> Result<(), SanitizeError> {
    let len = text.chars().count();
    if len > max {
        return Err(SanitizeError::TooLong { len, max });
    }
    if text.chars().any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r') {
        return Err(SanitizeError::ControlCharacter);
    }
    Ok(())
}

/// Split an expression into tokens.
pub fn tokenize(expr: &str) -> Result<Vec<Token>, SanitizeError> {
    check_length(expr, MAX_FORMULA_LENGTH)?;

    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' | '"' => {
                let (literal, next) = read_string(&chars, i)?;
                tokens.push(Token::Str(literal));
                i = next;
            }
            '{' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '}')
                    .ok_or(SanitizeError::UnterminatedField)?;
                let name: String = chars[i + 1..i + 1 + close].iter().collect();
                if name.trim().is_empty() || name.contains('{') {
                    return Err(SanitizeError::InvalidFieldName(name));
                }
                tokens.push(Token::FieldRef(name));
                i += close + 2;
            }
            c if c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || (chars[i] == '.' && !seen_dot))
                {
                    seen_dot |= chars[i] == '.';
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let mut peek = i;
                while peek < chars.len() && chars[peek].is_whitespace() {
                    peek += 1;
                }
                let upper = ident.to_ascii_uppercase();
                if chars.get(peek) == Some(&'(') {
                    tokens.push(Token::Function(upper));
                } else if upper == "TRUE" || upper == "FALSE" {
                    tokens.push(Token::Bool(upper == "TRUE"));
                } else {
                    tokens.push(Token::BareField(ident));
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            _ => {
                let op = OPERATORS.iter().find(|op| {
                    let op_chars: Vec<char> = op.chars().collect();
                    chars[i..].starts_with(&op_chars)
                });
                match op {
                    Some(op) => {
                        tokens.push(Token::Operator(*op));
                        i += op.len();
                    }
                    None => return Err(SanitizeError::UnexpectedChar(c, i)),
                }
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted literal starting at `start`; returns content and next index.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), SanitizeError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars.get(i + 1).ok_or(SanitizeError::UnterminatedString)?;
                out.push(*escaped);
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(SanitizeError::UnterminatedString)
}

/// A formula that passed every schema-independent check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFormula {
    tokens: Vec<Token>,
}

/// Tokenize and run the checks that need no table schema.
pub fn prevalidate(expr: &str) -> Result<ParsedFormula, SanitizeError> {
    let tokens = tokenize(expr)?;

    let mut depth = 0usize;
    for token in &tokens {
        match token {
            Token::Function(name) if !is_allowed_function(name) => {
                return Err(SanitizeError::DisallowedFunction(name.clone()));
            }
            Token::LParen => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(SanitizeError::TooDeep(MAX_NESTING_DEPTH));
                }
            }
            Token::RParen => {
                depth = depth.checked_sub(1).ok_or(SanitizeError::Unbalanced)?;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SanitizeError::Unbalanced);
    }

    Ok(ParsedFormula { tokens })
}

impl ParsedFormula {
    /// Field names the formula references.
    pub fn referenced_fields(&self) -> BTreeSet<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::FieldRef(name) | Token::BareField(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Check field references against the table's fields and render the
    /// canonical, escaped formula.
    pub fn bind(self, known_fields: &HashSet<&str>) -> Result<String, SanitizeError> {
        if let Some(unknown) = self
            .referenced_fields()
            .into_iter()
            .find(|name| !known_fields.contains(name))
        {
            return Err(SanitizeError::UnknownField(unknown.to_string()));
        }
        Ok(render(&self.tokens))
    }
}

fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for token in tokens {
        let glued = matches!(
            (prev, token),
            (None, _)
                | (Some(Token::LParen), _)
                | (_, Token::RParen)
                | (_, Token::Comma)
                | (Some(Token::Function(_)), Token::LParen)
        );
        if !glued {
            out.push(' ');
        }
        out.push_str(&token.render());
        prev = Some(token);
    }
    out
}

/// Full validation of a user-supplied filter formula.
pub fn validate_filter_formula(
    expr: &str,
    known_fields: &HashSet<&str>,
) -> Result<String, SanitizeError> {
    prevalidate(expr)?.bind(known_fields)
}

/// Quote text as a formula string literal, escaping backslashes and quotes.
pub fn quote_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `{name}` reference for a field name.
pub fn field_ref(name: &str) -> Result<String, SanitizeError> {
    if name.trim().is_empty() || name.contains(['{', '}']) || name.chars().any(char::is_control) {
        return Err(SanitizeError::InvalidFieldName(name.to_string()));
    }
    Ok(format!("{{{name}}}"))
}

/// Screen free search text before it is embedded as a literal.
///
/// Anything shaped like a call to a function outside the allow-list is
/// rejected outright; the rest is escaped by [`quote_literal`].
pub fn screen_search_query(query: &str) -> Result<String, SanitizeError> {
    check_length(query, MAX_QUERY_LENGTH)?;

    let chars: Vec<char> = query.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_alphabetic() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let mut peek = i;
            while peek < chars.len() && chars[peek].is_whitespace() {
                peek += 1;
            }
            if chars.get(peek) == Some(&'(') {
                let name: String = chars[start..i].iter().collect::<String>().to_ascii_uppercase();
                if !is_allowed_function(&name) {
                    return Err(SanitizeError::DisallowedFunction(name));
                }
            }
        } else {
            i += 1;
        }
    }

    Ok(query.trim().to_string())
}

/// Case-insensitive substring search across `fields`.
pub fn build_search_formula(query: &str, fields: &[&str]) -> Result<String, SanitizeError> {
    let needle = quote_literal(&query.to_lowercase());
    let conditions = fields
        .iter()
        .map(|f| Ok(format!("FIND({needle}, LOWER({})) > 0", field_ref(f)?)))
        .collect::<Result<Vec<_>, SanitizeError>>()?;

    Ok(match conditions.len() {
        0 => "FALSE()".to_string(),
        1 => conditions.into_iter().next().unwrap_or_default(),
        _ => format!("OR({})", conditions.join(", ")),
    })
}
