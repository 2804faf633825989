//! Caller predicate handling
//!
//! Predicates arrive as SQL text. Before they are embedded in a join the
//! ambiguous column references get a table alias, and first/last selection
//! needs the predicate split into top-level conjuncts.
//!
//! ```text
//! t_rec > 10 AND camera = 1        -> T.t_rec > 10 AND T.camera = 1
//! a BETWEEN 1 AND 5 AND b = 2      -> ["a BETWEEN 1 AND 5", "b = 2"]
//! ```

use crate::error::{Error, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, one_of},
    combinator::{map, opt, recognize},
    sequence::{pair, tuple},
    IResult,
};

/// Lexical token with its source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Space(&'a str),
    /// Single-quoted string literal, quotes included
    Str(&'a str),
    /// Double-quoted identifier, quotes included
    QuotedIdent(&'a str),
    Number(&'a str),
    Ident(&'a str),
    Punct(&'a str),
}

impl<'a> Token<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Token::Space(s)
            | Token::Str(s)
            | Token::QuotedIdent(s)
            | Token::Number(s)
            | Token::Ident(s)
            | Token::Punct(s) => s,
        }
    }

    fn is_space(&self) -> bool {
        matches!(self, Token::Space(_))
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self, Token::Punct(s) if *s == p)
    }
}

/// Text delimited by `q`, where a doubled `q` is an escaped delimiter
fn quoted(q: char, input: &str) -> IResult<&str, &str> {
    let (mut rest, _) = char(q)(input)?;
    loop {
        let (r, _) = take_while(|c: char| c != q)(rest)?;
        let (r, _) = char(q)(r)?;
        match char::<&str, nom::error::Error<&str>>(q)(r) {
            Ok((r, _)) => rest = r,
            Err(_) => {
                let consumed = input.len() - r.len();
                return Ok((r, &input[..consumed]));
            }
        }
    }
}

fn string_literal(input: &str) -> IResult<&str, &str> {
    quoted('\'', input)
}

fn quoted_ident(input: &str) -> IResult<&str, &str> {
    quoted('"', input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        digit1,
        opt(pair(char('.'), take_while(|c: char| c.is_ascii_digit()))),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
    ))(input)
}

fn punct(input: &str) -> IResult<&str, &str> {
    alt((
        tag("<="),
        tag(">="),
        tag("<>"),
        tag("!="),
        tag("||"),
        tag("::"),
        recognize(one_of("()=<>+-*/%,.;:[]!|&~^")),
    ))(input)
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(multispace1, Token::Space),
        map(string_literal, Token::Str),
        map(quoted_ident, Token::QuotedIdent),
        map(number, Token::Number),
        map(identifier, Token::Ident),
        map(punct, Token::Punct),
    ))(input)
}

/// Split predicate text into tokens; whitespace is kept so text can be rebuilt
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        match token(rest) {
            Ok((remaining, tok)) => {
                tokens.push(tok);
                rest = remaining;
            }
            Err(_) => {
                return Err(Error::InvalidRequest(format!(
                    "Cannot tokenize predicate near '{}'",
                    rest.chars().take(20).collect::<String>()
                )))
            }
        }
    }
    Ok(tokens)
}

fn prev_significant<'a>(tokens: &[Token<'a>], i: usize) -> Option<Token<'a>> {
    tokens[..i].iter().rev().find(|t| !t.is_space()).copied()
}

fn next_significant<'a>(tokens: &[Token<'a>], i: usize) -> Option<Token<'a>> {
    tokens[i + 1..].iter().find(|t| !t.is_space()).copied()
}

fn is_listed(name: &str, columns: &[String]) -> bool {
    columns.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Prefix every bare reference to one of `columns` with `alias.`
///
/// Identifiers following `.` are already qualified; identifiers followed by
/// `(` are function calls.
pub fn qualify(predicate: &str, alias: &str, columns: &[String]) -> Result<String> {
    let tokens = tokenize(predicate)?;
    let mut out = String::new();
    out.try_reserve(predicate.len() + 16)?;

    for (i, tok) in tokens.iter().enumerate() {
        if let Token::Ident(name) = tok {
            let after_dot = prev_significant(&tokens, i).map_or(false, |t| t.is_punct("."));
            let before_call = next_significant(&tokens, i).map_or(false, |t| t.is_punct("("));
            let before_dot = next_significant(&tokens, i).map_or(false, |t| t.is_punct("."));
            if !after_dot && !before_call && !before_dot && is_listed(name, columns) {
                out.try_reserve(alias.len() + 1 + name.len())?;
                out.push_str(alias);
                out.push('.');
                out.push_str(&name.to_lowercase());
                continue;
            }
        }
        out.try_reserve(tok.text().len())?;
        out.push_str(tok.text());
    }
    Ok(out)
}

/// Columns from `columns` the predicate refers to, lower-cased, in order of first use
pub fn referenced_columns(predicate: &str, columns: &[String]) -> Result<Vec<String>> {
    let tokens = tokenize(predicate)?;
    let mut found: Vec<String> = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        if let Token::Ident(name) = tok {
            let before_call = next_significant(&tokens, i).map_or(false, |t| t.is_punct("("));
            let lower = name.to_lowercase();
            if !before_call && is_listed(name, columns) && !found.contains(&lower) {
                found.push(lower);
            }
        }
    }
    Ok(found)
}

/// Split a predicate into its top-level `AND` conjuncts
///
/// `BETWEEN x AND y` stays whole. A top-level `OR` makes the whole predicate
/// one conjunct.
pub fn split_conjuncts(predicate: &str) -> Result<Vec<String>> {
    let tokens = tokenize(predicate)?;
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut pending_between = 0u32;
    let mut disjunction = false;

    for tok in &tokens {
        if tok.is_punct("(") {
            depth += 1;
        } else if tok.is_punct(")") {
            depth -= 1;
            if depth < 0 {
                return Err(unbalanced(predicate));
            }
        } else if depth == 0 && !disjunction {
            if tok.is_keyword("or") {
                disjunction = true;
            } else if tok.is_keyword("between") {
                pending_between += 1;
            } else if tok.is_keyword("and") {
                if pending_between > 0 {
                    pending_between -= 1;
                } else {
                    let part = current.trim();
                    if !part.is_empty() {
                        parts.push(part.to_string());
                    }
                    current.clear();
                    continue;
                }
            }
        }
        current.try_reserve(tok.text().len())?;
        current.push_str(tok.text());
    }

    if depth != 0 {
        return Err(unbalanced(predicate));
    }
    if disjunction {
        let whole = predicate.trim();
        return Ok(if whole.is_empty() {
            Vec::new()
        } else {
            vec![whole.to_string()]
        });
    }

    let part = current.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
    Ok(parts)
}

fn unbalanced(predicate: &str) -> Error {
    Error::InvalidRequest(format!("Unbalanced parentheses in predicate '{}'", predicate))
}
