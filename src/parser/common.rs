use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{map, map_res, opt, recognize, verify},
    error::{Error, ErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// A keyword that must not run on into an identifier (`ORDER` does not match `ORDERS`).
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag_no_case(kw)(input)?;
        if rest.chars().next().is_some_and(is_word_char) {
            return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
        }
        Ok((rest, matched))
    }
}

/// A space-separated keyword sequence (`"ORDER BY"`), any whitespace between words.
pub fn keywords<'a>(words: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, ()> {
    move |mut input: &'a str| {
        for (i, word) in words.split(' ').enumerate() {
            if i > 0 {
                input = multispace0(input)?.0;
            }
            let (rest, _) = tag_no_case(word)(input)?;
            if rest.chars().next().is_some_and(is_word_char) {
                return Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)));
            }
            input = rest;
        }
        Ok((input, ()))
    }
}

/// Words that never act as a bare identifier or an implicit alias.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN", "INNER",
    "LEFT", "RIGHT", "CROSS", "OUTER", "NATURAL", "STRAIGHT_JOIN", "ON", "USING", "AND", "OR",
    "NOT", "AS", "SET", "VALUES", "VALUE", "INTO", "UNION", "LIKE", "IN", "IS", "BETWEEN", "ASC",
    "DESC", "CASE", "WHEN", "THEN", "ELSE", "END", "DIV", "MOD", "SEPARATOR", "FOR", "LOCK",
    "NULL", "TRUE", "FALSE", "DISTINCT", "BY", "WITH", "INTERVAL",
];

#[must_use]
pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

fn bare_word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(is_word_char),
    ))(input)
}

/// `` `quoted` `` identifier; doubled backticks stand for one.
fn quoted_identifier(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('`'),
            many0(alt((map(tag("``"), |_| "`"), is_not("`")))),
            char('`'),
        ),
        |parts: Vec<&str>| parts.concat(),
    )(input)
}

/// Any identifier, reserved words included (table names after FROM, column lists).
pub fn identifier(input: &str) -> IResult<&str, String> {
    alt((quoted_identifier, map(bare_word, str::to_string)))(input)
}

/// Identifier that is not a reserved word unless quoted.
pub fn plain_identifier(input: &str) -> IResult<&str, String> {
    alt((
        quoted_identifier,
        map(verify(bare_word, |w: &str| !is_reserved(w)), str::to_string),
    ))(input)
}

/// `name` or `qualifier.name`, returned as (qualifier, name).
pub fn qualified_name(input: &str) -> IResult<&str, (Option<String>, String)> {
    let (input, first) = plain_identifier(input)?;
    let (input, second) = opt(preceded(char('.'), identifier))(input)?;
    Ok(match second {
        Some(name) => (input, (Some(first), name)),
        None => (input, (None, first)),
    })
}

/// Table name, optionally `schema.table` (the schema part is dropped).
pub fn table_name(input: &str) -> IResult<&str, String> {
    let (input, first) = identifier(input)?;
    let (input, second) = opt(preceded(char('.'), identifier))(input)?;
    Ok((input, second.unwrap_or(first)))
}

/// `AS alias` or a bare non-reserved alias.
pub fn alias(input: &str) -> IResult<&str, String> {
    alt((
        preceded(ws(keyword("AS")), ws(alt((plain_identifier, string_body)))),
        ws(plain_identifier),
    ))(input)
}

fn quoted_raw(quote: char) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input: &str| {
        let mut chars = input.char_indices();
        match chars.next() {
            Some((_, c)) if c == quote => {}
            _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
        }
        let mut escaped = false;
        while let Some((i, c)) = chars.next() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                // doubled quote is an escaped quote
                if input[i + 1..].starts_with(quote) {
                    chars.next();
                    continue;
                }
                return Ok((&input[i + 1..], &input[..=i]));
            }
        }
        Err(nom::Err::Error(Error::new(input, ErrorKind::Char)))
    }
}

/// A quoted string literal, returned raw with its quotes.
pub fn string_literal_raw(input: &str) -> IResult<&str, &str> {
    alt((quoted_raw('\''), quoted_raw('"')))(input)
}

/// A quoted string literal, decoded.
pub fn string_body(input: &str) -> IResult<&str, String> {
    map(string_literal_raw, unescape_quoted)(input)
}

/// Decodes a raw quoted literal: strips the quotes and resolves `\n \r \t \0 \\ \' \"`
/// and doubled quotes. `\%` and `\_` stay as written.
#[must_use]
pub fn unescape_quoted(raw: &str) -> String {
    let Some(quote) = raw.chars().next() else {
        return String::new();
    };
    let inner = &raw[quote.len_utf8()..];
    let body = inner.strip_suffix(quote).unwrap_or(inner);
    let mut out = String::with_capacity(body.len());
    let mut iter = body.chars().peekable();
    while let Some(c) = iter.next() {
        if c == '\\' {
            match iter.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('0') => out.push('\0'),
                Some('Z') => out.push('\u{1a}'),
                // kept escaped for LIKE patterns
                Some(wild @ ('%' | '_')) => {
                    out.push('\\');
                    out.push(wild);
                }
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else if c == quote && iter.peek() == Some(&quote) {
            iter.next();
            out.push(quote);
        } else {
            out.push(c);
        }
    }
    out
}

/// Unsigned numeric literal (`12`, `1.5`, `.5`, `1e3`), raw.
pub fn number_raw(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        alt((
            recognize(tuple((digit1, opt(pair(char('.'), take_while(|c: char| c.is_ascii_digit())))))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((
            alt((char('e'), char('E'))),
            opt(alt((char('+'), char('-')))),
            digit1,
        ))),
    )))(input)
}

/// `X'..'` or `0x..` blob literal, raw.
pub fn hex_raw(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((
            alt((char('x'), char('X'))),
            char('\''),
            take_while(|c: char| c.is_ascii_hexdigit()),
            char('\''),
        ))),
        recognize(pair(tag("0x"), take_while1(|c: char| c.is_ascii_hexdigit()))),
    ))(input)
}

pub fn unsigned(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse::<usize>)(input)
}

/// `(a, b, c)` list of identifiers, each optionally followed by a prefix length `(10)`
/// and ASC/DESC, as found in key definitions.
pub fn column_list(input: &str) -> IResult<&str, Vec<String>> {
    delimited(
        ws(char('(')),
        separated_list1(
            ws(char(',')),
            map(
                tuple((
                    ws(identifier),
                    opt(delimited(ws(char('(')), unsigned, ws(char(')')))),
                    opt(ws(alt((keyword("ASC"), keyword("DESC"))))),
                )),
                |(name, _, _)| name,
            ),
        ),
        ws(char(')')),
    )(input)
}
