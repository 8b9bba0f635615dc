use super::common::{
    hex_raw, identifier, keyword, number_raw, qualified_name, string_body, string_literal_raw, ws,
};
use super::statement::{BinaryOp, CompareOp, Condition, ConditionToken, Expr, Predicate};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, multispace0},
    combinator::{map, opt, peek, value},
    multi::{many0, many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// Zero-argument functions that may be written without parentheses.
const NILADIC: &[&str] = &["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME", "LOCALTIMESTAMP", "LOCALTIME"];

fn literal(input: &str) -> IResult<&str, Expr> {
    alt((
        map(hex_raw, |raw| Expr::Literal(raw.to_string())),
        map(number_raw, |raw| Expr::Literal(raw.to_string())),
        map(string_literal_raw, |raw| Expr::Literal(raw.to_string())),
        map(keyword("NULL"), |_| Expr::Literal("NULL".to_string())),
        map(keyword("TRUE"), |_| Expr::Literal("TRUE".to_string())),
        map(keyword("FALSE"), |_| Expr::Literal("FALSE".to_string())),
    ))(input)
}

fn variable(input: &str) -> IResult<&str, Expr> {
    let (input, _) = tag("@@")(input)?;
    let (input, _) = opt(terminated(
        alt((keyword("SESSION"), keyword("GLOBAL"), keyword("LOCAL"))),
        char('.'),
    ))(input)?;
    let (input, name) = identifier(input)?;
    Ok((input, Expr::Variable(name.to_ascii_lowercase())))
}

fn case_expr(input: &str) -> IResult<&str, Expr> {
    let (input, _) = keyword("CASE")(input)?;
    let (input, operand) = opt(ws(expr))(input)?;
    let (input, branches) = many1(tuple((
        preceded(ws(keyword("WHEN")), ws(value_expr)),
        preceded(ws(keyword("THEN")), ws(value_expr)),
    )))(input)?;
    let (input, else_result) = opt(preceded(ws(keyword("ELSE")), ws(value_expr)))(input)?;
    let (input, _) = ws(keyword("END"))(input)?;
    Ok((
        input,
        Expr::Case {
            operand: operand.map(Box::new),
            branches,
            else_result: else_result.map(Box::new),
        },
    ))
}

/// `CAST(x AS type)` / `CONVERT(x, type)`; the target type becomes a string argument.
fn cast_expr(input: &str) -> IResult<&str, Expr> {
    let (input, name) = alt((keyword("CAST"), keyword("CONVERT")))(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, arg) = ws(value_expr)(input)?;
    let (input, _) = alt((ws(keyword("AS")), ws(tag(","))))(input)?;
    let (input, target) = ws(identifier)(input)?;
    // SIGNED INTEGER, UNSIGNED INT
    let (input, _) = opt(ws(alt((keyword("INTEGER"), keyword("INT")))))(input)?;
    let (input, _) = opt(delimited(ws(char('(')), nom::bytes::complete::is_not(")"), char(')')))(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((
        input,
        Expr::Function {
            name: name.to_ascii_uppercase(),
            args: vec![arg, Expr::Literal(format!("'{}'", target.to_ascii_uppercase()))],
            distinct: false,
            separator: None,
        },
    ))
}

fn function_arg(input: &str) -> IResult<&str, Expr> {
    alt((value(Expr::Wildcard, ws(char('*'))), ws(value_expr)))(input)
}

fn function_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, _) = preceded(multispace0, char('('))(input)?;
    let (input, distinct) = opt(ws(keyword("DISTINCT")))(input)?;
    let (input, args) = separated_list0(ws(char(',')), function_arg)(input)?;
    let (input, separator) = opt(preceded(ws(keyword("SEPARATOR")), ws(string_body)))(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((
        input,
        Expr::Function {
            name: name.to_ascii_uppercase(),
            args,
            distinct: distinct.is_some(),
            separator,
        },
    ))
}

fn niladic(input: &str) -> IResult<&str, Expr> {
    let (rest, word) = identifier(input)?;
    let upper = word.to_ascii_uppercase();
    if NILADIC.contains(&upper.as_str()) {
        Ok((
            rest,
            Expr::Function {
                name: upper,
                args: Vec::new(),
                distinct: false,
                separator: None,
            },
        ))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
    }
}

fn column_ref(input: &str) -> IResult<&str, Expr> {
    map(qualified_name, |(table, name)| Expr::Column { table, name })(input)
}

fn parenthesized(input: &str) -> IResult<&str, Expr> {
    delimited(char('('), ws(value_expr), char(')'))(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        literal,
        variable,
        case_expr,
        cast_expr,
        parenthesized,
        function_call,
        niladic,
        column_ref,
    )))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |inner| match inner {
            Expr::Literal(raw) if raw.starts_with(|c: char| c.is_ascii_digit() || c == '.') => {
                Expr::Literal(format!("-{raw}"))
            }
            other => Expr::Negate(Box::new(other)),
        }),
        preceded(ws(char('+')), unary),
        primary,
    ))(input)
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |left, (op, right)| Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Multiply, char('*')),
            value(BinaryOp::Divide, char('/')),
            value(BinaryOp::Modulo, char('%')),
            value(BinaryOp::IntDivide, keyword("DIV")),
            value(BinaryOp::Modulo, keyword("MOD")),
        ))),
        unary,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

/// Arithmetic expression: `+ - * / % DIV MOD` over operands.
pub fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Subtract, char('-')),
        ))),
        term,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::NullSafeEq, tag("<=>")),
        value(CompareOp::LtEq, tag("<=")),
        value(CompareOp::GtEq, tag(">=")),
        value(CompareOp::NotEq, tag("<>")),
        value(CompareOp::NotEq, tag("!=")),
        value(CompareOp::Eq, tag("==")),
        value(CompareOp::Eq, tag("=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
    ))(input)
}

fn negation(input: &str) -> IResult<&str, bool> {
    map(opt(ws(keyword("NOT"))), |n| n.is_some())(input)
}

fn predicate(input: &str) -> IResult<&str, Predicate> {
    let (input, left) = ws(expr)(input)?;

    if let Ok((rest, negated)) = preceded(ws(keyword("IS")), negation)(input) {
        if let Ok((rest, _)) = ws(keyword("NULL"))(rest) {
            return Ok((rest, Predicate::IsNull { expr: left, negated }));
        }
    }

    if let Ok((rest, (negated, _, low, _, high))) = tuple((
        negation,
        ws(keyword("BETWEEN")),
        ws(expr),
        ws(keyword("AND")),
        ws(expr),
    ))(input)
    {
        return Ok((rest, Predicate::Between { expr: left, low, high, negated }));
    }

    if let Ok((rest, (negated, _, list))) = tuple((
        negation,
        ws(keyword("IN")),
        delimited(ws(char('(')), separated_list1(ws(char(',')), ws(expr)), ws(char(')'))),
    ))(input)
    {
        return Ok((rest, Predicate::InList { expr: left, list, negated }));
    }

    if let Ok((rest, (negated, _, pattern))) = tuple((negation, ws(keyword("LIKE")), ws(expr)))(input) {
        let (rest, _) = opt(preceded(ws(keyword("ESCAPE")), ws(string_literal_raw)))(rest)?;
        return Ok((rest, Predicate::Like { expr: left, pattern, negated }));
    }

    if let Ok((rest, (op, right))) = pair(ws(compare_op), ws(expr))(input) {
        return Ok((rest, Predicate::Compare { left, op, right }));
    }

    Ok((input, Predicate::Expr(left)))
}

fn operand(input: &str) -> IResult<&str, Vec<ConditionToken>> {
    let (input, nots) = many0(alt((
        ws(keyword("NOT")),
        ws(terminated(tag("!"), peek(nom::character::complete::none_of("=")))),
    )))(input)?;
    let (input, predicate) = predicate(input)?;
    let mut tokens: Vec<ConditionToken> = nots.iter().map(|_| ConditionToken::Not).collect();
    tokens.push(match predicate {
        Predicate::Expr(Expr::Condition(group)) => ConditionToken::Group(*group),
        other => ConditionToken::Predicate(other),
    });
    Ok((input, tokens))
}

fn logical_op(input: &str) -> IResult<&str, ConditionToken> {
    ws(alt((
        value(ConditionToken::And, keyword("AND")),
        value(ConditionToken::And, tag("&&")),
        value(ConditionToken::Or, keyword("OR")),
        value(ConditionToken::Or, tag("||")),
    )))(input)
}

/// A WHERE/HAVING/ON condition as a flat operand/operator token list.
pub fn condition(input: &str) -> IResult<&str, Condition> {
    let (mut input, mut tokens) = operand(input)?;
    while let Ok((rest, op)) = logical_op(input) {
        match operand(rest) {
            Ok((rest, more)) => {
                tokens.push(op);
                tokens.extend(more);
                input = rest;
            }
            Err(_) => break,
        }
    }
    Ok((input, Condition { tokens }))
}

/// A value that may itself be a condition (`a > 1`, `x IS NULL`).
pub fn value_expr(input: &str) -> IResult<&str, Expr> {
    map(condition, |mut condition| {
        if let [ConditionToken::Predicate(Predicate::Expr(_))] = condition.tokens.as_slice() {
            if let Some(ConditionToken::Predicate(Predicate::Expr(e))) = condition.tokens.pop() {
                return e;
            }
        }
        Expr::Condition(Box::new(condition))
    })(input)
}

/// Comma-separated value expressions.
pub fn value_list(input: &str) -> IResult<&str, Vec<Expr>> {
    separated_list1(ws(char(',')), ws(value_expr))(input)
}
