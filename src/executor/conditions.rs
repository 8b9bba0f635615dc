/// Expression and condition evaluation.
///
/// Conditions are flat operand/operator token lists. Operands reduce to
/// booleans first; `AND` and `OR` then fold strictly left to right with equal
/// precedence, so `a OR b AND c` means `(a OR b) AND c`.
use super::functions::SqlFunctions;
use super::session::Session;
use crate::core::value::leading_number;
use crate::core::{Row, Value};
use crate::parser::{
    unescape_quoted, BinaryOp, CompareOp, Condition, ConditionToken, Expr, Predicate, SelectItem,
};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Turns a raw literal token into a value: quoted text, integers, decimals,
/// `NULL`, `TRUE`/`FALSE` and hex blobs.
#[must_use]
pub fn decode_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.starts_with('\'') || raw.starts_with('"') {
        return Value::Text(unescape_quoted(raw));
    }
    match raw.to_ascii_uppercase().as_str() {
        "NULL" => return Value::Null,
        "TRUE" => return Value::Boolean(true),
        "FALSE" => return Value::Boolean(false),
        _ => {}
    }
    let hex_digits = raw
        .strip_prefix("0x")
        .or_else(|| {
            raw.strip_prefix("X'")
                .or_else(|| raw.strip_prefix("x'"))
                .and_then(|s| s.strip_suffix('\''))
        });
    if let Some(digits) = hex_digits {
        return hex::decode(digits).map_or_else(|_| Value::Text(raw.to_string()), Value::Bytes);
    }
    if !raw.contains(['.', 'e', 'E']) {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Integer(i);
        }
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Real(f),
        _ => Value::Text(raw.to_string()),
    }
}

/// Integer view used to keep integer arithmetic exact.
fn exact_int(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Boolean(b) => Some(i64::from(*b)),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric view for arithmetic; non-numeric text counts as its numeric prefix or 0.
fn arithmetic_operand(value: &Value) -> f64 {
    value
        .as_f64()
        .or_else(|| value.as_text().and_then(leading_number))
        .unwrap_or(0.0)
}

/// Applies an arithmetic operator. NULL in, NULL out; division by zero is NULL.
#[must_use]
pub fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    if let (Some(l), Some(r)) = (exact_int(left), exact_int(right)) {
        let exact = match op {
            BinaryOp::Add => l.checked_add(r),
            BinaryOp::Subtract => l.checked_sub(r),
            BinaryOp::Multiply => l.checked_mul(r),
            BinaryOp::IntDivide | BinaryOp::Modulo if r == 0 => return Value::Null,
            BinaryOp::IntDivide => l.checked_div(r),
            BinaryOp::Modulo => l.checked_rem(r),
            BinaryOp::Divide => None,
        };
        if let Some(result) = exact {
            return Value::Integer(result);
        }
    }
    let (l, r) = (arithmetic_operand(left), arithmetic_operand(right));
    match op {
        BinaryOp::Add => Value::Real(l + r),
        BinaryOp::Subtract => Value::Real(l - r),
        BinaryOp::Multiply => Value::Real(l * r),
        _ if r == 0.0 => Value::Null,
        BinaryOp::Divide => Value::Real(l / r),
        BinaryOp::IntDivide => Value::Integer((l / r).trunc() as i64),
        BinaryOp::Modulo => Value::Real(l % r),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    Any,
    One,
    Char(char),
}

fn compile_like(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            '\\' => LikeToken::Char(chars.next().unwrap_or('\\')),
            other => LikeToken::Char(other),
        });
    }
    tokens
}

/// Case-insensitive `LIKE`: `%` matches any run, `_` one character, `\` escapes.
#[must_use]
pub fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
    let pattern: Vec<LikeToken> = compile_like(pattern)
        .into_iter()
        .flat_map(|t| match t {
            LikeToken::Char(c) => c.to_lowercase().map(LikeToken::Char).collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect();

    // greedy match with backtracking to the last `%`
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(LikeToken::Any) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(LikeToken::One) => {
                t += 1;
                p += 1;
            }
            Some(LikeToken::Char(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|t| *t == LikeToken::Any)
}

/// Looks a column up in a row: the qualified key first (post-join rows carry
/// `alias.column` keys), then the bare name, then case-insensitively.
#[must_use]
pub fn resolve_column<'r>(row: &'r Row, table: Option<&str>, name: &str) -> Option<&'r Value> {
    if let Some(table) = table {
        let qualified = format!("{table}.{name}");
        if let Some(value) = row.get(&qualified).or_else(|| row.get_ignore_case(&qualified)) {
            return Some(value);
        }
    }
    row.get(name).or_else(|| row.get_ignore_case(name))
}

/// Evaluates expressions and conditions against one row.
pub struct ExpressionEvaluator<'a> {
    session: &'a Session,
    /// Select-list aliases (lowercased), consulted when a bare name is not a column.
    aliases: HashMap<String, &'a Expr>,
}

impl<'a> ExpressionEvaluator<'a> {
    #[must_use]
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            aliases: HashMap::new(),
        }
    }

    /// Makes `AS` names of the select list usable in HAVING and ORDER BY.
    #[must_use]
    pub fn with_aliases(mut self, items: &'a [SelectItem]) -> Self {
        for item in items {
            if let SelectItem::Expr { expr, alias: Some(alias) } = item {
                self.aliases.insert(alias.to_ascii_lowercase(), expr);
            }
        }
        self
    }

    #[must_use]
    pub const fn session(&self) -> &'a Session {
        self.session
    }

    pub fn evaluate_value(&self, expr: &Expr, row: &Row) -> Value {
        match expr {
            Expr::Literal(raw) => decode_literal(raw),
            Expr::Column { table, name } => {
                if let Some(value) = resolve_column(row, table.as_deref(), name) {
                    return value.clone();
                }
                match (table, self.aliases.get(&name.to_ascii_lowercase())) {
                    // alias bodies are evaluated without aliases so `x AS x` cannot recurse
                    (None, Some(aliased)) => ExpressionEvaluator::new(self.session).evaluate_value(aliased, row),
                    _ => Value::Null,
                }
            }
            Expr::Wildcard => Value::Null,
            Expr::Function { name, args, .. } => {
                if expr.is_aggregate() {
                    // grouped rows carry their aggregate results under the call's text
                    return row.get(&expr.to_string()).cloned().unwrap_or(Value::Null);
                }
                let values: Vec<Value> = args.iter().map(|a| self.evaluate_value(a, row)).collect();
                SqlFunctions::evaluate(name, &values, self.session)
            }
            Expr::Binary { left, op, right } => {
                arithmetic(*op, &self.evaluate_value(left, row), &self.evaluate_value(right, row))
            }
            Expr::Negate(inner) => match self.evaluate_value(inner, row) {
                Value::Null => Value::Null,
                Value::Integer(i) => i.checked_neg().map_or(Value::Real(-(i as f64)), Value::Integer),
                other => Value::Real(-arithmetic_operand(&other)),
            },
            Expr::Variable(name) => self.session.variable(name),
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                let subject = operand.as_ref().map(|o| self.evaluate_value(o, row));
                for (when, then) in branches {
                    let hit = match &subject {
                        Some(subject) => subject.sql_eq(&self.evaluate_value(when, row)),
                        None => self.evaluate_value(when, row).is_truthy(),
                    };
                    if hit {
                        return self.evaluate_value(then, row);
                    }
                }
                else_result
                    .as_ref()
                    .map_or(Value::Null, |e| self.evaluate_value(e, row))
            }
            Expr::Condition(condition) => Value::Integer(i64::from(self.evaluate_where(condition, row))),
        }
    }

    pub fn evaluate_where(&self, condition: &Condition, row: &Row) -> bool {
        let mut result: Option<bool> = None;
        let mut pending: Option<&ConditionToken> = None;
        let mut negate = false;

        for token in &condition.tokens {
            let operand = match token {
                ConditionToken::Not => {
                    negate = !negate;
                    continue;
                }
                ConditionToken::And | ConditionToken::Or => {
                    pending = Some(token);
                    continue;
                }
                ConditionToken::Predicate(predicate) => self.evaluate_predicate(predicate, row),
                ConditionToken::Group(group) => self.evaluate_where(group, row),
            };
            let operand = operand != std::mem::take(&mut negate);
            result = Some(match (result, pending.take()) {
                (None, _) => operand,
                (Some(acc), Some(ConditionToken::Or)) => acc || operand,
                (Some(acc), _) => acc && operand,
            });
        }
        result.unwrap_or(true)
    }

    fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
        if op == CompareOp::NullSafeEq {
            return match (left.is_null(), right.is_null()) {
                (true, true) => true,
                (false, false) => left.sql_eq(right),
                _ => false,
            };
        }
        let Some(ordering) = left.compare(right) else {
            return false;
        };
        match op {
            CompareOp::Eq | CompareOp::NullSafeEq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    fn evaluate_predicate(&self, predicate: &Predicate, row: &Row) -> bool {
        match predicate {
            Predicate::Compare { left, op, right } => Self::compare(
                *op,
                &self.evaluate_value(left, row),
                &self.evaluate_value(right, row),
            ),
            Predicate::IsNull { expr, negated } => self.evaluate_value(expr, row).is_null() != *negated,
            Predicate::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.evaluate_value(expr, row);
                let low = self.evaluate_value(low, row);
                let high = self.evaluate_value(high, row);
                match (value.compare(&low), value.compare(&high)) {
                    (Some(lo), Some(hi)) => (lo != Ordering::Less && hi != Ordering::Greater) != *negated,
                    _ => false,
                }
            }
            Predicate::InList { expr, list, negated } => {
                let value = self.evaluate_value(expr, row);
                if value.is_null() {
                    return false;
                }
                let found = list.iter().any(|item| value.sql_eq(&self.evaluate_value(item, row)));
                found != *negated
            }
            Predicate::Like {
                expr,
                pattern,
                negated,
            } => {
                let (Some(text), Some(pattern)) = (
                    self.evaluate_value(expr, row).to_text(),
                    self.evaluate_value(pattern, row).to_text(),
                ) else {
                    return false;
                };
                like_matches(&text, &pattern) != *negated
            }
            Predicate::Expr(expr) => self.evaluate_value(expr, row).is_truthy(),
        }
    }
}
